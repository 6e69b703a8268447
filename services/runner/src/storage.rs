//! File Access Layer
//!
//! Discovery of per-source JSON inputs, output naming, and the pretty-printed
//! JSON writes every command ends with. One output file per source identifier,
//! so concurrent workers never share a path.

use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::warn;

/// One input file, identified by its file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub source_id: String,
    pub path: PathBuf,
}

impl SourceFile {
    /// The file name without its `.json` extension.
    pub fn stem(&self) -> &str {
        Path::new(&self.source_id)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(&self.source_id)
    }

    /// `<output_dir>/<stem>_<suffix>.json`
    pub fn output_path(&self, output_dir: &Path, suffix: &str) -> PathBuf {
        output_dir.join(format!("{}_{}.json", self.stem(), suffix))
    }
}

/// Lists the `*.json` files directly inside `dir`, sorted by name.
///
/// Files whose stem was already taken (`a.json` and `a.JSON`) are skipped so
/// that no two sources write the same output path.
pub async fn discover_sources(dir: &Path) -> Result<Vec<SourceFile>> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .with_context(|| format!("Failed to read input directory {}", dir.display()))?;

    let mut sources = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let is_json = path
            .extension()
            .and_then(|s| s.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        if !is_json || !entry.file_type().await?.is_file() {
            continue;
        }
        if let Some(name) = path.file_name().and_then(|s| s.to_str()) {
            sources.push(SourceFile {
                source_id: name.to_string(),
                path,
            });
        }
    }
    sources.sort_by(|a, b| a.source_id.cmp(&b.source_id));

    let mut stems = HashSet::new();
    sources.retain(|source| {
        let unique = stems.insert(source.stem().to_string());
        if !unique {
            warn!(
                source_id = %source.source_id,
                stem = source.stem(),
                "Another source already uses this stem, skipping"
            );
        }
        unique
    });
    Ok(sources)
}

/// Serializes `value` as pretty JSON (non-ASCII kept as-is) and writes it to `path`.
pub async fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let body = serde_json::to_string_pretty(value)?;
    tokio::fs::write(path, body)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))
}

/// Loads every `*.md` file in `prompts_path`, keyed by file stem.
pub fn load_prompts(prompts_path: &Path) -> Result<HashMap<String, String>> {
    let mut prompts = HashMap::new();
    for entry in std::fs::read_dir(prompts_path)
        .with_context(|| format!("Failed to read prompts directory {}", prompts_path.display()))?
    {
        let entry = entry?;
        let path = entry.path();
        if path.is_file() && path.extension().and_then(|s| s.to_str()) == Some("md") {
            let prompt_key = path
                .file_stem()
                .and_then(|s| s.to_str())
                .context("Could not get file stem")?
                .to_string();
            let content = std::fs::read_to_string(&path)?;
            prompts.insert(prompt_key, content);
        }
    }
    Ok(prompts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_discover_sources_sorted_json_only() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("b.json"), "[]").unwrap();
        std::fs::write(dir.path().join("a.JSON"), "[]").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "x").unwrap();
        std::fs::create_dir(dir.path().join("nested.json")).unwrap();

        let sources = discover_sources(dir.path()).await.unwrap();
        let ids: Vec<&str> = sources.iter().map(|s| s.source_id.as_str()).collect();
        assert_eq!(ids, vec!["a.JSON", "b.json"]);
    }

    #[tokio::test]
    async fn test_discover_skips_stem_collisions() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("a.json"), "[]").unwrap();
        std::fs::write(dir.path().join("a.JSON"), "[]").unwrap();
        std::fs::write(dir.path().join("b.Json"), "[]").unwrap();

        let sources = discover_sources(dir.path()).await.unwrap();
        let ids: Vec<&str> = sources.iter().map(|s| s.source_id.as_str()).collect();
        // Case-insensitive filesystems hold only one of the two `a` files.
        assert_eq!(ids.iter().filter(|id| id.starts_with("a.")).count(), 1);
        assert_eq!(ids.last(), Some(&"b.Json"));

        let out = Path::new("/out");
        let paths: HashSet<PathBuf> = sources
            .iter()
            .map(|s| s.output_path(out, "results"))
            .collect();
        assert_eq!(paths.len(), sources.len());
    }

    #[tokio::test]
    async fn test_discover_missing_directory() {
        let dir = tempdir().unwrap();
        assert!(discover_sources(&dir.path().join("missing")).await.is_err());
    }

    #[test]
    fn test_output_naming() {
        let source = SourceFile {
            source_id: "session_07.json".to_string(),
            path: PathBuf::from("/in/session_07.json"),
        };
        assert_eq!(source.stem(), "session_07");
        assert_eq!(
            source.output_path(Path::new("/out"), "results"),
            PathBuf::from("/out/session_07_results.json")
        );
    }

    #[tokio::test]
    async fn test_write_json_keeps_unicode() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.json");
        write_json(&path, &serde_json::json!({"content": "（空白）"}))
            .await
            .unwrap();
        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.contains("（空白）"));
        assert!(written.contains('\n'));
    }

    #[test]
    fn test_load_prompts_by_stem() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("therapist_cbt.md"), "Be a CBT therapist.").unwrap();
        std::fs::write(dir.path().join("readme.txt"), "ignored").unwrap();

        let prompts = load_prompts(dir.path()).unwrap();
        assert_eq!(prompts.len(), 1);
        assert_eq!(prompts["therapist_cbt"], "Be a CBT therapist.");
    }
}
