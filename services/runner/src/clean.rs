//! Annotation stripping for raw counseling transcripts.
//!
//! Source transcripts carry per-utterance annotations that must not leak into
//! persona instructions. This pass keeps only `role` and `content`.

use crate::storage::{discover_sources, write_json};
use anyhow::{Context, Result};
use serde_json::{Value, json};
use std::path::Path;
use tracing::{info, warn};

#[derive(Debug, Default, PartialEq)]
pub struct CleanReport {
    pub written: usize,
    pub skipped: Vec<String>,
}

/// Keeps `role` and `content` of every object entry; other entries are dropped.
///
/// Returns `None` when `raw` is not a JSON array.
pub fn strip_annotations(raw: &str) -> Option<Vec<Value>> {
    let Value::Array(entries) = serde_json::from_str::<Value>(raw).ok()? else {
        return None;
    };
    Some(
        entries
            .iter()
            .filter_map(Value::as_object)
            .map(|entry| {
                json!({
                    "role": entry.get("role").cloned().unwrap_or(Value::Null),
                    "content": entry.get("content").cloned().unwrap_or(Value::Null),
                })
            })
            .collect(),
    )
}

/// Cleans every `*.json` file in `input_dir` into a same-named file in `output_dir`.
pub async fn clean_dir(input_dir: &Path, output_dir: &Path) -> Result<CleanReport> {
    let sources = discover_sources(input_dir).await?;
    let mut report = CleanReport::default();
    if sources.is_empty() {
        warn!(input_dir = %input_dir.display(), "No JSON files found; nothing to clean");
        return Ok(report);
    }
    tokio::fs::create_dir_all(output_dir)
        .await
        .with_context(|| format!("Failed to create output directory {}", output_dir.display()))?;

    for source in sources {
        let raw = tokio::fs::read_to_string(&source.path)
            .await
            .with_context(|| format!("Failed to read {}", source.path.display()))?;
        match strip_annotations(&raw) {
            Some(cleaned) => {
                write_json(&output_dir.join(&source.source_id), &cleaned).await?;
                report.written += 1;
            }
            None => {
                warn!(source_id = %source.source_id, "Not a JSON array, skipping");
                report.skipped.push(source.source_id);
            }
        }
    }
    info!(
        written = report.written,
        skipped = report.skipped.len(),
        "Annotation stripping finished"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_strip_keeps_role_and_content() {
        let raw = r#"[
            {"role": "client", "content": "我很累", "annotation": {"emotion": "sad"}},
            "stray",
            {"content": "no role"}
        ]"#;
        let cleaned = strip_annotations(raw).unwrap();
        assert_eq!(
            cleaned,
            vec![
                json!({"role": "client", "content": "我很累"}),
                json!({"role": null, "content": "no role"}),
            ]
        );
    }

    #[test]
    fn test_strip_rejects_non_arrays() {
        assert!(strip_annotations("{\"role\": \"client\"}").is_none());
        assert!(strip_annotations("not json").is_none());
    }

    #[tokio::test]
    async fn test_clean_dir() {
        let input = tempdir().unwrap();
        let output = tempdir().unwrap();
        std::fs::write(
            input.path().join("a.json"),
            r#"[{"role":"client","content":"hi","annotation":"x"}]"#,
        )
        .unwrap();
        std::fs::write(input.path().join("b.json"), "oops").unwrap();

        let report = clean_dir(input.path(), &output.path().join("clean"))
            .await
            .unwrap();
        assert_eq!(report.written, 1);
        assert_eq!(report.skipped, vec!["b.json".to_string()]);

        let written: Value = serde_json::from_str(
            &std::fs::read_to_string(output.path().join("clean/a.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(written, json!([{"role": "client", "content": "hi"}]));
    }
}
