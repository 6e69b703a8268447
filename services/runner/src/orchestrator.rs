//! Conversation Orchestrator
//!
//! Fans a directory of sources out over a bounded worker pool. Each source is
//! one isolated unit of work that owns its engine (or scorer) and its output
//! files. Any failure inside a unit, panics included, is reported against its
//! source identifier without touching siblings.

use crate::state::AppState;
use crate::storage::{SourceFile, discover_sources, write_json};
use anyhow::{Context, Result, anyhow};
use counsel_core::conversation::{Conversation, RoleId, SeedRecord};
use counsel_core::dialogue::{DialogueEngine, Termination};
use counsel_core::scoring::UtteranceScorer;
use counsel_core::summary::aggregate;
use counsel_core::CounselError;
use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{Instrument, error, info, info_span, warn};

/// What one source produced.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceOutcome {
    Generated {
        utterances: usize,
        termination: Termination,
    },
    Evaluated {
        scored: usize,
        skipped: usize,
        summarized: bool,
    },
}

impl SourceOutcome {
    /// A failure that still left output behind: a conversation cut short, or
    /// a scoring pass in which every attempted utterance was skipped.
    pub fn failure(&self) -> Option<String> {
        match self {
            Self::Generated {
                termination: Termination::GenerationFailed { turn, reason },
                ..
            } => Some(format!("generation failed at turn {turn}: {reason}")),
            Self::Evaluated {
                scored: 0, skipped, ..
            } if *skipped > 0 => Some(format!(
                "all {skipped} scorable utterances were skipped"
            )),
            _ => None,
        }
    }
}

/// A source that produced no output.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceFailure {
    pub source_id: String,
    pub error: String,
}

/// Per-source results of one run, sorted by source identifier.
#[derive(Debug, Default)]
pub struct RunReport {
    pub completed: Vec<(String, SourceOutcome)>,
    pub failed: Vec<SourceFailure>,
}

impl RunReport {
    pub fn total(&self) -> usize {
        self.completed.len() + self.failed.len()
    }

    /// Sources that failed outright or finished with a partial result.
    pub fn failure_count(&self) -> usize {
        self.failed.len()
            + self
                .completed
                .iter()
                .filter(|(_, outcome)| outcome.failure().is_some())
                .count()
    }

    /// True when there was at least one source and none of them succeeded.
    pub fn all_failed(&self) -> bool {
        self.total() > 0 && self.failure_count() == self.total()
    }
}

/// Simulates one conversation per seed file in `input_dir` and writes each to
/// `<stem>_results.json` in `output_dir`.
pub async fn generate_all(
    state: &AppState,
    input_dir: &Path,
    output_dir: &Path,
) -> Result<RunReport> {
    let Some(sources) = prepare(input_dir, output_dir).await? else {
        return Ok(RunReport::default());
    };
    info!(
        sources = sources.len(),
        workers = state.config.worker_pool_size,
        style = %state.config.therapist_style,
        "Starting conversation generation"
    );

    let output_dir = Arc::new(output_dir.to_path_buf());
    let report = fan_out(sources, state.config.worker_pool_size, |source| {
        let state = state.clone();
        let output_dir = output_dir.clone();
        async move { generate_source(&state, &source, &output_dir).await }
    })
    .await;
    Ok(report)
}

/// Scores every conversation file in `input_dir`, writing
/// `<stem>_evaluations.json` and, when anything was scored, `<stem>_summary.json`.
pub async fn evaluate_all(
    state: &AppState,
    input_dir: &Path,
    output_dir: &Path,
) -> Result<RunReport> {
    let Some(sources) = prepare(input_dir, output_dir).await? else {
        return Ok(RunReport::default());
    };
    info!(
        sources = sources.len(),
        workers = state.config.worker_pool_size,
        scored_role = %state.config.scorable_role(),
        "Starting conversation evaluation"
    );

    let output_dir = Arc::new(output_dir.to_path_buf());
    let report = fan_out(sources, state.config.worker_pool_size, |source| {
        let state = state.clone();
        let output_dir = output_dir.clone();
        async move { evaluate_source(&state, &source, &output_dir).await }
    })
    .await;
    Ok(report)
}

async fn prepare(input_dir: &Path, output_dir: &Path) -> Result<Option<Vec<SourceFile>>> {
    let sources = discover_sources(input_dir).await?;
    if sources.is_empty() {
        warn!(input_dir = %input_dir.display(), "No JSON files found; nothing to do");
        return Ok(None);
    }
    tokio::fs::create_dir_all(output_dir)
        .await
        .with_context(|| format!("Failed to create output directory {}", output_dir.display()))?;
    Ok(Some(sources))
}

async fn generate_source(
    state: &AppState,
    source: &SourceFile,
    output_dir: &Path,
) -> Result<SourceOutcome> {
    let raw = read_source(source).await?;
    let seed = SeedRecord::parse(&source.source_id, &raw)?;
    let engine = DialogueEngine::new(
        &state.client,
        &state.registry,
        state.config.therapist_style,
        state.config.max_turns,
        &seed,
    )?;
    let outcome = engine.run().await;

    let path = source.output_path(output_dir, "results");
    write_json(&path, &outcome.conversation).await?;
    match &outcome.termination {
        Termination::TurnLimit => info!(path = %path.display(), "Saved conversation"),
        Termination::GenerationFailed { turn, reason } => warn!(
            turn,
            reason = %reason,
            path = %path.display(),
            "Saved partial conversation"
        ),
    }

    Ok(SourceOutcome::Generated {
        utterances: outcome.conversation.len(),
        termination: outcome.termination,
    })
}

async fn evaluate_source(
    state: &AppState,
    source: &SourceFile,
    output_dir: &Path,
) -> Result<SourceOutcome> {
    let raw = read_source(source).await?;
    let conversation: Conversation =
        serde_json::from_str(&raw).map_err(|e| CounselError::SeedLoad {
            source_id: source.source_id.clone(),
            reason: e.to_string(),
        })?;

    let scorable_role = state.config.scorable_role();
    let rubric_style = match scorable_role {
        RoleId::Therapist(style) => style,
        RoleId::Client => state.config.therapist_style,
    };
    let rubric = state.registry.rubric(rubric_style)?;
    let outcome = UtteranceScorer::new(&state.client, rubric, scorable_role)
        .evaluate(&conversation)
        .await;

    write_json(&source.output_path(output_dir, "evaluations"), &outcome.records).await?;

    let summarized = match aggregate(
        &source.source_id,
        &outcome.records,
        state.config.summary_precision,
    ) {
        Ok(summary) => {
            info!(
                overall_average = summary.overall_average,
                turn_count = summary.turn_count,
                "Summary"
            );
            write_json(&source.output_path(output_dir, "summary"), &summary).await?;
            true
        }
        Err(CounselError::EmptyResult) => {
            info!("Nothing to summarize");
            false
        }
        Err(e) => return Err(e.into()),
    };

    Ok(SourceOutcome::Evaluated {
        scored: outcome.records.len(),
        skipped: outcome.skipped.len(),
        summarized,
    })
}

async fn read_source(source: &SourceFile) -> Result<String> {
    tokio::fs::read_to_string(&source.path)
        .await
        .map_err(|e| {
            CounselError::SeedLoad {
                source_id: source.source_id.clone(),
                reason: e.to_string(),
            }
            .into()
        })
}

/// Runs `work` once per source with at most `workers` units in flight.
async fn fan_out<F, Fut>(sources: Vec<SourceFile>, workers: usize, work: F) -> RunReport
where
    F: Fn(SourceFile) -> Fut,
    Fut: Future<Output = Result<SourceOutcome>> + Send + 'static,
{
    let total = sources.len();
    let semaphore = Arc::new(Semaphore::new(workers.max(1)));
    let mut join_set = JoinSet::new();

    for source in sources {
        let semaphore = semaphore.clone();
        let source_id = source.source_id.clone();
        let span = info_span!("source", source_id = %source_id);
        let unit = work(source).instrument(span);
        join_set.spawn(async move {
            let result = match semaphore.acquire_owned().await {
                Ok(_permit) => match AssertUnwindSafe(unit).catch_unwind().await {
                    Ok(result) => result,
                    Err(panic) => Err(anyhow!(
                        "worker panicked: {}",
                        panic_message(panic.as_ref())
                    )),
                },
                Err(_) => Err(anyhow!("worker pool closed")),
            };
            (source_id, result)
        });
    }

    let mut report = RunReport::default();
    while let Some(joined) = join_set.join_next().await {
        match joined {
            Ok((source_id, Ok(outcome))) => {
                if let Some(reason) = outcome.failure() {
                    warn!(source_id = %source_id, reason = %reason, "Source finished with errors");
                }
                report.completed.push((source_id, outcome));
            }
            Ok((source_id, Err(e))) => {
                error!(source_id = %source_id, error = %format!("{e:#}"), "Source failed");
                report.failed.push(SourceFailure {
                    source_id,
                    error: format!("{e:#}"),
                });
            }
            // Panics are caught inside the unit, so only a cancelled task lands here.
            Err(e) => error!(error = %e, "Worker task did not complete"),
        }
        info!(done = report.total(), total, "Progress");
    }

    report.completed.sort_by(|a, b| a.0.cmp(&b.0));
    report.failed.sort_by(|a, b| a.source_id.cmp(&b.source_id));
    report
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}
