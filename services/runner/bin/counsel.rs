//! Main Entrypoint for the Counseling Dialogue Runner
//!
//! This binary is responsible for:
//! 1. Parsing the command line and loading configuration from the environment.
//! 2. Initializing logging.
//! 3. Building the generation backend and shared run state.
//! 4. Running the requested command and turning its report into an exit status.

use anyhow::{Context, bail};
use async_openai::config::OpenAIConfig;
use clap::Parser;
use counsel_core::llm_client::OpenAICompatibleBackend;
use counsel_runner::{
    clean::clean_dir,
    cli::{Cli, Command},
    config::Config,
    orchestrator::{RunReport, evaluate_all, generate_all},
    state::AppState,
    storage::load_prompts,
};
use std::{collections::HashMap, sync::Arc};
use tracing::{info, warn};

/// Builds the shared state once the command-line overrides have been applied.
fn build_state(config: Config) -> anyhow::Result<AppState> {
    config.validate().context("Invalid command-line override")?;

    let prompts = match &config.prompts_path {
        Some(path) => load_prompts(path)?,
        None => HashMap::new(),
    };

    let openai_config = OpenAIConfig::new()
        .with_api_key(config.require_api_key()?)
        .with_api_base(&config.api_base);
    let backend = Arc::new(OpenAICompatibleBackend::new(
        openai_config,
        config.generation_model.clone(),
        config.scoring_model.clone(),
    ));

    info!(
        generation_model = %config.generation_model,
        scoring_model = %config.scoring_model,
        api_base = %config.api_base,
        "Generation service configured"
    );
    Ok(AppState::new(config, &prompts, backend))
}

/// Logs the report and fails the process only when every source failed.
fn finish(command: &str, report: RunReport) -> anyhow::Result<()> {
    for failure in &report.failed {
        warn!(source_id = %failure.source_id, error = %failure.error, "Failed source");
    }
    info!(
        command,
        total = report.total(),
        failed = report.failure_count(),
        "Run finished"
    );
    if report.all_failed() {
        bail!("All {} sources failed", report.total());
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // --- 1. Parse Arguments and Load Configuration ---
    let cli = Cli::parse();
    let mut config = Config::from_env().context("Failed to load configuration")?;

    // --- 2. Initialize Logging ---
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .init();

    // --- 3. Run the Command ---
    match cli.command {
        Command::Generate {
            input_dir,
            output_dir,
            run,
            max_turns,
        } => {
            run.apply(&mut config);
            if let Some(max_turns) = max_turns {
                config.max_turns = max_turns;
            }
            let state = build_state(config)?;
            let report = generate_all(&state, &input_dir, &output_dir).await?;
            finish("generate", report)
        }
        Command::Evaluate {
            input_dir,
            output_dir,
            run,
            scored_role,
        } => {
            run.apply(&mut config);
            if scored_role.is_some() {
                config.scored_role = scored_role;
            }
            let state = build_state(config)?;
            let report = evaluate_all(&state, &input_dir, &output_dir).await?;
            finish("evaluate", report)
        }
        Command::Clean {
            input_dir,
            output_dir,
        } => {
            clean_dir(&input_dir, &output_dir).await?;
            Ok(())
        }
    }
}
