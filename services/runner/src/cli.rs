//! Command-line interface.

use crate::config::Config;
use clap::{Args, Parser, Subcommand};
use counsel_core::conversation::{RoleId, TherapistStyle};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "counsel", version)]
#[command(about = "Simulate and score counseling dialogues with LLM personas", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Simulate one conversation per seed file
    Generate {
        #[arg(long, default_value = "data/seeds")]
        input_dir: PathBuf,
        #[arg(long, default_value = "data/results")]
        output_dir: PathBuf,
        #[command(flatten)]
        run: RunArgs,
        /// Override MAX_TURNS
        #[arg(long)]
        max_turns: Option<usize>,
    },
    /// Score the therapist utterances of each conversation file
    Evaluate {
        #[arg(long, default_value = "data/results")]
        input_dir: PathBuf,
        #[arg(long, default_value = "data/evaluations")]
        output_dir: PathBuf,
        #[command(flatten)]
        run: RunArgs,
        /// Override SCORED_ROLE, e.g. `therapist_cbt`
        #[arg(long)]
        scored_role: Option<RoleId>,
    },
    /// Strip annotations from raw transcripts, keeping role and content
    Clean {
        #[arg(long, default_value = "data/raw")]
        input_dir: PathBuf,
        #[arg(long, default_value = "data/seeds")]
        output_dir: PathBuf,
    },
}

/// Overrides shared by the commands that call the generation service.
#[derive(Args, Debug, Clone, Default)]
pub struct RunArgs {
    /// Override THERAPIST_STYLE (sfbt, humanistic, cbt)
    #[arg(long)]
    pub style: Option<TherapistStyle>,
    /// Override WORKER_POOL_SIZE
    #[arg(long)]
    pub workers: Option<usize>,
}

impl RunArgs {
    pub fn apply(&self, config: &mut Config) {
        if let Some(style) = self.style {
            config.therapist_style = style;
        }
        if let Some(workers) = self.workers {
            config.worker_pool_size = workers;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_generate_overrides() {
        let cli = Cli::try_parse_from([
            "counsel",
            "generate",
            "--input-dir",
            "seeds",
            "--style",
            "cbt",
            "--workers",
            "8",
            "--max-turns",
            "6",
        ])
        .unwrap();
        match cli.command {
            Command::Generate {
                input_dir,
                output_dir,
                run,
                max_turns,
            } => {
                assert_eq!(input_dir, PathBuf::from("seeds"));
                assert_eq!(output_dir, PathBuf::from("data/results"));
                assert_eq!(run.style, Some(TherapistStyle::Cbt));
                assert_eq!(run.workers, Some(8));
                assert_eq!(max_turns, Some(6));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_parse_evaluate_rejects_unknown_role() {
        assert!(
            Cli::try_parse_from(["counsel", "evaluate", "--scored-role", "narrator"]).is_err()
        );
        let cli =
            Cli::try_parse_from(["counsel", "evaluate", "--scored-role", "therapist_humanistic"])
                .unwrap();
        assert!(matches!(
            cli.command,
            Command::Evaluate {
                scored_role: Some(RoleId::Therapist(TherapistStyle::Humanistic)),
                ..
            }
        ));
    }
}
