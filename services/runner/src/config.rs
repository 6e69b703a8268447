use counsel_core::conversation::{RoleId, TherapistStyle};
use counsel_core::persona::DEFAULT_TURN_BUDGET;
use counsel_core::scoring::ScoreScale;
use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::Level;

/// Decimal places beyond this are below `f64` resolution for scores of this size.
const MAX_SUMMARY_PRECISION: u32 = 15;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub openai_api_key: Option<String>,
    pub api_base: String,
    pub generation_model: String,
    pub scoring_model: String,
    /// Maximum number of utterances per simulated conversation.
    pub max_turns: usize,
    pub worker_pool_size: usize,
    pub scoring_delay: Duration,
    pub score_scale: ScoreScale,
    /// Decimal places kept in summary averages.
    pub summary_precision: u32,
    pub therapist_style: TherapistStyle,
    /// Role whose utterances are scored; `None` means the therapist of `therapist_style`.
    pub scored_role: Option<RoleId>,
    pub max_attempts: u32,
    pub log_level: Level,
    pub prompts_path: Option<PathBuf>,
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let openai_api_key = std::env::var("OPENAI_API_KEY")
            .ok()
            .filter(|key| !key.trim().is_empty());
        let api_base = std::env::var("OPENAI_API_BASE")
            .unwrap_or_else(|_| "https://api.openai.com/v1/".to_string());
        let generation_model =
            std::env::var("GENERATION_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string());
        let scoring_model = std::env::var("SCORING_MODEL").unwrap_or_else(|_| "gpt-4o".to_string());

        let max_turns = parse_var("MAX_TURNS", DEFAULT_TURN_BUDGET)?;
        let worker_pool_size = parse_var("WORKER_POOL_SIZE", 4usize)?;
        let scoring_delay = Duration::from_millis(parse_var("SCORING_DELAY_MS", 1000u64)?);
        let defaults = ScoreScale::default();
        let score_scale = ScoreScale {
            dimensions: parse_var("RUBRIC_DIMENSIONS", defaults.dimensions)?,
            max: parse_var("SCORE_MAX", defaults.max)?,
            step: parse_var("SCORE_STEP", defaults.step)?,
        };
        let summary_precision = parse_var("SUMMARY_PRECISION", 4u32)?;
        let therapist_style = parse_var("THERAPIST_STYLE", TherapistStyle::Sfbt)?;
        let scored_role = match std::env::var("SCORED_ROLE") {
            Ok(raw) => Some(raw.parse::<RoleId>().map_err(|e| {
                ConfigError::InvalidValue("SCORED_ROLE".to_string(), e.to_string())
            })?),
            Err(_) => None,
        };
        let max_attempts = parse_var("MAX_ATTEMPTS", 1u32)?;

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let prompts_path = std::env::var("PROMPTS_PATH").ok().map(PathBuf::from);

        let config = Self {
            openai_api_key,
            api_base,
            generation_model,
            scoring_model,
            max_turns,
            worker_pool_size,
            scoring_delay,
            score_scale,
            summary_precision,
            therapist_style,
            scored_role,
            max_attempts,
            log_level,
            prompts_path,
        };
        config.validate()?;
        Ok(config)
    }

    /// Checks the numeric bounds every run relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |var: &str, msg: &str| {
            Err(ConfigError::InvalidValue(var.to_string(), msg.to_string()))
        };
        if self.max_turns == 0 {
            return invalid("MAX_TURNS", "must be at least 1");
        }
        if self.worker_pool_size == 0 {
            return invalid("WORKER_POOL_SIZE", "must be at least 1");
        }
        if self.score_scale.dimensions == 0 {
            return invalid("RUBRIC_DIMENSIONS", "must be at least 1");
        }
        if !(self.score_scale.max.is_finite() && self.score_scale.max > 0.0) {
            return invalid("SCORE_MAX", "must be a positive number");
        }
        if !(self.score_scale.step.is_finite() && self.score_scale.step > 0.0) {
            return invalid("SCORE_STEP", "must be a positive number");
        }
        if self.summary_precision > MAX_SUMMARY_PRECISION {
            return invalid("SUMMARY_PRECISION", "must be at most 15");
        }
        if self.max_attempts == 0 {
            return invalid("MAX_ATTEMPTS", "must be at least 1");
        }
        Ok(())
    }

    /// The role whose utterances the scorer evaluates.
    pub fn scorable_role(&self) -> RoleId {
        self.scored_role
            .unwrap_or(RoleId::Therapist(self.therapist_style))
    }

    /// The API key, required by any command that talks to the generation service.
    pub fn require_api_key(&self) -> Result<&str, ConfigError> {
        self.openai_api_key
            .as_deref()
            .ok_or_else(|| ConfigError::MissingVar("OPENAI_API_KEY".to_string()))
    }
}

fn parse_var<T>(name: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidValue(name.to_string(), e.to_string())),
        Err(_) => Ok(default),
    }
}
