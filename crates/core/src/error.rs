//! Failure taxonomy shared by the dialogue and scoring pipelines.
//!
//! Each variant is scoped to the smallest unit of work it can affect and never
//! aborts sibling work. `ScoreParse` costs one utterance, `Generation` ends one
//! conversation early.

/// Errors raised by the core pipeline.
#[derive(Debug, thiserror::Error)]
pub enum CounselError {
    /// A seed or conversation file could not be read or did not have the expected shape.
    #[error("Failed to load source '{source_id}': {reason}")]
    SeedLoad { source_id: String, reason: String },
    /// The generation backend was unreachable, errored, timed out or returned nothing.
    #[error("Generation failed: {0}")]
    Generation(String),
    /// A scoring response did not parse to exactly N in-range numbers.
    #[error("Unparseable score response: {0}")]
    ScoreParse(#[from] ScoreParseError),
    /// There were no evaluation records to summarize.
    #[error("No evaluation records to summarize")]
    EmptyResult,
    /// A role identifier has no persona or is not part of the closed role set.
    #[error("Unknown role: {0}")]
    UnknownRole(String),
    /// An utterance sequence broke the client/therapist alternation.
    #[error("Invalid conversation: {0}")]
    InvalidConversation(String),
}

/// The specific way a scoring response was malformed.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ScoreParseError {
    #[error("expected {expected} scores, got {got} in '{raw}'")]
    WrongCount {
        expected: usize,
        got: usize,
        raw: String,
    },
    #[error("'{token}' is not a number")]
    NonNumeric { token: String },
    #[error("{value} is outside [0, {max}]")]
    OutOfRange { value: f64, max: f64 },
    #[error("{value} is not a multiple of {step}")]
    OffStep { value: f64, step: f64 },
}

pub type Result<T, E = CounselError> = std::result::Result<T, E>;
