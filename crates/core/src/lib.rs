//! Counseling dialogue simulation and scoring core.
//!
//! - `conversation`: roles, utterances, conversations and seed records.
//! - `persona`: the immutable registry of persona instructions and rubrics.
//! - `llm_client`: the generation service client and its backends.
//! - `dialogue`: the turn-alternation engine that grows one conversation.
//! - `scoring`: strict score parsing and the per-utterance scoring pass.
//! - `summary`: reduction of evaluation records to a summary record.

pub mod conversation;
pub mod dialogue;
pub mod error;
pub mod llm_client;
pub mod persona;
pub mod prompts;
pub mod scoring;
pub mod summary;

pub use error::{CounselError, Result, ScoreParseError};
