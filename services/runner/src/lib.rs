//! Counseling Dialogue Runner Library Crate
//!
//! This library contains everything the `counsel` binary drives: configuration,
//! shared run state, file access, the per-source orchestrator, and the
//! annotation-stripping pass. The binary is a thin wrapper around it.

pub mod clean;
pub mod cli;
pub mod config;
pub mod orchestrator;
pub mod state;
pub mod storage;
