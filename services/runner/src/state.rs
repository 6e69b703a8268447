//! Shared Run State
//!
//! This module defines the `AppState` struct, which holds the resources every
//! worker of a run shares: the configuration, the persona registry and the
//! generation client.

use crate::config::Config;
use counsel_core::llm_client::{CompletionBackend, GenerationClient, RetryPolicy};
use counsel_core::persona::PersonaRegistry;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// The shared state, created once at startup and handed to every worker.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub registry: Arc<PersonaRegistry>,
    pub client: GenerationClient,
}

impl AppState {
    /// Builds the registry from built-in personas plus any prompt overrides,
    /// and wraps `backend` with the configured scale, delay and retry policy.
    pub fn new(
        config: Config,
        prompts: &HashMap<String, String>,
        backend: Arc<dyn CompletionBackend>,
    ) -> Self {
        let registry = PersonaRegistry::from_prompts(prompts, config.max_turns);
        let client = GenerationClient::new(backend, config.score_scale)
            .with_scoring_delay(config.scoring_delay)
            .with_retry(RetryPolicy {
                max_attempts: config.max_attempts,
                backoff: Duration::from_secs(1),
            });
        Self {
            config: Arc::new(config),
            registry: Arc::new(registry),
            client,
        }
    }
}
