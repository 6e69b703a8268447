use crate::error::{CounselError, Result};
use crate::scoring::{ScoreScale, ScoreVector};
use async_openai::{
    Client,
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs,
    },
};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, warn};

/// What a completion request is for. Backends may pick a model or sampling
/// settings per kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    /// Produce the next utterance of a dialogue.
    Generate,
    /// Rate one therapist utterance against a rubric.
    Score,
}

/// A single system + user message exchange with the backend.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub kind: RequestKind,
    pub system: String,
    pub user: String,
}

/// A generic text-completion backend.
///
/// Implementations make exactly one call per invocation and report any
/// transport, quota or timeout problem as `CounselError::Generation`.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<String>;
}

/// An implementation of `CompletionBackend` for any OpenAI-compatible API.
pub struct OpenAICompatibleBackend {
    client: Client<OpenAIConfig>,
    generation_model: String,
    scoring_model: String,
}

impl OpenAICompatibleBackend {
    /// Creates a new backend for an OpenAI-compatible service.
    ///
    /// # Arguments
    ///
    /// * `config` - The configuration for the OpenAI client, including API key and base URL.
    /// * `generation_model` - Model used to produce dialogue turns (e.g., "gpt-4o-mini").
    /// * `scoring_model` - Model used to score therapist replies (e.g., "gpt-4o").
    pub fn new(config: OpenAIConfig, generation_model: String, scoring_model: String) -> Self {
        Self {
            client: Client::with_config(config),
            generation_model,
            scoring_model,
        }
    }
}

#[async_trait]
impl CompletionBackend for OpenAICompatibleBackend {
    async fn complete(&self, request: CompletionRequest) -> Result<String> {
        let mut messages: Vec<ChatCompletionRequestMessage> = vec![
            ChatCompletionRequestSystemMessageArgs::default()
                .content(request.system)
                .build()
                .map_err(backend_err)?
                .into(),
        ];
        if !request.user.is_empty() {
            messages.push(
                ChatCompletionRequestUserMessageArgs::default()
                    .content(request.user)
                    .build()
                    .map_err(backend_err)?
                    .into(),
            );
        }

        let mut args = CreateChatCompletionRequestArgs::default();
        match request.kind {
            RequestKind::Generate => {
                args.model(&self.generation_model);
            }
            RequestKind::Score => {
                args.model(&self.scoring_model).temperature(0.0);
            }
        }
        let chat_request = args
            .messages(messages)
            .build()
            .map_err(backend_err)?;

        let response = self
            .client
            .chat()
            .create(chat_request)
            .await
            .map_err(backend_err)?;

        response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .ok_or_else(|| CounselError::Generation("No content in LLM response".to_string()))
    }
}

fn backend_err(e: impl std::fmt::Display) -> CounselError {
    CounselError::Generation(e.to_string())
}

/// How many times a failed backend call is attempted before giving up.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Values below 1 are treated as 1.
    pub max_attempts: u32,
    /// Pause before attempt `n + 1` is `backoff * n`.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            backoff: Duration::from_secs(1),
        }
    }
}

/// Client for the generation service: dialogue turns and rubric scores.
///
/// Wraps a `CompletionBackend` and owns failure classification: empty text is
/// a `Generation` failure, malformed scores are a `ScoreParse` failure.
#[derive(Clone)]
pub struct GenerationClient {
    backend: Arc<dyn CompletionBackend>,
    scale: ScoreScale,
    scoring_delay: Duration,
    retry: RetryPolicy,
}

impl GenerationClient {
    pub fn new(backend: Arc<dyn CompletionBackend>, scale: ScoreScale) -> Self {
        Self {
            backend,
            scale,
            scoring_delay: Duration::ZERO,
            retry: RetryPolicy::default(),
        }
    }

    /// Fixed pause applied before every scoring call.
    pub fn with_scoring_delay(mut self, delay: Duration) -> Self {
        self.scoring_delay = delay;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn scale(&self) -> &ScoreScale {
        &self.scale
    }

    /// Generates the next utterance for a persona given the transcript so far.
    ///
    /// Returns the trimmed, non-empty reply text.
    pub async fn generate(&self, instructions: &str, transcript: &str) -> Result<String> {
        if instructions.trim().is_empty() {
            return Err(CounselError::Generation(
                "system instructions must not be empty".to_string(),
            ));
        }
        let request = CompletionRequest {
            kind: RequestKind::Generate,
            system: instructions.to_string(),
            user: transcript.to_string(),
        };
        let text = self.call(request).await?;
        let text = text.trim();
        if text.is_empty() {
            return Err(CounselError::Generation(
                "backend returned an empty reply".to_string(),
            ));
        }
        Ok(text.to_string())
    }

    /// Scores one therapist utterance against a rubric.
    ///
    /// `context` is the conversation up to and including the target utterance.
    pub async fn score(&self, rubric: &str, context: &str, target: &str) -> Result<ScoreVector> {
        if !self.scoring_delay.is_zero() {
            tokio::time::sleep(self.scoring_delay).await;
        }
        let user = format!(
            "Here is the full conversation so far (UTF-8 JSON):\n\n{context}\n\n\
             Evaluate **only** this therapist reply:\n\n\"{target}\"\n\n\
             Return {} numbers as described.",
            self.scale.dimensions
        );
        let request = CompletionRequest {
            kind: RequestKind::Score,
            system: rubric.to_string(),
            user,
        };
        let raw = self.call(request).await?;
        Ok(self.scale.parse(&raw)?)
    }

    async fn call(&self, request: CompletionRequest) -> Result<String> {
        let attempts = self.retry.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.backend.complete(request.clone()).await {
                Ok(text) => return Ok(text),
                Err(e) if attempt < attempts => {
                    warn!(attempt, error = %e, "Backend call failed, retrying");
                    tokio::time::sleep(self.retry.backoff * attempt).await;
                    attempt += 1;
                }
                Err(e) => {
                    debug!(attempt, error = %e, "Backend call failed");
                    return Err(e);
                }
            }
        }
    }
}

/// A deterministic `CompletionBackend` for development and integration testing.
///
/// Dialogue requests are answered with `"scripted reply <n>"`, where `n` is
/// the position of the new utterance in the conversation. Scoring requests
/// are answered from a queue of canned replies, falling back to a default.
pub struct ScriptedBackend {
    default_score: String,
    queued_scores: Mutex<VecDeque<String>>,
    fail_at_turn: Option<usize>,
    latency: Duration,
    requests: Mutex<Vec<CompletionRequest>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedBackend {
    pub fn new(default_score: impl Into<String>) -> Self {
        Self {
            default_score: default_score.into(),
            queued_scores: Mutex::new(VecDeque::new()),
            fail_at_turn: None,
            latency: Duration::ZERO,
            requests: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Fails every dialogue request that would produce utterance number `turn` (1-based).
    pub fn failing_at_turn(mut self, turn: usize) -> Self {
        self.fail_at_turn = Some(turn);
        self
    }

    /// Scoring replies returned, in order, before falling back to the default.
    pub fn with_score_replies<I, S>(self, replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if let Ok(mut queue) = self.queued_scores.lock() {
            queue.extend(replies.into_iter().map(Into::into));
        }
        self
    }

    /// Simulated per-call latency.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Every request received so far, in arrival order.
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    /// Highest number of calls that were in progress at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn transcript_turns(transcript: &str) -> usize {
        transcript
            .lines()
            .filter(|line| line.starts_with("Client: ") || line.starts_with("Therapist: "))
            .count()
    }
}

#[async_trait]
impl CompletionBackend for ScriptedBackend {
    async fn complete(&self, request: CompletionRequest) -> Result<String> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }

        let result = match request.kind {
            RequestKind::Generate => {
                let turn = Self::transcript_turns(&request.user) + 1;
                if self.fail_at_turn == Some(turn) {
                    Err(CounselError::Generation(format!(
                        "scripted failure at turn {turn}"
                    )))
                } else {
                    Ok(format!("  scripted reply {turn}\n"))
                }
            }
            RequestKind::Score => Ok(self
                .queued_scores
                .lock()
                .ok()
                .and_then(|mut queue| queue.pop_front())
                .unwrap_or_else(|| self.default_score.clone())),
        };
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}
