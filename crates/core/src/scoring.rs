//! Utterance Scoring
//!
//! Strict parsing of rubric scores and the per-conversation scoring pass that
//! turns every scorable utterance into an `EvaluationRecord`.

use crate::conversation::{Conversation, RoleId};
use crate::error::{CounselError, ScoreParseError};
use crate::llm_client::GenerationClient;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Shape of a rubric's numeric output: `dimensions` scores in `[0, max]`,
/// each a multiple of `step`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreScale {
    pub dimensions: usize,
    pub max: f64,
    pub step: f64,
}

impl Default for ScoreScale {
    fn default() -> Self {
        Self {
            dimensions: 7,
            max: 3.0,
            step: 0.5,
        }
    }
}

impl ScoreScale {
    /// Parses a whitespace-separated score line such as `"2 3 2.5 2 3 2 3"`.
    pub fn parse(&self, raw: &str) -> Result<ScoreVector, ScoreParseError> {
        let tokens: Vec<&str> = raw.split_whitespace().collect();
        if tokens.len() != self.dimensions {
            return Err(ScoreParseError::WrongCount {
                expected: self.dimensions,
                got: tokens.len(),
                raw: raw.trim().to_string(),
            });
        }

        let mut values = Vec::with_capacity(tokens.len());
        for token in tokens {
            let value = token
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .ok_or_else(|| ScoreParseError::NonNumeric {
                    token: token.to_string(),
                })?;
            if !(0.0..=self.max).contains(&value) {
                return Err(ScoreParseError::OutOfRange {
                    value,
                    max: self.max,
                });
            }
            let steps = value / self.step;
            if (steps - steps.round()).abs() > 1e-9 {
                return Err(ScoreParseError::OffStep {
                    value,
                    step: self.step,
                });
            }
            values.push(value);
        }
        Ok(ScoreVector(values))
    }
}

/// Ordered per-dimension scores for one utterance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScoreVector(Vec<f64>);

impl ScoreVector {
    pub fn new(values: Vec<f64>) -> Self {
        Self(values)
    }

    pub fn values(&self) -> &[f64] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Arithmetic mean of all dimensions; zero for an empty vector.
    pub fn mean(&self) -> f64 {
        if self.0.is_empty() {
            return 0.0;
        }
        self.0.iter().sum::<f64>() / self.0.len() as f64
    }
}

/// The score of one therapist utterance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationRecord {
    pub utterance_index: usize,
    pub reply_text: String,
    pub scores: ScoreVector,
    pub turn_average: f64,
}

impl EvaluationRecord {
    pub fn new(utterance_index: usize, reply_text: impl Into<String>, scores: ScoreVector) -> Self {
        let turn_average = scores.mean();
        Self {
            utterance_index,
            reply_text: reply_text.into(),
            scores,
            turn_average,
        }
    }
}

/// An utterance that was not scored, and why.
#[derive(Debug)]
pub struct SkippedUtterance {
    pub utterance_index: usize,
    pub error: CounselError,
}

/// Result of one conversation's scoring pass.
#[derive(Debug, Default)]
pub struct ScoringOutcome {
    /// Records in ascending `utterance_index` order.
    pub records: Vec<EvaluationRecord>,
    pub skipped: Vec<SkippedUtterance>,
}

/// Scores the utterances of one role in a finished conversation.
///
/// Calls are made one at a time, in utterance order; the client's scoring
/// delay separates successive calls.
pub struct UtteranceScorer<'a> {
    client: &'a GenerationClient,
    rubric: &'a str,
    scorable_role: RoleId,
}

impl<'a> UtteranceScorer<'a> {
    pub fn new(client: &'a GenerationClient, rubric: &'a str, scorable_role: RoleId) -> Self {
        Self {
            client,
            rubric,
            scorable_role,
        }
    }

    /// The conversation's therapist role when it is not the scorable role.
    pub fn mismatched_therapist(&self, conversation: &Conversation) -> Option<RoleId> {
        conversation
            .therapist_role()
            .filter(|therapist| *therapist != self.scorable_role)
    }

    /// Scores every utterance spoken by the scorable role.
    ///
    /// A failure on one utterance is recorded in `skipped` and the pass moves
    /// on to the next utterance. Client utterances are never scored.
    pub async fn evaluate(&self, conversation: &Conversation) -> ScoringOutcome {
        let mut outcome = ScoringOutcome::default();
        if self.scorable_role == RoleId::Client {
            warn!("Scorable role is 'client'; client utterances are never scored");
            return outcome;
        }
        if let Some(therapist) = self.mismatched_therapist(conversation) {
            warn!(
                conversation_therapist = %therapist,
                scorable_role = %self.scorable_role,
                "Conversation therapist differs from the scorable role; nothing will be scored"
            );
        }

        for (index, utterance) in conversation.utterances().iter().enumerate() {
            if utterance.role != self.scorable_role {
                continue;
            }
            let result = match conversation.prefix_json(index) {
                Ok(context) => {
                    self.client
                        .score(self.rubric, &context, &utterance.content)
                        .await
                }
                Err(e) => Err(e),
            };
            match result {
                Ok(scores) => {
                    let record = EvaluationRecord::new(index, utterance.content.clone(), scores);
                    info!(
                        utterance_index = index,
                        scores = ?record.scores.values(),
                        turn_average = record.turn_average,
                        "Scored utterance"
                    );
                    outcome.records.push(record);
                }
                Err(error) => {
                    warn!(utterance_index = index, error = %error, "Skipping utterance");
                    outcome.skipped.push(SkippedUtterance {
                        utterance_index: index,
                        error,
                    });
                }
            }
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::{TherapistStyle, Utterance};
    use crate::llm_client::{RequestKind, ScriptedBackend};
    use approx::assert_relative_eq;
    use std::sync::Arc;

    const SFBT: RoleId = RoleId::Therapist(TherapistStyle::Sfbt);

    fn four_turns() -> Conversation {
        let mut conversation = Conversation::seeded("I feel overwhelmed");
        conversation.append(Utterance::new(SFBT, "first reply")).unwrap();
        conversation.append(Utterance::new(RoleId::Client, "ok")).unwrap();
        conversation.append(Utterance::new(SFBT, "second reply")).unwrap();
        conversation
    }

    #[test]
    fn test_parse_valid_scores() {
        let scores = ScoreScale::default().parse("1 2 1.5 3 0 2 2").unwrap();
        assert_eq!(scores.values(), &[1.0, 2.0, 1.5, 3.0, 0.0, 2.0, 2.0]);
        assert_relative_eq!(scores.mean(), 11.5 / 7.0);
        assert_relative_eq!(scores.mean(), 1.642857, epsilon = 1e-6);
    }

    #[test]
    fn test_parse_rejects_malformed_scores() {
        let scale = ScoreScale::default();
        assert!(matches!(
            scale.parse("1 2 3"),
            Err(ScoreParseError::WrongCount { expected: 7, got: 3, .. })
        ));
        assert!(matches!(
            scale.parse("1 2 3 x 1 1 1"),
            Err(ScoreParseError::NonNumeric { .. })
        ));
        assert!(matches!(
            scale.parse("1 2 3 NaN 1 1 1"),
            Err(ScoreParseError::NonNumeric { .. })
        ));
        assert!(matches!(
            scale.parse("1 2 3 3.5 1 1 1"),
            Err(ScoreParseError::OutOfRange { .. })
        ));
        assert!(matches!(
            scale.parse("1 2 -0.5 3 1 1 1"),
            Err(ScoreParseError::OutOfRange { .. })
        ));
        assert!(matches!(
            scale.parse("1 2 1.25 3 1 1 1"),
            Err(ScoreParseError::OffStep { .. })
        ));
        assert!(matches!(scale.parse(""), Err(ScoreParseError::WrongCount { got: 0, .. })));
    }

    #[test]
    fn test_custom_scale() {
        let scale = ScoreScale {
            dimensions: 3,
            max: 5.0,
            step: 1.0,
        };
        assert_eq!(scale.parse(" 5 0 4\n").unwrap().len(), 3);
        assert!(scale.parse("4.5 0 4").is_err());
    }

    #[test]
    fn test_record_average() {
        let record = EvaluationRecord::new(1, "hi", ScoreVector::new(vec![1.0, 2.0, 3.0]));
        assert_relative_eq!(record.turn_average, 2.0);
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["scores"], serde_json::json!([1.0, 2.0, 3.0]));
        assert_eq!(json["utterance_index"], 1);
    }

    #[tokio::test]
    async fn test_scores_only_therapist_utterances() {
        let backend = Arc::new(ScriptedBackend::new("2 2 2 2 2 2 2"));
        let client = GenerationClient::new(backend.clone(), ScoreScale::default());
        let scorer = UtteranceScorer::new(&client, "rubric", SFBT);

        assert_eq!(scorer.mismatched_therapist(&four_turns()), None);
        let outcome = scorer.evaluate(&four_turns()).await;
        let indices: Vec<usize> = outcome.records.iter().map(|r| r.utterance_index).collect();
        assert_eq!(indices, vec![1, 3]);
        assert!(outcome.skipped.is_empty());

        let requests = backend.requests();
        assert_eq!(requests.len(), 2);
        assert!(requests.iter().all(|r| r.kind == RequestKind::Score));
        // The context stops at the scored utterance.
        assert!(requests[0].user.contains("first reply"));
        assert!(!requests[0].user.contains("second reply"));
        assert!(requests[1].user.contains("second reply"));
    }

    #[tokio::test]
    async fn test_bad_score_skips_only_that_utterance() {
        let backend = Arc::new(
            ScriptedBackend::new("3 3 3 3 3 3 3").with_score_replies(["1 2 3"]),
        );
        let client = GenerationClient::new(backend, ScoreScale::default());
        let scorer = UtteranceScorer::new(&client, "rubric", SFBT);

        let outcome = scorer.evaluate(&four_turns()).await;
        assert_eq!(outcome.records.len(), 1);
        assert_eq!(outcome.records[0].utterance_index, 3);
        assert_eq!(outcome.skipped.len(), 1);
        assert_eq!(outcome.skipped[0].utterance_index, 1);
        assert!(matches!(outcome.skipped[0].error, CounselError::ScoreParse(_)));
    }

    #[tokio::test]
    async fn test_mismatched_scorable_role_scores_nothing() {
        let backend = Arc::new(ScriptedBackend::new("2 2 2 2 2 2 2"));
        let client = GenerationClient::new(backend.clone(), ScoreScale::default());
        let cbt = RoleId::Therapist(TherapistStyle::Cbt);

        let scorer = UtteranceScorer::new(&client, "rubric", cbt);
        assert_eq!(scorer.mismatched_therapist(&four_turns()), Some(SFBT));
        let outcome = scorer.evaluate(&four_turns()).await;
        assert!(outcome.records.is_empty());
        assert!(backend.requests().is_empty());

        let outcome = UtteranceScorer::new(&client, "rubric", RoleId::Client)
            .evaluate(&four_turns())
            .await;
        assert!(outcome.records.is_empty());
    }
}
