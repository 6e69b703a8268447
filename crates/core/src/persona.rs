//! Persona Registry
//!
//! Maps every role in the closed role set to its instructions, and every
//! therapist style to the rubric its replies are scored against. The registry
//! is built once at startup and shared read-only (behind an `Arc`) by all
//! concurrently running dialogue engines and scorers.

use crate::conversation::{RoleId, TherapistStyle};
use crate::error::{CounselError, Result};
use crate::prompts;
use std::collections::HashMap;
use tracing::{debug, info};

/// Default number of utterances a persona allows in one conversation.
pub const DEFAULT_TURN_BUDGET: usize = 20;

/// The static behavioral policy bound to one role.
#[derive(Debug, Clone, PartialEq)]
pub struct PersonaDefinition {
    pub role: RoleId,
    pub instructions: String,
    /// Upper bound on the total utterance count of a conversation with this persona.
    pub turn_budget: usize,
}

impl PersonaDefinition {
    /// Instructions with the reference transcript substituted in.
    ///
    /// Personas without the placeholder are returned unchanged.
    pub fn render_instructions(&self, reference_conversation: &str) -> String {
        self.instructions
            .replace(prompts::REFERENCE_PLACEHOLDER, reference_conversation)
    }
}

/// Immutable lookup table of personas and rubrics.
#[derive(Debug, Clone)]
pub struct PersonaRegistry {
    personas: HashMap<RoleId, PersonaDefinition>,
    rubrics: HashMap<TherapistStyle, String>,
}

impl PersonaRegistry {
    /// A registry holding only the built-in personas and rubrics.
    pub fn builtin(turn_budget: usize) -> Self {
        Self::from_prompts(&HashMap::new(), turn_budget)
    }

    /// Builds the registry, preferring prompt texts from `overrides` keyed by
    /// `client`, `therapist_<style>` or `rubric_<style>`.
    pub fn from_prompts(overrides: &HashMap<String, String>, turn_budget: usize) -> Self {
        let pick = |key: &str, builtin: String| match overrides.get(key) {
            Some(text) => {
                info!(prompt = %key, "Using prompt override");
                text.clone()
            }
            None => builtin,
        };

        let mut personas = HashMap::new();
        let client = RoleId::Client;
        personas.insert(
            client,
            PersonaDefinition {
                role: client,
                instructions: pick(
                    &client.to_string(),
                    prompts::CLIENT_INSTRUCTIONS.to_string(),
                ),
                turn_budget,
            },
        );

        let mut rubrics = HashMap::new();
        for style in TherapistStyle::ALL {
            let role = RoleId::Therapist(style);
            let (instructions, rubric) = match style {
                TherapistStyle::Sfbt => (
                    prompts::THERAPIST_SFBT_INSTRUCTIONS,
                    prompts::rubric_sfbt(),
                ),
                TherapistStyle::Humanistic => (
                    prompts::THERAPIST_HUMANISTIC_INSTRUCTIONS,
                    prompts::rubric_humanistic(),
                ),
                TherapistStyle::Cbt => (
                    prompts::THERAPIST_CBT_INSTRUCTIONS,
                    prompts::rubric_cbt(),
                ),
            };
            personas.insert(
                role,
                PersonaDefinition {
                    role,
                    instructions: pick(&role.to_string(), instructions.to_string()),
                    turn_budget,
                },
            );
            rubrics.insert(style, pick(&format!("rubric_{style}"), rubric));
        }

        for key in overrides.keys() {
            let known = key == "client"
                || key.parse::<RoleId>().is_ok()
                || key
                    .strip_prefix("rubric_")
                    .is_some_and(|s| s.parse::<TherapistStyle>().is_ok());
            if !known {
                debug!(prompt = %key, "Ignoring prompt file that matches no persona or rubric");
            }
        }

        Self { personas, rubrics }
    }

    /// Looks up the persona bound to `role`.
    pub fn lookup(&self, role: RoleId) -> Result<&PersonaDefinition> {
        self.personas
            .get(&role)
            .ok_or_else(|| CounselError::UnknownRole(role.to_string()))
    }

    /// Looks up the scoring rubric for a therapist style.
    pub fn rubric(&self, style: TherapistStyle) -> Result<&str> {
        self.rubrics
            .get(&style)
            .map(String::as_str)
            .ok_or_else(|| CounselError::UnknownRole(format!("rubric_{style}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_covers_every_role() {
        let registry = PersonaRegistry::builtin(DEFAULT_TURN_BUDGET);
        assert!(registry.lookup(RoleId::Client).is_ok());
        for style in TherapistStyle::ALL {
            let persona = registry.lookup(RoleId::Therapist(style)).unwrap();
            assert_eq!(persona.role, RoleId::Therapist(style));
            assert_eq!(persona.turn_budget, DEFAULT_TURN_BUDGET);
            assert!(!persona.instructions.is_empty());
            assert!(registry.rubric(style).unwrap().contains("0.5 increments"));
        }
    }

    #[test]
    fn test_client_instructions_embed_reference() {
        let registry = PersonaRegistry::builtin(4);
        let client = registry.lookup(RoleId::Client).unwrap();
        let rendered = client.render_instructions("[{\"role\":\"client\"}]");
        assert!(rendered.contains("[{\"role\":\"client\"}]"));
        assert!(!rendered.contains(prompts::REFERENCE_PLACEHOLDER));
    }

    #[test]
    fn test_overrides_replace_builtin_text() {
        let mut overrides = HashMap::new();
        overrides.insert("therapist_cbt".to_string(), "custom cbt".to_string());
        overrides.insert("rubric_humanistic".to_string(), "custom rubric".to_string());
        overrides.insert("unrelated".to_string(), "ignored".to_string());

        let registry = PersonaRegistry::from_prompts(&overrides, 10);
        let cbt = registry
            .lookup(RoleId::Therapist(TherapistStyle::Cbt))
            .unwrap();
        assert_eq!(cbt.instructions, "custom cbt");
        assert_eq!(
            registry.rubric(TherapistStyle::Humanistic).unwrap(),
            "custom rubric"
        );
        assert_ne!(registry.rubric(TherapistStyle::Sfbt).unwrap(), "custom rubric");
    }
}
