//! Dialogue Engine
//!
//! Drives a single simulated counseling conversation from its seed to
//! termination. One engine owns one `Conversation` exclusively; generation
//! calls are strictly sequential because each turn depends on the last.
//!
//! State machine:
//!
//! ```text
//! Seeded -> Generating(role) -> Appended -> Generating(opponent) | Terminated
//! ```

use crate::conversation::{Conversation, RoleId, SeedRecord, TherapistStyle, Utterance};
use crate::error::Result;
use crate::llm_client::GenerationClient;
use crate::persona::PersonaRegistry;
use tracing::{debug, info, warn};

/// Why a conversation stopped growing.
#[derive(Debug, Clone, PartialEq)]
pub enum Termination {
    /// The maximum utterance count was reached.
    TurnLimit,
    /// The generation service failed while producing utterance number `turn` (1-based).
    GenerationFailed { turn: usize, reason: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum DialogueState {
    /// Only the opening client utterance exists.
    Seeded,
    /// The next utterance for this role is being requested.
    Generating(RoleId),
    /// An utterance was just appended.
    Appended,
    Terminated(Termination),
}

/// A finished conversation and the reason it ended.
#[derive(Debug, Clone)]
pub struct DialogueOutcome {
    pub conversation: Conversation,
    pub termination: Termination,
}

pub struct DialogueEngine<'a> {
    client: &'a GenerationClient,
    registry: &'a PersonaRegistry,
    therapist: TherapistStyle,
    max_turns: usize,
    client_instructions: String,
    conversation: Conversation,
    state: DialogueState,
}

impl<'a> DialogueEngine<'a> {
    /// Seeds a new conversation from `seed`.
    ///
    /// The effective turn limit is the smaller of `max_turns` and the turn
    /// budgets of the two personas taking part.
    pub fn new(
        client: &'a GenerationClient,
        registry: &'a PersonaRegistry,
        therapist: TherapistStyle,
        max_turns: usize,
        seed: &SeedRecord,
    ) -> Result<Self> {
        let client_persona = registry.lookup(RoleId::Client)?;
        let therapist_persona = registry.lookup(RoleId::Therapist(therapist))?;
        let max_turns = max_turns
            .min(client_persona.turn_budget)
            .min(therapist_persona.turn_budget);

        Ok(Self {
            client,
            registry,
            therapist,
            max_turns,
            client_instructions: client_persona.render_instructions(&seed.reference_json()),
            conversation: Conversation::seeded(seed.opening_utterance()),
            state: DialogueState::Seeded,
        })
    }

    pub fn state(&self) -> &DialogueState {
        &self.state
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    /// Performs one state transition and returns the new state.
    ///
    /// Stepping a terminated engine is a no-op.
    pub async fn step(&mut self) -> &DialogueState {
        self.state = match std::mem::replace(&mut self.state, DialogueState::Seeded) {
            DialogueState::Seeded | DialogueState::Appended => {
                if self.conversation.len() >= self.max_turns {
                    DialogueState::Terminated(Termination::TurnLimit)
                } else {
                    let next = self.conversation.last_role().opponent(self.therapist);
                    DialogueState::Generating(next)
                }
            }
            DialogueState::Generating(role) => self.generate(role).await,
            terminated @ DialogueState::Terminated(_) => terminated,
        };
        &self.state
    }

    /// Runs the conversation to termination.
    pub async fn run(mut self) -> DialogueOutcome {
        loop {
            let state = self.step().await.clone();
            if let DialogueState::Terminated(termination) = state {
                info!(
                    utterances = self.conversation.len(),
                    termination = ?termination,
                    "Conversation finished"
                );
                return DialogueOutcome {
                    conversation: self.conversation,
                    termination,
                };
            }
        }
    }

    async fn generate(&mut self, role: RoleId) -> DialogueState {
        let turn = self.conversation.len() + 1;
        let instructions = match role {
            RoleId::Client => self.client_instructions.as_str(),
            RoleId::Therapist(_) => match self.registry.lookup(role) {
                Ok(persona) => persona.instructions.as_str(),
                Err(e) => return Self::failed(turn, e.to_string()),
            },
        };
        let transcript = self.conversation.render_transcript();

        match self.client.generate(instructions, &transcript).await {
            Ok(text) => match self.conversation.append(Utterance::new(role, text)) {
                Ok(()) => {
                    debug!(turn, role = %role, "Appended utterance");
                    DialogueState::Appended
                }
                Err(e) => Self::failed(turn, e.to_string()),
            },
            Err(e) => {
                warn!(
                    turn,
                    role = %role,
                    error = %e,
                    "Generation failed; ending conversation early"
                );
                Self::failed(turn, e.to_string())
            }
        }
    }

    fn failed(turn: usize, reason: String) -> DialogueState {
        DialogueState::Terminated(Termination::GenerationFailed { turn, reason })
    }
}
