//! Conversation Data Model
//!
//! Roles, utterances and the append-only `Conversation` they form, plus the
//! seed records that conversations are started from.

use crate::error::{CounselError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Text used as the opening client utterance when a seed record has none.
pub const PLACEHOLDER_UTTERANCE: &str = "（空白）";

/// The therapeutic approaches a therapist persona can follow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TherapistStyle {
    /// Solution-Focused Brief Therapy.
    Sfbt,
    Humanistic,
    /// Cognitive Behavioral Therapy.
    Cbt,
}

impl TherapistStyle {
    pub const ALL: [TherapistStyle; 3] = [
        TherapistStyle::Sfbt,
        TherapistStyle::Humanistic,
        TherapistStyle::Cbt,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TherapistStyle::Sfbt => "sfbt",
            TherapistStyle::Humanistic => "humanistic",
            TherapistStyle::Cbt => "cbt",
        }
    }
}

impl fmt::Display for TherapistStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TherapistStyle {
    type Err = CounselError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "sfbt" => Ok(TherapistStyle::Sfbt),
            "humanistic" => Ok(TherapistStyle::Humanistic),
            "cbt" => Ok(TherapistStyle::Cbt),
            other => Err(CounselError::UnknownRole(format!("therapist_{other}"))),
        }
    }
}

/// Identifies who produced an utterance.
///
/// Serialized as `"client"` or `"therapist_<style>"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum RoleId {
    Client,
    Therapist(TherapistStyle),
}

impl RoleId {
    /// The role that speaks after `self` in a conversation with the given therapist.
    pub fn opponent(self, therapist: TherapistStyle) -> RoleId {
        match self {
            RoleId::Client => RoleId::Therapist(therapist),
            RoleId::Therapist(_) => RoleId::Client,
        }
    }

    /// Speaker label used when rendering a transcript.
    pub fn label(&self) -> &'static str {
        match self {
            RoleId::Client => "Client",
            RoleId::Therapist(_) => "Therapist",
        }
    }

    pub fn is_therapist(&self) -> bool {
        matches!(self, RoleId::Therapist(_))
    }
}

impl fmt::Display for RoleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoleId::Client => f.write_str("client"),
            RoleId::Therapist(style) => write!(f, "therapist_{style}"),
        }
    }
}

impl FromStr for RoleId {
    type Err = CounselError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s == "client" {
            return Ok(RoleId::Client);
        }
        s.strip_prefix("therapist_")
            .and_then(|style| style.parse().ok())
            .map(RoleId::Therapist)
            .ok_or_else(|| CounselError::UnknownRole(s.to_string()))
    }
}

impl TryFrom<String> for RoleId {
    type Error = CounselError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<RoleId> for String {
    fn from(role: RoleId) -> Self {
        role.to_string()
    }
}

/// A single turn of dialogue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Utterance {
    pub role: RoleId,
    pub content: String,
}

impl Utterance {
    pub fn new(role: RoleId, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// An ordered, append-only sequence of utterances.
///
/// The first utterance is always from the client, and roles alternate between
/// the client and one fixed therapist for the lifetime of the conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Utterance>", into = "Vec<Utterance>")]
pub struct Conversation {
    utterances: Vec<Utterance>,
}

impl Conversation {
    /// Starts a conversation with the opening client utterance.
    pub fn seeded(opening: impl Into<String>) -> Self {
        Self {
            utterances: vec![Utterance::new(RoleId::Client, opening)],
        }
    }

    /// Builds a conversation from existing utterances, checking alternation.
    pub fn from_utterances(utterances: Vec<Utterance>) -> Result<Self> {
        let mut iter = utterances.into_iter();
        let first = iter
            .next()
            .ok_or_else(|| CounselError::InvalidConversation("no utterances".to_string()))?;
        if first.role != RoleId::Client {
            return Err(CounselError::InvalidConversation(format!(
                "first utterance must be from the client, found '{}'",
                first.role
            )));
        }
        let mut conversation = Self {
            utterances: vec![first],
        };
        for utterance in iter {
            conversation.append(utterance)?;
        }
        Ok(conversation)
    }

    /// Appends the next utterance if it respects the alternation invariant.
    pub fn append(&mut self, utterance: Utterance) -> Result<()> {
        let expected_ok = match (self.last_role(), utterance.role) {
            (RoleId::Client, RoleId::Therapist(style)) => self
                .therapist_role()
                .is_none_or(|existing| existing == RoleId::Therapist(style)),
            (RoleId::Therapist(_), RoleId::Client) => true,
            _ => false,
        };
        if !expected_ok {
            return Err(CounselError::InvalidConversation(format!(
                "'{}' cannot speak after '{}' at index {}",
                utterance.role,
                self.last_role(),
                self.utterances.len()
            )));
        }
        self.utterances.push(utterance);
        Ok(())
    }

    pub fn utterances(&self) -> &[Utterance] {
        &self.utterances
    }

    pub fn len(&self) -> usize {
        self.utterances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.utterances.is_empty()
    }

    pub fn last_role(&self) -> RoleId {
        self.utterances
            .last()
            .map(|u| u.role)
            .unwrap_or(RoleId::Client)
    }

    /// The therapist role of this conversation, once the therapist has spoken.
    pub fn therapist_role(&self) -> Option<RoleId> {
        self.utterances
            .iter()
            .map(|u| u.role)
            .find(RoleId::is_therapist)
    }

    /// Renders the conversation as `Label: content` lines, oldest first.
    pub fn render_transcript(&self) -> String {
        self.utterances
            .iter()
            .map(|u| format!("{}: {}", u.role.label(), u.content))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Pretty JSON of the utterances up to and including `index`.
    pub fn prefix_json(&self, index: usize) -> Result<String> {
        let end = (index + 1).min(self.utterances.len());
        serde_json::to_string_pretty(&self.utterances[..end])
            .map_err(|e| CounselError::InvalidConversation(e.to_string()))
    }
}

impl TryFrom<Vec<Utterance>> for Conversation {
    type Error = CounselError;

    fn try_from(value: Vec<Utterance>) -> Result<Self> {
        Conversation::from_utterances(value)
    }
}

impl From<Conversation> for Vec<Utterance> {
    fn from(conversation: Conversation) -> Self {
        conversation.utterances
    }
}

/// A source record that a conversation is seeded from.
///
/// Only the first entry's `content` opens the new conversation; the whole
/// record is kept verbatim as reference material for the client persona.
#[derive(Debug, Clone)]
pub struct SeedRecord {
    pub source_id: String,
    entries: Vec<serde_json::Value>,
}

impl SeedRecord {
    /// Parses a seed from the raw JSON text of a source file.
    pub fn parse(source_id: &str, raw: &str) -> Result<Self> {
        let seed_err = |reason: String| CounselError::SeedLoad {
            source_id: source_id.to_string(),
            reason,
        };
        let value: serde_json::Value =
            serde_json::from_str(raw).map_err(|e| seed_err(e.to_string()))?;
        let entries = match value {
            serde_json::Value::Array(entries) => entries,
            _ => return Err(seed_err("expected a JSON array of messages".to_string())),
        };
        if entries.is_empty() {
            return Err(seed_err("seed contains no messages".to_string()));
        }
        Ok(Self {
            source_id: source_id.to_string(),
            entries,
        })
    }

    /// The opening client utterance, or the placeholder when missing or blank.
    pub fn opening_utterance(&self) -> String {
        self.entries
            .first()
            .and_then(|entry| entry.get("content"))
            .and_then(|content| content.as_str())
            .filter(|content| !content.trim().is_empty())
            .unwrap_or(PLACEHOLDER_UTTERANCE)
            .to_string()
    }

    /// The full source record as pretty-printed JSON.
    pub fn reference_json(&self) -> String {
        serde_json::to_string_pretty(&self.entries).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SFBT: RoleId = RoleId::Therapist(TherapistStyle::Sfbt);

    #[test]
    fn test_role_serialization() {
        assert_eq!(serde_json::to_string(&RoleId::Client).unwrap(), "\"client\"");
        assert_eq!(
            serde_json::to_string(&RoleId::Therapist(TherapistStyle::Humanistic)).unwrap(),
            "\"therapist_humanistic\""
        );
        let role: RoleId = serde_json::from_str("\"therapist_cbt\"").unwrap();
        assert_eq!(role, RoleId::Therapist(TherapistStyle::Cbt));
        assert!(serde_json::from_str::<RoleId>("\"therapist_cbt_prompt\"").is_err());
        assert!(serde_json::from_str::<RoleId>("\"counselor\"").is_err());
    }

    #[test]
    fn test_opponent() {
        assert_eq!(RoleId::Client.opponent(TherapistStyle::Sfbt), SFBT);
        assert_eq!(SFBT.opponent(TherapistStyle::Sfbt), RoleId::Client);
    }

    #[test]
    fn test_append_enforces_alternation() {
        let mut conversation = Conversation::seeded("hi");
        assert!(conversation.append(Utterance::new(RoleId::Client, "again")).is_err());
        conversation.append(Utterance::new(SFBT, "hello")).unwrap();
        assert!(conversation.append(Utterance::new(SFBT, "twice")).is_err());
        conversation.append(Utterance::new(RoleId::Client, "ok")).unwrap();
        let other = RoleId::Therapist(TherapistStyle::Cbt);
        assert!(conversation.append(Utterance::new(other, "switch")).is_err());
        assert_eq!(conversation.len(), 3);
    }

    #[test]
    fn test_round_trip() {
        let mut conversation = Conversation::seeded("I feel overwhelmed");
        conversation.append(Utterance::new(SFBT, "Tell me more.")).unwrap();
        conversation.append(Utterance::new(RoleId::Client, "Work.")).unwrap();

        let json = serde_json::to_string_pretty(&conversation).unwrap();
        let parsed: Conversation = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, conversation);
        assert_eq!(parsed.utterances(), conversation.utterances());
    }

    #[test]
    fn test_deserialize_rejects_therapist_first() {
        let json = r#"[{"role":"therapist_sfbt","content":"hi"}]"#;
        assert!(serde_json::from_str::<Conversation>(json).is_err());
    }

    #[test]
    fn test_render_transcript_and_prefix() {
        let mut conversation = Conversation::seeded("one");
        conversation.append(Utterance::new(SFBT, "two")).unwrap();
        conversation.append(Utterance::new(RoleId::Client, "three")).unwrap();
        assert_eq!(
            conversation.render_transcript(),
            "Client: one\nTherapist: two\nClient: three"
        );

        let prefix: Vec<Utterance> =
            serde_json::from_str(&conversation.prefix_json(1).unwrap()).unwrap();
        assert_eq!(prefix.len(), 2);
        assert_eq!(prefix[1].content, "two");
    }

    #[test]
    fn test_seed_record_opening() {
        let seed = SeedRecord::parse(
            "a",
            r#"[{"role":"client","content":"I feel overwhelmed","annotation":"x"},{"role":"counselor","content":"hm"}]"#,
        )
        .unwrap();
        assert_eq!(seed.opening_utterance(), "I feel overwhelmed");
        assert!(seed.reference_json().contains("annotation"));

        let blank = SeedRecord::parse("b", r#"[{"role":"client","content":"   "}]"#).unwrap();
        assert_eq!(blank.opening_utterance(), PLACEHOLDER_UTTERANCE);

        let missing = SeedRecord::parse("c", r#"[{"role":"client"}]"#).unwrap();
        assert_eq!(missing.opening_utterance(), PLACEHOLDER_UTTERANCE);
    }

    #[test]
    fn test_seed_record_opening_is_verbatim() {
        let seed = SeedRecord::parse(
            "a",
            r#"[{"role":"client","content":"  I feel overwhelmed\n"}]"#,
        )
        .unwrap();
        assert_eq!(seed.opening_utterance(), "  I feel overwhelmed\n");
    }

    #[test]
    fn test_seed_record_failures() {
        for raw in ["not json", "{}", "[]"] {
            match SeedRecord::parse("bad.json", raw) {
                Err(CounselError::SeedLoad { source_id, .. }) => assert_eq!(source_id, "bad.json"),
                other => panic!("Expected SeedLoad, got {:?}", other),
            }
        }
    }
}
