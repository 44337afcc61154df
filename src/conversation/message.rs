use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::scenario::Scenario;

/// A finished transcription, consumed once by the orchestrator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transcript {
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl Transcript {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            timestamp: Utc::now(),
        }
    }

    /// Empty or whitespace-only
    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// One entry of the conversation history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub id: u64,
    pub text: String,
    pub is_user: bool,
    /// Only set on assistant messages
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scenario: Option<Scenario>,
    pub timestamp: DateTime<Utc>,
}

/// Append-only conversation history
#[derive(Debug, Default)]
pub struct ConversationHistory {
    messages: Vec<ConversationMessage>,
    next_id: u64,
}

impl ConversationHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_user(&mut self, text: impl Into<String>) -> ConversationMessage {
        self.push(text.into(), true, None)
    }

    /// Append an assistant message. Callers guarantee non-empty text.
    pub fn push_assistant(
        &mut self,
        text: impl Into<String>,
        scenario: Scenario,
    ) -> ConversationMessage {
        let text = text.into();
        debug_assert!(!text.trim().is_empty(), "assistant messages need text");
        self.push(text, false, Some(scenario))
    }

    fn push(&mut self, text: String, is_user: bool, scenario: Option<Scenario>) -> ConversationMessage {
        self.next_id += 1;
        let message = ConversationMessage {
            id: self.next_id,
            text,
            is_user,
            scenario,
            timestamp: Utc::now(),
        };
        self.messages.push(message.clone());
        message
    }

    pub fn messages(&self) -> &[ConversationMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Position of a message by id
    pub fn index_of(&self, id: u64) -> Option<usize> {
        self.messages.iter().position(|m| m.id == id)
    }

    /// Explicit reset; the only way history shrinks. Ids keep increasing.
    pub fn clear(&mut self) {
        self.messages.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_increase_and_order_is_kept() {
        let mut history = ConversationHistory::new();
        let user = history.push_user("Halló");
        let reply = history.push_assistant("Góðan dag!", Scenario::Greeting);

        assert!(reply.id > user.id);
        assert_eq!(history.index_of(user.id), Some(0));
        assert_eq!(history.index_of(reply.id), Some(1));
        assert_eq!(history.messages()[0].scenario, None);
        assert_eq!(history.messages()[1].scenario, Some(Scenario::Greeting));
    }

    #[test]
    fn test_clear_keeps_ids_unique() {
        let mut history = ConversationHistory::new();
        let before = history.push_user("eitt");
        history.clear();
        assert!(history.is_empty());
        let after = history.push_user("tvö");
        assert!(after.id > before.id);
    }

    #[test]
    fn test_blank_transcript() {
        assert!(Transcript::new("  \n\t").is_blank());
        assert!(!Transcript::new(" já ").is_blank());
    }
}
