use serde::{Deserialize, Serialize};

use super::enums::ChatRole;

/// One role/content pair of an LLM exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(ChatRole::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(ChatRole::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(ChatRole::Assistant, content)
    }
}

/// Append-only message log threaded through one LLM call chain.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationHistory {
    messages: Vec<ChatMessage>,
}

impl ConversationHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, message: ChatMessage) {
        self.messages.push(message);
    }

    /// Put `system` at the head of the log unless one is already there.
    pub fn ensure_system(&mut self, system: &str) {
        let has_system = self
            .messages
            .first()
            .is_some_and(|m| m.role == ChatRole::System);
        if !has_system {
            self.messages.insert(0, ChatMessage::system(system));
        }
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn last(&self) -> Option<&ChatMessage> {
        self.messages.last()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ensure_system_inserts_once_at_head() {
        let mut history = ConversationHistory::new();
        history.push(ChatMessage::user("hello"));
        history.ensure_system("be brief");
        history.ensure_system("ignored");
        assert_eq!(history.len(), 2);
        assert_eq!(history.messages()[0], ChatMessage::system("be brief"));
    }

    #[test]
    fn serializes_as_plain_array() {
        let mut history = ConversationHistory::new();
        history.push(ChatMessage::assistant("ok"));
        let json = serde_json::to_value(&history).unwrap();
        assert_eq!(json, serde_json::json!([{"role": "assistant", "content": "ok"}]));
    }
}
