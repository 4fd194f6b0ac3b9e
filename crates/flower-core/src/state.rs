//! UI-agnostic transcript types
//!
//! Shared by the agent panel and anything else that renders a chat
//! transcript; nothing here depends on a UI framework.

use serde::{Deserialize, Serialize};

/// Who sent a chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Agent,
}

/// A message in the transcript
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: u64,
    pub sender: Sender,
    pub text: String,
    #[serde(default)]
    pub is_generating: bool,
}

impl ChatMessage {
    pub fn user(id: u64, text: impl Into<String>) -> Self {
        Self {
            id,
            sender: Sender::User,
            text: text.into(),
            is_generating: false,
        }
    }

    pub fn agent(id: u64, text: impl Into<String>) -> Self {
        Self {
            id,
            sender: Sender::Agent,
            text: text.into(),
            is_generating: false,
        }
    }

    /// Placeholder for a reply that is still streaming in
    pub fn generating(id: u64) -> Self {
        Self {
            is_generating: true,
            ..Self::agent(id, String::new())
        }
    }
}
