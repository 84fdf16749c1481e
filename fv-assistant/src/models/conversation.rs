//! Session-scoped conversation transcript.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Who spoke a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// Position of a turn in its transcript.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct TurnId(usize);

impl TurnId {
    pub fn index(&self) -> usize {
        self.0
    }
}

/// One message in a conversation. Fields are private: a turn never changes
/// after it is appended.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Turn {
    role: Role,
    content: String,
    created_at: DateTime<Utc>,
}

impl Turn {
    fn new(role: Role, content: String) -> Self {
        Self {
            role,
            content,
            created_at: Utc::now(),
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn is_user(&self) -> bool {
        self.role == Role::User
    }

    /// `HH:MM` label for the transcript view.
    pub fn time_label(&self) -> String {
        self.created_at.format("%H:%M").to_string()
    }
}

/// Ordered, append-only transcript for one UI session.
#[derive(Debug, Default)]
pub struct ConversationState {
    turns: Vec<Turn>,
}

impl ConversationState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append_user(&mut self, text: impl Into<String>) -> TurnId {
        self.push(Role::User, text.into())
    }

    /// Only called once the model answered the preceding user turn.
    pub fn append_assistant(&mut self, text: impl Into<String>) -> TurnId {
        self.push(Role::Assistant, text.into())
    }

    fn push(&mut self, role: Role, content: String) -> TurnId {
        self.turns.push(Turn::new(role, content));
        TurnId(self.turns.len() - 1)
    }

    /// All turns in chronological order.
    pub fn snapshot(&self) -> Vec<Turn> {
        self.turns.clone()
    }

    pub fn get(&self, id: TurnId) -> Option<&Turn> {
        self.turns.get(id.0)
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}
