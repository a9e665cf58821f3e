//! Message Identity and Wire Types
//!
//! Identifiers and roles shared by the store and the orchestrator, plus the
//! typed projection of stored messages onto the outbound request body.
//!
//! # Wire Format
//!
//! The chat endpoint receives:
//!
//! ```json
//! {"model": "gpt-4", "messages": [{"role": "user", "content": "Hi"}]}
//! ```
//!
//! Only `role` and `content` ever leave the client. Ids, timestamps and the
//! streaming flag are local bookkeeping and are dropped by [`WireMessage::from`].

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::conversation::Message;

/// Message identifier
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub String);

impl MessageId {
    /// Generate a new unique message ID
    ///
    /// Combines a timestamp with an atomic counter so ids stay unique within
    /// one millisecond and across restarts (ids are persisted).
    #[must_use]
    pub fn new() -> Self {
        use std::sync::atomic::{AtomicU64, Ordering};
        use std::time::{SystemTime, UNIX_EPOCH};

        static COUNTER: AtomicU64 = AtomicU64::new(0);
        let count = COUNTER.fetch_add(1, Ordering::SeqCst);
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        Self(format!("msg_{timestamp}_{count}"))
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Stream session identifier, used to correlate log lines of one exchange
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SessionId(pub uuid::Uuid);

impl SessionId {
    /// Generate a new unique session ID
    #[must_use]
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Short form: first 8 chars of UUID
        write!(f, "{}", &self.0.to_string()[..8])
    }
}

/// Who sent a message
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// User input
    User,
    /// Streamed model output
    Assistant,
}

impl MessageRole {
    /// Wire name of the role
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A message as the chat endpoint sees it
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireMessage {
    /// Author role
    pub role: MessageRole,
    /// Message text
    pub content: String,
}

impl WireMessage {
    /// Build a wire message directly (used for the message being sent)
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

impl From<&Message> for WireMessage {
    fn from(message: &Message) -> Self {
        Self {
            role: message.role,
            content: message.content.clone(),
        }
    }
}

/// Request body posted to the streaming chat endpoint
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRequestBody {
    /// Selected model identifier
    pub model: String,
    /// Conversation history in chronological order
    pub messages: Vec<WireMessage>,
}

impl ChatRequestBody {
    /// Assemble the outbound body from prior history and the new user input
    ///
    /// Messages still being streamed are excluded; the new content is
    /// appended as the final user turn.
    pub fn from_history(model: impl Into<String>, history: &[Message], content: &str) -> Self {
        let mut messages: Vec<WireMessage> = history
            .iter()
            .filter(|m| !m.is_streaming)
            .map(WireMessage::from)
            .collect();
        messages.push(WireMessage::new(MessageRole::User, content));

        Self {
            model: model.into(),
            messages,
        }
    }
}
