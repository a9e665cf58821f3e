//! Conversations and Messages
//!
//! The data model owned by the [`ConversationStore`](crate::store::ConversationStore).
//!
//! A [`Message`] is either finalized (immutable history) or streaming (its
//! content only grows). A [`Conversation`] keeps its messages in strict
//! chronological order and derives its title from the first user message
//! while the title is still the placeholder.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::messages::{MessageId, MessageRole};

/// Title given to conversations before the first user message arrives
pub const DEFAULT_TITLE: &str = "New Chat";

/// Maximum number of characters taken from the first user message for a title
pub const TITLE_MAX_CHARS: usize = 50;

/// Marker appended to a truncated title
pub const TITLE_ELLIPSIS: &str = "...";

// ============================================================================
// Core Types
// ============================================================================

/// Unique identifier for a conversation
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationId(pub Uuid);

impl ConversationId {
    /// Create a new unique conversation ID
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConversationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Short form: first 8 chars of UUID
        write!(f, "{}", &self.0.to_string()[..8])
    }
}

/// A message in a conversation
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Unique message ID
    pub id: MessageId,
    /// Who sent this message
    pub role: MessageRole,
    /// Message content
    pub content: String,
    /// When the message was created
    pub timestamp: DateTime<Utc>,
    /// Whether the message is still receiving content
    ///
    /// Never persisted: a message loaded from storage is always final.
    #[serde(skip)]
    pub is_streaming: bool,
}

impl Message {
    /// Create a finalized message
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            id: MessageId::new(),
            role,
            content: content.into(),
            timestamp: Utc::now(),
            is_streaming: false,
        }
    }

    /// Create a finalized user message
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, content)
    }

    /// Create a finalized assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant, content)
    }

    /// Create an assistant message that will keep receiving content
    pub fn assistant_streaming(content: impl Into<String>) -> Self {
        Self {
            is_streaming: true,
            ..Self::new(MessageRole::Assistant, content)
        }
    }

    /// Mark streaming as complete
    pub fn finalize(&mut self) {
        self.is_streaming = false;
    }
}

/// A conversation with its full message history
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    /// Unique conversation identifier
    pub id: ConversationId,
    /// Display title
    pub title: String,
    /// Messages in chronological order
    pub messages: Vec<Message>,
    /// When the conversation was created
    pub created_at: DateTime<Utc>,
    /// Last mutation of messages or title
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    /// Create an empty conversation with the placeholder title
    #[must_use]
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            id: ConversationId::new(),
            title: DEFAULT_TITLE.to_string(),
            messages: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Advance `updated_at`
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Whether the title is still the placeholder
    #[must_use]
    pub fn has_default_title(&self) -> bool {
        self.title == DEFAULT_TITLE
    }

    /// Append a message, deriving the title from the first user message
    pub fn push_message(&mut self, message: Message) {
        if self.has_default_title() && message.role == MessageRole::User {
            self.title = derive_title(&message.content);
        }
        self.messages.push(message);
        self.touch();
    }

    /// The message currently receiving content, if any
    #[must_use]
    pub fn streaming_message(&self) -> Option<&Message> {
        self.messages.iter().find(|m| m.is_streaming)
    }

    /// Number of messages flagged as streaming
    #[must_use]
    pub fn streaming_count(&self) -> usize {
        self.messages.iter().filter(|m| m.is_streaming).count()
    }

    /// The most recent user message
    #[must_use]
    pub fn last_user_message(&self) -> Option<&Message> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == MessageRole::User)
    }

    /// Clear the streaming flag on every message
    ///
    /// Returns `true` if any message changed.
    pub fn finalize_streaming(&mut self) -> bool {
        let mut changed = false;
        for message in self.messages.iter_mut().filter(|m| m.is_streaming) {
            message.finalize();
            changed = true;
        }
        if changed {
            self.touch();
        }
        changed
    }

    /// Write the full accumulated text into the trailing streaming message
    ///
    /// Creates the streaming assistant message if the conversation does not
    /// end with one. Any other message still flagged as streaming is
    /// finalized first, so at most one streaming message exists.
    pub fn set_streaming_content(&mut self, content: &str) -> &Message {
        let trailing_streaming = self
            .messages
            .last()
            .is_some_and(|m| m.role == MessageRole::Assistant && m.is_streaming);

        if !trailing_streaming {
            for message in self.messages.iter_mut().filter(|m| m.is_streaming) {
                message.finalize();
            }
            self.messages.push(Message::assistant_streaming(String::new()));
        }

        self.touch();
        let last = self.messages.len() - 1;
        let message = &mut self.messages[last];
        message.content.clear();
        message.content.push_str(content);
        message
    }

    /// Pop messages from the tail up to and including the last user message
    ///
    /// Returns the removed user message's content. If the conversation has
    /// no user message nothing is removed and `None` is returned.
    pub fn remove_through_last_user_message(&mut self) -> Option<String> {
        let index = self
            .messages
            .iter()
            .rposition(|m| m.role == MessageRole::User)?;

        let removed = self.messages.split_off(index);
        self.touch();
        removed.into_iter().next().map(|m| m.content)
    }
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}

/// Title derived from the leading text of a user message
#[must_use]
pub fn derive_title(content: &str) -> String {
    let mut chars = content.chars();
    let mut title: String = chars.by_ref().take(TITLE_MAX_CHARS).collect();
    if chars.next().is_some() {
        title.push_str(TITLE_ELLIPSIS);
    }
    title
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_new_conversation_has_placeholder_title() {
        let conversation = Conversation::new();
        assert_eq!(conversation.title, DEFAULT_TITLE);
        assert!(conversation.messages.is_empty());
        assert_eq!(conversation.created_at, conversation.updated_at);
    }

    #[test]
    fn test_title_from_first_user_message() {
        let mut conversation = Conversation::new();
        conversation.push_message(Message::user("What is Rust?"));
        assert_eq!(conversation.title, "What is Rust?");

        // Later user messages leave the title alone
        conversation.push_message(Message::user("And Go?"));
        assert_eq!(conversation.title, "What is Rust?");
    }

    #[test]
    fn test_assistant_message_does_not_set_title() {
        let mut conversation = Conversation::new();
        conversation.push_message(Message::assistant("Hello!"));
        assert_eq!(conversation.title, DEFAULT_TITLE);
    }

    #[test]
    fn test_derive_title_truncates_by_chars() {
        let exact = "a".repeat(50);
        assert_eq!(derive_title(&exact), exact);

        let long = "é".repeat(60);
        let title = derive_title(&long);
        assert_eq!(title, format!("{}...", "é".repeat(50)));
    }

    #[test]
    fn test_streaming_content_creates_then_replaces() {
        let mut conversation = Conversation::new();
        conversation.push_message(Message::user("Hi"));

        conversation.set_streaming_content("Hel");
        assert_eq!(conversation.messages.len(), 2);
        conversation.set_streaming_content("Hello");
        assert_eq!(conversation.messages.len(), 2);

        let last = conversation.messages.last().unwrap();
        assert_eq!(last.content, "Hello");
        assert_eq!(last.role, MessageRole::Assistant);
        assert!(last.is_streaming);
    }

    #[test]
    fn test_at_most_one_streaming_message() {
        let mut conversation = Conversation::new();
        conversation.set_streaming_content("first");
        conversation.push_message(Message::user("interrupt"));
        conversation.set_streaming_content("second");

        assert_eq!(conversation.streaming_count(), 1);
        assert_eq!(conversation.streaming_message().unwrap().content, "second");
    }

    #[test]
    fn test_finalize_streaming_reports_change() {
        let mut conversation = Conversation::new();
        assert!(!conversation.finalize_streaming());

        conversation.set_streaming_content("partial");
        assert!(conversation.finalize_streaming());
        assert_eq!(conversation.streaming_count(), 0);
        assert_eq!(conversation.messages[0].content, "partial");
    }

    #[test]
    fn test_remove_through_last_user_message() {
        let mut conversation = Conversation::new();
        conversation.push_message(Message::user("Q1"));
        conversation.push_message(Message::assistant("A1"));
        conversation.push_message(Message::user("Hi"));
        conversation.push_message(Message::assistant("Hello"));

        let removed = conversation.remove_through_last_user_message();
        assert_eq!(removed.as_deref(), Some("Hi"));

        let remaining: Vec<_> = conversation
            .messages
            .iter()
            .map(|m| m.content.as_str())
            .collect();
        assert_eq!(remaining, vec!["Q1", "A1"]);
    }

    #[test]
    fn test_remove_without_user_message_is_noop() {
        let mut conversation = Conversation::new();
        conversation.push_message(Message::assistant("orphan"));
        let before = conversation.clone();

        assert_eq!(conversation.remove_through_last_user_message(), None);
        assert_eq!(conversation, before);
    }

    #[test]
    fn test_streaming_flag_is_not_serialized() {
        let message = Message::assistant_streaming("partial");
        let json = serde_json::to_value(&message).unwrap();

        assert!(json.get("isStreaming").is_none());
        assert!(json.get("timestamp").unwrap().is_string());

        let restored: Message = serde_json::from_value(json).unwrap();
        assert!(!restored.is_streaming);
        assert_eq!(restored.content, "partial");
    }

    #[test]
    fn test_conversation_uses_camel_case_fields() {
        let conversation = Conversation::new();
        let json = serde_json::to_value(&conversation).unwrap();
        assert!(json.get("createdAt").is_some());
        assert!(json.get("updatedAt").is_some());
    }
}
