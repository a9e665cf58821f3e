//! Conversation Store
//!
//! The single source of truth for all conversations, the active conversation
//! and the selected model. Every mutation goes through a method here and is
//! followed by a save to the configured [`ConversationStorage`].
//!
//! # Concurrency
//!
//! The store is a plain owned value mutated through `&mut self`. The
//! orchestrator owns it and applies stream events one at a time, so the
//! append order of a conversation's messages is the order events were
//! applied in. Stream tasks never touch the store directly.
//!
//! # Persistence
//!
//! Inside a tokio runtime saves go through a [`StorageWriter`] and run on
//! the blocking pool; outside one they are written inline. Call
//! [`ConversationStore::flush`] before reading the backend directly or
//! before shutting the runtime down.
//!
//! Save errors are logged and swallowed; the in-memory state stays
//! authoritative and streaming is never interrupted by storage problems.

use std::sync::Arc;

use tokio::runtime::Handle;

use crate::conversation::{Conversation, ConversationId, Message};
use crate::messages::MessageId;
use crate::models::{default_models, ModelInfo};
use crate::storage::{report_write_error, ConversationStorage, PendingWrite, StorageWriter};

/// Owner of all conversation state
pub struct ConversationStore {
    /// Conversations, most recently created first
    conversations: Vec<Conversation>,
    /// Conversation new input is sent to
    active_conversation_id: Option<ConversationId>,
    /// Model used for new requests
    selected_model: ModelInfo,
    /// Persistence backend
    storage: Arc<dyn ConversationStorage>,
    /// Background writer, started on the first write inside a runtime
    writer: Option<StorageWriter>,
}

impl ConversationStore {
    /// Create an empty store (nothing is loaded from storage)
    pub fn new(storage: Arc<dyn ConversationStorage>) -> Self {
        let selected_model = default_models()
            .into_iter()
            .next()
            .unwrap_or_else(|| ModelInfo::custom("gpt-4"));

        Self {
            conversations: Vec::new(),
            active_conversation_id: None,
            selected_model,
            storage,
            writer: None,
        }
    }

    /// Restore the store from storage
    ///
    /// The most recently updated conversation becomes active. A load failure
    /// is logged and yields an empty store.
    pub fn load(storage: Arc<dyn ConversationStorage>) -> Self {
        let mut store = Self::new(storage);

        match store.storage.load() {
            Ok(conversations) => {
                tracing::info!(count = conversations.len(), "Loaded conversations");
                store.conversations = conversations;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to load conversations, starting empty");
            }
        }

        store.active_conversation_id = store
            .conversations
            .iter()
            .max_by_key(|c| c.updated_at)
            .map(|c| c.id);

        store
    }

    // ------------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------------

    /// All conversations, most recently created first
    #[must_use]
    pub fn conversations(&self) -> &[Conversation] {
        &self.conversations
    }

    /// Look up a conversation
    #[must_use]
    pub fn conversation(&self, id: ConversationId) -> Option<&Conversation> {
        self.conversations.iter().find(|c| c.id == id)
    }

    /// The active conversation ID
    #[must_use]
    pub fn active_conversation_id(&self) -> Option<ConversationId> {
        self.active_conversation_id
    }

    /// The active conversation
    #[must_use]
    pub fn active_conversation(&self) -> Option<&Conversation> {
        self.active_conversation_id
            .and_then(|id| self.conversation(id))
    }

    /// The selected model
    #[must_use]
    pub fn selected_model(&self) -> &ModelInfo {
        &self.selected_model
    }

    fn conversation_mut(&mut self, id: ConversationId) -> Option<&mut Conversation> {
        self.conversations.iter_mut().find(|c| c.id == id)
    }

    // ------------------------------------------------------------------------
    // Conversation lifecycle
    // ------------------------------------------------------------------------

    /// Create a conversation, make it active and return its ID
    pub fn create_conversation(&mut self) -> ConversationId {
        let conversation = Conversation::new();
        let id = conversation.id;
        self.conversations.insert(0, conversation);
        self.active_conversation_id = Some(id);
        self.persist();

        tracing::debug!(conversation = %id, "Created conversation");
        id
    }

    /// Delete a conversation
    ///
    /// If it was active, the first remaining conversation becomes active.
    pub fn delete_conversation(&mut self, id: ConversationId) -> bool {
        let before = self.conversations.len();
        self.conversations.retain(|c| c.id != id);
        if self.conversations.len() == before {
            return false;
        }

        if self.active_conversation_id == Some(id) {
            self.active_conversation_id = self.conversations.first().map(|c| c.id);
        }
        self.persist();
        true
    }

    /// Rename a conversation
    pub fn rename_conversation(&mut self, id: ConversationId, title: impl Into<String>) -> bool {
        let Some(conversation) = self.conversation_mut(id) else {
            return false;
        };
        conversation.title = title.into();
        conversation.touch();
        self.persist();
        true
    }

    /// Change the active conversation (`None` clears it)
    ///
    /// Returns `false` if the ID is unknown.
    pub fn set_active_conversation(&mut self, id: Option<ConversationId>) -> bool {
        if let Some(id) = id {
            if self.conversation(id).is_none() {
                return false;
            }
        }
        self.active_conversation_id = id;
        true
    }

    /// Change the model used for new requests
    pub fn set_selected_model(&mut self, model: ModelInfo) {
        tracing::debug!(model = %model.id, "Selected model");
        self.selected_model = model;
    }

    /// Remove all conversations from memory and storage
    pub fn clear(&mut self) {
        self.conversations.clear();
        self.active_conversation_id = None;
        self.write(PendingWrite::Clear);
    }

    // ------------------------------------------------------------------------
    // Streaming slice
    // ------------------------------------------------------------------------

    /// Append a message to a conversation
    pub fn add_message(&mut self, id: ConversationId, message: Message) -> bool {
        let Some(conversation) = self.conversation_mut(id) else {
            return false;
        };
        conversation.push_message(message);
        self.persist();
        true
    }

    /// Write the accumulated text into the conversation's streaming message
    ///
    /// Creates the streaming assistant message on first use. Returns its ID.
    pub fn update_streaming_message(
        &mut self,
        id: ConversationId,
        content: &str,
    ) -> Option<MessageId> {
        let conversation = self.conversation_mut(id)?;
        let message_id = conversation.set_streaming_content(content).id.clone();
        self.persist();
        Some(message_id)
    }

    /// Finalize every streaming message of a conversation
    ///
    /// Returns `true` if a message was finalized. Finalizing a conversation
    /// without streaming messages changes nothing.
    pub fn finish_streaming(&mut self, id: ConversationId) -> bool {
        let Some(conversation) = self.conversation_mut(id) else {
            return false;
        };
        if !conversation.finalize_streaming() {
            return false;
        }
        self.persist();
        true
    }

    /// Pop the tail of a conversation through its last user message
    ///
    /// Returns the removed user message's content, or `None` (nothing
    /// removed) if the conversation has no user message.
    pub fn remove_through_last_user_message(&mut self, id: ConversationId) -> Option<String> {
        let removed = self
            .conversation_mut(id)?
            .remove_through_last_user_message()?;
        self.persist();
        Some(removed)
    }

    // ------------------------------------------------------------------------
    // Persistence
    // ------------------------------------------------------------------------

    /// Wait until every save issued so far has reached the backend
    pub async fn flush(&mut self) {
        if let Some(writer) = self.writer.as_mut() {
            writer.flush().await;
        }
    }

    fn persist(&mut self) {
        self.write(PendingWrite::Save(self.conversations.clone()));
    }

    fn write(&mut self, write: PendingWrite) {
        if self.writer.is_none() {
            if let Ok(handle) = Handle::try_current() {
                self.writer = Some(StorageWriter::spawn(Arc::clone(&self.storage), &handle));
            }
        }

        match self.writer.as_mut() {
            Some(writer) => writer.submit(write),
            None => {
                if let Err(e) = write.apply(self.storage.as_ref()) {
                    report_write_error(&e);
                }
            }
        }
    }
}

impl std::fmt::Debug for ConversationStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversationStore")
            .field("conversations", &self.conversations.len())
            .field("active_conversation_id", &self.active_conversation_id)
            .field("selected_model", &self.selected_model.id)
            .finish_non_exhaustive()
    }
}
