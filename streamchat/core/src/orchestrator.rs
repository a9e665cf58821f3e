//! Session Orchestrator
//!
//! Turns user input into a stream and the stream back into store mutations.
//!
//! # Lifecycle
//!
//! ```text
//! Idle ──send──► Sending ──first delta──► Streaming ──┬─► Completed ─┐
//!                (user message appended)              ├─► Errored   ─┼─► Idle
//!                                                     └─► Cancelled ─┘
//! ```
//!
//! At most one stream is active per orchestrator. Starting a send while a
//! stream is active cancels and finalizes the previous stream first, so two
//! sessions never write into the same conversation.
//!
//! # Applying events
//!
//! The orchestrator owns the store; session events are applied by whoever
//! drives the orchestrator, one at a time:
//!
//! - [`ChatOrchestrator::next_update`] waits for the next event
//! - [`ChatOrchestrator::poll_streaming`] applies whatever is ready without
//!   waiting (for surfaces that run their own loop)
//! - [`ChatOrchestrator::run_to_completion`] drives the stream to its end
//!
//! Every finished stream (including a cancelled or replaced one) produces
//! exactly one [`StreamUpdate::Finished`].

use std::collections::VecDeque;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::backend::{ChatTransport, StreamRequest};
use crate::config::Config;
use crate::conversation::{ConversationId, Message};
use crate::messages::{ChatRequestBody, SessionId};
use crate::store::ConversationStore;
use crate::streaming::{SessionEvent, StreamSession, DEFAULT_EVENT_BUFFER};

// ============================================================================
// Configuration
// ============================================================================

/// Where and how the orchestrator opens streams
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OrchestratorConfig {
    /// Full URL of the streaming chat endpoint
    pub endpoint: String,
    /// Extra request headers
    pub headers: Vec<(String, String)>,
    /// Capacity of each session's event channel
    pub event_buffer: usize,
}

impl OrchestratorConfig {
    /// Configuration for an endpoint with default settings
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            headers: Vec::new(),
            event_buffer: DEFAULT_EVENT_BUFFER,
        }
    }

    /// Derive from the loaded configuration
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            endpoint: config.stream_endpoint(),
            headers: config
                .server
                .headers
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            event_buffer: config.chat.event_buffer,
        }
    }

    /// Add a request header
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Set the event channel capacity
    #[must_use]
    pub fn with_event_buffer(mut self, event_buffer: usize) -> Self {
        self.event_buffer = event_buffer;
        self
    }
}

// ============================================================================
// Updates
// ============================================================================

/// How a stream ended
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StreamOutcome {
    /// The server finished the response
    Completed,
    /// The exchange failed; partial content was kept
    Errored(String),
    /// The stream was cancelled or replaced; partial content was kept
    Cancelled,
}

/// A store change caused by a stream
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StreamUpdate {
    /// New content was appended to the streaming message
    Delta {
        /// Conversation being streamed into
        conversation_id: ConversationId,
        /// The fragment just received
        content: String,
    },
    /// The stream ended and its message was finalized
    Finished {
        /// Conversation that was streamed into
        conversation_id: ConversationId,
        /// How it ended
        outcome: StreamOutcome,
    },
}

/// The stream currently in flight
#[derive(Debug)]
struct ActiveSession {
    /// Conversation receiving the response
    conversation_id: ConversationId,
    /// Session handle
    session: StreamSession,
    /// Full response text received so far
    accumulated: String,
}

// ============================================================================
// Orchestrator
// ============================================================================

/// Drives streaming exchanges against a conversation store
pub struct ChatOrchestrator<T: ChatTransport + ?Sized> {
    /// All conversation state
    store: ConversationStore,
    /// Network seam
    transport: Arc<T>,
    /// Endpoint settings
    config: OrchestratorConfig,
    /// At most one stream in flight
    active: Option<ActiveSession>,
    /// Updates produced outside of event application (cancel, replace)
    pending: VecDeque<StreamUpdate>,
}

impl<T: ChatTransport + ?Sized + 'static> ChatOrchestrator<T> {
    /// Create an orchestrator
    pub fn new(store: ConversationStore, transport: Arc<T>, config: OrchestratorConfig) -> Self {
        Self {
            store,
            transport,
            config,
            active: None,
            pending: VecDeque::new(),
        }
    }

    /// The conversation store
    #[must_use]
    pub fn store(&self) -> &ConversationStore {
        &self.store
    }

    /// Mutable access for collaborator operations (rename, select model...)
    ///
    /// Use [`Self::delete_conversation`] rather than the store directly to
    /// delete a conversation that may be streaming.
    pub fn store_mut(&mut self) -> &mut ConversationStore {
        &mut self.store
    }

    /// Endpoint settings
    #[must_use]
    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Whether a stream is in flight
    #[must_use]
    pub fn is_streaming(&self) -> bool {
        self.active.is_some()
    }

    /// Conversation the in-flight stream writes into
    #[must_use]
    pub fn streaming_conversation_id(&self) -> Option<ConversationId> {
        self.active.as_ref().map(|a| a.conversation_id)
    }

    /// Token of the in-flight stream
    ///
    /// Cancelling it ends the stream the same way [`Self::cancel`] does; the
    /// outcome is reported as [`StreamOutcome::Cancelled`] on the next update.
    /// Use it to impose a deadline from another task.
    #[must_use]
    pub fn active_cancellation_token(&self) -> Option<CancellationToken> {
        self.active.as_ref().map(|a| a.session.cancellation_token())
    }

    // ------------------------------------------------------------------------
    // Sending
    // ------------------------------------------------------------------------

    /// Send into the active conversation
    ///
    /// No-op when no conversation is active; the caller is expected to create
    /// one first (see [`Self::send_in_new_conversation`]).
    pub fn send_message(&mut self, content: &str) -> Option<SessionId> {
        let Some(conversation_id) = self.store.active_conversation_id() else {
            tracing::warn!("No active conversation, message not sent");
            return None;
        };
        self.send_to(conversation_id, content)
    }

    /// Create a conversation, make it active and send into it
    pub fn send_in_new_conversation(&mut self, content: &str) -> Option<SessionId> {
        if content.trim().is_empty() {
            return None;
        }
        let conversation_id = self.store.create_conversation();
        self.send_to(conversation_id, content)
    }

    /// Append a user message to a conversation and stream the response
    ///
    /// Content is trimmed; empty content and unknown conversations are
    /// rejected. A stream already in flight is cancelled and finalized first.
    pub fn send_to(&mut self, conversation_id: ConversationId, content: &str) -> Option<SessionId> {
        let content = content.trim();
        if content.is_empty() {
            tracing::debug!("Ignoring empty message");
            return None;
        }

        if self.store.conversation(conversation_id).is_none() {
            tracing::warn!(conversation = %conversation_id, "Unknown conversation, message not sent");
            return None;
        }

        if self.active.is_some() {
            tracing::warn!("Send while streaming, replacing the active stream");
            self.cancel();
        }

        let history = self
            .store
            .conversation(conversation_id)
            .map(|c| c.messages.as_slice())
            .unwrap_or_default();
        let body = ChatRequestBody::from_history(
            self.store.selected_model().id.clone(),
            history,
            content,
        );
        let body = match serde_json::to_value(&body) {
            Ok(body) => body,
            Err(e) => {
                tracing::error!(error = %e, "Failed to encode request body");
                return None;
            }
        };

        self.store.add_message(conversation_id, Message::user(content));

        let request = StreamRequest::post(self.config.endpoint.clone(), body)
            .with_headers(self.config.headers.iter().cloned());
        let session = StreamSession::open(
            Arc::clone(&self.transport),
            request,
            self.config.event_buffer,
        );
        let session_id = session.id();

        tracing::info!(
            conversation = %conversation_id,
            session = %session_id,
            model = %self.store.selected_model().id,
            transport = self.transport.name(),
            "Started streaming"
        );

        self.active = Some(ActiveSession {
            conversation_id,
            session,
            accumulated: String::new(),
        });

        Some(session_id)
    }

    /// Resend the last user message of a conversation
    ///
    /// Removes the tail of the conversation through its last user message
    /// and sends that message again. No-op if the conversation has no user
    /// message. A stream into this conversation is cancelled first.
    pub fn retry(&mut self, conversation_id: ConversationId) -> Option<SessionId> {
        if self.streaming_conversation_id() == Some(conversation_id) {
            self.cancel();
        }

        let Some(content) = self.store.remove_through_last_user_message(conversation_id) else {
            tracing::debug!(conversation = %conversation_id, "Nothing to retry");
            return None;
        };

        tracing::info!(conversation = %conversation_id, "Retrying last message");
        self.send_to(conversation_id, &content)
    }

    /// Cancel the stream in flight, keeping its partial content
    ///
    /// Idempotent: returns `false` if nothing was streaming.
    pub fn cancel(&mut self) -> bool {
        let Some(active) = self.active.take() else {
            return false;
        };

        let update = self.finish(active, StreamOutcome::Cancelled);
        self.pending.push_back(update);
        true
    }

    /// Delete a conversation, cancelling its stream if it has one
    pub fn delete_conversation(&mut self, conversation_id: ConversationId) -> bool {
        if self.streaming_conversation_id() == Some(conversation_id) {
            self.cancel();
        }
        self.store.delete_conversation(conversation_id)
    }

    // ------------------------------------------------------------------------
    // Applying events
    // ------------------------------------------------------------------------

    /// Wait for the next stream update and apply it
    ///
    /// Returns `None` when nothing is streaming and no update is pending.
    /// Cancel safe: dropping the future before it resolves loses no event.
    pub async fn next_update(&mut self) -> Option<StreamUpdate> {
        if let Some(update) = self.pending.pop_front() {
            return Some(update);
        }

        let active = self.active.as_mut()?;
        let event = active.session.next_event().await;
        self.apply(event)
    }

    /// Apply every update that is ready, without waiting
    pub fn poll_streaming(&mut self) -> Vec<StreamUpdate> {
        let mut updates: Vec<StreamUpdate> = self.pending.drain(..).collect();

        while let Some(active) = self.active.as_mut() {
            let event = active.session.try_next_event();
            if event.is_none() && !active.session.is_cancelled() {
                // Nothing ready yet
                break;
            }
            updates.extend(self.apply(event));
        }

        updates
    }

    /// Apply updates until nothing is streaming
    ///
    /// Returns the outcome of the last stream that finished.
    pub async fn run_to_completion(&mut self) -> Option<StreamOutcome> {
        let mut outcome = None;
        while let Some(update) = self.next_update().await {
            if let StreamUpdate::Finished { outcome: o, .. } = update {
                outcome = Some(o);
            }
        }
        outcome
    }

    /// Apply one session event to the store
    ///
    /// `None` means the session was cancelled through its token.
    fn apply(&mut self, event: Option<SessionEvent>) -> Option<StreamUpdate> {
        let mut active = self.active.take()?;
        let conversation_id = active.conversation_id;

        let outcome = match event {
            Some(SessionEvent::Delta(content)) => {
                active.accumulated.push_str(&content);
                if self
                    .store
                    .update_streaming_message(conversation_id, &active.accumulated)
                    .is_some()
                {
                    self.active = Some(active);
                    return Some(StreamUpdate::Delta {
                        conversation_id,
                        content,
                    });
                }
                tracing::warn!(conversation = %conversation_id, "Conversation vanished mid-stream");
                StreamOutcome::Cancelled
            }
            Some(SessionEvent::Completed) => StreamOutcome::Completed,
            Some(SessionEvent::Failed(e)) => {
                tracing::error!(conversation = %conversation_id, error = %e, "Streaming failed");
                StreamOutcome::Errored(e.to_string())
            }
            None => StreamOutcome::Cancelled,
        };

        Some(self.finish(active, outcome))
    }

    /// Finalize the streaming message and tear the session down
    fn finish(&mut self, active: ActiveSession, outcome: StreamOutcome) -> StreamUpdate {
        active.session.cancel();
        self.store.finish_streaming(active.conversation_id);

        tracing::info!(
            conversation = %active.conversation_id,
            session = %active.session.id(),
            chars = active.accumulated.chars().count(),
            outcome = ?outcome,
            "Finished streaming"
        );

        StreamUpdate::Finished {
            conversation_id: active.conversation_id,
            outcome,
        }
    }
}

impl<T: ChatTransport + ?Sized> std::fmt::Debug for ChatOrchestrator<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatOrchestrator")
            .field("store", &self.store)
            .field("config", &self.config)
            .field("active", &self.active)
            .field("pending", &self.pending.len())
            .finish_non_exhaustive()
    }
}
