//! StreamChat Core - Headless Streaming Chat Engine
//!
//! This crate holds everything a chat client needs between the input box and
//! the network: it opens a streamed HTTP exchange, parses the `data: ` event
//! stream out of raw byte chunks, grows the assistant message as content
//! arrives, and keeps the conversation history consistent and persisted
//! through completion, failure, cancellation and retry.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                 Surfaces (CLI, GUI, tests...)                     │
//! │        send / retry / cancel          StreamUpdate (up)           │
//! └──────────────────────────────┬───────────────────────────────────┘
//!                                │
//! ┌──────────────────────────────┼───────────────────────────────────┐
//! │                      STREAMCHAT CORE                              │
//! │  ┌───────────────────────────┴─────────────────────────────────┐ │
//! │  │                    ChatOrchestrator                          │ │
//! │  │  ┌───────────────────┐   ┌──────────────┐  ┌──────────────┐ │ │
//! │  │  │ ConversationStore │   │StreamSession │  │ChatTransport │ │ │
//! │  │  │   + Storage       │   │ + FrameParser│  │  (HTTP)      │ │ │
//! │  │  └───────────────────┘   └──────────────┘  └──────────────┘ │ │
//! │  └─────────────────────────────────────────────────────────────┘ │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use streamchat_core::{
//!     config::load_config, ChatOrchestrator, ConversationStore, FileStorage,
//!     HttpTransport, OrchestratorConfig,
//! };
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = load_config()?;
//!     let storage = Arc::new(FileStorage::new(&config.storage.dir));
//!     let transport = Arc::new(HttpTransport::new(config.connect_timeout())?);
//!
//!     let mut chat = ChatOrchestrator::new(
//!         ConversationStore::load(storage),
//!         transport,
//!         OrchestratorConfig::from_config(&config),
//!     );
//!
//!     chat.send_in_new_conversation("Hello!");
//!     while let Some(update) = chat.next_update().await {
//!         // Render the update
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Module Overview
//!
//! - [`streaming`]: Frame parser and stream sessions
//! - [`backend`]: Transport abstraction (HTTP, scripted test transport)
//! - [`orchestrator`]: Send, retry and cancel; applies stream events
//! - [`store`]: Conversation state, the single source of truth
//! - [`conversation`]: Conversation and message types
//! - [`storage`]: Persistence backends
//! - [`messages`]: IDs and wire types
//! - [`models`]: Built-in model catalog
//! - [`config`]: Layered configuration

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod backend;
pub mod config;
pub mod conversation;
pub mod messages;
pub mod models;
pub mod orchestrator;
pub mod storage;
pub mod store;
pub mod streaming;

// Re-exports for convenience
pub use backend::{ChatTransport, HttpTransport, StreamRequest, TransportError};
pub use config::{Config, ConfigError, ConfigOverrides, ConfigSource};
pub use conversation::{Conversation, ConversationId, Message};
pub use messages::{ChatRequestBody, MessageId, MessageRole, SessionId, WireMessage};
pub use models::{default_models, resolve_model, ModelInfo};
pub use orchestrator::{ChatOrchestrator, OrchestratorConfig, StreamOutcome, StreamUpdate};
pub use storage::{ConversationStorage, FileStorage, MemoryStorage, StorageError};
pub use store::ConversationStore;
pub use streaming::{FrameEvent, FrameParser, SessionEvent, StreamSession};
