//! Streaming
//!
//! ```text
//! ┌──────────────┐  bytes   ┌─────────────┐  FrameEvent  ┌───────────────┐
//! │ ChatTransport│ ───────► │ FrameParser │ ───────────► │ StreamSession │ ──► SessionEvent
//! └──────────────┘          └─────────────┘              └───────────────┘
//! ```
//!
//! The parser is pure and synchronous; the session owns the read loop,
//! cancellation and the channel to the consumer.

mod frame_parser;
mod session;

pub use frame_parser::{FrameEvent, FrameParser, DATA_PREFIX, DONE_SENTINEL};
pub use session::{SessionEvent, StreamSession, DEFAULT_EVENT_BUFFER};
