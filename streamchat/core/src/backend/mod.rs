//! Chat Endpoint Transport
//!
//! Abstracted access to the streaming chat endpoint through a common trait,
//! so the session engine can run against HTTP in production and against
//! scripted byte streams in tests.
//!
//! # Usage
//!
//! ```ignore
//! use streamchat_core::backend::{ChatTransport, HttpTransport, StreamRequest};
//!
//! let transport = HttpTransport::new(std::time::Duration::from_secs(10))?;
//! let request = StreamRequest::post("http://localhost:3000/api/chat/stream", body);
//! let mut bytes = transport.open(&request).await?;
//! ```

mod http;
pub mod test_utils;
mod traits;

pub use http::HttpTransport;
pub use traits::{ByteStream, ChatTransport, HttpMethod, StreamRequest, TransportError};
