//! Scripted Transport for Tests
//!
//! A [`ChatTransport`] whose responses are queued ahead of time. Each
//! `open()` consumes the next script: an immediate failure, a complete body,
//! or a live feed the test pushes chunks into while the session runs.
//!
//! # Usage
//!
//! ```ignore
//! use streamchat_core::backend::test_utils::ScriptedTransport;
//!
//! let transport = ScriptedTransport::new();
//! let feed = transport.push_feed();
//! // ... open a session ...
//! feed.send_str("data: {\"content\":\"Hel\"}\n");
//! feed.fail(TransportError::Read("reset".into()));
//!
//! // Afterwards, inspect what was requested
//! assert_eq!(transport.requests().len(), 1);
//! ```

use std::collections::VecDeque;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use super::traits::{ByteStream, ChatTransport, StreamRequest, TransportError};

type Chunk = Result<Vec<u8>, TransportError>;

enum Script {
    Fail(TransportError),
    Feed(mpsc::UnboundedReceiver<Chunk>),
}

/// Sender half of a live scripted response body
#[derive(Clone, Debug)]
pub struct StreamFeed {
    tx: mpsc::UnboundedSender<Chunk>,
}

impl StreamFeed {
    /// Deliver a raw chunk; returns `false` once the reader is gone
    pub fn send_bytes(&self, bytes: impl Into<Vec<u8>>) -> bool {
        self.tx.send(Ok(bytes.into())).is_ok()
    }

    /// Deliver a text chunk; returns `false` once the reader is gone
    pub fn send_str(&self, text: &str) -> bool {
        self.send_bytes(text.as_bytes().to_vec())
    }

    /// Fail the read with a transport error
    pub fn fail(&self, error: TransportError) -> bool {
        self.tx.send(Err(error)).is_ok()
    }

    /// Whether the reading side dropped the stream (connection torn down)
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Transport that replays queued scripts
#[derive(Default)]
pub struct ScriptedTransport {
    scripts: Mutex<VecDeque<Script>>,
    requests: Mutex<Vec<StreamRequest>>,
}

impl ScriptedTransport {
    /// Create a transport with nothing queued
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a live response and return its feed
    ///
    /// The body ends when every clone of the feed is dropped.
    pub fn push_feed(&self) -> StreamFeed {
        let (tx, rx) = mpsc::unbounded_channel();
        self.scripts.lock().push_back(Script::Feed(rx));
        StreamFeed { tx }
    }

    /// Queue a complete response body delivered as the given chunks
    pub fn push_chunks<I, S>(&self, chunks: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<Vec<u8>>,
    {
        let feed = self.push_feed();
        for chunk in chunks {
            feed.send_bytes(chunk);
        }
    }

    /// Queue a complete response body delivered as one chunk
    pub fn push_body(&self, body: &str) {
        self.push_chunks([body.as_bytes().to_vec()]);
    }

    /// Queue a failure of `open()` itself
    pub fn push_failure(&self, error: TransportError) {
        self.scripts.lock().push_back(Script::Fail(error));
    }

    /// Requests received so far, in order
    #[must_use]
    pub fn requests(&self) -> Vec<StreamRequest> {
        self.requests.lock().clone()
    }

    /// Body of the most recent request
    #[must_use]
    pub fn last_body(&self) -> Option<serde_json::Value> {
        self.requests.lock().last().and_then(|r| r.body.clone())
    }
}

#[async_trait]
impl ChatTransport for ScriptedTransport {
    fn name(&self) -> &str {
        "Scripted"
    }

    async fn open(&self, request: &StreamRequest) -> Result<ByteStream, TransportError> {
        self.requests.lock().push(request.clone());

        let script = self.scripts.lock().pop_front();
        match script {
            Some(Script::Fail(error)) => Err(error),
            Some(Script::Feed(rx)) => Ok(Box::pin(UnboundedReceiverStream::new(rx))),
            None => Err(TransportError::Request("no scripted response".to_string())),
        }
    }
}
