//! Stream Session
//!
//! Owns one network exchange from request to terminal outcome.
//!
//! A session runs a single cooperative read loop on a spawned task: one read
//! outstanding at a time, each chunk parsed completely before the next read
//! is issued. Parsed events are pushed, in arrival order, through a bounded
//! channel to whoever holds the [`StreamSession`]; the bound is the
//! backpressure.
//!
//! # Terminal events
//!
//! Exactly one of [`SessionEvent::Completed`] or [`SessionEvent::Failed`] is
//! delivered per session, unless the session is cancelled, in which case
//! neither is. The connection is torn down (the body stream dropped) as soon
//! as the loop exits.
//!
//! # Cancellation
//!
//! [`StreamSession::cancel`] is idempotent. The loop waits on the
//! cancellation token alongside every request and every read, so an
//! outstanding read resolves as cancelled instead of hanging, and a chunk
//! that was already in flight is not processed.

use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use super::frame_parser::{FrameEvent, FrameParser};
use crate::backend::{ChatTransport, StreamRequest, TransportError};
use crate::messages::SessionId;

/// Default capacity of the event channel between read loop and consumer
pub const DEFAULT_EVENT_BUFFER: usize = 100;

/// Event delivered by a stream session
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionEvent {
    /// A content fragment, ready to be accumulated by the consumer
    Delta(String),
    /// The stream finished (sentinel, `done` flag, or end of input)
    Completed,
    /// The exchange failed
    Failed(TransportError),
}

impl SessionEvent {
    /// Whether this event ends the session
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed(_))
    }
}

/// Handle to one running stream
pub struct StreamSession {
    /// Session identifier (for logs)
    id: SessionId,
    /// Events from the read loop
    events: mpsc::Receiver<SessionEvent>,
    /// Cooperative cancellation
    cancel: CancellationToken,
    /// A terminal event has been handed out
    finished: bool,
}

impl StreamSession {
    /// Issue the request and start reading the response
    ///
    /// Must be called within a tokio runtime. Request failures are reported
    /// as a [`SessionEvent::Failed`] event, never as a return value.
    pub fn open<T>(transport: Arc<T>, request: StreamRequest, capacity: usize) -> Self
    where
        T: ChatTransport + ?Sized + 'static,
    {
        let id = SessionId::new();
        let (tx, events) = mpsc::channel(capacity.max(1));
        let cancel = CancellationToken::new();

        let span = tracing::debug_span!("stream_session", session = %id);
        tokio::spawn(run_session(transport, request, tx, cancel.clone()).instrument(span));

        Self {
            id,
            events,
            cancel,
            finished: false,
        }
    }

    /// Session identifier
    #[must_use]
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Whether cancellation was requested
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Whether a terminal event has been delivered
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// A token that cancels this session (e.g. for an external timeout)
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Abort the request or read in progress
    ///
    /// Idempotent. No terminal event is delivered for a cancelled session.
    pub fn cancel(&self) {
        if !self.cancel.is_cancelled() {
            tracing::debug!(session = %self.id, "Cancelling stream session");
            self.cancel.cancel();
        }
    }

    /// Wait for the next event
    ///
    /// Returns `None` once the session is cancelled or after its terminal
    /// event.
    pub async fn next_event(&mut self) -> Option<SessionEvent> {
        if self.finished || self.cancel.is_cancelled() {
            return None;
        }

        let event = tokio::select! {
            biased;
            () = self.cancel.cancelled() => return None,
            event = self.events.recv() => event,
        };
        self.accept(event)
    }

    /// Take the next event if one is ready, without waiting
    pub fn try_next_event(&mut self) -> Option<SessionEvent> {
        if self.finished || self.cancel.is_cancelled() {
            return None;
        }

        match self.events.try_recv() {
            Ok(event) => self.accept(Some(event)),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => self.accept(None),
        }
    }

    fn accept(&mut self, event: Option<SessionEvent>) -> Option<SessionEvent> {
        let event = match event {
            Some(event) => event,
            // The read loop exits without a terminal event only when
            // cancelled or when it died; report the latter as a failure.
            None if self.cancel.is_cancelled() => return None,
            None => SessionEvent::Failed(TransportError::Read(
                "stream session ended without a result".to_string(),
            )),
        };

        if event.is_terminal() {
            self.finished = true;
        }
        Some(event)
    }
}

impl Drop for StreamSession {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl std::fmt::Debug for StreamSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamSession")
            .field("id", &self.id)
            .field("cancelled", &self.cancel.is_cancelled())
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}

/// Send an event unless the session is cancelled first
async fn emit(
    tx: &mpsc::Sender<SessionEvent>,
    cancel: &CancellationToken,
    event: SessionEvent,
) -> bool {
    tokio::select! {
        biased;
        () = cancel.cancelled() => false,
        result = tx.send(event) => result.is_ok(),
    }
}

/// The read loop
async fn run_session<T>(
    transport: Arc<T>,
    request: StreamRequest,
    tx: mpsc::Sender<SessionEvent>,
    cancel: CancellationToken,
) where
    T: ChatTransport + ?Sized,
{
    let opened = tokio::select! {
        biased;
        () = cancel.cancelled() => {
            tracing::debug!("Cancelled before the response arrived");
            return;
        }
        opened = transport.open(&request) => opened,
    };

    let mut stream = match opened {
        Ok(stream) => stream,
        Err(e) => {
            tracing::warn!(transport = transport.name(), error = %e, "Failed to open stream");
            emit(&tx, &cancel, SessionEvent::Failed(e)).await;
            return;
        }
    };

    let mut parser = FrameParser::new();
    let mut deltas = 0usize;
    let mut bytes_read = 0usize;

    loop {
        let next = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                tracing::debug!(deltas, bytes_read, "Stream cancelled");
                return;
            }
            next = stream.next() => next,
        };

        match next {
            Some(Ok(chunk)) => {
                bytes_read += chunk.len();
                for event in parser.push_bytes(&chunk) {
                    match event {
                        FrameEvent::ContentDelta(text) => {
                            deltas += 1;
                            if !emit(&tx, &cancel, SessionEvent::Delta(text)).await {
                                return;
                            }
                        }
                        FrameEvent::Done => {
                            tracing::debug!(deltas, bytes_read, "Stream completed");
                            emit(&tx, &cancel, SessionEvent::Completed).await;
                            return;
                        }
                    }
                }
            }
            Some(Err(e)) => {
                tracing::warn!(deltas, bytes_read, error = %e, "Stream failed");
                emit(&tx, &cancel, SessionEvent::Failed(e)).await;
                return;
            }
            None => {
                parser.finish();
                tracing::debug!(deltas, bytes_read, "Stream ended without sentinel");
                emit(&tx, &cancel, SessionEvent::Completed).await;
                return;
            }
        }
    }
}
