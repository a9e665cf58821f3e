//! Transport Traits
//!
//! The stream session only needs one thing from the network: issue a request
//! and hand back the response body as an ordered stream of byte chunks.
//! Implementations handle the protocol details (status checks, headers).

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use thiserror::Error;

/// Response body as it arrives, chunk by chunk
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Vec<u8>, TransportError>> + Send>>;

/// Transport failures
///
/// Caller-initiated cancellation is not an error and has no variant here.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// The request could not be sent (connection refused, DNS, TLS...)
    #[error("Request failed: {0}")]
    Request(String),

    /// The server answered with a non-success status
    #[error("HTTP error! status: {status}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body, if it could be read
        body: String,
    },

    /// The response carried no streamable body
    #[error("Response body is null")]
    MissingBody,

    /// Reading the body failed mid-stream
    #[error("Stream read failed: {0}")]
    Read(String),
}

/// HTTP method of a stream request
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum HttpMethod {
    /// GET (no body is sent)
    Get,
    /// POST with a JSON body
    #[default]
    Post,
}

/// One streaming request
#[derive(Clone, Debug, PartialEq)]
pub struct StreamRequest {
    /// Full endpoint URL
    pub endpoint: String,
    /// HTTP method
    pub method: HttpMethod,
    /// JSON body (ignored for GET)
    pub body: Option<serde_json::Value>,
    /// Extra headers, applied over the defaults
    pub headers: Vec<(String, String)>,
}

impl StreamRequest {
    /// A POST request with a JSON body
    pub fn post(endpoint: impl Into<String>, body: serde_json::Value) -> Self {
        Self {
            endpoint: endpoint.into(),
            method: HttpMethod::Post,
            body: Some(body),
            headers: Vec::new(),
        }
    }

    /// A GET request
    pub fn get(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            method: HttpMethod::Get,
            body: None,
            headers: Vec::new(),
        }
    }

    /// Add a header
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Add several headers
    #[must_use]
    pub fn with_headers<I, K, V>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.headers
            .extend(headers.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }
}

/// Chat transport trait
///
/// Implement this trait to stream from a different kind of endpoint.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Transport name for logs (e.g., "HTTP")
    fn name(&self) -> &str;

    /// Issue the request and return the response body as a chunk stream
    ///
    /// Fails fast on a failure status or a missing body; read errors after
    /// that point are items of the returned stream.
    async fn open(&self, request: &StreamRequest) -> Result<ByteStream, TransportError>;
}
