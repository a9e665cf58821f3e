//! HTTP Transport
//!
//! Streams the chat endpoint's response over HTTP with `reqwest`.
//! The request declares `Accept: text/event-stream`; the body is read with
//! `bytes_stream()` so chunks are delivered as they arrive instead of being
//! buffered into a single payload.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, CONTENT_TYPE};
use reqwest::StatusCode;

use super::traits::{ByteStream, ChatTransport, HttpMethod, StreamRequest, TransportError};

/// Most bytes of an error response body kept for diagnostics
const ERROR_BODY_LIMIT: usize = 4096;

/// HTTP client for streaming chat endpoints
#[derive(Clone, Debug)]
pub struct HttpTransport {
    /// HTTP client
    http_client: reqwest::Client,
}

impl HttpTransport {
    /// Create a transport with the given connect timeout
    ///
    /// No overall request timeout is set: streams may legitimately run for
    /// a long time and are ended by cancellation instead.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(connect_timeout: Duration) -> Result<Self, TransportError> {
        let http_client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| TransportError::Request(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self { http_client })
    }

    /// Wrap an existing client
    #[must_use]
    pub fn with_client(http_client: reqwest::Client) -> Self {
        Self { http_client }
    }

    /// Default headers with the caller's headers applied over them
    fn build_headers(request: &StreamRequest) -> Result<HeaderMap, TransportError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT, HeaderValue::from_static("text/event-stream"));

        for (name, value) in &request.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| TransportError::Request(format!("Invalid header name {name:?}: {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| TransportError::Request(format!("Invalid header value: {e}")))?;
            headers.insert(name, value);
        }

        Ok(headers)
    }
}

/// First chunk of an error response, capped at [`ERROR_BODY_LIMIT`]
///
/// The rest of the body is never read: a failing server that keeps
/// streaming must not delay the failure.
async fn error_body_excerpt(response: reqwest::Response) -> String {
    match response.bytes_stream().next().await {
        Some(Ok(chunk)) => {
            let end = chunk.len().min(ERROR_BODY_LIMIT);
            String::from_utf8_lossy(&chunk[..end]).into_owned()
        }
        Some(Err(e)) => {
            tracing::debug!(error = %e, "Failed to read error response body");
            String::new()
        }
        None => String::new(),
    }
}

#[async_trait]
impl ChatTransport for HttpTransport {
    fn name(&self) -> &str {
        "HTTP"
    }

    async fn open(&self, request: &StreamRequest) -> Result<ByteStream, TransportError> {
        let headers = Self::build_headers(request)?;

        let mut builder = match request.method {
            HttpMethod::Get => self.http_client.get(&request.endpoint),
            HttpMethod::Post => self.http_client.post(&request.endpoint),
        }
        .headers(headers);

        if request.method != HttpMethod::Get {
            if let Some(ref body) = request.body {
                let bytes = serde_json::to_vec(body)
                    .map_err(|e| TransportError::Request(format!("Failed to encode body: {e}")))?;
                builder = builder.body(bytes);
            }
        }

        tracing::debug!(endpoint = %request.endpoint, method = ?request.method, "Opening stream");

        let response = builder
            .send()
            .await
            .map_err(|e| TransportError::Request(e.to_string()))?;

        // Check for HTTP errors
        let status = response.status();
        if !status.is_success() {
            let body = error_body_excerpt(response).await;
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }

        if status == StatusCode::NO_CONTENT {
            return Err(TransportError::MissingBody);
        }

        let stream = response.bytes_stream().map(|chunk| {
            chunk
                .map(|bytes| bytes.to_vec())
                .map_err(|e| TransportError::Read(e.to_string()))
        });

        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_caller_headers_override_defaults() {
        let request = StreamRequest::get("http://localhost")
            .with_header("Accept", "application/x-ndjson")
            .with_header("X-Client", "streamchat");

        let headers = HttpTransport::build_headers(&request).unwrap();
        assert_eq!(headers.get(ACCEPT).unwrap(), "application/x-ndjson");
        assert_eq!(headers.get(CONTENT_TYPE).unwrap(), "application/json");
        assert_eq!(headers.get("x-client").unwrap(), "streamchat");
        assert_eq!(headers.get_all(ACCEPT).iter().count(), 1);
    }

    #[test]
    fn test_invalid_header_rejected() {
        let request = StreamRequest::get("http://localhost").with_header("bad header", "x");
        assert!(matches!(
            HttpTransport::build_headers(&request),
            Err(TransportError::Request(_))
        ));
    }

    #[tokio::test]
    async fn test_connection_refused_is_request_error() {
        // Reserve a port, then free it so nothing is listening there
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let transport = HttpTransport::new(Duration::from_secs(1)).unwrap();
        let request = StreamRequest::post(
            format!("http://127.0.0.1:{port}/api/chat/stream"),
            serde_json::json!({}),
        );

        let result = transport.open(&request).await;
        assert!(matches!(result, Err(TransportError::Request(_))));
    }

    #[tokio::test]
    async fn test_error_status_fails_without_draining_body() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        // A failing server that starts an event stream and never ends it
        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = vec![0u8; 4096];
            let _ = socket.read(&mut request).await.unwrap();

            let frame = "data: boom\n";
            let response = format!(
                "HTTP/1.1 500 Internal Server Error\r\n\
                 Content-Type: text/event-stream\r\n\
                 Transfer-Encoding: chunked\r\n\r\n\
                 {:x}\r\n{frame}\r\n",
                frame.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            std::future::pending::<()>().await;
        });

        let transport = HttpTransport::new(Duration::from_secs(1)).unwrap();
        let request = StreamRequest::post(
            format!("http://{addr}/api/chat/stream"),
            serde_json::json!({}),
        );

        let result = tokio::time::timeout(Duration::from_secs(5), transport.open(&request))
            .await
            .expect("error status should be reported before the body ends");
        match result {
            Err(TransportError::Status { status, body }) => {
                assert_eq!(status, 500);
                assert_eq!(body, "data: boom\n");
            }
            Err(e) => panic!("unexpected error: {e}"),
            Ok(_) => panic!("error status opened a stream"),
        }

        server.abort();
    }

    #[tokio::test]
    async fn test_error_body_is_capped() {
        use wiremock::matchers::method;
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("x".repeat(64 * 1024)))
            .mount(&server)
            .await;

        let transport = HttpTransport::new(Duration::from_secs(5)).unwrap();
        let request = StreamRequest::post(
            format!("{}/api/chat/stream", server.uri()),
            serde_json::json!({}),
        );

        match transport.open(&request).await {
            Err(TransportError::Status { status, body }) => {
                assert_eq!(status, 503);
                assert!(!body.is_empty());
                assert!(body.len() <= ERROR_BODY_LIMIT);
            }
            Err(e) => panic!("unexpected error: {e}"),
            Ok(_) => panic!("error status opened a stream"),
        }
    }
}
