//! Streaming HTTP transport for job progress
//!
//! The driver only depends on [`StreamOpener`]: open a request, get back a
//! stream of body chunks. [`ReqwestStreamOpener`] is the production
//! implementation on top of `reqwest`; tests substitute scripted streams.

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, USER_AGENT};
use reqwest::{Client, Method};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::infrastructure::config::StreamConfig;

/// Body chunks of a streamed response
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Vec<u8>, TransportError>> + Send>>;

/// Longest error body kept for display
const MAX_ERROR_BODY_CHARS: usize = 512;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Request timed out after {seconds}s")]
    Timeout { seconds: u64 },

    #[error("Job request rejected with status {status}: {body}")]
    HttpStatus { status: u16, body: String },

    #[error("Connection failed: {message}")]
    Connection { message: String },

    #[error("Failed to read job stream: {message}")]
    Body { message: String },

    #[error("Request cancelled")]
    Cancelled,

    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },
}

impl TransportError {
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// A long-lived request whose response body is an event stream
#[derive(Debug, Clone, PartialEq)]
pub struct StreamRequest {
    pub method: Method,
    pub url: String,
    pub body: Option<serde_json::Value>,
}

impl StreamRequest {
    pub fn post(url: impl Into<String>, body: serde_json::Value) -> Self {
        Self {
            method: Method::POST,
            url: url.into(),
            body: Some(body),
        }
    }
}

/// Capability to open a streamed request
#[async_trait]
pub trait StreamOpener: Send + Sync {
    /// Open `request`. Returns once response headers are in; the body is read
    /// through the returned stream. Must give up with
    /// [`TransportError::Cancelled`] when `cancel` fires.
    async fn open(
        &self,
        request: StreamRequest,
        cancel: CancellationToken,
    ) -> Result<ByteStream, TransportError>;
}

/// `reqwest`-backed opener
pub struct ReqwestStreamOpener {
    client: Client,
    timeout_seconds: u64,
}

impl ReqwestStreamOpener {
    pub fn new(config: &StreamConfig) -> Result<Self, TransportError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("text/event-stream"));
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&config.user_agent).map_err(|e| {
                TransportError::InvalidRequest {
                    message: format!("Invalid user agent: {e}"),
                }
            })?,
        );

        // The total timeout also bounds body streaming.
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .connect_timeout(Duration::from_secs(config.connect_timeout_seconds))
            .default_headers(headers)
            .build()
            .map_err(|e| TransportError::InvalidRequest {
                message: format!("Failed to create HTTP client: {e}"),
            })?;

        Ok(Self {
            client,
            timeout_seconds: config.request_timeout_seconds,
        })
    }

    fn classify(&self, error: &reqwest::Error) -> TransportError {
        if error.is_timeout() {
            TransportError::Timeout {
                seconds: self.timeout_seconds,
            }
        } else if error.is_body() || error.is_decode() {
            TransportError::Body {
                message: error.to_string(),
            }
        } else {
            TransportError::Connection {
                message: error.to_string(),
            }
        }
    }
}

#[async_trait]
impl StreamOpener for ReqwestStreamOpener {
    async fn open(
        &self,
        request: StreamRequest,
        cancel: CancellationToken,
    ) -> Result<ByteStream, TransportError> {
        if cancel.is_cancelled() {
            return Err(TransportError::Cancelled);
        }

        let mut builder = self.client.request(request.method.clone(), &request.url);
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        info!("📡 Opening job stream: {} {}", request.method, request.url);

        let response = tokio::select! {
            result = builder.send() => result.map_err(|e| self.classify(&e))?,
            () = cancel.cancelled() => {
                warn!("🛑 Job stream request cancelled: {}", request.url);
                return Err(TransportError::Cancelled);
            }
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::HttpStatus {
                status: status.as_u16(),
                body: body.chars().take(MAX_ERROR_BODY_CHARS).collect(),
            });
        }

        debug!("Job stream open ({})", status);

        let timeout_seconds = self.timeout_seconds;
        let stream = response.bytes_stream().map(move |chunk| {
            chunk.map(|bytes| bytes.to_vec()).map_err(|e| {
                if e.is_timeout() {
                    TransportError::Timeout {
                        seconds: timeout_seconds,
                    }
                } else {
                    TransportError::Body {
                        message: e.to_string(),
                    }
                }
            })
        });
        Ok(Box::pin(stream))
    }
}
