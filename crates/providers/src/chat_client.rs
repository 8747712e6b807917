//! HTTP client for the gateway's `/api/chat` route.
//!
//! Posts a [`ChatRequest`] and turns the line-framed response body into a
//! channel of text deltas. Dropping the receiver cancels the read.

use crate::accumulator::DeltaReceiver;
use crate::data_stream::{StreamDecoder, StreamFrame};
use aether_config::AppConfig;
use aether_core::atom::AtomSet;
use aether_core::error::ProviderError;
use aether_core::message::HistoryEntry;
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

/// Body of `POST /api/chat`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub history: Vec<HistoryEntry>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub memories: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub atoms: Option<AtomSet>,
}

impl ChatRequest {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::default()
        }
    }

    pub fn with_history(mut self, history: Vec<HistoryEntry>) -> Self {
        self.history = history;
        self
    }

    pub fn with_memories(mut self, memories: Vec<String>) -> Self {
        self.memories = memories;
        self
    }

    pub fn with_atoms(mut self, atoms: AtomSet) -> Self {
        self.atoms = Some(atoms);
        self
    }
}

/// Anything that can turn a chat request into a delta stream.
///
/// `ChatClient` talks HTTP; tests script the deltas directly.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn send(&self, request: &ChatRequest) -> Result<DeltaReceiver, ProviderError>;
}

/// Streams chat responses from a running gateway.
pub struct ChatClient {
    endpoint: String,
    client: reqwest::Client,
}

impl ChatClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(std::time::Duration::from_secs(10))
            .build()
            .expect("Failed to create HTTP client");

        let base_url = base_url.into();
        Self {
            endpoint: format!("{}/api/chat", base_url.trim_end_matches('/')),
            client,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(&config.chat.gateway_url)
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl ChatTransport for ChatClient {
    async fn send(&self, request: &ChatRequest) -> Result<DeltaReceiver, ProviderError> {
        debug!(
            endpoint = %self.endpoint,
            history = request.history.len(),
            memories = request.memories.len(),
            atoms = request.atoms.is_some(),
            "Sending chat request"
        );

        let response = self
            .client
            .post(&self.endpoint)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout(e.to_string())
                } else {
                    ProviderError::Network(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), body = %body, "Gateway rejected chat request");
            return Err(ProviderError::ApiError {
                status_code: status.as_u16(),
                message: body,
            });
        }

        let (tx, rx) = mpsc::channel(64);
        tokio::spawn(pump_deltas(response.bytes_stream(), tx));
        Ok(rx)
    }
}

/// Decode a byte stream into text deltas and push them into `tx`.
///
/// A transport error is forwarded once as `StreamInterrupted` and ends the
/// pump. A closed receiver ends it silently. Error frames from the server are
/// logged and otherwise ignored.
pub async fn pump_deltas<S, B, E>(stream: S, tx: mpsc::Sender<Result<String, ProviderError>>)
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: std::fmt::Display,
{
    let mut stream = std::pin::pin!(stream);
    let mut decoder = StreamDecoder::new();

    while let Some(chunk) = stream.next().await {
        let bytes = match chunk {
            Ok(bytes) => bytes,
            Err(e) => {
                let _ = tx
                    .send(Err(ProviderError::StreamInterrupted(e.to_string())))
                    .await;
                return;
            }
        };

        for frame in decoder.feed_frames(bytes.as_ref()) {
            match frame {
                StreamFrame::TextDelta(delta) => {
                    if tx.send(Ok(delta)).await.is_err() {
                        debug!("Delta receiver dropped, abandoning stream");
                        return;
                    }
                }
                StreamFrame::Error(message) => {
                    warn!(message = %message, "Server reported a stream error");
                }
                other => trace!(tag = other.tag(), "Skipping non-text frame"),
            }
        }
    }

    let malformed = decoder.malformed_lines();
    let discarded = decoder.finish();
    if malformed > 0 || !discarded.is_empty() {
        debug!(
            malformed,
            tail_chars = discarded.line_chars,
            tail_bytes = discarded.utf8_bytes,
            "Stream closed with discarded input"
        );
    }
}
