//! Completion-service plumbing for Aether.
//!
//! - [`openai_compat`]: the upstream `Provider` the gateway streams from.
//! - [`data_stream`]: the line-framed wire protocol between gateway and client.
//! - [`chat_client`]: the client half, turning a response body into deltas.
//! - [`accumulator`]: rebuilds the answer from those deltas.

pub mod accumulator;
pub mod chat_client;
pub mod data_stream;
pub mod openai_compat;

pub use accumulator::{
    DeltaReceiver, FALLBACK_MESSAGE, ResponseAccumulator, StreamOutcome, accumulate,
    running_values,
};
pub use chat_client::{ChatClient, ChatRequest, ChatTransport, pump_deltas};
pub use data_stream::{FinishPayload, FrameUsage, StreamDecoder, StreamFrame};
pub use openai_compat::OpenAiCompatProvider;

use aether_config::AppConfig;
use aether_core::error::ProviderError;
use aether_core::provider::Provider;
use std::sync::Arc;

/// Build the configured upstream provider.
pub fn build_from_config(config: &AppConfig) -> Result<Arc<dyn Provider>, ProviderError> {
    let provider = OpenAiCompatProvider::from_config(config)?;
    tracing::info!(
        provider = %config.provider.name,
        base_url = %config.provider.base_url,
        "Upstream provider configured"
    );
    Ok(Arc::new(provider))
}
