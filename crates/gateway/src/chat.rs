//! `POST /api/chat`: assemble the prompt, stream the upstream answer back
//! as data stream frames.

use axum::{
    body::Body,
    extract::State,
    http::{HeaderName, StatusCode, header},
    response::{IntoResponse, Json, Response},
};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};

use aether_agent::PromptContext;
use aether_core::provider::{ChunkReceiver, ProviderRequest, Usage};
use aether_providers::{ChatRequest, FinishPayload, StreamFrame};

use crate::{ErrorResponse, SharedState};

const DATA_STREAM_HEADER: HeaderName = HeaderName::from_static("x-vercel-ai-data-stream");

/// Frames buffered between the relay task and the response body.
const FRAME_BUFFER: usize = 64;

/// One body chunk. An `Err` aborts the response mid-body.
type BodyLine = Result<String, std::io::Error>;

pub(crate) async fn chat_handler(
    State(state): State<SharedState>,
    Json(payload): Json<ChatRequest>,
) -> Result<Response, (StatusCode, Json<ErrorResponse>)> {
    if payload.message.trim().is_empty() {
        return Err(ErrorResponse::status(
            StatusCode::BAD_REQUEST,
            "message must not be empty",
        ));
    }

    let atoms = payload.atoms.as_ref().filter(|a| a.has_any());
    if let Some(atoms) = atoms {
        atoms
            .ensure_submittable()
            .map_err(|e| ErrorResponse::status(StatusCode::BAD_REQUEST, e.to_string()))?;
    }

    // The user message goes upstream verbatim; only the guard above trims.
    let mut ctx = PromptContext::new(&payload.message)
        .with_history(&payload.history)
        .with_memories(&payload.memories);
    if let Some(atoms) = atoms {
        ctx = ctx.with_atoms(atoms);
    }

    let config = &state.config;
    let mut request = ProviderRequest::new(&config.default_model, state.assembler.assemble(&ctx));
    request.temperature = config.default_temperature;
    request.max_tokens = Some(config.default_max_tokens);
    request.stream = true;

    info!(
        provider = %state.provider.name(),
        model = %request.model,
        history = ctx.windowed_history().len(),
        memories = payload.memories.len(),
        atoms = atoms.is_some(),
        "api/chat request"
    );

    let upstream = state.provider.stream(request).await.map_err(|e| {
        warn!(error = %e, "Upstream refused chat request");
        ErrorResponse::status(StatusCode::BAD_GATEWAY, format!("Upstream error: {e}"))
    })?;

    let (tx, rx) = mpsc::channel::<BodyLine>(FRAME_BUFFER);
    let message_id = format!("msg-{}", uuid::Uuid::new_v4());
    tokio::spawn(relay_frames(upstream, tx, message_id));

    let body = Body::from_stream(ReceiverStream::new(rx));
    Ok((
        [
            (header::CONTENT_TYPE, "text/plain; charset=utf-8"),
            (DATA_STREAM_HEADER, "v1"),
        ],
        body,
    )
        .into_response())
}

/// Re-emit upstream chunks as wire lines.
///
/// Emits `f:` once, `0:` per non-empty chunk, then `d:`. An upstream error
/// emits `3:` and then aborts the body, so the client sees a broken
/// transport rather than a short answer. Returns as soon as the client hangs
/// up, which drops `upstream` and cancels the provider.
pub(crate) async fn relay_frames(
    mut upstream: ChunkReceiver,
    tx: mpsc::Sender<BodyLine>,
    message_id: String,
) {
    let start = StreamFrame::StartStep { message_id };
    if tx.send(Ok(start.encode())).await.is_err() {
        return;
    }

    let mut usage: Option<Usage> = None;
    let mut deltas = 0usize;
    while let Some(item) = upstream.recv().await {
        match item {
            Ok(chunk) => {
                if let Some(text) = chunk.content.filter(|t| !t.is_empty()) {
                    deltas += 1;
                    if tx.send(Ok(StreamFrame::TextDelta(text).encode())).await.is_err() {
                        debug!(deltas, "Client disconnected mid-stream");
                        return;
                    }
                }
                if chunk.usage.is_some() {
                    usage = chunk.usage;
                }
                if chunk.done {
                    break;
                }
            }
            Err(e) => {
                warn!(error = %e, deltas, "Upstream failed mid-stream");
                let message = e.to_string();
                let _ = tx.send(Ok(StreamFrame::Error(message.clone()).encode())).await;
                let _ = tx.send(Err(std::io::Error::other(message))).await;
                return;
            }
        }
    }

    let finish = StreamFrame::Finish(FinishPayload {
        finish_reason: "stop".into(),
        usage: usage.map(Into::into),
    });
    let _ = tx.send(Ok(finish.encode())).await;
    debug!(deltas, "Chat stream finished");
}
