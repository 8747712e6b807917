//! Line-framed data stream protocol.
//!
//! Each line on the wire is `<tag>:<json-payload>\n`. Only tag `0` (a
//! JSON-encoded text delta) carries content the chat pipeline consumes; every
//! other tag is valid protocol that decodes to a non-text frame.
//!
//! The decoder is a small state machine owning two buffers:
//!
//! 1. an incomplete UTF-8 tail, held back until the rest of the character
//!    arrives, and
//! 2. an unterminated line, held until its `\n` arrives.
//!
//! Each call to [`StreamDecoder::feed`] is one transition. At end of stream
//! [`StreamDecoder::finish`] discards whatever is still buffered: an
//! unterminated trailing line is not a frame.

use aether_core::provider::Usage;
use serde::{Deserialize, Serialize};
use tracing::trace;

/// Text delta.
pub const TAG_TEXT: &str = "0";
/// Error message surfaced by the server.
pub const TAG_ERROR: &str = "3";
/// Finish of the whole message.
pub const TAG_FINISH_MESSAGE: &str = "d";
/// Start of a generation step.
pub const TAG_START_STEP: &str = "f";

/// One decoded protocol line.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamFrame {
    /// `0:"..."`, the only frame that contributes to the answer.
    TextDelta(String),
    /// `3:"..."`
    Error(String),
    /// `f:{"messageId":"..."}`
    StartStep { message_id: String },
    /// `d:{"finishReason":"...","usage":{...}}`
    Finish(FinishPayload),
    /// Any other well-formed line (tool calls, annotations, reasoning, ...).
    Ignored {
        tag: String,
        payload: serde_json::Value,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinishPayload {
    pub finish_reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<FrameUsage>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

impl From<Usage> for FrameUsage {
    fn from(usage: Usage) -> Self {
        Self {
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StartStepPayload {
    message_id: String,
}

impl StreamFrame {
    pub fn tag(&self) -> &str {
        match self {
            Self::TextDelta(_) => TAG_TEXT,
            Self::Error(_) => TAG_ERROR,
            Self::StartStep { .. } => TAG_START_STEP,
            Self::Finish(_) => TAG_FINISH_MESSAGE,
            Self::Ignored { tag, .. } => tag,
        }
    }

    /// Parse one line (without its terminator).
    ///
    /// Returns `None` for malformed lines: no `:` separator, an empty or
    /// non-alphanumeric tag, a payload that is not JSON, or a text/error
    /// payload that is not a JSON string.
    pub fn parse_line(line: &str) -> Option<Self> {
        let (tag, payload) = line.split_once(':')?;
        if tag.is_empty() || !tag.chars().all(|c| c.is_ascii_alphanumeric()) {
            return None;
        }
        let value: serde_json::Value = serde_json::from_str(payload).ok()?;

        let frame = match tag {
            TAG_TEXT => Self::TextDelta(string_payload(value)?),
            TAG_ERROR => Self::Error(string_payload(value)?),
            TAG_START_STEP => match serde_json::from_value::<StartStepPayload>(value.clone()) {
                Ok(p) => Self::StartStep {
                    message_id: p.message_id,
                },
                Err(_) => Self::Ignored {
                    tag: tag.to_string(),
                    payload: value,
                },
            },
            TAG_FINISH_MESSAGE => match serde_json::from_value::<FinishPayload>(value.clone()) {
                Ok(p) => Self::Finish(p),
                Err(_) => Self::Ignored {
                    tag: tag.to_string(),
                    payload: value,
                },
            },
            _ => Self::Ignored {
                tag: tag.to_string(),
                payload: value,
            },
        };
        Some(frame)
    }

    /// Render this frame as one wire line, terminator included.
    pub fn encode(&self) -> String {
        let payload = match self {
            Self::TextDelta(text) | Self::Error(text) => serde_json::to_string(text),
            Self::StartStep { message_id } => {
                serde_json::to_string(&serde_json::json!({ "messageId": message_id }))
            }
            Self::Finish(finish) => serde_json::to_string(finish),
            Self::Ignored { payload, .. } => serde_json::to_string(payload),
        }
        .unwrap_or_else(|_| "null".into());
        format!("{}:{}\n", self.tag(), payload)
    }
}

fn string_payload(value: serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => Some(s),
        _ => None,
    }
}

// ── UTF-8 ─────────────────────────────────────────────────────────────────

/// Incremental byte-to-text decoder.
///
/// Invalid sequences become U+FFFD; a trailing *incomplete* sequence is held
/// back until the next call.
#[derive(Debug, Default)]
struct Utf8Decoder {
    tail: Vec<u8>,
}

impl Utf8Decoder {
    fn decode(&mut self, bytes: &[u8], out: &mut String) {
        let owned;
        let mut input: &[u8] = if self.tail.is_empty() {
            bytes
        } else {
            let mut joined = std::mem::take(&mut self.tail);
            joined.extend_from_slice(bytes);
            owned = joined;
            &owned
        };

        loop {
            match std::str::from_utf8(input) {
                Ok(s) => {
                    out.push_str(s);
                    return;
                }
                Err(e) => {
                    let (valid, rest) = input.split_at(e.valid_up_to());
                    // `valid_up_to` guarantees this prefix is UTF-8.
                    out.push_str(std::str::from_utf8(valid).unwrap_or_default());
                    match e.error_len() {
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            input = &rest[len..];
                        }
                        None => {
                            self.tail = rest.to_vec();
                            return;
                        }
                    }
                }
            }
        }
    }

    fn pending(&self) -> usize {
        self.tail.len()
    }
}

// ── Decoder ───────────────────────────────────────────────────────────────

/// What [`StreamDecoder::finish`] threw away.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Discarded {
    /// Characters of an unterminated final line.
    pub line_chars: usize,
    /// Bytes of an incomplete final UTF-8 sequence.
    pub utf8_bytes: usize,
}

impl Discarded {
    pub fn is_empty(&self) -> bool {
        self.line_chars == 0 && self.utf8_bytes == 0
    }
}

/// Stateful reader for one in-flight response. Not shared across requests.
#[derive(Debug, Default)]
pub struct StreamDecoder {
    utf8: Utf8Decoder,
    line: String,
    malformed: usize,
}

impl StreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one transport chunk; returns every complete frame it finished.
    ///
    /// Malformed lines are skipped and counted, never fatal.
    pub fn feed_frames(&mut self, bytes: &[u8]) -> Vec<StreamFrame> {
        self.utf8.decode(bytes, &mut self.line);

        let mut frames = Vec::new();
        while let Some(end) = self.line.find('\n') {
            let raw: String = self.line.drain(..=end).collect();
            let line = raw.trim_end_matches('\n').trim_end_matches('\r');
            if line.is_empty() {
                continue;
            }
            match StreamFrame::parse_line(line) {
                Some(frame) => frames.push(frame),
                None => {
                    self.malformed += 1;
                    trace!(line = %line, "Skipping malformed stream line");
                }
            }
        }
        frames
    }

    /// Feed one transport chunk; returns only the text deltas.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<String> {
        self.feed_frames(bytes)
            .into_iter()
            .filter_map(|frame| match frame {
                StreamFrame::TextDelta(text) => Some(text),
                _ => None,
            })
            .collect()
    }

    /// Number of malformed lines skipped so far.
    pub fn malformed_lines(&self) -> usize {
        self.malformed
    }

    /// End of stream: drop any unterminated line and incomplete character.
    pub fn finish(self) -> Discarded {
        let discarded = Discarded {
            line_chars: self.line.chars().count(),
            utf8_bytes: self.utf8.pending(),
        };
        if !discarded.is_empty() {
            trace!(?discarded, "Discarding unterminated stream tail");
        }
        discarded
    }
}
