//! Response accumulation: rebuilds the full answer from text deltas.
//!
//! `full = full + delta` for every delta, in arrival order. The running value
//! after each delta is what a progressive display shows; the value at the end
//! of the stream is what gets recorded.

use aether_core::error::ProviderError;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Shown in place of an answer when the transport fails mid-flight.
pub const FALLBACK_MESSAGE: &str =
    "Neural link disrupted. Please check your connection and try again.";

/// Receiving half of a decoded delta stream.
pub type DeltaReceiver = mpsc::Receiver<Result<String, ProviderError>>;

/// A single growing string.
#[derive(Debug, Clone, Default)]
pub struct ResponseAccumulator {
    full: String,
    deltas: usize,
}

impl ResponseAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one delta and return the running value.
    pub fn push(&mut self, delta: &str) -> &str {
        self.full.push_str(delta);
        self.deltas += 1;
        &self.full
    }

    pub fn current(&self) -> &str {
        &self.full
    }

    pub fn delta_count(&self) -> usize {
        self.deltas
    }

    /// Final value. Empty when no (non-empty) delta arrived.
    pub fn finish(self) -> String {
        self.full
    }
}

/// The running values for a sequence of deltas, produced lazily.
///
/// Each item is a superset (prefix-extension) of the previous one.
pub fn running_values<I>(deltas: I) -> impl Iterator<Item = String>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    deltas.into_iter().scan(String::new(), |full, delta| {
        full.push_str(delta.as_ref());
        Some(full.clone())
    })
}

/// How a streamed response ended.
#[derive(Debug, Clone)]
pub enum StreamOutcome {
    /// At least one character arrived and the stream closed cleanly.
    Complete(String),
    /// The stream closed cleanly without any text. Nothing is recorded.
    Empty,
    /// The transport failed before the stream completed.
    Failed {
        error: ProviderError,
        /// Characters received before the failure; never recorded.
        partial_chars: usize,
    },
}

impl StreamOutcome {
    /// The text to display, applying the fallback policy.
    ///
    /// `None` means there is nothing to show or record.
    pub fn display_text(&self) -> Option<&str> {
        match self {
            Self::Complete(text) => Some(text),
            Self::Empty => None,
            Self::Failed { .. } => Some(FALLBACK_MESSAGE),
        }
    }

    /// The text that may be persisted as an assistant turn.
    pub fn recordable(&self) -> Option<&str> {
        match self {
            Self::Complete(text) => Some(text),
            Self::Empty | Self::Failed { .. } => None,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

/// Drain a delta stream into an accumulator.
///
/// `on_partial` sees the running value after every delta. The first error
/// ends accumulation; whatever arrived before it is discarded.
pub async fn accumulate(mut rx: DeltaReceiver, mut on_partial: impl FnMut(&str)) -> StreamOutcome {
    let mut acc = ResponseAccumulator::new();

    while let Some(item) = rx.recv().await {
        match item {
            Ok(delta) => on_partial(acc.push(&delta)),
            Err(error) => {
                warn!(error = %error, received = acc.delta_count(), "Response stream failed");
                return StreamOutcome::Failed {
                    error,
                    partial_chars: acc.current().chars().count(),
                };
            }
        }
    }

    debug!(deltas = acc.delta_count(), "Response stream complete");
    let full = acc.finish();
    if full.is_empty() {
        StreamOutcome::Empty
    } else {
        StreamOutcome::Complete(full)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn running_value_grows_with_each_delta() {
        let mut acc = ResponseAccumulator::new();
        let running: Vec<String> = ["A", "B", "C"]
            .iter()
            .map(|d| acc.push(d).to_string())
            .collect();
        assert_eq!(running, vec!["A", "AB", "ABC"]);
        assert_eq!(acc.finish(), "ABC");
    }

    #[test]
    fn lazy_running_values_match() {
        let values: Vec<String> = running_values(["A", "B", "C"]).collect();
        assert_eq!(values, vec!["A", "AB", "ABC"]);
        assert_eq!(running_values(Vec::<String>::new()).count(), 0);
    }

    #[tokio::test]
    async fn accumulate_reports_partials_and_completes() {
        let (tx, rx) = mpsc::channel(8);
        for delta in ["Hel", "lo"] {
            tx.send(Ok(delta.to_string())).await.unwrap();
        }
        drop(tx);

        let mut seen = Vec::new();
        let outcome = accumulate(rx, |partial| seen.push(partial.to_string())).await;
        assert_eq!(seen, vec!["Hel", "Hello"]);
        assert!(matches!(outcome, StreamOutcome::Complete(ref s) if s == "Hello"));
        assert_eq!(outcome.recordable(), Some("Hello"));
    }

    #[tokio::test]
    async fn zero_deltas_is_empty_and_not_recordable() {
        let (tx, rx) = mpsc::channel::<Result<String, ProviderError>>(1);
        drop(tx);
        let outcome = accumulate(rx, |_| {}).await;
        assert!(matches!(outcome, StreamOutcome::Empty));
        assert_eq!(outcome.display_text(), None);
        assert_eq!(outcome.recordable(), None);
    }

    #[tokio::test]
    async fn transport_failure_substitutes_fallback() {
        let (tx, rx) = mpsc::channel(8);
        tx.send(Ok("partial ans".to_string())).await.unwrap();
        tx.send(Err(ProviderError::StreamInterrupted("reset".into())))
            .await
            .unwrap();
        tx.send(Ok("never seen".to_string())).await.unwrap();
        drop(tx);

        let outcome = accumulate(rx, |_| {}).await;
        assert!(outcome.is_failed());
        assert_eq!(outcome.display_text(), Some(FALLBACK_MESSAGE));
        assert_eq!(outcome.recordable(), None);
        if let StreamOutcome::Failed { partial_chars, .. } = outcome {
            assert_eq!(partial_chars, 11);
        }
    }
}
