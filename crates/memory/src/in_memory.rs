//! In-memory record store, for tests and ephemeral sessions.

use async_trait::async_trait;
use aether_core::error::StoreError;
use aether_core::record::{FeedbackRecord, RecordQuery, RecordStore, TurnRecord};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Keeps turns and feedback in two `Vec`s, in insertion order.
pub struct InMemoryStore {
    turns: Arc<RwLock<Vec<TurnRecord>>>,
    feedback: Arc<RwLock<Vec<FeedbackRecord>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            turns: Arc::new(RwLock::new(Vec::new())),
            feedback: Arc::new(RwLock::new(Vec::new())),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RecordStore for InMemoryStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn append_turn(&self, turn: TurnRecord) -> Result<String, StoreError> {
        let id = turn.id.clone();
        self.turns.write().await.push(turn);
        Ok(id)
    }

    async fn append_feedback(&self, feedback: FeedbackRecord) -> Result<String, StoreError> {
        feedback.validate()?;
        let id = feedback.id.clone();
        self.feedback.write().await.push(feedback);
        Ok(id)
    }

    async fn turns(&self, query: &RecordQuery) -> Result<Vec<TurnRecord>, StoreError> {
        Ok(query.select_turns(&self.turns.read().await))
    }

    async fn feedback(&self, query: &RecordQuery) -> Result<Vec<FeedbackRecord>, StoreError> {
        Ok(query.select_feedback(&self.feedback.read().await))
    }
}
