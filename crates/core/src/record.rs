//! Stored records (turns and ratings) and the record store trait.
//!
//! The serving layer writes a `TurnRecord` after each user message and each
//! completed assistant reply; raters attach `FeedbackRecord`s to assistant
//! turns. The dataset correlator only ever reads a snapshot of both.

use crate::error::StoreError;
use crate::message::Speaker;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One stored message within a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnRecord {
    pub id: String,
    pub role: Speaker,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub session_id: String,
    pub user_id: String,
    /// Email from the author's profile, when the store can join it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_email: Option<String>,
}

impl TurnRecord {
    pub fn new(
        role: Speaker,
        content: impl Into<String>,
        session_id: impl Into<String>,
        user_id: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content: content.into(),
            created_at: Utc::now(),
            session_id: session_id.into(),
            user_id: user_id.into(),
            user_email: None,
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.user_email = Some(email.into());
        self
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }
}

/// A rating attached to one assistant turn.
///
/// `prompt_id` references the *assistant* turn being rated. The name is a
/// fixed storage contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackRecord {
    pub id: String,
    pub prompt_id: String,
    pub rating: u8,
    pub feedback_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_response: Option<String>,
    pub created_at: DateTime<Utc>,
}

pub const MIN_RATING: u8 = 1;
pub const MAX_RATING: u8 = 5;

impl FeedbackRecord {
    pub fn new(prompt_id: impl Into<String>, rating: u8, feedback_type: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            prompt_id: prompt_id.into(),
            rating,
            feedback_type: feedback_type.into(),
            preferred_response: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_preferred(mut self, preferred: impl Into<String>) -> Self {
        self.preferred_response = Some(preferred.into());
        self
    }

    /// Ratings outside 1..=5 are rejected by every store.
    pub fn validate(&self) -> Result<(), StoreError> {
        if !(MIN_RATING..=MAX_RATING).contains(&self.rating) {
            return Err(StoreError::InvalidRecord(format!(
                "rating {} outside {MIN_RATING}..={MAX_RATING}",
                self.rating
            )));
        }
        if self.prompt_id.trim().is_empty() {
            return Err(StoreError::InvalidRecord("feedback without prompt_id".into()));
        }
        Ok(())
    }
}

/// Scope of a record read.
///
/// `session_id` narrows turns only; feedback has no session column.
/// `limit` keeps the most recent N records. Results are always ordered by
/// `created_at` ascending, ties in insertion order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecordQuery {
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
}

impl RecordQuery {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn session(session_id: impl Into<String>) -> Self {
        Self {
            session_id: Some(session_id.into()),
            limit: None,
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Apply this query to an in-memory slice of turns.
    pub fn select_turns(&self, turns: &[TurnRecord]) -> Vec<TurnRecord> {
        let filtered = turns
            .iter()
            .filter(|t| self.session_id.as_ref().is_none_or(|s| &t.session_id == s))
            .cloned()
            .collect();
        self.order_and_limit(filtered, |t| t.created_at)
    }

    /// Apply this query to an in-memory slice of feedback.
    pub fn select_feedback(&self, feedback: &[FeedbackRecord]) -> Vec<FeedbackRecord> {
        self.order_and_limit(feedback.to_vec(), |f| f.created_at)
    }

    fn order_and_limit<T>(&self, mut records: Vec<T>, at: impl Fn(&T) -> DateTime<Utc>) -> Vec<T> {
        // Stable: equal timestamps keep insertion order.
        records.sort_by_key(|r| at(r));
        if let Some(limit) = self.limit {
            let excess = records.len().saturating_sub(limit);
            records.drain(..excess);
        }
        records
    }
}

/// A point-in-time copy of a store's contents.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecordSnapshot {
    pub turns: Vec<TurnRecord>,
    pub feedback: Vec<FeedbackRecord>,
}

/// The record store boundary.
///
/// Implementations: in-memory (tests), JSONL file, SQLite.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// The backend name (e.g., "sqlite", "file", "in_memory").
    fn name(&self) -> &str;

    /// Persist a turn. Returns its id.
    async fn append_turn(&self, turn: TurnRecord) -> std::result::Result<String, StoreError>;

    /// Persist a rating. Returns its id.
    async fn append_feedback(&self, feedback: FeedbackRecord) -> std::result::Result<String, StoreError>;

    async fn turns(&self, query: &RecordQuery) -> std::result::Result<Vec<TurnRecord>, StoreError>;

    async fn feedback(&self, query: &RecordQuery) -> std::result::Result<Vec<FeedbackRecord>, StoreError>;

    /// Read turns and feedback for one scope.
    async fn snapshot(&self, query: &RecordQuery) -> std::result::Result<RecordSnapshot, StoreError> {
        Ok(RecordSnapshot {
            turns: self.turns(query).await?,
            feedback: self.feedback(&RecordQuery::all()).await?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn rating_bounds_are_enforced() {
        assert!(FeedbackRecord::new("t1", 0, "rating").validate().is_err());
        assert!(FeedbackRecord::new("t1", 6, "rating").validate().is_err());
        assert!(FeedbackRecord::new("t1", 5, "rating").validate().is_ok());
        assert!(FeedbackRecord::new(" ", 3, "rating").validate().is_err());
    }

    #[test]
    fn query_orders_by_time_and_keeps_ties_stable() {
        let turns = vec![
            TurnRecord::new(Speaker::User, "b", "s1", "u").with_created_at(at(5)),
            TurnRecord::new(Speaker::User, "a", "s1", "u").with_created_at(at(1)),
            TurnRecord::new(Speaker::User, "c", "s1", "u").with_created_at(at(5)),
        ];
        let selected = RecordQuery::all().select_turns(&turns);
        let contents: Vec<&str> = selected.iter().map(|t| t.content.as_str()).collect();
        assert_eq!(contents, vec!["a", "b", "c"]);
    }

    #[test]
    fn query_filters_session_and_keeps_most_recent() {
        let turns = vec![
            TurnRecord::new(Speaker::User, "1", "s1", "u").with_created_at(at(1)),
            TurnRecord::new(Speaker::User, "x", "s2", "u").with_created_at(at(2)),
            TurnRecord::new(Speaker::User, "2", "s1", "u").with_created_at(at(3)),
            TurnRecord::new(Speaker::User, "3", "s1", "u").with_created_at(at(4)),
        ];
        let selected = RecordQuery::session("s1").with_limit(2).select_turns(&turns);
        let contents: Vec<&str> = selected.iter().map(|t| t.content.as_str()).collect();
        assert_eq!(contents, vec!["2", "3"]);
    }

    #[test]
    fn turn_record_omits_missing_email() {
        let turn = TurnRecord::new(Speaker::Assistant, "hi", "s", "u");
        let json = serde_json::to_string(&turn).unwrap();
        assert!(!json.contains("user_email"));
        assert!(json.contains(r#""role":"assistant""#));
    }
}
