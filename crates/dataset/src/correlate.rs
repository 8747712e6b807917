//! Dataset correlation: stored turns + ratings → paired training examples.
//!
//! For every user turn `p`:
//!
//! 1. the response is the earliest assistant turn in the same session whose
//!    `created_at` is strictly later than `p.created_at` (equal timestamps
//!    resolve to the turn that comes first in the input);
//! 2. the rating is the first feedback record whose `prompt_id` equals that
//!    assistant turn's id. `prompt_id` names the rated *assistant* turn.
//!
//! Every user turn yields exactly one example, matched or not.

use aether_core::message::Speaker;
use aether_core::record::{FeedbackRecord, TurnRecord};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Shown for turns whose author has no email on record.
pub const ANONYMOUS: &str = "anonymous";

/// One (prompt, response, preference) example.
///
/// Field order is the export contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RlhfExample {
    pub prompt: String,
    /// Empty when no later assistant turn exists in the session.
    pub response: String,
    pub rating: Option<u8>,
    pub preferred_response: Option<String>,
    pub user_email: String,
    /// When the user turn was created.
    pub timestamp: DateTime<Utc>,
}

impl RlhfExample {
    /// Has both a response and a rating.
    pub fn is_complete(&self) -> bool {
        !self.response.is_empty() && self.rating.is_some()
    }
}

/// Join turns and feedback into one example per user turn, in input order.
pub fn correlate(turns: &[TurnRecord], feedback: &[FeedbackRecord]) -> Vec<RlhfExample> {
    // Assistant turns per session, stably sorted by time.
    let mut replies: HashMap<&str, Vec<&TurnRecord>> = HashMap::new();
    for turn in turns.iter().filter(|t| t.role == Speaker::Assistant) {
        replies.entry(turn.session_id.as_str()).or_default().push(turn);
    }
    for list in replies.values_mut() {
        list.sort_by_key(|t| t.created_at);
    }

    let mut ratings: HashMap<&str, &FeedbackRecord> = HashMap::new();
    for f in feedback {
        ratings.entry(f.prompt_id.as_str()).or_insert(f);
    }

    let examples: Vec<RlhfExample> = turns
        .iter()
        .filter(|t| t.role == Speaker::User)
        .map(|prompt| {
            let response = replies.get(prompt.session_id.as_str()).and_then(|list| {
                let first_later = list.partition_point(|r| r.created_at <= prompt.created_at);
                list.get(first_later).copied()
            });
            let rating = response.and_then(|r| ratings.get(r.id.as_str()).copied());

            RlhfExample {
                prompt: prompt.content.clone(),
                response: response.map(|r| r.content.clone()).unwrap_or_default(),
                rating: rating.map(|f| f.rating),
                preferred_response: rating.and_then(|f| f.preferred_response.clone()),
                user_email: prompt
                    .user_email
                    .clone()
                    .unwrap_or_else(|| ANONYMOUS.to_string()),
                timestamp: prompt.created_at,
            }
        })
        .collect();

    tracing::debug!(
        turns = turns.len(),
        feedback = feedback.len(),
        examples = examples.len(),
        complete = examples.iter().filter(|e| e.is_complete()).count(),
        "Correlated dataset"
    );
    examples
}
