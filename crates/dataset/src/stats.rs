//! Dashboard statistics and turn search over a record snapshot.

use aether_core::record::{RecordSnapshot, TurnRecord};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DashboardStats {
    /// Distinct user ids across all turns.
    pub total_users: usize,
    pub total_turns: usize,
    /// Distinct session ids across all turns.
    pub total_sessions: usize,
    pub total_feedback: usize,
}

impl DashboardStats {
    pub fn from_snapshot(snapshot: &RecordSnapshot) -> Self {
        let users: HashSet<&str> = snapshot.turns.iter().map(|t| t.user_id.as_str()).collect();
        let sessions: HashSet<&str> = snapshot
            .turns
            .iter()
            .map(|t| t.session_id.as_str())
            .collect();
        Self {
            total_users: users.len(),
            total_turns: snapshot.turns.len(),
            total_sessions: sessions.len(),
            total_feedback: snapshot.feedback.len(),
        }
    }
}

/// Newest-first turns whose content or author email contains `query`,
/// case-insensitively. A blank query matches everything.
pub fn search_turns(turns: &[TurnRecord], query: &str, limit: usize) -> Vec<TurnRecord> {
    let needle = query.trim().to_lowercase();
    let matches = |t: &TurnRecord| {
        needle.is_empty()
            || t.content.to_lowercase().contains(&needle)
            || t
                .user_email
                .as_deref()
                .is_some_and(|e| e.to_lowercase().contains(&needle))
    };

    let mut found: Vec<TurnRecord> = turns.iter().filter(|t| matches(t)).cloned().collect();
    // Stable: equal timestamps keep their relative order, reversed below.
    found.sort_by_key(|t| t.created_at);
    found.reverse();
    found.truncate(limit);
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use aether_core::message::Speaker;
    use aether_core::record::FeedbackRecord;
    use chrono::{DateTime, TimeZone, Utc};

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn turns() -> Vec<TurnRecord> {
        vec![
            TurnRecord::new(Speaker::User, "Explain Raft", "s1", "u1")
                .with_email("Ann@Example.com")
                .with_created_at(at(1)),
            TurnRecord::new(Speaker::Assistant, "Raft is a consensus protocol", "s1", "u1")
                .with_created_at(at(2)),
            TurnRecord::new(Speaker::User, "Paxos vs raft?", "s2", "u2").with_created_at(at(3)),
        ]
    }

    #[test]
    fn stats_count_distinct_users_and_sessions() {
        let snapshot = RecordSnapshot {
            turns: turns(),
            feedback: vec![FeedbackRecord::new("x", 3, "rating")],
        };
        assert_eq!(
            DashboardStats::from_snapshot(&snapshot),
            DashboardStats {
                total_users: 2,
                total_turns: 3,
                total_sessions: 2,
                total_feedback: 1,
            }
        );
    }

    #[test]
    fn search_is_case_insensitive_and_newest_first() {
        let found = search_turns(&turns(), "RAFT", 10);
        let contents: Vec<&str> = found.iter().map(|t| t.content.as_str()).collect();
        assert_eq!(
            contents,
            vec!["Paxos vs raft?", "Raft is a consensus protocol", "Explain Raft"]
        );
    }

    #[test]
    fn search_matches_email() {
        let found = search_turns(&turns(), "ann@example", 10);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].content, "Explain Raft");
    }

    #[test]
    fn blank_query_lists_with_limit() {
        let found = search_turns(&turns(), "  ", 2);
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].content, "Paxos vs raft?");
    }
}
