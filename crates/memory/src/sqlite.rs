//! SQLite record store.
//!
//! Two tables, `turns` and `feedback`, each with an integer `iid` that
//! records insertion order. Timestamps are stored as fixed-width RFC 3339
//! text so lexical order equals time order.

use async_trait::async_trait;
use aether_core::error::StoreError;
use aether_core::message::Speaker;
use aether_core::record::{FeedbackRecord, RecordQuery, RecordStore, TurnRecord};
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tracing::{debug, info};

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) the database at `path` and run migrations.
    pub async fn new(path: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(path)
            .map_err(|e| StoreError::Storage(format!("Invalid SQLite path: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Storage(format!("Failed to open SQLite: {e}")))?;

        let store = Self { pool };
        store.run_migrations().await?;
        info!("SQLite record store initialized at {path}");
        Ok(store)
    }

    /// Wrap an existing pool.
    pub async fn from_pool(pool: SqlitePool) -> Result<Self, StoreError> {
        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS turns (
                iid         INTEGER PRIMARY KEY AUTOINCREMENT,
                id          TEXT UNIQUE NOT NULL,
                role        TEXT NOT NULL,
                content     TEXT NOT NULL,
                created_at  TEXT NOT NULL,
                session_id  TEXT NOT NULL,
                user_id     TEXT NOT NULL,
                user_email  TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("turns table: {e}")))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS feedback (
                iid                 INTEGER PRIMARY KEY AUTOINCREMENT,
                id                  TEXT UNIQUE NOT NULL,
                prompt_id           TEXT NOT NULL,
                rating              INTEGER NOT NULL CHECK (rating BETWEEN 1 AND 5),
                feedback_type       TEXT NOT NULL,
                preferred_response  TEXT,
                created_at          TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("feedback table: {e}")))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_turns_session ON turns(session_id, created_at)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("session index: {e}")))?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_feedback_prompt ON feedback(prompt_id)")
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::MigrationFailed(format!("prompt index: {e}")))?;

        debug!("SQLite migrations complete");
        Ok(())
    }

    fn row_to_turn(row: &sqlx::sqlite::SqliteRow) -> Result<TurnRecord, StoreError> {
        let get = |col: &str| -> Result<String, StoreError> {
            row.try_get(col)
                .map_err(|e| StoreError::QueryFailed(format!("{col} column: {e}")))
        };

        let role = match get("role")?.as_str() {
            "user" => Speaker::User,
            "assistant" => Speaker::Assistant,
            other => {
                return Err(StoreError::InvalidRecord(format!("unknown role '{other}'")));
            }
        };
        let user_email: Option<String> = row
            .try_get("user_email")
            .map_err(|e| StoreError::QueryFailed(format!("user_email column: {e}")))?;

        Ok(TurnRecord {
            id: get("id")?,
            role,
            content: get("content")?,
            created_at: parse_timestamp(&get("created_at")?)?,
            session_id: get("session_id")?,
            user_id: get("user_id")?,
            user_email,
        })
    }

    fn row_to_feedback(row: &sqlx::sqlite::SqliteRow) -> Result<FeedbackRecord, StoreError> {
        let get = |col: &str| -> Result<String, StoreError> {
            row.try_get(col)
                .map_err(|e| StoreError::QueryFailed(format!("{col} column: {e}")))
        };

        let rating: i64 = row
            .try_get("rating")
            .map_err(|e| StoreError::QueryFailed(format!("rating column: {e}")))?;
        let rating = u8::try_from(rating)
            .map_err(|_| StoreError::InvalidRecord(format!("rating {rating} out of range")))?;
        let preferred_response: Option<String> = row
            .try_get("preferred_response")
            .map_err(|e| StoreError::QueryFailed(format!("preferred_response column: {e}")))?;

        Ok(FeedbackRecord {
            id: get("id")?,
            prompt_id: get("prompt_id")?,
            rating,
            feedback_type: get("feedback_type")?,
            preferred_response,
            created_at: parse_timestamp(&get("created_at")?)?,
        })
    }
}

fn format_timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::InvalidRecord(format!("bad timestamp '{s}': {e}")))
}

/// Oldest-first, optionally keeping only the newest `limit` rows.
fn ordered_select(table: &str, filter: &str, limited: bool) -> String {
    if limited {
        format!(
            "SELECT * FROM (SELECT * FROM {table} {filter} \
             ORDER BY created_at DESC, iid DESC LIMIT ?) \
             ORDER BY created_at ASC, iid ASC"
        )
    } else {
        format!("SELECT * FROM {table} {filter} ORDER BY created_at ASC, iid ASC")
    }
}

fn limit_param(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

#[async_trait]
impl RecordStore for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn append_turn(&self, turn: TurnRecord) -> Result<String, StoreError> {
        sqlx::query(
            "INSERT INTO turns (id, role, content, created_at, session_id, user_id, user_email) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&turn.id)
        .bind(turn.role.to_string())
        .bind(&turn.content)
        .bind(format_timestamp(&turn.created_at))
        .bind(&turn.session_id)
        .bind(&turn.user_id)
        .bind(&turn.user_email)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("insert turn: {e}")))?;

        Ok(turn.id)
    }

    async fn append_feedback(&self, feedback: FeedbackRecord) -> Result<String, StoreError> {
        feedback.validate()?;
        sqlx::query(
            "INSERT INTO feedback (id, prompt_id, rating, feedback_type, preferred_response, created_at) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&feedback.id)
        .bind(&feedback.prompt_id)
        .bind(i64::from(feedback.rating))
        .bind(&feedback.feedback_type)
        .bind(&feedback.preferred_response)
        .bind(format_timestamp(&feedback.created_at))
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("insert feedback: {e}")))?;

        Ok(feedback.id)
    }

    async fn turns(&self, query: &RecordQuery) -> Result<Vec<TurnRecord>, StoreError> {
        let filter = if query.session_id.is_some() {
            "WHERE session_id = ?"
        } else {
            ""
        };
        let sql = ordered_select("turns", filter, query.limit.is_some());

        let mut q = sqlx::query(&sql);
        if let Some(session_id) = &query.session_id {
            q = q.bind(session_id);
        }
        if let Some(limit) = query.limit {
            q = q.bind(limit_param(limit));
        }

        let rows = q
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("select turns: {e}")))?;
        rows.iter().map(Self::row_to_turn).collect()
    }

    async fn feedback(&self, query: &RecordQuery) -> Result<Vec<FeedbackRecord>, StoreError> {
        let sql = ordered_select("feedback", "", query.limit.is_some());

        let mut q = sqlx::query(&sql);
        if let Some(limit) = query.limit {
            q = q.bind(limit_param(limit));
        }

        let rows = q
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("select feedback: {e}")))?;
        rows.iter().map(Self::row_to_feedback).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    async fn test_store(dir: &tempfile::TempDir) -> SqliteStore {
        let path = dir.path().join("records.sqlite");
        SqliteStore::new(&format!("sqlite://{}", path.display()))
            .await
            .unwrap()
    }

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[tokio::test]
    async fn turn_roundtrip_preserves_fields() {
        let dir = tempfile::tempdir().unwrap();
        let store = test_store(&dir).await;

        let with_email = TurnRecord::new(Speaker::User, "Wat is RLHF?", "s1", "u1")
            .with_email("ann@example.com");
        let without = TurnRecord::new(Speaker::Assistant, "Een techniek.", "s1", "u1");
        store.append_turn(with_email.clone()).await.unwrap();
        store.append_turn(without.clone()).await.unwrap();

        let turns = store.turns(&RecordQuery::all()).await.unwrap();
        assert_eq!(turns, vec![with_email, without]);
    }

    #[tokio::test]
    async fn feedback_roundtrip_and_validation() {
        let dir = tempfile::tempdir().unwrap();
        let store = test_store(&dir).await;

        let rating = FeedbackRecord::new("turn-1", 4, "rating").with_preferred("shorter");
        store.append_feedback(rating.clone()).await.unwrap();
        assert!(
            store
                .append_feedback(FeedbackRecord::new("turn-1", 6, "rating"))
                .await
                .is_err()
        );

        let feedback = store.feedback(&RecordQuery::all()).await.unwrap();
        assert_eq!(feedback, vec![rating]);
    }

    #[tokio::test]
    async fn ordering_ties_keep_insertion_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = test_store(&dir).await;

        for (content, secs) in [("late", 9), ("tie-a", 5), ("tie-b", 5), ("early", 1)] {
            store
                .append_turn(
                    TurnRecord::new(Speaker::User, content, "s1", "u").with_created_at(at(secs)),
                )
                .await
                .unwrap();
        }

        let turns = store.turns(&RecordQuery::all()).await.unwrap();
        let contents: Vec<&str> = turns.iter().map(|t| t.content.as_str()).collect();
        assert_eq!(contents, vec!["early", "tie-a", "tie-b", "late"]);
    }

    #[tokio::test]
    async fn session_filter_and_limit() {
        let dir = tempfile::tempdir().unwrap();
        let store = test_store(&dir).await;

        for (i, session) in ["s1", "s2", "s1", "s1"].iter().enumerate() {
            store
                .append_turn(
                    TurnRecord::new(Speaker::User, format!("m{i}"), *session, "u")
                        .with_created_at(at(i as i64)),
                )
                .await
                .unwrap();
        }

        let turns = store
            .turns(&RecordQuery::session("s1").with_limit(2))
            .await
            .unwrap();
        let contents: Vec<&str> = turns.iter().map(|t| t.content.as_str()).collect();
        assert_eq!(contents, vec!["m2", "m3"]);
    }

    #[tokio::test]
    async fn data_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let turn = TurnRecord::new(Speaker::User, "persist me", "s", "u");
        {
            let store = test_store(&dir).await;
            store.append_turn(turn.clone()).await.unwrap();
        }
        let reopened = test_store(&dir).await;
        assert_eq!(reopened.turns(&RecordQuery::all()).await.unwrap(), vec![turn]);
    }
}
