//! File-based record store: two JSON-lines files in one directory.
//!
//! `turns.jsonl` and `feedback.jsonl` each hold one JSON object per line.
//! Both are loaded into memory on open; every append writes one line, so the
//! files stay human-inspectable and append-only.

use async_trait::async_trait;
use aether_core::error::StoreError;
use aether_core::record::{FeedbackRecord, RecordQuery, RecordStore, TurnRecord};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

pub const TURNS_FILE: &str = "turns.jsonl";
pub const FEEDBACK_FILE: &str = "feedback.jsonl";

pub struct FileStore {
    dir: PathBuf,
    turns: Arc<RwLock<Vec<TurnRecord>>>,
    feedback: Arc<RwLock<Vec<FeedbackRecord>>>,
}

impl FileStore {
    /// Open the store rooted at `dir`.
    ///
    /// Missing files mean an empty store; they are created on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        let turns: Vec<TurnRecord> = load_from_disk(&dir.join(TURNS_FILE));
        let feedback: Vec<FeedbackRecord> = load_from_disk(&dir.join(FEEDBACK_FILE));
        debug!(
            dir = %dir.display(),
            turns = turns.len(),
            feedback = feedback.len(),
            "File record store loaded"
        );
        Self {
            dir,
            turns: Arc::new(RwLock::new(turns)),
            feedback: Arc::new(RwLock::new(feedback)),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Append one record as a line to `file`.
    fn append_line<T: Serialize>(&self, file: &str, record: &T) -> Result<(), StoreError> {
        std::fs::create_dir_all(&self.dir).map_err(|e| {
            StoreError::Storage(format!("Failed to create store directory: {e}"))
        })?;

        let mut line = serde_json::to_string(record)
            .map_err(|e| StoreError::Storage(format!("Failed to serialize record: {e}")))?;
        line.push('\n');

        let path = self.dir.join(file);
        let mut handle = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| StoreError::Storage(format!("Failed to open {}: {e}", path.display())))?;
        handle
            .write_all(line.as_bytes())
            .map_err(|e| StoreError::Storage(format!("Failed to write {}: {e}", path.display())))?;
        Ok(())
    }
}

/// Read a JSONL file, skipping blank and corrupted lines.
fn load_from_disk<T: DeserializeOwned>(path: &Path) -> Vec<T> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(_) => return Vec::new(), // not written yet
    };

    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .filter_map(|(n, line)| match serde_json::from_str::<T>(line) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(path = %path.display(), line = n + 1, error = %e, "Skipping corrupted record");
                None
            }
        })
        .collect()
}

#[async_trait]
impl RecordStore for FileStore {
    fn name(&self) -> &str {
        "file"
    }

    async fn append_turn(&self, turn: TurnRecord) -> Result<String, StoreError> {
        // Hold the lock across the write so file order matches memory order.
        let mut turns = self.turns.write().await;
        self.append_line(TURNS_FILE, &turn)?;
        let id = turn.id.clone();
        turns.push(turn);
        Ok(id)
    }

    async fn append_feedback(&self, feedback: FeedbackRecord) -> Result<String, StoreError> {
        feedback.validate()?;
        let mut all = self.feedback.write().await;
        self.append_line(FEEDBACK_FILE, &feedback)?;
        let id = feedback.id.clone();
        all.push(feedback);
        Ok(id)
    }

    async fn turns(&self, query: &RecordQuery) -> Result<Vec<TurnRecord>, StoreError> {
        Ok(query.select_turns(&self.turns.read().await))
    }

    async fn feedback(&self, query: &RecordQuery) -> Result<Vec<FeedbackRecord>, StoreError> {
        Ok(query.select_feedback(&self.feedback.read().await))
    }
}
