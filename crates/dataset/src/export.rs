//! The RLHF export artifact: a pretty-printed JSON array of examples.

use crate::correlate::RlhfExample;
use chrono::NaiveDate;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("Failed to serialize dataset: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// `prometheus-rlhf-YYYY-MM-DD.json`
pub fn export_file_name(date: NaiveDate) -> String {
    format!("prometheus-rlhf-{}.json", date.format("%Y-%m-%d"))
}

/// Render examples as a JSON array with 2-space indentation.
///
/// Absent ratings and preferred responses are written as `null`.
pub fn to_json(examples: &[RlhfExample]) -> Result<String, ExportError> {
    Ok(serde_json::to_string_pretty(examples)?)
}

/// Write the artifact to `path`, creating parent directories.
pub fn write_export(path: &Path, examples: &[RlhfExample]) -> Result<(), ExportError> {
    let json = to_json(examples)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|source| ExportError::Write {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    std::fs::write(path, json).map_err(|source| ExportError::Write {
        path: path.to_path_buf(),
        source,
    })?;
    info!(path = %path.display(), examples = examples.len(), "Dataset exported");
    Ok(())
}
