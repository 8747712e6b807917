//! RLHF dataset tooling for Aether.
//!
//! Reads a point-in-time snapshot from a record store, pairs user turns with
//! their replies and ratings, and renders the export artifact. Nothing here
//! writes back to the store.

pub mod correlate;
pub mod export;
pub mod stats;

pub use correlate::{ANONYMOUS, RlhfExample, correlate};
pub use export::{ExportError, export_file_name, to_json, write_export};
pub use stats::{DashboardStats, search_turns};

use aether_core::error::StoreError;
use aether_core::record::{RecordQuery, RecordStore};

/// Snapshot `store` within `query` and correlate it.
pub async fn build_dataset(
    store: &dyn RecordStore,
    query: &RecordQuery,
) -> Result<Vec<RlhfExample>, StoreError> {
    let snapshot = store.snapshot(query).await?;
    Ok(correlate(&snapshot.turns, &snapshot.feedback))
}

/// Dashboard counters over the whole store.
pub async fn dashboard_stats(store: &dyn RecordStore) -> Result<DashboardStats, StoreError> {
    let snapshot = store.snapshot(&RecordQuery::all()).await?;
    Ok(DashboardStats::from_snapshot(&snapshot))
}
