//! Record store backends for Aether.
//!
//! All backends implement `aether_core::RecordStore`. [`open_store`] picks one
//! from the `[store]` section of the config.

pub mod file_backend;
pub mod in_memory;
pub mod sqlite;

pub use file_backend::FileStore;
pub use in_memory::InMemoryStore;
pub use sqlite::SqliteStore;

use aether_config::{StoreBackend, StoreConfig};
use aether_core::error::StoreError;
use aether_core::record::RecordStore;
use std::sync::Arc;

/// Open the configured record store.
pub async fn open_store(config: &StoreConfig) -> Result<Arc<dyn RecordStore>, StoreError> {
    let store: Arc<dyn RecordStore> = match config.backend {
        StoreBackend::Memory => Arc::new(InMemoryStore::new()),
        StoreBackend::File => Arc::new(FileStore::new(config.resolved_path())),
        StoreBackend::Sqlite => {
            let path = config.resolved_path();
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    StoreError::Storage(format!("Failed to create store directory: {e}"))
                })?;
            }
            Arc::new(SqliteStore::new(&format!("sqlite://{}", path.display())).await?)
        }
    };
    tracing::debug!(backend = store.name(), "Record store opened");
    Ok(store)
}
