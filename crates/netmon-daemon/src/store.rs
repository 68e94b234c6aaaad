//! Host store bootstrap

use anyhow::{Context, Result};
use netmon_core::{HostStore, JsonFileStore, MemoryStore};
use std::sync::Arc;
use tracing::info;

use crate::config::{StoreBackend, StoreConfig};

/// Open the configured store backend
pub async fn open_store(config: &StoreConfig) -> Result<Arc<dyn HostStore>> {
    match config.backend {
        StoreBackend::Json => {
            let store = JsonFileStore::open(&config.path, &config.table)
                .await
                .with_context(|| {
                    format!(
                        "Failed to open host table {:?} in {}",
                        config.table,
                        config.path.display()
                    )
                })?;
            Ok(Arc::new(store))
        }
        StoreBackend::Memory => {
            info!(table = %config.table, "Using in-memory host table, records are not persisted");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}
