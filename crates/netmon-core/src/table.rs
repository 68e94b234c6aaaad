//! JSON file backed host table
//!
//! A table lives in a single file, `{dir}/{table}.json`, holding every record
//! keyed by hardware address. The file is read once when the table is opened
//! and rewritten after each successful write. A missing file is an empty
//! table.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::host::{HostUpdate, MacAddress, NetworkHost};
use crate::store::{apply_update, HostStore, Lookup, StoreError};

/// On-disk layout of a host table
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HostTable {
    /// Version of the table format
    #[serde(default = "default_version")]
    pub version: String,
    /// Records keyed by hardware address
    #[serde(default)]
    pub records: BTreeMap<MacAddress, NetworkHost>,
}

fn default_version() -> String {
    "1.0".to_string()
}

impl HostTable {
    pub fn new() -> Self {
        Self {
            version: default_version(),
            records: BTreeMap::new(),
        }
    }

    /// Load a table from a file
    pub async fn from_file(path: &Path) -> Result<Self, StoreError> {
        let content = tokio::fs::read_to_string(path).await?;
        let table: HostTable = serde_json::from_str(&content)?;
        Ok(table)
    }

    /// Load a table or start an empty one if the file doesn't exist
    pub async fn load_or_create(path: &Path) -> Result<Self, StoreError> {
        if tokio::fs::try_exists(path).await? {
            Self::from_file(path).await
        } else {
            Ok(Self::new())
        }
    }

    /// Save the table, replacing the file atomically
    pub async fn save(&self, path: &Path) -> Result<(), StoreError> {
        let content = serde_json::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, content).await?;
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }
}

/// Durable host store backed by one JSON file per table
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    table: RwLock<HostTable>,
}

impl JsonFileStore {
    /// Open `{dir}/{table}.json`, creating the directory if needed
    pub async fn open(dir: &Path, table: &str) -> Result<Self, StoreError> {
        if table.is_empty() || table.contains(['/', '\\']) {
            return Err(StoreError::Backend(format!("invalid table name: {:?}", table)));
        }
        tokio::fs::create_dir_all(dir).await?;

        let path = dir.join(format!("{}.json", table));
        let loaded = HostTable::load_or_create(&path).await?;
        info!(
            path = %path.display(),
            records = loaded.records.len(),
            "Opened host table"
        );

        Ok(Self {
            path,
            table: RwLock::new(loaded),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Apply `change` to a copy of the table and commit it once it is on disk
    async fn write_with<F>(&self, change: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut HostTable),
    {
        let mut table = self.table.write().await;
        let mut next = table.clone();
        change(&mut next);
        next.save(&self.path).await?;
        *table = next;
        debug!(path = %self.path.display(), records = table.records.len(), "Saved host table");
        Ok(())
    }
}

#[async_trait]
impl HostStore for JsonFileStore {
    async fn get(&self, mac: &MacAddress) -> Result<Lookup, StoreError> {
        Ok(match self.table.read().await.records.get(mac) {
            Some(host) => Lookup::Found(host.clone()),
            None => Lookup::NotFound,
        })
    }

    async fn put_new(&self, host: &NetworkHost) -> Result<(), StoreError> {
        self.write_with(|table| {
            table.records.insert(host.mac_address, host.clone());
        })
        .await
    }

    async fn update_fields(&self, mac: &MacAddress, update: &HostUpdate) -> Result<(), StoreError> {
        self.write_with(|table| apply_update(&mut table.records, mac, update))
            .await
    }

    async fn list(&self) -> Result<Vec<NetworkHost>, StoreError> {
        Ok(self.table.read().await.records.values().cloned().collect())
    }
}
