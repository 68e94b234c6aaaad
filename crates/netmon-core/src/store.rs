//! Host record store port and the in-memory adapter

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::host::{HostUpdate, MacAddress, NetworkHost};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Store backend error: {0}")]
    Backend(String),
}

/// Outcome of a lookup that reached the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    Found(NetworkHost),
    NotFound,
}

impl Lookup {
    pub fn into_option(self) -> Option<NetworkHost> {
        match self {
            Lookup::Found(host) => Some(host),
            Lookup::NotFound => None,
        }
    }
}

/// Persistent table of host records keyed by hardware address
#[async_trait]
pub trait HostStore: Send + Sync {
    /// Fetch the record for a hardware address
    async fn get(&self, mac: &MacAddress) -> Result<Lookup, StoreError>;

    /// Write a complete new record, replacing any record with the same key
    async fn put_new(&self, host: &NetworkHost) -> Result<(), StoreError>;

    /// Overwrite ip/liveness fields of the record for `mac`.
    ///
    /// Creates the record when it does not exist yet.
    async fn update_fields(&self, mac: &MacAddress, update: &HostUpdate) -> Result<(), StoreError>;

    /// All records, ordered by hardware address
    async fn list(&self) -> Result<Vec<NetworkHost>, StoreError>;
}

/// Process-local store, contents are lost on exit
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    records: Arc<RwLock<BTreeMap<MacAddress, NetworkHost>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: impl IntoIterator<Item = NetworkHost>) -> Self {
        let records = records.into_iter().map(|h| (h.mac_address, h)).collect();
        Self {
            records: Arc::new(RwLock::new(records)),
        }
    }
}

#[async_trait]
impl HostStore for MemoryStore {
    async fn get(&self, mac: &MacAddress) -> Result<Lookup, StoreError> {
        Ok(match self.records.read().await.get(mac) {
            Some(host) => Lookup::Found(host.clone()),
            None => Lookup::NotFound,
        })
    }

    async fn put_new(&self, host: &NetworkHost) -> Result<(), StoreError> {
        self.records
            .write()
            .await
            .insert(host.mac_address, host.clone());
        Ok(())
    }

    async fn update_fields(&self, mac: &MacAddress, update: &HostUpdate) -> Result<(), StoreError> {
        let mut records = self.records.write().await;
        apply_update(&mut records, mac, update);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<NetworkHost>, StoreError> {
        Ok(self.records.read().await.values().cloned().collect())
    }
}

/// Upsert the update fields into a record map
pub(crate) fn apply_update(
    records: &mut BTreeMap<MacAddress, NetworkHost>,
    mac: &MacAddress,
    update: &HostUpdate,
) {
    records
        .entry(*mac)
        .and_modify(|host| update.apply(host))
        .or_insert_with(|| NetworkHost {
            ip_address: update.ip_address,
            mac_address: *mac,
            is_active: update.is_active,
            last_active: update.last_active,
        });
}
