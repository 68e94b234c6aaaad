//! Host registry reconciliation against the record store

use netmon_core::{DiscoverySnapshot, HostStore, Lookup, NetworkHost};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::error::DiscoveryError;

/// What happened to one host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// No prior record; a new one was written
    Inserted,
    /// Prior record overwritten in place
    Updated,
    /// No prior record and the insert failed; host skipped this cycle
    InsertFailed,
}

impl ReconcileOutcome {
    pub fn succeeded(self) -> bool {
        !matches!(self, ReconcileOutcome::InsertFailed)
    }
}

/// Counts of outcomes for one snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    pub inserted: usize,
    pub updated: usize,
    pub insert_failed: usize,
    /// Hosts whose reconcile task did not complete
    pub task_failed: usize,
}

impl ReconcileSummary {
    fn record(&mut self, outcome: ReconcileOutcome) {
        match outcome {
            ReconcileOutcome::Inserted => self.inserted += 1,
            ReconcileOutcome::Updated => self.updated += 1,
            ReconcileOutcome::InsertFailed => self.insert_failed += 1,
        }
    }
}

/// Merges observations into the store, one record per hardware address
#[derive(Clone)]
pub struct Reconciler {
    store: Arc<dyn HostStore>,
    preserve_last_active: bool,
}

impl Reconciler {
    pub fn new(store: Arc<dyn HostStore>) -> Self {
        Self {
            store,
            preserve_last_active: false,
        }
    }

    /// Keep the stored `last_active` when an update observes the host inactive
    pub fn preserve_last_active(mut self, enabled: bool) -> Self {
        self.preserve_last_active = enabled;
        self
    }

    /// Insert or update the record for `host`.
    ///
    /// A failed lookup is treated as a missing record. A failed insert is
    /// reported in the outcome; a failed update aborts the cycle.
    pub async fn reconcile(&self, host: &NetworkHost) -> Result<ReconcileOutcome, DiscoveryError> {
        let mac = host.mac_address;

        let existing = match self.store.get(&mac).await {
            Ok(Lookup::Found(record)) => Some(record),
            Ok(Lookup::NotFound) => None,
            Err(e) => {
                warn!(mac = %mac, error = %e, "Host lookup failed, treating as new host");
                None
            }
        };

        match existing {
            Some(record) => {
                let mut update = host.update();
                if self.preserve_last_active && !host.is_active {
                    update.last_active = record.last_active;
                }

                self.store
                    .update_fields(&mac, &update)
                    .await
                    .map_err(|source| DiscoveryError::Update { mac, source })?;

                debug!(
                    mac = %mac,
                    ip = %host.ip_address,
                    active = host.is_active,
                    "Updated host"
                );
                Ok(ReconcileOutcome::Updated)
            }
            None => match self.store.put_new(host).await {
                Ok(()) => {
                    info!(mac = %mac, ip = %host.ip_address, active = host.is_active, "New host recorded");
                    Ok(ReconcileOutcome::Inserted)
                }
                Err(e) => {
                    error!(mac = %mac, error = %e, "Failed to insert host");
                    Ok(ReconcileOutcome::InsertFailed)
                }
            },
        }
    }

    /// Reconcile every host of a snapshot on a bounded pool.
    ///
    /// The first fatal error cancels the hosts still in flight.
    pub async fn reconcile_all(
        &self,
        snapshot: DiscoverySnapshot,
        max_concurrency: usize,
    ) -> Result<ReconcileSummary, DiscoveryError> {
        let semaphore = Arc::new(Semaphore::new(max_concurrency.max(1)));
        let mut tasks = JoinSet::new();

        for host in snapshot {
            let semaphore = Arc::clone(&semaphore);
            let reconciler = self.clone();

            tasks.spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return Ok(None);
                };
                reconciler.reconcile(&host).await.map(Some)
            });
        }

        let mut summary = ReconcileSummary::default();
        while let Some(result) = tasks.join_next().await {
            match result {
                Ok(Ok(Some(outcome))) => summary.record(outcome),
                Ok(Ok(None)) => summary.task_failed += 1,
                Ok(Err(e)) => return Err(e),
                Err(e) => {
                    warn!(error = %e, "Reconcile task failed");
                    summary.task_failed += 1;
                }
            }
        }

        Ok(summary)
    }
}
