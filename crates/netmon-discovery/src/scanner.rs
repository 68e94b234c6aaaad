//! Network monitor that runs one discovery and reconciliation cycle

use netmon_core::{DiscoverySnapshot, HostStore};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;

use crate::arp::{AddressTableResolver, Resolution, ResolverConfig, DEFAULT_MAX_ENTRIES, IP_NET_TO_PHYSICAL_OID};
use crate::error::DiscoveryError;
use crate::probe::{LivenessProber, NetworkReachability, Reachability, DEFAULT_FALLBACK_PORTS, PROBE_TIMEOUT_MS};
use crate::reconcile::{ReconcileSummary, Reconciler};
use crate::snmp::ManagementSession;

/// Monitor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Address table OID
    pub table_oid: String,
    /// Bulk read size
    pub max_entries: u32,
    /// Dotted-quad prefix of the addresses of interest
    pub network_prefix: String,
    /// ICMP echo timeout in milliseconds
    pub echo_timeout_ms: u64,
    /// Per-port TCP connect timeout in milliseconds
    pub connect_timeout_ms: u64,
    /// Ports tried in order when echo fails
    pub fallback_ports: Vec<u16>,
    /// Hosts probed or reconciled at once
    pub max_concurrency: usize,
    /// Deadline for a whole cycle in seconds, 0 for none
    pub cycle_timeout_secs: u64,
    /// Keep the stored last-active time for hosts found inactive
    pub preserve_last_active: bool,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            table_oid: IP_NET_TO_PHYSICAL_OID.to_string(),
            max_entries: DEFAULT_MAX_ENTRIES,
            network_prefix: "172".to_string(),
            echo_timeout_ms: PROBE_TIMEOUT_MS,
            connect_timeout_ms: PROBE_TIMEOUT_MS,
            fallback_ports: DEFAULT_FALLBACK_PORTS.to_vec(),
            max_concurrency: 16,
            cycle_timeout_secs: 0,
            preserve_last_active: false,
        }
    }
}

impl MonitorConfig {
    fn resolver_config(&self) -> ResolverConfig {
        ResolverConfig {
            table_oid: self.table_oid.clone(),
            max_entries: self.max_entries,
            network_prefix: self.network_prefix.clone(),
            max_concurrency: self.max_concurrency,
        }
    }
}

/// Result of one cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Hosts in the snapshot
    pub discovered: usize,
    /// Of which found active
    pub active: usize,
    /// Table entries left out because their probe did not complete
    pub probe_failed: usize,
    pub reconciled: ReconcileSummary,
}

/// Runs the resolve → reconcile pipeline
pub struct NetworkMonitor {
    config: MonitorConfig,
    resolver: AddressTableResolver,
    reconciler: Reconciler,
}

impl NetworkMonitor {
    /// Create a monitor with explicit reachability checks
    pub fn new(
        config: MonitorConfig,
        reachability: Arc<dyn Reachability>,
        store: Arc<dyn HostStore>,
    ) -> Self {
        let prober = LivenessProber::new(reachability, &config.fallback_ports);
        let resolver = AddressTableResolver::new(config.resolver_config(), prober);
        let reconciler = Reconciler::new(store).preserve_last_active(config.preserve_last_active);

        Self {
            config,
            resolver,
            reconciler,
        }
    }

    /// Create a monitor probing the real network.
    ///
    /// Must be called from within a tokio runtime.
    pub fn with_network(config: MonitorConfig, store: Arc<dyn HostStore>) -> Self {
        let reachability = Arc::new(NetworkReachability::new(
            Duration::from_millis(config.echo_timeout_ms),
            Duration::from_millis(config.connect_timeout_ms),
        ));
        Self::new(config, reachability, store)
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Resolve and probe the address table without touching the store
    pub async fn discover(
        &self,
        session: &mut dyn ManagementSession,
    ) -> Result<DiscoverySnapshot, DiscoveryError> {
        let resolution = self.with_deadline(self.resolver.resolve(session)).await?;
        Ok(resolution.snapshot)
    }

    /// Run one full discovery and reconciliation cycle
    pub async fn run_cycle(
        &self,
        session: &mut dyn ManagementSession,
    ) -> Result<CycleReport, DiscoveryError> {
        self.with_deadline(self.cycle(session)).await
    }

    async fn cycle(&self, session: &mut dyn ManagementSession) -> Result<CycleReport, DiscoveryError> {
        let started = Instant::now();
        info!(
            oid = %self.config.table_oid,
            prefix = %self.config.network_prefix,
            "Starting discovery cycle"
        );

        let Resolution {
            snapshot,
            probe_failed,
        } = self.resolver.resolve(session).await?;
        let discovered = snapshot.len();
        let active = snapshot.active_count();

        let reconciled = self
            .reconciler
            .reconcile_all(snapshot, self.config.max_concurrency)
            .await?;

        info!(
            discovered = discovered,
            active = active,
            inserted = reconciled.inserted,
            updated = reconciled.updated,
            insert_failed = reconciled.insert_failed,
            probe_failed = probe_failed,
            task_failed = reconciled.task_failed,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Discovery cycle complete"
        );

        Ok(CycleReport {
            discovered,
            active,
            probe_failed,
            reconciled,
        })
    }

    /// Apply the cycle deadline; expiry drops the future and cancels its tasks
    async fn with_deadline<T>(
        &self,
        fut: impl Future<Output = Result<T, DiscoveryError>>,
    ) -> Result<T, DiscoveryError> {
        match self.config.cycle_timeout_secs {
            0 => fut.await,
            secs => tokio::time::timeout(Duration::from_secs(secs), fut)
                .await
                .map_err(|_| DiscoveryError::DeadlineExceeded(secs))?,
        }
    }
}
