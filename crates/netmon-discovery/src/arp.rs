//! Address table resolution over SNMP
//!
//! Reads the device's IP-to-physical table with one bulk read, decodes each
//! binding into an IPv4 / hardware address pair, and probes every surviving
//! entry to build the cycle's discovery snapshot.

use netmon_core::{DiscoverySnapshot, MacAddress, NetworkHost};
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, trace, warn};

use crate::error::DiscoveryError;
use crate::probe::LivenessProber;
use crate::snmp::{in_subtree, ManagementSession, VarBind};

/// ipNetToPhysicalTable
pub const IP_NET_TO_PHYSICAL_OID: &str = "1.3.6.1.2.1.4.35";

/// Maximum bindings requested by the bulk read
pub const DEFAULT_MAX_ENTRIES: u32 = 100;

/// Address table entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArpEntry {
    pub ip: Ipv4Addr,
    pub mac: MacAddress,
}

/// Resolver configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Table to bulk-read
    pub table_oid: String,
    /// Bulk read size
    pub max_entries: u32,
    /// Only addresses whose dotted form starts with this are kept
    pub network_prefix: String,
    /// Hosts probed at once
    pub max_concurrency: usize,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            table_oid: IP_NET_TO_PHYSICAL_OID.to_string(),
            max_entries: DEFAULT_MAX_ENTRIES,
            network_prefix: "172".to_string(),
            max_concurrency: 16,
        }
    }
}

/// Whether an address is inside the configured network prefix
pub fn matches_prefix(ip: &Ipv4Addr, prefix: &str) -> bool {
    ip.to_string().starts_with(prefix)
}

/// `ipv4(1)` in the InetAddressType convention
const INET_ADDRESS_IPV4: &str = "1";

/// IPv4 address of a table row.
///
/// Row names below `root` are `1.<column>.<ifIndex>.<addrType>.<addrLen>.<addr>`;
/// only `addrType` ipv4 with a four-octet address qualifies.
fn ip_from_index(name: &str, root: &str) -> Option<Ipv4Addr> {
    let index = name
        .trim_start_matches('.')
        .strip_prefix(root.trim().trim_start_matches('.'))?
        .strip_prefix('.')?;

    let arcs: Vec<&str> = index.split('.').collect();
    let [_entry, _column, _if_index, addr_type, addr_len, a, b, c, d] = arcs.as_slice() else {
        return None;
    };
    if *addr_type != INET_ADDRESS_IPV4 || *addr_len != "4" {
        return None;
    }

    Some(Ipv4Addr::new(
        a.parse().ok()?,
        b.parse().ok()?,
        c.parse().ok()?,
        d.parse().ok()?,
    ))
}

/// Decode one binding into an entry of interest
fn decode_entry(bind: &VarBind, config: &ResolverConfig) -> Option<ArpEntry> {
    // The bulk read may run past the end of the table
    if !in_subtree(&bind.name, &config.table_oid) {
        trace!(name = %bind.name, "Binding outside address table");
        return None;
    }

    // Other columns (timestamps, types, states) carry no hardware address
    let payload = bind.octets.as_deref()?;

    let Some(ip) = ip_from_index(&bind.name, &config.table_oid) else {
        debug!(name = %bind.name, "Binding index is not an IPv4 address row");
        return None;
    };

    if !matches_prefix(&ip, &config.network_prefix) {
        return None;
    }

    match MacAddress::from_octets(payload) {
        Ok(mac) => Some(ArpEntry { ip, mac }),
        Err(e) => {
            warn!(ip = %ip, payload = ?payload, error = %e, "Found invalid host entry");
            None
        }
    }
}

/// Snapshot of one address table read
#[derive(Debug, Clone, Default)]
pub struct Resolution {
    pub snapshot: DiscoverySnapshot,
    /// Entries left out because their probe task did not complete
    pub probe_failed: usize,
}

/// Builds a discovery snapshot from the device's address table
pub struct AddressTableResolver {
    config: ResolverConfig,
    prober: LivenessProber,
}

impl AddressTableResolver {
    pub fn new(config: ResolverConfig, prober: LivenessProber) -> Self {
        Self { config, prober }
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Connect, bulk-read the table, and decode the entries of interest in table order
    pub async fn read_table(
        &self,
        session: &mut dyn ManagementSession,
    ) -> Result<Vec<ArpEntry>, DiscoveryError> {
        session.connect().await.map_err(DiscoveryError::Connect)?;

        let binds = session
            .bulk_read(&self.config.table_oid, self.config.max_entries)
            .await
            .map_err(DiscoveryError::BulkRead)?;

        let entries: Vec<ArpEntry> = binds
            .iter()
            .filter_map(|bind| decode_entry(bind, &self.config))
            .collect();

        debug!(
            bindings = binds.len(),
            entries = entries.len(),
            prefix = %self.config.network_prefix,
            "Decoded address table"
        );
        Ok(entries)
    }

    /// Read the table and probe every entry
    pub async fn resolve(
        &self,
        session: &mut dyn ManagementSession,
    ) -> Result<Resolution, DiscoveryError> {
        let entries = self.read_table(session).await?;
        let (observed, probe_failed) = self.probe_entries(entries).await;

        // Table order is restored before insertion so a repeated hardware
        // address keeps its last entry.
        let snapshot: DiscoverySnapshot = observed.into_iter().collect();

        info!(
            hosts = snapshot.len(),
            active = snapshot.active_count(),
            probe_failed = probe_failed,
            "Address table resolved"
        );
        Ok(Resolution {
            snapshot,
            probe_failed,
        })
    }

    /// Probe entries on a bounded pool.
    ///
    /// Returns the hosts in table order and the number of entries whose probe
    /// task did not complete.
    async fn probe_entries(&self, entries: Vec<ArpEntry>) -> (Vec<NetworkHost>, usize) {
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrency.max(1)));
        let mut tasks = JoinSet::new();

        for (seq, entry) in entries.into_iter().enumerate() {
            let semaphore = Arc::clone(&semaphore);
            let prober = self.prober.clone();

            tasks.spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return None;
                };

                let is_active = prober.is_alive(entry.ip).await;
                Some((seq, NetworkHost::observed(entry.ip, entry.mac, is_active)))
            });
        }

        let mut observed = Vec::new();
        let mut failed = 0;
        while let Some(result) = tasks.join_next().await {
            match result {
                Ok(Some(item)) => observed.push(item),
                Ok(None) => failed += 1,
                Err(e) => {
                    warn!(error = %e, "Probe task failed");
                    failed += 1;
                }
            }
        }

        observed.sort_by_key(|(seq, _)| *seq);
        (observed.into_iter().map(|(_, host)| host).collect(), failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::DEFAULT_FALLBACK_PORTS;
    use crate::probe::Reachability;
    use crate::testing::{phys_address, phys_address_v6, FakeSession, ScriptedReachability};
    use async_trait::async_trait;

    const MAC: [u8; 6] = [0x00, 0x11, 0x22, 0x33, 0x44, 0x55];

    fn resolver(reach: ScriptedReachability, max_concurrency: usize) -> AddressTableResolver {
        let config = ResolverConfig {
            max_concurrency,
            ..ResolverConfig::default()
        };
        let prober = LivenessProber::new(Arc::new(reach), DEFAULT_FALLBACK_PORTS);
        AddressTableResolver::new(config, prober)
    }

    #[test]
    fn test_ip_from_index() {
        let root = IP_NET_TO_PHYSICAL_OID;
        assert_eq!(
            ip_from_index("1.3.6.1.2.1.4.35.1.4.3.1.4.172.16.0.5", root),
            Some(Ipv4Addr::new(172, 16, 0, 5))
        );
        assert_eq!(
            ip_from_index(".1.3.6.1.2.1.4.35.1.4.12.1.4.10.0.0.1", root),
            Some(Ipv4Addr::new(10, 0, 0, 1))
        );
        assert_eq!(ip_from_index("1.3.6.1.2.1.4.35.1.4.3.1.4.300.16.0.5", root), None);
        // Address length disagrees with the ipv4 type
        assert_eq!(ip_from_index("1.3.6.1.2.1.4.35.1.4.3.1.16.172.16.0.5", root), None);
        // Truncated index
        assert_eq!(ip_from_index("1.3.6.1.2.1.4.35.1.4.3.1.4.172.16.0", root), None);
        assert_eq!(ip_from_index("1.2.3", root), None);
    }

    #[test]
    fn test_ipv6_row_is_not_read_as_ipv4() {
        let mut v6 = [0u8; 16];
        v6[..2].copy_from_slice(&[0xfe, 0x80]);
        v6[12..].copy_from_slice(&[172, 16, 0, 5]);
        let bind = phys_address_v6(&v6, &MAC);

        assert_eq!(ip_from_index(&bind.name, IP_NET_TO_PHYSICAL_OID), None);
        assert!(decode_entry(&bind, &ResolverConfig::default()).is_none());

        let accept_all = ResolverConfig {
            network_prefix: String::new(),
            ..ResolverConfig::default()
        };
        assert!(decode_entry(&bind, &accept_all).is_none());
    }

    #[test]
    fn test_matches_prefix() {
        let ip = Ipv4Addr::new(172, 16, 0, 5);
        assert!(matches_prefix(&ip, "172"));
        assert!(matches_prefix(&ip, "172.16."));
        assert!(matches_prefix(&ip, ""));
        assert!(!matches_prefix(&ip, "10"));
        assert!(!matches_prefix(&Ipv4Addr::new(10, 0, 0, 9), "172"));
        // Plain string prefix, not a subnet match
        assert!(matches_prefix(&Ipv4Addr::new(172, 200, 0, 1), "172.2"));
    }

    #[test]
    fn test_prefix_equal_to_address() {
        let ip = Ipv4Addr::new(172, 16, 0, 5);
        assert!(matches_prefix(&ip, "172.16.0.5"));
        assert!(!matches_prefix(&ip, "172.16.0.50"));
    }

    #[test]
    fn test_decode_entry() {
        let config = ResolverConfig::default();
        let entry = decode_entry(&phys_address("172.16.0.5", &MAC), &config).unwrap();
        assert_eq!(entry.ip, Ipv4Addr::new(172, 16, 0, 5));
        assert_eq!(entry.mac.to_string(), "00:11:22:33:44:55");
    }

    #[test]
    fn test_decode_skips_filtered_and_malformed() {
        let config = ResolverConfig::default();
        // Outside prefix
        assert!(decode_entry(&phys_address("10.0.0.9", &MAC), &config).is_none());
        // Short hardware address
        assert!(decode_entry(&phys_address("172.16.0.5", &[1, 2, 3, 4]), &config).is_none());
        // Non octet-string column
        assert!(decode_entry(
            &VarBind::other("1.3.6.1.2.1.4.35.1.5.3.1.4.172.16.0.5"),
            &config
        )
        .is_none());
        // Past the end of the table
        assert!(decode_entry(&VarBind::octets("1.3.6.1.2.1.4.36.1.1.172.16.0.5", &MAC), &config).is_none());
    }

    #[tokio::test]
    async fn test_read_table_uses_configured_oid_and_size() {
        let resolver = resolver(ScriptedReachability::new(true, &[]), 4);
        let mut session = FakeSession::with_binds(vec![phys_address("172.16.0.5", &MAC)]);

        let entries = resolver.read_table(&mut session).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(session.connects, 1);
        assert_eq!(
            session.reads,
            vec![(IP_NET_TO_PHYSICAL_OID.to_string(), DEFAULT_MAX_ENTRIES)]
        );
    }

    #[tokio::test]
    async fn test_resolve_marks_liveness() {
        let up = Ipv4Addr::new(172, 16, 0, 5);
        let resolver = resolver(ScriptedReachability::answering(&[up]), 4);
        let mut session = FakeSession::with_binds(vec![
            phys_address("172.16.0.5", &[0, 0, 0, 0, 0, 1]),
            phys_address("172.16.0.6", &[0, 0, 0, 0, 0, 2]),
        ]);

        let snapshot = resolver.resolve(&mut session).await.unwrap().snapshot;
        assert_eq!(snapshot.len(), 2);

        let alive = snapshot.get(&MacAddress::new([0, 0, 0, 0, 0, 1])).unwrap();
        assert!(alive.is_active);
        assert!(alive.last_active > 0);

        let down = snapshot.get(&MacAddress::new([0, 0, 0, 0, 0, 2])).unwrap();
        assert!(!down.is_active);
        assert_eq!(down.last_active, 0);
    }

    #[tokio::test]
    async fn test_duplicate_mac_keeps_later_entry() {
        for max_concurrency in [1, 8] {
            let resolver = resolver(ScriptedReachability::new(true, &[]), max_concurrency);
            let mut session = FakeSession::with_binds(vec![
                phys_address("172.16.0.5", &MAC),
                phys_address("172.16.0.9", &[9, 9, 9, 9, 9, 9]),
                phys_address("172.16.0.7", &MAC),
            ]);

            let snapshot = resolver.resolve(&mut session).await.unwrap().snapshot;
            assert_eq!(snapshot.len(), 2);
            let host = snapshot.get(&MacAddress::new(MAC)).unwrap();
            assert_eq!(host.ip_address, Ipv4Addr::new(172, 16, 0, 7));
        }
    }

    #[tokio::test]
    async fn test_connect_failure_is_fatal() {
        let resolver = resolver(ScriptedReachability::new(true, &[]), 1);
        let mut session = FakeSession {
            fail_connect: true,
            ..FakeSession::default()
        };

        let err = resolver.resolve(&mut session).await.unwrap_err();
        assert!(matches!(err, DiscoveryError::Connect(_)));
        assert!(session.reads.is_empty());
    }

    #[tokio::test]
    async fn test_bulk_read_failure_is_fatal() {
        let resolver = resolver(ScriptedReachability::new(true, &[]), 1);
        let mut session = FakeSession {
            fail_bulk_read: true,
            ..FakeSession::default()
        };

        let err = resolver.resolve(&mut session).await.unwrap_err();
        assert!(matches!(err, DiscoveryError::BulkRead(_)));
    }

    #[tokio::test]
    async fn test_ipv6_row_keeps_ipv4_observation() {
        let config = ResolverConfig {
            network_prefix: String::new(),
            ..ResolverConfig::default()
        };
        let up = Ipv4Addr::new(172, 16, 0, 5);
        let prober = LivenessProber::new(
            Arc::new(ScriptedReachability::answering(&[up])),
            DEFAULT_FALLBACK_PORTS,
        );
        let resolver = AddressTableResolver::new(config, prober);

        let mut v6 = [0u8; 16];
        v6[..2].copy_from_slice(&[0xfe, 0x80]);
        v6[12..].copy_from_slice(&[172, 16, 0, 9]);
        // ipv6 rows sort after ipv4 rows in the table
        let mut session = FakeSession::with_binds(vec![
            phys_address("172.16.0.5", &MAC),
            phys_address_v6(&v6, &MAC),
        ]);

        let snapshot = resolver.resolve(&mut session).await.unwrap().snapshot;
        assert_eq!(snapshot.len(), 1);
        let host = snapshot.get(&MacAddress::new(MAC)).unwrap();
        assert_eq!(host.ip_address, up);
        assert!(host.is_active);
    }

    struct PanicOn(Ipv4Addr);

    #[async_trait]
    impl Reachability for PanicOn {
        async fn echo(&self, ip: Ipv4Addr) -> bool {
            if ip == self.0 {
                panic!("echo socket gone");
            }
            true
        }

        async fn connect(&self, _ip: Ipv4Addr, _port: u16) -> bool {
            false
        }
    }

    #[tokio::test]
    async fn test_failed_probe_task_is_counted() {
        let prober = LivenessProber::new(
            Arc::new(PanicOn(Ipv4Addr::new(172, 16, 0, 6))),
            DEFAULT_FALLBACK_PORTS,
        );
        let resolver = AddressTableResolver::new(ResolverConfig::default(), prober);
        let mut session = FakeSession::with_binds(vec![
            phys_address("172.16.0.5", &[0, 0, 0, 0, 0, 1]),
            phys_address("172.16.0.6", &[0, 0, 0, 0, 0, 2]),
        ]);

        let resolution = resolver.resolve(&mut session).await.unwrap();
        assert_eq!(resolution.snapshot.len(), 1);
        assert_eq!(resolution.probe_failed, 1);
    }
}
