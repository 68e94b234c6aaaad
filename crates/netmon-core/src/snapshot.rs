//! Discovery snapshot: the hosts seen in one scan cycle, keyed by hardware address

use std::collections::btree_map::{self, BTreeMap};

use crate::host::{MacAddress, NetworkHost};

/// Hosts observed by one discovery cycle.
///
/// Keyed by hardware address. Inserting a host whose address is already
/// present replaces the earlier observation, so callers that feed entries in
/// table order get last-write-wins semantics. Iteration is ordered by
/// hardware address.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscoverySnapshot {
    hosts: BTreeMap<MacAddress, NetworkHost>,
}

impl DiscoverySnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an observation, returning the one it replaced
    pub fn insert(&mut self, host: NetworkHost) -> Option<NetworkHost> {
        self.hosts.insert(host.mac_address, host)
    }

    pub fn get(&self, mac: &MacAddress) -> Option<&NetworkHost> {
        self.hosts.get(mac)
    }

    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }

    /// Number of hosts found active in this cycle
    pub fn active_count(&self) -> usize {
        self.hosts.values().filter(|h| h.is_active).count()
    }

    pub fn hosts(&self) -> impl Iterator<Item = &NetworkHost> {
        self.hosts.values()
    }
}

impl IntoIterator for DiscoverySnapshot {
    type Item = NetworkHost;
    type IntoIter = btree_map::IntoValues<MacAddress, NetworkHost>;

    fn into_iter(self) -> Self::IntoIter {
        self.hosts.into_values()
    }
}

impl FromIterator<NetworkHost> for DiscoverySnapshot {
    fn from_iter<I: IntoIterator<Item = NetworkHost>>(iter: I) -> Self {
        let mut snapshot = Self::new();
        for host in iter {
            snapshot.insert(host);
        }
        snapshot
    }
}
