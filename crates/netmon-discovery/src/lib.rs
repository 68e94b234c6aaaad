//! netmon Discovery - Address table discovery and host reconciliation
//!
//! This crate provides the scan pipeline:
//! - SNMP bulk read of a router/switch address table
//! - Layered liveness probing (ICMP echo, TCP connect fallback)
//! - Reconciliation of observed hosts against the record store

pub mod arp;
pub mod error;
pub mod probe;
pub mod reconcile;
pub mod scanner;
pub mod snmp;

#[cfg(test)]
mod testing;

pub use arp::{AddressTableResolver, ArpEntry, Resolution, ResolverConfig};
pub use error::DiscoveryError;
pub use probe::{LivenessProber, NetworkReachability, Reachability};
pub use reconcile::{ReconcileOutcome, ReconcileSummary, Reconciler};
pub use scanner::{CycleReport, MonitorConfig, NetworkMonitor};
pub use snmp::{ManagementSession, SnmpConfig, SnmpError, SnmpSession, VarBind};
