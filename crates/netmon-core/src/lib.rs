//! netmon Core - Host types, discovery snapshot, and host record store
//!
//! This crate provides the foundational types for the netmon system:
//! - Hardware address and host record types
//! - The per-cycle discovery snapshot keyed by hardware address
//! - The host store port with in-memory and JSON file adapters

pub mod host;
pub mod snapshot;
pub mod store;
pub mod table;

pub use host::{HostUpdate, MacAddress, MacAddressError, NetworkHost};
pub use snapshot::DiscoverySnapshot;
pub use store::{HostStore, Lookup, MemoryStore, StoreError};
pub use table::{HostTable, JsonFileStore};
