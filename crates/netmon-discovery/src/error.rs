//! Errors that abort a discovery cycle

use netmon_core::{MacAddress, StoreError};
use thiserror::Error;

use crate::snmp::SnmpError;

#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error("Failed to connect to management endpoint: {0}")]
    Connect(#[source] SnmpError),
    #[error("Failed to read address table: {0}")]
    BulkRead(#[source] SnmpError),
    #[error("Failed to update host {mac}: {source}")]
    Update {
        mac: MacAddress,
        #[source]
        source: StoreError,
    },
    #[error("Discovery cycle exceeded its {0}s deadline")]
    DeadlineExceeded(u64),
}
