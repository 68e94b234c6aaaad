//! Host types for tracking discovered network hosts

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MacAddressError {
    #[error("hardware address must be 6 bytes, got {0}")]
    InvalidLength(usize),
    #[error("invalid hardware address: {0}")]
    InvalidFormat(String),
}

/// 6-octet hardware address, the identity key of a host across scans
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MacAddress([u8; 6]);

impl MacAddress {
    pub const fn new(octets: [u8; 6]) -> Self {
        Self(octets)
    }

    /// Build from a raw payload, rejecting anything that is not exactly 6 bytes
    pub fn from_octets(bytes: &[u8]) -> Result<Self, MacAddressError> {
        let octets: [u8; 6] = bytes
            .try_into()
            .map_err(|_| MacAddressError::InvalidLength(bytes.len()))?;
        Ok(Self(octets))
    }

    pub fn octets(&self) -> [u8; 6] {
        self.0
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            a, b, c, d, e, g
        )
    }
}

impl FromStr for MacAddress {
    type Err = MacAddressError;

    /// Accepts `aa:bb:cc:dd:ee:ff` or `AA-BB-CC-DD-EE-FF`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(|c| c == ':' || c == '-').collect();
        if parts.len() != 6 {
            return Err(MacAddressError::InvalidFormat(s.to_string()));
        }

        let mut octets = [0u8; 6];
        for (octet, part) in octets.iter_mut().zip(&parts) {
            if part.len() != 2 {
                return Err(MacAddressError::InvalidFormat(s.to_string()));
            }
            *octet = u8::from_str_radix(part, 16)
                .map_err(|_| MacAddressError::InvalidFormat(s.to_string()))?;
        }
        Ok(Self(octets))
    }
}

impl TryFrom<String> for MacAddress {
    type Error = MacAddressError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<MacAddress> for String {
    fn from(mac: MacAddress) -> Self {
        mac.to_string()
    }
}

/// A host observed on the network, and the persisted record for it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkHost {
    /// Last observed IPv4 address
    pub ip_address: Ipv4Addr,
    /// Hardware address (record key)
    pub mac_address: MacAddress,
    /// Result of the most recent liveness check
    pub is_active: bool,
    /// Unix seconds of the most recent check that found the host active, 0 otherwise
    pub last_active: i64,
}

impl NetworkHost {
    /// Record the outcome of a liveness check made just now
    pub fn observed(ip_address: Ipv4Addr, mac_address: MacAddress, is_active: bool) -> Self {
        let last_active = if is_active { Utc::now().timestamp() } else { 0 };
        Self {
            ip_address,
            mac_address,
            is_active,
            last_active,
        }
    }

    /// Fields written on the update path
    pub fn update(&self) -> HostUpdate {
        HostUpdate {
            ip_address: self.ip_address,
            is_active: self.is_active,
            last_active: self.last_active,
        }
    }
}

/// Fields overwritten in place when a host is already known
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostUpdate {
    pub ip_address: Ipv4Addr,
    pub is_active: bool,
    pub last_active: i64,
}

impl HostUpdate {
    /// Apply onto an existing record, keeping its key
    pub fn apply(&self, host: &mut NetworkHost) {
        host.ip_address = self.ip_address;
        host.is_active = self.is_active;
        host.last_active = self.last_active;
    }
}
