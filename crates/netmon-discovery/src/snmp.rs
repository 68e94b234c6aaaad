//! SNMPv2c management session used to read the device's address table

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use snmp2::{AsyncSession, Oid, Value};
use std::time::Duration;
use thiserror::Error;
use tokio::time::timeout;
use tracing::{debug, trace};

/// Default SNMP agent port
pub const SNMP_PORT: u16 = 161;

/// Default SNMP request timeout in milliseconds
pub const SNMP_TIMEOUT_MS: u64 = 1000;

#[derive(Error, Debug)]
pub enum SnmpError {
    #[error("Invalid OID: {0}")]
    InvalidOid(String),
    #[error("Failed to open session to {target}: {source}")]
    Connect {
        target: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Request failed: {0}")]
    Request(String),
    #[error("Request timed out after {0} ms")]
    Timeout(u64),
    #[error("Session is not connected")]
    NotConnected,
}

/// One variable binding returned by a bulk read.
///
/// Only octet-string values are kept; every other value type is `None`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VarBind {
    /// Dotted object identifier
    pub name: String,
    pub octets: Option<Vec<u8>>,
}

impl VarBind {
    pub fn octets(name: impl Into<String>, octets: &[u8]) -> Self {
        Self {
            name: name.into(),
            octets: Some(octets.to_vec()),
        }
    }

    pub fn other(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            octets: None,
        }
    }
}

/// Read-only management protocol session
#[async_trait]
pub trait ManagementSession: Send {
    /// Open the session to the configured endpoint
    async fn connect(&mut self) -> Result<(), SnmpError>;

    /// Bulk-read up to `max_entries` bindings following `oid`
    async fn bulk_read(&mut self, oid: &str, max_entries: u32) -> Result<Vec<VarBind>, SnmpError>;
}

/// SNMP endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnmpConfig {
    /// Agent address, `host` or `host:port`
    pub target: String,
    /// Port used when `target` carries none
    pub port: u16,
    /// v2c community string
    pub community: String,
    /// Timeout for opening the session and for each request
    pub timeout_ms: u64,
}

impl SnmpConfig {
    /// `host:port` of the agent
    pub fn address(&self) -> String {
        if self.target.contains(':') {
            self.target.clone()
        } else {
            format!("{}:{}", self.target, self.port)
        }
    }
}

/// SNMPv2c session backed by snmp2
pub struct SnmpSession {
    config: SnmpConfig,
    session: Option<AsyncSession>,
}

impl SnmpSession {
    pub fn new(config: SnmpConfig) -> Self {
        Self {
            config,
            session: None,
        }
    }

    fn timeout(&self) -> Duration {
        Duration::from_millis(self.config.timeout_ms)
    }
}

#[async_trait]
impl ManagementSession for SnmpSession {
    async fn connect(&mut self) -> Result<(), SnmpError> {
        let target = self.config.address();
        let session = timeout(
            self.timeout(),
            AsyncSession::new_v2c(target.as_str(), self.config.community.as_bytes(), 0),
        )
        .await
        .map_err(|_| SnmpError::Timeout(self.config.timeout_ms))?
        .map_err(|source| SnmpError::Connect {
            target: target.clone(),
            source,
        })?;

        debug!(agent = %target, "SNMP session opened");
        self.session = Some(session);
        Ok(())
    }

    async fn bulk_read(&mut self, oid: &str, max_entries: u32) -> Result<Vec<VarBind>, SnmpError> {
        let arcs = parse_oid(oid)?;
        let root = Oid::from(&arcs[..]).map_err(|e| SnmpError::InvalidOid(format!("{}: {:?}", oid, e)))?;
        let duration = self.timeout();
        let timeout_ms = self.config.timeout_ms;
        let session = self.session.as_mut().ok_or(SnmpError::NotConnected)?;

        trace!(oid = %oid, max_entries = max_entries, "Sending GetBulk");

        let pdu = timeout(duration, session.getbulk(&[&root], 0, max_entries))
            .await
            .map_err(|_| SnmpError::Timeout(timeout_ms))?
            .map_err(|e| SnmpError::Request(format!("{:?}", e)))?;

        if pdu.error_status != 0 {
            return Err(SnmpError::Request(format!(
                "agent returned error status {} at index {}",
                pdu.error_status, pdu.error_index
            )));
        }

        let binds: Vec<VarBind> = pdu
            .varbinds
            .map(|(name, value)| VarBind {
                name: name.to_string(),
                octets: match value {
                    Value::OctetString(bytes) => Some(bytes.to_vec()),
                    _ => None,
                },
            })
            .collect();

        debug!(oid = %oid, count = binds.len(), "GetBulk returned bindings");
        Ok(binds)
    }
}

/// Parse a dotted OID such as `1.3.6.1.2.1.4.35`
pub fn parse_oid(oid: &str) -> Result<Vec<u64>, SnmpError> {
    let trimmed = oid.trim().trim_start_matches('.');
    let arcs = trimmed
        .split('.')
        .map(|arc| arc.parse::<u64>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| SnmpError::InvalidOid(oid.to_string()))?;

    if arcs.len() < 2 {
        return Err(SnmpError::InvalidOid(oid.to_string()));
    }
    Ok(arcs)
}

/// Whether `name` lies strictly below `root` in the OID tree
pub fn in_subtree(name: &str, root: &str) -> bool {
    let name = name.trim_start_matches('.');
    let root = root.trim().trim_start_matches('.');
    name.strip_prefix(root)
        .map(|rest| rest.starts_with('.') && rest.len() > 1)
        .unwrap_or(false)
}
