//! Scripted collaborators for unit tests

use async_trait::async_trait;
use netmon_core::{HostStore, HostUpdate, Lookup, MacAddress, MemoryStore, NetworkHost, StoreError};
use std::collections::HashSet;
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

use crate::probe::Reachability;
use crate::snmp::{ManagementSession, SnmpError, VarBind};

/// Reachability with a fixed echo result and a fixed set of open ports
pub struct ScriptedReachability {
    echo_ok: bool,
    open_ports: HashSet<u16>,
    echo_ok_hosts: HashSet<Ipv4Addr>,
    attempts: Mutex<Vec<u16>>,
}

impl ScriptedReachability {
    pub fn new(echo_ok: bool, open_ports: &[u16]) -> Self {
        Self {
            echo_ok,
            open_ports: open_ports.iter().copied().collect(),
            echo_ok_hosts: HashSet::new(),
            attempts: Mutex::new(Vec::new()),
        }
    }

    /// Only the listed hosts answer echo
    pub fn answering(hosts: &[Ipv4Addr]) -> Self {
        Self {
            echo_ok: false,
            open_ports: HashSet::new(),
            echo_ok_hosts: hosts.iter().copied().collect(),
            attempts: Mutex::new(Vec::new()),
        }
    }

    pub fn connect_attempts(&self) -> Vec<u16> {
        self.attempts.lock().unwrap().clone()
    }
}

#[async_trait]
impl Reachability for ScriptedReachability {
    async fn echo(&self, ip: Ipv4Addr) -> bool {
        self.echo_ok || self.echo_ok_hosts.contains(&ip)
    }

    async fn connect(&self, _ip: Ipv4Addr, port: u16) -> bool {
        self.attempts.lock().unwrap().push(port);
        self.open_ports.contains(&port)
    }
}

/// Session returning a fixed table, with failure switches
#[derive(Default)]
pub struct FakeSession {
    pub binds: Vec<VarBind>,
    pub fail_connect: bool,
    pub fail_bulk_read: bool,
    pub connects: u32,
    pub reads: Vec<(String, u32)>,
}

impl FakeSession {
    pub fn with_binds(binds: Vec<VarBind>) -> Self {
        Self {
            binds,
            ..Self::default()
        }
    }
}

#[async_trait]
impl ManagementSession for FakeSession {
    async fn connect(&mut self) -> Result<(), SnmpError> {
        self.connects += 1;
        if self.fail_connect {
            return Err(SnmpError::Connect {
                target: "fake:161".to_string(),
                source: std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused"),
            });
        }
        Ok(())
    }

    async fn bulk_read(&mut self, oid: &str, max_entries: u32) -> Result<Vec<VarBind>, SnmpError> {
        self.reads.push((oid.to_string(), max_entries));
        if self.fail_bulk_read {
            return Err(SnmpError::Timeout(1000));
        }
        Ok(self.binds.clone())
    }
}

/// Address table binding for an IPv4 entry of ipNetToPhysicalPhysAddress
pub fn phys_address(ip: &str, octets: &[u8]) -> VarBind {
    VarBind::octets(format!("1.3.6.1.2.1.4.35.1.4.3.1.4.{}", ip), octets)
}

/// Address table binding for an IPv6 entry of ipNetToPhysicalPhysAddress
pub fn phys_address_v6(addr: &[u8; 16], octets: &[u8]) -> VarBind {
    let index: Vec<String> = addr.iter().map(|b| b.to_string()).collect();
    VarBind::octets(
        format!("1.3.6.1.2.1.4.35.1.4.3.2.16.{}", index.join(".")),
        octets,
    )
}

/// Memory store that counts calls and can be told to fail
#[derive(Default)]
pub struct RecordingStore {
    inner: MemoryStore,
    pub gets: AtomicU64,
    pub puts: AtomicU64,
    pub updates: AtomicU64,
    pub fail_get: AtomicBool,
    pub fail_put: AtomicBool,
    pub fail_update: AtomicBool,
    pub panic_put: AtomicBool,
}

impl RecordingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: impl IntoIterator<Item = NetworkHost>) -> Self {
        Self {
            inner: MemoryStore::with_records(records),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> u64 {
        self.gets.load(Ordering::Relaxed)
            + self.puts.load(Ordering::Relaxed)
            + self.updates.load(Ordering::Relaxed)
    }

    pub async fn records(&self) -> Vec<NetworkHost> {
        self.inner.list().await.unwrap()
    }
}

fn backend_error(op: &str) -> StoreError {
    StoreError::Backend(format!("{} failed", op))
}

#[async_trait]
impl HostStore for RecordingStore {
    async fn get(&self, mac: &MacAddress) -> Result<Lookup, StoreError> {
        self.gets.fetch_add(1, Ordering::Relaxed);
        if self.fail_get.load(Ordering::Relaxed) {
            return Err(backend_error("get"));
        }
        self.inner.get(mac).await
    }

    async fn put_new(&self, host: &NetworkHost) -> Result<(), StoreError> {
        self.puts.fetch_add(1, Ordering::Relaxed);
        if self.panic_put.load(Ordering::Relaxed) {
            panic!("store client poisoned");
        }
        if self.fail_put.load(Ordering::Relaxed) {
            return Err(backend_error("put"));
        }
        self.inner.put_new(host).await
    }

    async fn update_fields(&self, mac: &MacAddress, update: &HostUpdate) -> Result<(), StoreError> {
        self.updates.fetch_add(1, Ordering::Relaxed);
        if self.fail_update.load(Ordering::Relaxed) {
            return Err(backend_error("update"));
        }
        self.inner.update_fields(mac, update).await
    }

    async fn list(&self) -> Result<Vec<NetworkHost>, StoreError> {
        self.inner.list().await
    }
}

