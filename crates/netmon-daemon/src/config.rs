//! Configuration loading and validation

use anyhow::{bail, Result};
use netmon_discovery::arp::{DEFAULT_MAX_ENTRIES, IP_NET_TO_PHYSICAL_OID};
use netmon_discovery::probe::{DEFAULT_FALLBACK_PORTS, PROBE_TIMEOUT_MS};
use netmon_discovery::snmp::{parse_oid, SNMP_PORT, SNMP_TIMEOUT_MS};
use netmon_discovery::{MonitorConfig, SnmpConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub snmp: SnmpSection,
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnmpSection {
    /// Router/switch to query, `host` or `host:port`
    #[serde(default)]
    pub target: String,
    /// Agent port when `target` has none
    #[serde(default = "default_snmp_port")]
    pub port: u16,
    /// v2c community string
    #[serde(default)]
    pub community: String,
    /// Address table OID
    #[serde(default = "default_table_oid")]
    pub table_oid: String,
    /// Bulk read size
    #[serde(default = "default_max_entries")]
    pub max_entries: u32,
    /// Session and request timeout in milliseconds
    #[serde(default = "default_snmp_timeout")]
    pub timeout_ms: u64,
}

impl Default for SnmpSection {
    fn default() -> Self {
        Self {
            target: String::new(),
            port: default_snmp_port(),
            community: String::new(),
            table_oid: default_table_oid(),
            max_entries: default_max_entries(),
            timeout_ms: default_snmp_timeout(),
        }
    }
}

fn default_snmp_port() -> u16 {
    SNMP_PORT
}

fn default_table_oid() -> String {
    IP_NET_TO_PHYSICAL_OID.to_string()
}

fn default_max_entries() -> u32 {
    DEFAULT_MAX_ENTRIES
}

fn default_snmp_timeout() -> u64 {
    SNMP_TIMEOUT_MS
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// Only addresses starting with this prefix are tracked
    #[serde(default = "default_network_prefix")]
    pub network_prefix: String,
    /// ICMP echo timeout in milliseconds
    #[serde(default = "default_probe_timeout")]
    pub echo_timeout_ms: u64,
    /// Per-port TCP connect timeout in milliseconds
    #[serde(default = "default_probe_timeout")]
    pub connect_timeout_ms: u64,
    /// Ports tried in order when echo fails
    #[serde(default = "default_fallback_ports")]
    pub fallback_ports: Vec<u16>,
    /// Hosts probed or reconciled at once
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    /// Whole-cycle deadline in seconds (0 to disable)
    #[serde(default)]
    pub cycle_timeout_secs: u64,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            network_prefix: default_network_prefix(),
            echo_timeout_ms: default_probe_timeout(),
            connect_timeout_ms: default_probe_timeout(),
            fallback_ports: default_fallback_ports(),
            max_concurrency: default_max_concurrency(),
            cycle_timeout_secs: 0,
        }
    }
}

fn default_network_prefix() -> String {
    "172".to_string()
}

fn default_probe_timeout() -> u64 {
    PROBE_TIMEOUT_MS
}

fn default_fallback_ports() -> Vec<u16> {
    DEFAULT_FALLBACK_PORTS.to_vec()
}

fn default_max_concurrency() -> usize {
    16
}

/// Where host records are kept
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// `{path}/{table}.json`
    Json,
    /// In-process only, printed at exit
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Table name
    #[serde(default = "default_table")]
    pub table: String,
    /// Directory for table files
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
    #[serde(default = "default_backend")]
    pub backend: StoreBackend,
    /// Keep the stored last-active time when a host is found inactive
    #[serde(default)]
    pub preserve_last_active: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            table: default_table(),
            path: default_store_path(),
            backend: default_backend(),
            preserve_last_active: false,
        }
    }
}

fn default_table() -> String {
    "netmon_devices".to_string()
}

fn default_store_path() -> PathBuf {
    PathBuf::from("./data")
}

fn default_backend() -> StoreBackend {
    StoreBackend::Json
}

impl Config {
    /// Override settings from `NETMON_*` variables; blank values are ignored
    pub fn apply_env<F>(&mut self, var: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            var(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        if let Some(target) = get("NETMON_SNMP_TARGET") {
            self.snmp.target = target;
        }
        if let Some(community) = get("NETMON_SNMP_COMMUNITY") {
            self.snmp.community = community;
        }
        if let Some(prefix) = get("NETMON_NETWORK_PREFIX") {
            self.discovery.network_prefix = prefix;
        }
        if let Some(table) = get("NETMON_STORE_TABLE").or_else(|| get("NETMON_DYNAMO_TABLE")) {
            self.store.table = table;
        }
        if let Some(path) = get("NETMON_STORE_PATH") {
            self.store.path = PathBuf::from(path);
        }
    }

    /// Check the settings the scan cannot run without
    pub fn validate(&self) -> Result<()> {
        if self.snmp.target.trim().is_empty() {
            bail!("snmp.target is not set (or NETMON_SNMP_TARGET)");
        }
        if self.snmp.community.is_empty() {
            bail!("snmp.community is not set (or NETMON_SNMP_COMMUNITY)");
        }
        if self.store.table.trim().is_empty() {
            bail!("store.table is empty");
        }
        if let Err(e) = parse_oid(&self.snmp.table_oid) {
            bail!("snmp.table_oid: {}", e);
        }
        if self.snmp.max_entries == 0 {
            bail!("snmp.max_entries must be at least 1");
        }
        if self.discovery.fallback_ports.is_empty() {
            bail!("discovery.fallback_ports must list at least one port");
        }
        if self.discovery.max_concurrency == 0 {
            bail!("discovery.max_concurrency must be at least 1");
        }
        Ok(())
    }

    /// Copy with the community string masked, for display
    pub fn redacted(&self) -> Config {
        let mut config = self.clone();
        if !config.snmp.community.is_empty() {
            config.snmp.community = "********".to_string();
        }
        config
    }

    pub fn to_snmp_config(&self) -> SnmpConfig {
        SnmpConfig {
            target: self.snmp.target.trim().to_string(),
            port: self.snmp.port,
            community: self.snmp.community.clone(),
            timeout_ms: self.snmp.timeout_ms,
        }
    }

    pub fn to_monitor_config(&self) -> MonitorConfig {
        MonitorConfig {
            table_oid: self.snmp.table_oid.clone(),
            max_entries: self.snmp.max_entries,
            network_prefix: self.discovery.network_prefix.clone(),
            echo_timeout_ms: self.discovery.echo_timeout_ms,
            connect_timeout_ms: self.discovery.connect_timeout_ms,
            fallback_ports: self.discovery.fallback_ports.clone(),
            max_concurrency: self.discovery.max_concurrency,
            cycle_timeout_secs: self.discovery.cycle_timeout_secs,
            preserve_last_active: self.store.preserve_last_active,
        }
    }
}

/// Load configuration from file
pub fn load_config(path: &Path) -> Result<Config> {
    if path.exists() {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    } else {
        info!(
            path = %path.display(),
            "Configuration file not found, using defaults"
        );
        Ok(Config::default())
    }
}
