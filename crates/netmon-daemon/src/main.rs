//! netmon - Main entry point
//!
//! Runs one discovery cycle: reads the router's address table over SNMP,
//! probes every host, records the results, and exits.

mod config;
mod store;

use anyhow::{Context, Result};
use chrono::DateTime;
use clap::Parser;
use netmon_core::NetworkHost;
use netmon_discovery::{NetworkMonitor, SnmpSession};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

use crate::config::StoreBackend;

#[derive(Parser, Debug)]
#[command(name = "netmon")]
#[command(about = "Discovers hosts from a router's address table and records their liveness")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "netmon.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Resolve and probe hosts, print them, and leave the store untouched
    #[arg(long)]
    dry_run: bool,

    /// Print the effective configuration and exit
    #[arg(long)]
    print_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("netmon v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration: file, then environment
    let mut config = config::load_config(&args.config)?;
    config.apply_env(|name| std::env::var(name).ok());

    if args.print_config {
        print!("{}", toml::to_string_pretty(&config.redacted())?);
        return Ok(());
    }

    config.validate().context("Invalid configuration")?;

    info!(
        snmp_target = %config.snmp.target,
        prefix = %config.discovery.network_prefix,
        table = %config.store.table,
        "Configuration loaded"
    );

    let store = store::open_store(&config.store).await?;
    let monitor = NetworkMonitor::with_network(config.to_monitor_config(), Arc::clone(&store));
    let mut session = SnmpSession::new(config.to_snmp_config());

    if args.dry_run {
        info!("Dry run, host records will not be written");
        let snapshot = monitor.discover(&mut session).await.inspect_err(|e| {
            error!(error = %e, "Discovery failed");
        })?;

        println!("Discovered {} hosts:", snapshot.len());
        for host in snapshot.hosts() {
            print_host(host);
        }
        return Ok(());
    }

    let report = monitor.run_cycle(&mut session).await.inspect_err(|e| {
        error!(error = %e, "Discovery cycle failed");
    })?;

    println!(
        "Discovered {} hosts ({} active): {} new, {} updated, {} failed",
        report.discovered,
        report.active,
        report.reconciled.inserted,
        report.reconciled.updated,
        report.reconciled.insert_failed
    );
    if report.probe_failed + report.reconciled.task_failed > 0 {
        println!(
            "Incomplete: {} probes and {} record writes did not finish",
            report.probe_failed, report.reconciled.task_failed
        );
    }

    if config.store.backend == StoreBackend::Memory {
        for host in store.list().await? {
            print_host(&host);
        }
    }

    Ok(())
}

fn print_host(host: &NetworkHost) {
    let last_active = DateTime::from_timestamp(host.last_active, 0)
        .filter(|_| host.last_active > 0)
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| "-".to_string());

    println!(
        "  - {} at {} ({}), last active {}",
        host.mac_address,
        host.ip_address,
        if host.is_active { "active" } else { "inactive" },
        last_active
    );
}
