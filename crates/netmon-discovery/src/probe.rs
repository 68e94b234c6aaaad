//! Layered liveness probing: ICMP echo first, TCP connect sweep as fallback

use async_trait::async_trait;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;
use std::time::Duration;
use surge_ping::{Client, Config, PingIdentifier, PingSequence};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, trace, warn};

/// Probe timeout in milliseconds, per echo and per connect attempt
pub const PROBE_TIMEOUT_MS: u64 = 1000;

/// Well-known service ports tried, in order, when echo gets no reply
pub const DEFAULT_FALLBACK_PORTS: &[u16] = &[
    21, 22, 23, 25, 80, 443, 3389, 8000, 8080, 8081, 8088, 8443,
];

/// Low-level reachability checks against a single address
#[async_trait]
pub trait Reachability: Send + Sync {
    /// One echo request; true on reply
    async fn echo(&self, ip: Ipv4Addr) -> bool;

    /// One TCP handshake attempt; true when the connection is accepted
    async fn connect(&self, ip: Ipv4Addr, port: u16) -> bool;
}

/// Reachability over the real network: surge-ping for echo, tokio for TCP
pub struct NetworkReachability {
    icmp: Option<Client>,
    echo_timeout: Duration,
    connect_timeout: Duration,
}

impl NetworkReachability {
    /// Must be called from within a tokio runtime
    pub fn new(echo_timeout: Duration, connect_timeout: Duration) -> Self {
        let icmp = match Client::new(&Config::default()) {
            Ok(client) => Some(client),
            Err(e) => {
                warn!(
                    error = %e,
                    "ICMP socket unavailable, liveness will rely on TCP fallback"
                );
                None
            }
        };

        Self {
            icmp,
            echo_timeout,
            connect_timeout,
        }
    }
}

/// Unique echo identifier per request within this process
fn next_identifier() -> PingIdentifier {
    static NEXT: AtomicU16 = AtomicU16::new(0);
    let base = std::process::id() as u16;
    PingIdentifier(base.wrapping_add(NEXT.fetch_add(1, Ordering::Relaxed)))
}

#[async_trait]
impl Reachability for NetworkReachability {
    async fn echo(&self, ip: Ipv4Addr) -> bool {
        let Some(client) = &self.icmp else {
            return false;
        };

        let payload = [0u8; 56];
        let mut pinger = client.pinger(IpAddr::V4(ip), next_identifier()).await;
        pinger.timeout(self.echo_timeout);

        match pinger.ping(PingSequence(0), &payload).await {
            Ok((_, rtt)) => {
                trace!(ip = %ip, rtt_ms = rtt.as_millis() as u64, "Echo reply");
                true
            }
            Err(e) => {
                trace!(ip = %ip, error = %e, "No echo reply");
                false
            }
        }
    }

    async fn connect(&self, ip: Ipv4Addr, port: u16) -> bool {
        let addr = SocketAddr::new(IpAddr::V4(ip), port);
        match timeout(self.connect_timeout, TcpStream::connect(addr)).await {
            Ok(Ok(_)) => true,
            Ok(Err(e)) => {
                trace!(ip = %ip, port = port, error = %e, "Connect failed");
                false
            }
            Err(_) => {
                trace!(ip = %ip, port = port, "Connect timed out");
                false
            }
        }
    }
}

/// Decides whether a host is up: echo, then the fallback port sweep
#[derive(Clone)]
pub struct LivenessProber {
    reach: Arc<dyn Reachability>,
    fallback_ports: Arc<[u16]>,
}

impl LivenessProber {
    pub fn new(reach: Arc<dyn Reachability>, fallback_ports: &[u16]) -> Self {
        Self {
            reach,
            fallback_ports: fallback_ports.into(),
        }
    }

    /// True if echo succeeds or any fallback port accepts a connection
    pub async fn is_alive(&self, ip: Ipv4Addr) -> bool {
        if self.reach.echo(ip).await {
            debug!(ip = %ip, "Host answered echo");
            return true;
        }

        for &port in self.fallback_ports.iter() {
            if self.reach.connect(ip, port).await {
                debug!(ip = %ip, port = port, "Host accepted connection");
                return true;
            }
        }

        debug!(
            ip = %ip,
            ports = self.fallback_ports.len(),
            "Host did not answer echo or any fallback port"
        );
        false
    }
}
