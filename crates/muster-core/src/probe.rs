//! Reachability probes

use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tracing::debug;

/// Pre-dispatch reachability check.
///
/// A probe is a cheap filter, not a guarantee: a target that probes
/// reachable can still fail once the action connects. Implementations must
/// bound their own runtime and must never error, any network failure is
/// reported as unreachable.
#[async_trait]
pub trait ReachabilityProbe: Send + Sync {
    /// True when the target looks reachable
    async fn probe(&self, target: &str) -> bool;
}

/// TCP connect probe.
///
/// The unprivileged stand-in for an ICMP ping: a target counts as reachable
/// when a TCP connection to `target:port` opens within the timeout.
#[derive(Debug, Clone)]
pub struct TcpProbe {
    port: u16,
    timeout: Duration,
}

impl TcpProbe {
    /// Probe `port` with the given connect timeout
    #[must_use]
    pub fn new(port: u16, timeout: Duration) -> Self {
        Self { port, timeout }
    }

    /// Port this probe connects to
    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }
}

#[async_trait]
impl ReachabilityProbe for TcpProbe {
    async fn probe(&self, target: &str) -> bool {
        match tokio::time::timeout(self.timeout, TcpStream::connect((target, self.port))).await {
            Ok(Ok(_stream)) => true,
            Ok(Err(e)) => {
                debug!(host = %target, port = self.port, error = %e, "probe connect failed");
                false
            }
            Err(_) => {
                debug!(host = %target, port = self.port, timeout = ?self.timeout, "probe timed out");
                false
            }
        }
    }
}

/// Probe that declares every target reachable.
///
/// Used when the action is local to the machine running the sweep, or when
/// probing is explicitly disabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysReachable;

#[async_trait]
impl ReachabilityProbe for AlwaysReachable {
    async fn probe(&self, _target: &str) -> bool {
        true
    }
}
