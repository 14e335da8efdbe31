//! Liveness probe.
//!
//! A probe is a bare TCP connect to `host:port`, bounded by a timeout and
//! dropped as soon as it succeeds. Any failure (refusal, resolution error,
//! timeout) reads as offline. One attempt per call.

use std::time::Duration;

use async_trait::async_trait;
use mastersync_core::Address;
use tracing::debug;

use crate::transport;

/// Returns true if `address:port` accepts a TCP connection within `timeout`.
pub async fn is_online(address: &Address, port: u16, timeout: Duration) -> bool {
    let target = address.with_port(port);
    match transport::connect(&target, timeout, false).await {
        Ok(stream) => {
            drop(stream);
            true
        }
        Err(e) => {
            debug!(remote = %target, error = %e, "Probe failed");
            false
        }
    }
}

/// Source of liveness answers for election.
#[async_trait]
pub trait Prober: Send + Sync {
    /// Returns true if `address` is currently reachable.
    async fn is_online(&self, address: &Address) -> bool;
}

/// Prober that opens real TCP connections to the coordination port.
#[derive(Debug, Clone, Copy)]
pub struct TcpProber {
    port: u16,
    timeout: Duration,
}

impl TcpProber {
    /// Creates a prober for `port` with the given connect timeout.
    #[must_use]
    pub const fn new(port: u16, timeout: Duration) -> Self {
        Self { port, timeout }
    }
}

#[async_trait]
impl Prober for TcpProber {
    async fn is_online(&self, address: &Address) -> bool {
        is_online(address, self.port, self.timeout).await
    }
}
