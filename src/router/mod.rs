//! Relay Router Core
//!
//! The `Router` owns the outer (public) and inner (private) UDP sockets,
//! the node registry, and the outer-conn allocator. An external driver
//! calls [`Router::update`] once per tick; each call drains both sockets'
//! receive queues without blocking, dispatches every datagram through the
//! codec and registry, and at most once per second runs the timeout
//! sweep.
//!
//! Everything is touched from the single driver thread; no locks anywhere.
//! Distributing the two drains across threads would require sharding the
//! registry by outer-conn hash first.

mod inner;
mod node;
mod outer;
mod registry;
mod sweep;
pub mod wire;

#[cfg(test)]
mod tests;

pub use node::{NodeStatus, RouterNode};
pub use registry::{NodeId, NodeRegistry};
pub use sweep::EvictReason;

use crate::config::{Config, ConfigError};
use crate::transport::{RelaySocket, TransportError};
use crate::utils::conn::ConnIdAllocator;
use std::net::SocketAddr;
use thiserror::Error;
use tracing::{info, warn};

/// Errors related to router setup.
#[derive(Debug, Error)]
pub enum RouterError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
}

/// Minimum spacing between sweep passes.
const SWEEP_INTERVAL_MS: u64 = 1000;

/// The relay router instance.
pub struct Router {
    /// Loaded configuration.
    config: Config,

    /// Public-facing socket; clients and peer routers send here.
    outer: RelaySocket,
    /// Private-side socket; game servers send here.
    inner: RelaySocket,

    /// Live routes and their two lookup indexes.
    registry: NodeRegistry,
    /// Process-wide unique outer conn ids.
    allocator: ConnIdAllocator,

    /// Last sweep timestamp.
    last_sweep_ms: u64,

    // Per-socket receive buffers, reused across ticks.
    outer_buf: Vec<u8>,
    inner_buf: Vec<u8>,
}

impl Router {
    /// Bind both sockets and construct the router.
    pub fn bind(config: Config) -> Result<Self, RouterError> {
        let outer_addr = config.outer_bind_addr()?;
        let inner_addr = config.inner_bind_addr()?;
        let buffer_bytes = config.router.buffers.socket_buffer_bytes;
        let datagram_bytes = config.router.buffers.datagram_bytes;

        let outer = RelaySocket::bind(outer_addr, buffer_bytes)?;
        let inner = RelaySocket::bind(inner_addr, buffer_bytes)?;

        info!(
            outer_addr = %outer.local_addr(),
            inner_addr = %inner.local_addr(),
            "Router bound"
        );

        Ok(Self {
            config,
            outer,
            inner,
            registry: NodeRegistry::new(),
            allocator: ConnIdAllocator::new(),
            last_sweep_ms: 0,
            outer_buf: vec![0u8; datagram_bytes],
            inner_buf: vec![0u8; datagram_bytes],
        })
    }

    /// The bound public endpoint.
    pub fn outer_addr(&self) -> SocketAddr {
        self.outer.local_addr()
    }

    /// The bound private endpoint.
    pub fn inner_addr(&self) -> SocketAddr {
        self.inner.local_addr()
    }

    /// Live-route registry, read-only.
    pub fn registry(&self) -> &NodeRegistry {
        &self.registry
    }

    /// One driver tick: drain the outer socket, drain the inner socket,
    /// then sweep if a second has passed.
    ///
    /// `now_ms` must come from a clock consistent across calls; all stored
    /// timestamps derive from it. The drains are bounded by the configured
    /// per-tick budget so a flood cannot stall the driver indefinitely.
    pub fn update(&mut self, now_ms: u64) {
        self.drain_outer(now_ms);
        self.drain_inner(now_ms);

        if now_ms.saturating_sub(self.last_sweep_ms) >= SWEEP_INTERVAL_MS {
            self.last_sweep_ms = now_ms;
            self.sweep(now_ms);
        }
    }

    /// Drop all routes and reset the allocator. The sockets are released
    /// when the router itself is dropped.
    pub fn close(&mut self) {
        let routes = self.registry.len();
        self.registry.clear();
        self.allocator.clear();
        info!(routes, "Router closed");
    }

    fn drain_outer(&mut self, now_ms: u64) {
        let mut buf = std::mem::take(&mut self.outer_buf);
        for _ in 0..self.config.router.buffers.drain_budget {
            match self.outer.try_recv_from(&mut buf) {
                Ok(Some((len, from))) => {
                    self.handle_outer_datagram(&buf[..len], from, now_ms);
                }
                Ok(None) => break,
                Err(e) => {
                    // One bad recv must not stop the drain for this tick.
                    warn!(error = %e, "Outer receive error");
                }
            }
        }
        self.outer_buf = buf;
    }

    fn drain_inner(&mut self, now_ms: u64) {
        let mut buf = std::mem::take(&mut self.inner_buf);
        for _ in 0..self.config.router.buffers.drain_budget {
            match self.inner.try_recv_from(&mut buf) {
                Ok(Some((len, from))) => {
                    self.handle_inner_datagram(&buf[..len], from, now_ms);
                }
                Ok(None) => break,
                Err(e) => {
                    warn!(error = %e, "Inner receive error");
                }
            }
        }
        self.inner_buf = buf;
    }

    /// Send toward a client on the outer socket, logging send failures.
    pub(crate) fn send_outer(&self, data: &[u8], addr: SocketAddr) {
        if let Err(e) = self.outer.send_to(data, addr) {
            warn!(addr = %addr, error = %e, "Outer send failed");
        }
    }

    /// Send toward a game server on the inner socket, logging send
    /// failures.
    pub(crate) fn send_inner(&self, data: &[u8], addr: SocketAddr) {
        if let Err(e) = self.inner.send_to(data, addr) {
            warn!(addr = %addr, error = %e, "Inner send failed");
        }
    }
}
