//! Per-route state.
//!
//! One `RouterNode` exists per logical client⇄server route. Nodes are owned
//! by the registry; everything here is plain data plus the small predicates
//! the listeners and sweeper evaluate against it.

use std::net::SocketAddr;

/// Route lifecycle phase.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeStatus {
    /// Handshake in progress.
    Sync,
    /// Established, forwarding payload traffic.
    Msg,
}

impl std::fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            NodeStatus::Sync => "sync",
            NodeStatus::Msg => "msg",
        };
        write!(f, "{}", s)
    }
}

/// State for one client⇄server route.
///
/// ## Identity
///
/// - `connect_id`: transient key chosen by the client for one handshake
///   attempt; the lookup key before the route is confirmed.
/// - `outer_conn` / `inner_conn`: stable ids chosen by the router and the
///   inner server respectively. Together they authenticate every frame on
///   the established path; neither changes except that the inner server is
///   authoritative for `inner_conn` at ACK time.
///
/// ## Addresses
///
/// - `sync_addr`: the client address observed during the handshake datagram.
///   Pins the handshake: a datagram claiming the same ids from elsewhere is
///   rejected, never merged.
/// - `outer_addr`: the client's current address for established forwarding.
///   Unset until the first client SYN; may diverge from `sync_addr` after
///   a reconnect.
#[derive(Debug)]
pub struct RouterNode {
    pub connect_id: u32,
    pub outer_conn: u32,
    pub inner_conn: u32,
    pub sync_addr: SocketAddr,
    pub outer_addr: Option<SocketAddr>,
    /// Resolved private game-server endpoint this route forwards to.
    pub inner_addr: SocketAddr,
    /// Raw form of the inner endpoint as the client presented it.
    pub inner_addr_raw: String,
    pub status: NodeStatus,
    /// Router-level handshake retries (RouterSYN / ReconnectSYN).
    pub router_sync_count: u32,
    /// Client-level handshake retries (SYN).
    pub sync_count: u32,
    /// Datagrams accepted in the current rate window.
    window_count: u32,
    /// Start of the current rate window.
    window_start_ms: u64,
    pub last_recv_outer_ms: u64,
    pub last_recv_inner_ms: u64,
}

/// Width of the packet-rate window.
const RATE_WINDOW_MS: u64 = 1000;

impl RouterNode {
    /// Create a node in `Sync` status, stamped with the creation time on
    /// the outer side so the handshake timeout has a baseline.
    pub fn new(
        connect_id: u32,
        outer_conn: u32,
        inner_conn: u32,
        sync_addr: SocketAddr,
        inner_addr: SocketAddr,
        inner_addr_raw: String,
        now_ms: u64,
    ) -> Self {
        Self {
            connect_id,
            outer_conn,
            inner_conn,
            sync_addr,
            outer_addr: None,
            inner_addr,
            inner_addr_raw,
            status: NodeStatus::Sync,
            router_sync_count: 0,
            sync_count: 0,
            window_count: 0,
            window_start_ms: now_ms,
            last_recv_outer_ms: now_ms,
            last_recv_inner_ms: now_ms,
        }
    }

    /// Record an accepted outer-side datagram against the rate window.
    ///
    /// The window resets once `RATE_WINDOW_MS` has elapsed. Returns false
    /// when the accepted count exceeds `limit` within one window, which
    /// triggers eviction with an explicit error.
    pub fn check_outer_count(&mut self, now_ms: u64, limit: u32) -> bool {
        if now_ms.saturating_sub(self.window_start_ms) > RATE_WINDOW_MS {
            self.window_start_ms = now_ms;
            self.window_count = 0;
        }
        self.window_count += 1;
        self.window_count <= limit
    }

    /// Handshake timeout predicate: no outer traffic within `timeout_ms`
    /// while the node is still connect-id reachable.
    pub fn is_handshake_stale(&self, now_ms: u64, timeout_ms: u64) -> bool {
        now_ms.saturating_sub(self.last_recv_outer_ms) > timeout_ms
    }

    /// Idle timeout predicate for established nodes. `timeout_ms` already
    /// includes the 10 s grace over the upstream session timeout.
    pub fn is_idle(&self, now_ms: u64, timeout_ms: u64) -> bool {
        now_ms.saturating_sub(self.last_recv_outer_ms) > timeout_ms
    }
}
