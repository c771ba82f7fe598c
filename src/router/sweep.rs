//! Timeout and abuse sweeping.
//!
//! Runs inside `update`, at most once per second. Handshake-stuck and idle
//! routes are evicted here; the per-route rate limiter is checked on every
//! accepted outer datagram. Eviction never notifies either side over the
//! wire; the inner server discovers the lost route when its own traffic
//! stops being answered, and the client's upstream transport times out and
//! may re-handshake via ReconnectSYN.

use super::node::NodeStatus;
use super::registry::NodeId;
use super::Router;
use tracing::warn;

/// Why a route was torn down. These are the only paths that remove a node;
/// validation failures are silent drops and never evict.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EvictReason {
    /// Connect-id-indexed node saw no outer traffic within the handshake
    /// deadline.
    ConnectTimeout,
    /// Established node saw no outer traffic within session timeout plus
    /// grace.
    SessionTimeout,
    /// Per-route packet rate exceeded.
    TooManyPackets,
    /// A handshake retry counter exceeded its bound.
    TooManySyncAttempts,
}

impl std::fmt::Display for EvictReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EvictReason::ConnectTimeout => "connect-timeout",
            EvictReason::SessionTimeout => "session-timeout",
            EvictReason::TooManyPackets => "too-many-packets",
            EvictReason::TooManySyncAttempts => "too-many-sync-attempts",
        };
        write!(f, "{}", s)
    }
}

impl Router {
    /// One sweep pass.
    pub(in crate::router) fn sweep(&mut self, now_ms: u64) {
        let connect_timeout_ms = self.config.router.limits.connect_timeout_ms();
        let idle_timeout_ms = self.config.router.idle_timeout_ms();

        // Handshake-stuck: still reachable by connect id, still in Sync,
        // no outer traffic within the deadline.
        let stale: Vec<NodeId> = self
            .registry
            .connect_indexed_ids()
            .into_iter()
            .filter(|&id| {
                self.registry.get(id).is_some_and(|node| {
                    node.status == NodeStatus::Sync
                        && node.is_handshake_stale(now_ms, connect_timeout_ms)
                })
            })
            .collect();
        for id in stale {
            self.evict_with_error(id, EvictReason::ConnectTimeout);
        }

        // Idle established routes.
        let idle: Vec<NodeId> = self
            .registry
            .outer_indexed_ids()
            .into_iter()
            .filter(|&id| {
                self.registry
                    .get(id)
                    .is_some_and(|node| node.is_idle(now_ms, idle_timeout_ms))
            })
            .collect();
        for id in idle {
            self.evict_with_error(id, EvictReason::SessionTimeout);
        }
    }

    /// Tear down a route with an explicit reason. Idempotent; frees the
    /// outer conn id for reuse.
    pub(in crate::router) fn evict_with_error(&mut self, id: NodeId, reason: EvictReason) {
        if let Some(node) = self.registry.evict(id) {
            let _ = self.allocator.free(node.outer_conn);
            warn!(
                outer_conn = node.outer_conn,
                connect_id = node.connect_id,
                status = %node.status,
                reason = %reason,
                "Route evicted"
            );
        }
    }

    /// Activity and rate bookkeeping for an accepted outer datagram.
    ///
    /// Every successfully validated outer-side frame lands here; exceeding
    /// the per-window budget evicts the route with an explicit error.
    pub(in crate::router) fn touch_outer(&mut self, id: NodeId, now_ms: u64) {
        let limit = self.config.router.limits.packets_per_second;
        let within_budget = match self.registry.get_mut(id) {
            Some(node) => {
                node.last_recv_outer_ms = now_ms;
                node.check_outer_count(now_ms, limit)
            }
            None => return,
        };

        if !within_budget {
            self.evict_with_error(id, EvictReason::TooManyPackets);
        }
    }
}
