//! Outer (public) listener.
//!
//! Every datagram arriving on the outer socket lands here. Three classes of
//! traffic: router-level handshakes (RouterSYN, ReconnectSYN), the
//! client-level handshake leg (SYN), and established forwarding (MSG, FIN).
//! Anything that fails validation is dropped without a reply; an attacker
//! probing with forged headers learns nothing and gets no amplification.

use super::registry::NodeId;
use super::sweep::EvictReason;
use super::wire::{self, Opcode, OuterHeader, RouterSynFrame};
use super::{Router, RouterNode};
use std::net::SocketAddr;
use tracing::{debug, info};

impl Router {
    /// Dispatch one outer-socket datagram.
    pub(crate) fn handle_outer_datagram(&mut self, data: &[u8], from: SocketAddr, now_ms: u64) {
        let opcode = match data.first().copied().and_then(Opcode::from_byte) {
            Some(op) => op,
            None => {
                debug!(from = %from, len = data.len(), "Dropping outer datagram with unknown opcode");
                return;
            }
        };

        match opcode {
            Opcode::RouterSyn => self.on_router_syn(data, from, now_ms),
            Opcode::ReconnectSyn => self.on_reconnect_syn(data, from, now_ms),
            Opcode::Syn => self.on_outer_syn(data, from, now_ms),
            Opcode::Msg | Opcode::Fin => self.on_outer_forward(opcode, data, from, now_ms),
            // Inner-to-outer opcodes never legitimately arrive here.
            Opcode::Ack | Opcode::ReconnectAck | Opcode::RouterAck => {
                debug!(from = %from, opcode = %opcode, "Dropping misdirected opcode on outer socket");
            }
        }
    }

    /// RouterSYN: open a route, or answer a retransmitted open.
    ///
    /// A retry is recognized by its connect id and must come from the exact
    /// address that opened the handshake, naming the same inner endpoint.
    /// The reply carries the assigned outer conn so the client can switch
    /// to it; the reply goes to the observed source address, so a spoofed
    /// open yields the attacker nothing.
    fn on_router_syn(&mut self, data: &[u8], from: SocketAddr, now_ms: u64) {
        let frame = match RouterSynFrame::parse(data) {
            Some(frame) => frame,
            None => {
                debug!(from = %from, len = data.len(), "Dropping malformed RouterSYN");
                return;
            }
        };

        if let Some(id) = self.registry.id_by_connect(frame.connect_id) {
            self.on_router_syn_retry(id, &frame, from, now_ms);
            return;
        }

        // Fresh handshake. The inner endpoint must resolve before any
        // state is committed.
        let inner_addr: SocketAddr = match frame.inner_addr.parse() {
            Ok(addr) => addr,
            Err(_) => {
                debug!(from = %from, inner_addr = %frame.inner_addr, "Dropping RouterSYN with unresolvable inner endpoint");
                return;
            }
        };

        let outer_conn = match self.allocator.allocate() {
            Ok(conn) => conn,
            Err(e) => {
                debug!(from = %from, error = %e, "Dropping RouterSYN, no outer conn available");
                return;
            }
        };

        let node = RouterNode::new(
            frame.connect_id,
            outer_conn,
            frame.inner_conn,
            from,
            inner_addr,
            frame.inner_addr.clone(),
            now_ms,
        );

        let id = self.registry.insert(node);
        // Claim the outer conn slot up front so retries and the eventual
        // SYN resolve to this node. Allocator uniqueness makes a collision
        // here impossible short of registry corruption.
        if !self.registry.promote(id) {
            self.registry.evict(id);
            if self.allocator.free(outer_conn).is_err() {
                debug!(outer_conn, "Outer conn already freed");
            }
            debug!(from = %from, outer_conn, "Dropping RouterSYN, outer conn slot taken");
            return;
        }

        info!(
            from = %from,
            outer_conn,
            connect_id = frame.connect_id,
            inner_addr = %inner_addr,
            "Route opened"
        );

        self.touch_outer(id, now_ms);
        if self.registry.get(id).is_none() {
            return;
        }

        self.send_outer(&wire::build_router_ack(frame.inner_conn, outer_conn), from);
    }

    fn on_router_syn_retry(
        &mut self,
        id: NodeId,
        frame: &RouterSynFrame,
        from: SocketAddr,
        now_ms: u64,
    ) {
        let (reply, exhausted) = match self.registry.get_mut(id) {
            Some(node) => {
                // Retries are pinned to the full handshake address and the
                // originally named inner endpoint.
                if node.sync_addr != from || node.inner_addr_raw != frame.inner_addr {
                    debug!(
                        from = %from,
                        expected = %node.sync_addr,
                        connect_id = frame.connect_id,
                        "Dropping RouterSYN retry from wrong source"
                    );
                    return;
                }
                node.router_sync_count += 1;
                node.last_recv_outer_ms = now_ms;
                let exhausted = node.router_sync_count > self.config.router.limits.router_sync_limit;
                (
                    wire::build_router_ack(node.inner_conn, node.outer_conn),
                    exhausted,
                )
            }
            None => return,
        };

        if exhausted {
            self.evict_with_error(id, EvictReason::TooManySyncAttempts);
            return;
        }

        self.touch_outer(id, now_ms);
        if self.registry.get(id).is_none() {
            return;
        }

        self.send_outer(&reply, from);
    }

    /// ReconnectSYN: a client whose NAT binding changed re-attaches to an
    /// existing route, or re-creates one this router no longer holds.
    ///
    /// The frame is forwarded verbatim to the inner server in every accepted
    /// case; the route is only confirmed when the server answers with
    /// ReconnectACK on the inner socket.
    fn on_reconnect_syn(&mut self, data: &[u8], from: SocketAddr, now_ms: u64) {
        let frame = match RouterSynFrame::parse(data) {
            Some(frame) => frame,
            None => {
                debug!(from = %from, len = data.len(), "Dropping malformed ReconnectSYN");
                return;
            }
        };

        let found = self
            .registry
            .id_by_outer(frame.outer_conn)
            .or_else(|| self.registry.id_by_connect(frame.connect_id));

        let id = match found {
            Some(id) => id,
            None => {
                self.on_reconnect_create(&frame, data, from, now_ms);
                return;
            }
        };

        let (node_connect_id, node_conns, node_sync_addr) = match self.registry.get(id) {
            Some(node) => (
                node.connect_id,
                (node.outer_conn, node.inner_conn),
                node.sync_addr,
            ),
            None => return,
        };

        if node_conns != (frame.outer_conn, frame.inner_conn) {
            debug!(from = %from, outer_conn = frame.outer_conn, "Dropping ReconnectSYN with wrong conn pair");
            return;
        }

        if node_connect_id == frame.connect_id {
            // Retransmission of a known attempt, pinned to its address and
            // inner endpoint. A client whose binding moved again must start
            // a fresh attempt with a new connect id.
            if node_sync_addr != from {
                debug!(
                    from = %from,
                    expected = %node_sync_addr,
                    connect_id = frame.connect_id,
                    "Dropping ReconnectSYN retry from wrong source"
                );
                return;
            }
            let addr_unchanged = self
                .registry
                .get(id)
                .is_some_and(|node| node.inner_addr_raw == frame.inner_addr);
            if !addr_unchanged {
                debug!(from = %from, connect_id = frame.connect_id, "Dropping ReconnectSYN retry naming a different inner endpoint");
                return;
            }
        } else {
            // Fresh attempt on a known route: adopt the new key and the
            // new source address.
            if !self.registry.rebind_connect_id(id, frame.connect_id) {
                debug!(from = %from, connect_id = frame.connect_id, "Dropping ReconnectSYN, connect id in use");
                return;
            }
            if let Some(node) = self.registry.get_mut(id) {
                node.sync_addr = from;
                node.router_sync_count = 0;
            }
            info!(
                from = %from,
                outer_conn = frame.outer_conn,
                connect_id = frame.connect_id,
                "Reconnect attempt started"
            );
        }

        let (forward_to, exhausted) = match self.registry.get_mut(id) {
            Some(node) => {
                node.router_sync_count += 1;
                node.last_recv_outer_ms = now_ms;
                (
                    node.inner_addr,
                    node.router_sync_count > self.config.router.limits.router_sync_limit,
                )
            }
            None => return,
        };

        if exhausted {
            self.evict_with_error(id, EvictReason::TooManySyncAttempts);
            return;
        }

        self.touch_outer(id, now_ms);
        if self.registry.get(id).is_none() {
            return;
        }

        self.send_inner(data, forward_to);
    }

    /// ReconnectSYN naming an outer conn this router does not hold, e.g.
    /// after a restart. The client-presented outer conn is reserved as-is
    /// so both sides keep their established pair.
    fn on_reconnect_create(
        &mut self,
        frame: &RouterSynFrame,
        data: &[u8],
        from: SocketAddr,
        now_ms: u64,
    ) {
        if frame.outer_conn == 0 {
            // Zero is the not-yet-assigned sentinel, never a real route.
            debug!(from = %from, "Dropping ReconnectSYN with zero outer conn");
            return;
        }

        let inner_addr: SocketAddr = match frame.inner_addr.parse() {
            Ok(addr) => addr,
            Err(_) => {
                debug!(from = %from, inner_addr = %frame.inner_addr, "Dropping ReconnectSYN with unresolvable inner endpoint");
                return;
            }
        };

        if self.allocator.reserve(frame.outer_conn).is_err() {
            debug!(from = %from, outer_conn = frame.outer_conn, "Dropping ReconnectSYN, outer conn not reservable");
            return;
        }

        let mut node = RouterNode::new(
            frame.connect_id,
            frame.outer_conn,
            frame.inner_conn,
            from,
            inner_addr,
            frame.inner_addr.clone(),
            now_ms,
        );
        node.router_sync_count = 1;

        let id = self.registry.insert(node);
        if !self.registry.promote(id) {
            self.registry.evict(id);
            if self.allocator.free(frame.outer_conn).is_err() {
                debug!(outer_conn = frame.outer_conn, "Outer conn already freed");
            }
            debug!(from = %from, outer_conn = frame.outer_conn, "Dropping ReconnectSYN, outer conn slot taken");
            return;
        }

        info!(
            from = %from,
            outer_conn = frame.outer_conn,
            connect_id = frame.connect_id,
            inner_addr = %inner_addr,
            "Route re-created from reconnect"
        );

        self.touch_outer(id, now_ms);
        if self.registry.get(id).is_none() {
            return;
        }

        self.send_inner(data, inner_addr);
    }

    /// Client-level SYN on an opened route. Fixes the client's forwarding
    /// address and pushes the handshake inward with the real client
    /// address appended.
    ///
    /// Matched by source IP only: the client may already sit behind a
    /// different NAT port than the RouterSYN used.
    fn on_outer_syn(&mut self, data: &[u8], from: SocketAddr, now_ms: u64) {
        let header = match OuterHeader::parse(data) {
            Some(header) => header,
            None => {
                debug!(from = %from, len = data.len(), "Dropping short SYN");
                return;
            }
        };

        let id = match self.registry.id_by_outer(header.outer_conn) {
            Some(id) => id,
            None => {
                debug!(from = %from, outer_conn = header.outer_conn, "Dropping SYN for unknown route");
                return;
            }
        };

        let (forward_to, exhausted) = match self.registry.get_mut(id) {
            Some(node) => {
                if node.inner_conn != header.inner_conn {
                    debug!(from = %from, outer_conn = header.outer_conn, "Dropping SYN with wrong inner conn");
                    return;
                }
                if node.sync_addr.ip() != from.ip() {
                    debug!(
                        from = %from,
                        expected_ip = %node.sync_addr.ip(),
                        outer_conn = header.outer_conn,
                        "Dropping SYN from wrong source IP"
                    );
                    return;
                }
                node.sync_count += 1;
                node.last_recv_outer_ms = now_ms;
                node.outer_addr = Some(from);
                (
                    node.inner_addr,
                    node.sync_count > self.config.router.limits.sync_limit,
                )
            }
            None => return,
        };

        if exhausted {
            self.evict_with_error(id, EvictReason::TooManySyncAttempts);
            return;
        }

        self.touch_outer(id, now_ms);
        if self.registry.get(id).is_none() {
            return;
        }

        // The connect id has served its purpose; only the stable pair
        // names this route from here on.
        self.registry.drop_connect_index(id);

        let client_addr = from.to_string();
        self.send_inner(
            &wire::build_syn_forward(header.outer_conn, header.inner_conn, &client_addr),
            forward_to,
        );
    }

    /// Established-path MSG and FIN, relayed inward untouched.
    fn on_outer_forward(&mut self, opcode: Opcode, data: &[u8], from: SocketAddr, now_ms: u64) {
        let header = match OuterHeader::parse(data) {
            Some(header) => header,
            None => {
                debug!(from = %from, opcode = %opcode, len = data.len(), "Dropping short outer frame");
                return;
            }
        };

        if opcode == Opcode::Fin && wire::fin_error(data).is_none() {
            debug!(from = %from, len = data.len(), "Dropping malformed FIN");
            return;
        }

        let id = match self.registry.id_by_outer(header.outer_conn) {
            Some(id) => id,
            None => {
                debug!(from = %from, outer_conn = header.outer_conn, opcode = %opcode, "Dropping outer frame for unknown route");
                return;
            }
        };

        let forward_to = match self.registry.get(id) {
            Some(node) => {
                // The conn pair is the sole credential on this path; the
                // source address is free to float behind a NAT.
                if node.inner_conn != header.inner_conn {
                    debug!(from = %from, outer_conn = header.outer_conn, "Dropping outer frame with wrong inner conn");
                    return;
                }
                if opcode == Opcode::Msg && node.status != super::NodeStatus::Msg {
                    debug!(from = %from, outer_conn = header.outer_conn, "Dropping MSG before handshake completion");
                    return;
                }
                node.inner_addr
            }
            None => return,
        };

        if let (Opcode::Fin, Some(error)) = (opcode, wire::fin_error(data)) {
            debug!(from = %from, outer_conn = header.outer_conn, error, "Forwarding FIN inward");
        }

        self.touch_outer(id, now_ms);
        if self.registry.get(id).is_none() {
            // Rate limiter evicted the route on this very datagram.
            return;
        }

        self.send_inner(data, forward_to);
    }
}
