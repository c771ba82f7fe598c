//! Inner (private) listener.
//!
//! Datagrams from game servers on the private network. The inner side
//! completes handshakes (ACK, ReconnectACK) and relays established traffic
//! back out to whatever client address the route currently holds. Frames
//! for which no forwarding address is known yet are dropped; the upstream
//! transport retransmits once the client's SYN lands.

use super::wire::{self, InnerHeader, Opcode, ReconnectAckFrame};
use super::{NodeStatus, Router};
use std::net::SocketAddr;
use tracing::{debug, info};

impl Router {
    /// Dispatch one inner-socket datagram.
    pub(crate) fn handle_inner_datagram(&mut self, data: &[u8], from: SocketAddr, now_ms: u64) {
        let opcode = match data.first().copied().and_then(Opcode::from_byte) {
            Some(op) => op,
            None => {
                debug!(from = %from, len = data.len(), "Dropping inner datagram with unknown opcode");
                return;
            }
        };

        match opcode {
            Opcode::Ack => self.on_ack(data, from, now_ms),
            Opcode::ReconnectAck => self.on_reconnect_ack(data, from, now_ms),
            Opcode::Msg | Opcode::Fin => self.on_inner_forward(opcode, data, from, now_ms),
            Opcode::Syn | Opcode::ReconnectSyn | Opcode::RouterSyn | Opcode::RouterAck => {
                debug!(from = %from, opcode = %opcode, "Dropping misdirected opcode on inner socket");
            }
        }
    }

    /// Server ACK completing the client-level handshake. The server is
    /// authoritative for the inner conn it presents here; the route adopts
    /// it and moves to established. The ACK itself is relayed to the
    /// client untouched.
    fn on_ack(&mut self, data: &[u8], from: SocketAddr, now_ms: u64) {
        let header = match InnerHeader::parse(data) {
            Some(header) => header,
            None => {
                debug!(from = %from, len = data.len(), "Dropping short ACK");
                return;
            }
        };

        let id = match self.registry.id_by_outer(header.outer_conn) {
            Some(id) => id,
            None => {
                debug!(from = %from, outer_conn = header.outer_conn, "Dropping ACK for unknown route");
                return;
            }
        };

        let forward_to = match self.registry.get_mut(id) {
            Some(node) => {
                let outer_addr = match node.outer_addr {
                    Some(addr) => addr,
                    None => {
                        // No client SYN has landed yet; nowhere to send.
                        debug!(from = %from, outer_conn = header.outer_conn, "Dropping ACK before client address known");
                        return;
                    }
                };
                node.inner_conn = header.inner_conn;
                node.status = NodeStatus::Msg;
                node.last_recv_inner_ms = now_ms;
                outer_addr
            }
            None => return,
        };

        info!(
            outer_conn = header.outer_conn,
            inner_conn = header.inner_conn,
            client = %forward_to,
            "Route established"
        );

        self.send_outer(data, forward_to);
    }

    /// Server ReconnectACK confirming a reconnect attempt. Looked up by the
    /// connect id the attempt used; both stable ids must match exactly.
    /// The echo to the client is the 9-byte form, connect id stripped.
    fn on_reconnect_ack(&mut self, data: &[u8], from: SocketAddr, now_ms: u64) {
        let frame = match ReconnectAckFrame::parse(data) {
            Some(frame) => frame,
            None => {
                debug!(from = %from, len = data.len(), "Dropping malformed ReconnectACK");
                return;
            }
        };

        let id = match self.registry.id_by_connect(frame.connect_id) {
            Some(id) => id,
            None => {
                debug!(from = %from, connect_id = frame.connect_id, "Dropping ReconnectACK for unknown attempt");
                return;
            }
        };

        let reply_to = match self.registry.get_mut(id) {
            Some(node) => {
                if node.inner_conn != frame.inner_conn || node.outer_conn != frame.outer_conn {
                    debug!(
                        from = %from,
                        connect_id = frame.connect_id,
                        "Dropping ReconnectACK with mismatched conn pair"
                    );
                    return;
                }
                node.status = NodeStatus::Msg;
                node.outer_addr = Some(node.sync_addr);
                node.last_recv_inner_ms = now_ms;
                node.sync_addr
            }
            None => return,
        };

        // The outer conn slot must resolve to this node before forwarding
        // can key on it.
        if !self.registry.promote(id) {
            debug!(outer_conn = frame.outer_conn, "Dropping ReconnectACK, outer conn slot taken");
            return;
        }

        info!(
            outer_conn = frame.outer_conn,
            inner_conn = frame.inner_conn,
            client = %reply_to,
            "Route re-established"
        );

        // The connect index stays live so a retransmitted ReconnectSYN
        // still resolves here if this echo is lost; the sweeper retires it.
        self.send_outer(
            &wire::build_reconnect_ack(frame.inner_conn, frame.outer_conn),
            reply_to,
        );
    }

    /// Established-path MSG and FIN from the server, relayed outward
    /// untouched to the client's current address.
    fn on_inner_forward(&mut self, opcode: Opcode, data: &[u8], from: SocketAddr, now_ms: u64) {
        let header = match InnerHeader::parse(data) {
            Some(header) => header,
            None => {
                debug!(from = %from, opcode = %opcode, len = data.len(), "Dropping short inner frame");
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
                debug!(from = %from, outer_conn = header.outer_conn, opcode = %opcode, "Dropping inner frame for unknown route");
                return;
            }
        };

        let forward_to = match self.registry.get_mut(id) {
            Some(node) => {
                if node.inner_conn != header.inner_conn {
                    debug!(from = %from, outer_conn = header.outer_conn, "Dropping inner frame with wrong inner conn");
                    return;
                }
                let outer_addr = match node.outer_addr {
                    Some(addr) => addr,
                    None => {
                        debug!(from = %from, outer_conn = header.outer_conn, "Dropping inner frame before client address known");
                        return;
                    }
                };
                node.last_recv_inner_ms = now_ms;
                outer_addr
            }
            None => return,
        };

        if let (Opcode::Fin, Some(error)) = (opcode, wire::fin_error(data)) {
            debug!(from = %from, outer_conn = header.outer_conn, error, "Forwarding FIN outward");
        }

        self.send_outer(data, forward_to);
    }
}
