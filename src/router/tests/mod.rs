//! Router behavior tests.
//!
//! The harness binds a real router plus two peer sockets standing in for
//! the public client and the private game server. Most tests inject
//! datagrams through the dispatch entry points with a fabricated source
//! address and a synthetic clock, so address pinning and timeouts can be
//! exercised precisely; the end-to-end test below drives everything over
//! the actual sockets.


use super::wire::Opcode;
use super::Router;
use crate::config::Config;
use crate::transport::RelaySocket;
use crate::utils::time::now_ms;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

pub(super) struct Harness {
    pub router: Router,
    pub client: RelaySocket,
    pub server: RelaySocket,
    /// Synthetic clock for injected datagrams.
    pub now_ms: u64,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(|_| {})
    }

    pub fn with_config(adjust: impl FnOnce(&mut Config)) -> Self {
        let mut config = Config::new();
        config.router.outer_bind_addr = Some("127.0.0.1:0".to_string());
        config.router.inner_bind_ip = Some("127.0.0.1".to_string());
        adjust(&mut config);

        Self {
            router: Router::bind(config).unwrap(),
            client: bind_peer(),
            server: bind_peer(),
            now_ms: 1000,
        }
    }

    pub fn client_addr(&self) -> SocketAddr {
        self.client.local_addr()
    }

    pub fn server_addr(&self) -> SocketAddr {
        self.server.local_addr()
    }

    pub fn server_addr_string(&self) -> String {
        self.server.local_addr().to_string()
    }

    /// Inject an outer-socket datagram from the client peer.
    pub fn from_client(&mut self, data: &[u8]) {
        let from = self.client.local_addr();
        self.from_addr(data, from);
    }

    /// Inject an outer-socket datagram from an arbitrary address.
    pub fn from_addr(&mut self, data: &[u8], from: SocketAddr) {
        let now = self.now_ms;
        self.router.handle_outer_datagram(data, from, now);
    }

    /// Inject an inner-socket datagram from the server peer.
    pub fn from_server(&mut self, data: &[u8]) {
        let from = self.server.local_addr();
        let now = self.now_ms;
        self.router.handle_inner_datagram(data, from, now);
    }

    pub fn recv_client(&self) -> Option<Vec<u8>> {
        recv_for(&self.client, Duration::from_secs(1))
    }

    pub fn recv_server(&self) -> Option<Vec<u8>> {
        recv_for(&self.server, Duration::from_secs(1))
    }

    /// Assert-nothing-arrived helper with a short deadline.
    pub fn no_client_frame(&self) -> bool {
        recv_for(&self.client, Duration::from_millis(150)).is_none()
    }

    pub fn no_server_frame(&self) -> bool {
        recv_for(&self.server, Duration::from_millis(150)).is_none()
    }

    /// Drive `update` with the real clock until the client peer receives
    /// a datagram, for tests running over the actual sockets.
    pub fn pump_recv_client(&mut self) -> Option<Vec<u8>> {
        let deadline = Instant::now() + Duration::from_secs(2);
        let mut buf = [0u8; 2048];
        while Instant::now() < deadline {
            self.router.update(now_ms());
            if let Ok(Some((len, _))) = self.client.try_recv_from(&mut buf) {
                return Some(buf[..len].to_vec());
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        None
    }

    pub fn pump_recv_server(&mut self) -> Option<Vec<u8>> {
        let deadline = Instant::now() + Duration::from_secs(2);
        let mut buf = [0u8; 2048];
        while Instant::now() < deadline {
            self.router.update(now_ms());
            if let Ok(Some((len, _))) = self.server.try_recv_from(&mut buf) {
                return Some(buf[..len].to_vec());
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        None
    }
}

fn bind_peer() -> RelaySocket {
    RelaySocket::bind("127.0.0.1:0".parse().unwrap(), 1 << 20).unwrap()
}

fn recv_for(socket: &RelaySocket, timeout: Duration) -> Option<Vec<u8>> {
    let mut buf = [0u8; 2048];
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if let Ok(Some((len, _))) = socket.try_recv_from(&mut buf) {
            return Some(buf[..len].to_vec());
        }
        std::thread::sleep(Duration::from_millis(1));
    }
    None
}

// ===== Frame builders =====

pub(super) fn u32_at(data: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        data[offset],
        data[offset + 1],
        data[offset + 2],
        data[offset + 3],
    ])
}

fn syn_like(opcode: Opcode, outer_conn: u32, inner_conn: u32, connect_id: u32, addr: &str) -> Vec<u8> {
    let mut data = vec![opcode.as_byte()];
    data.extend_from_slice(&outer_conn.to_le_bytes());
    data.extend_from_slice(&inner_conn.to_le_bytes());
    data.extend_from_slice(&connect_id.to_le_bytes());
    data.extend_from_slice(addr.as_bytes());
    data
}

pub(super) fn router_syn(outer_conn: u32, inner_conn: u32, connect_id: u32, addr: &str) -> Vec<u8> {
    syn_like(Opcode::RouterSyn, outer_conn, inner_conn, connect_id, addr)
}

pub(super) fn reconnect_syn(outer_conn: u32, inner_conn: u32, connect_id: u32, addr: &str) -> Vec<u8> {
    syn_like(Opcode::ReconnectSyn, outer_conn, inner_conn, connect_id, addr)
}

pub(super) fn syn(outer_conn: u32, inner_conn: u32) -> Vec<u8> {
    let mut data = vec![Opcode::Syn.as_byte()];
    data.extend_from_slice(&outer_conn.to_le_bytes());
    data.extend_from_slice(&inner_conn.to_le_bytes());
    data
}

pub(super) fn ack(inner_conn: u32, outer_conn: u32) -> Vec<u8> {
    let mut data = vec![Opcode::Ack.as_byte()];
    data.extend_from_slice(&inner_conn.to_le_bytes());
    data.extend_from_slice(&outer_conn.to_le_bytes());
    data
}

pub(super) fn msg_outer(outer_conn: u32, inner_conn: u32, payload: &[u8]) -> Vec<u8> {
    let mut data = vec![Opcode::Msg.as_byte()];
    data.extend_from_slice(&outer_conn.to_le_bytes());
    data.extend_from_slice(&inner_conn.to_le_bytes());
    data.extend_from_slice(payload);
    data
}

pub(super) fn msg_inner(inner_conn: u32, outer_conn: u32, payload: &[u8]) -> Vec<u8> {
    let mut data = vec![Opcode::Msg.as_byte()];
    data.extend_from_slice(&inner_conn.to_le_bytes());
    data.extend_from_slice(&outer_conn.to_le_bytes());
    data.extend_from_slice(payload);
    data
}

pub(super) fn fin_outer(outer_conn: u32, inner_conn: u32, error: u32) -> Vec<u8> {
    let mut data = vec![Opcode::Fin.as_byte()];
    data.extend_from_slice(&outer_conn.to_le_bytes());
    data.extend_from_slice(&inner_conn.to_le_bytes());
    data.extend_from_slice(&error.to_le_bytes());
    data
}

pub(super) fn fin_inner(inner_conn: u32, outer_conn: u32, error: u32) -> Vec<u8> {
    let mut data = vec![Opcode::Fin.as_byte()];
    data.extend_from_slice(&inner_conn.to_le_bytes());
    data.extend_from_slice(&outer_conn.to_le_bytes());
    data.extend_from_slice(&error.to_le_bytes());
    data
}

pub(super) fn reconnect_ack_inner(inner_conn: u32, outer_conn: u32, connect_id: u32) -> Vec<u8> {
    let mut data = vec![Opcode::ReconnectAck.as_byte()];
    data.extend_from_slice(&inner_conn.to_le_bytes());
    data.extend_from_slice(&outer_conn.to_le_bytes());
    data.extend_from_slice(&connect_id.to_le_bytes());
    data
}

pub(super) const INNER_CONN: u32 = 7;
pub(super) const CONNECT_ID: u32 = 42;

/// Run the full handshake through the injection entry points. Returns the
/// assigned outer conn; the route is established and both peer queues are
/// drained.
pub(super) fn establish(h: &mut Harness) -> u32 {
    let server_addr = h.server_addr_string();
    h.from_client(&router_syn(0, INNER_CONN, CONNECT_ID, &server_addr));

    let router_ack = h.recv_client().expect("no RouterACK");
    assert_eq!(router_ack[0], Opcode::RouterAck.as_byte());
    let outer_conn = u32_at(&router_ack, 5);
    assert_ne!(outer_conn, 0);

    h.from_client(&syn(outer_conn, INNER_CONN));
    let forwarded = h.recv_server().expect("SYN not forwarded");
    assert_eq!(forwarded[0], Opcode::Syn.as_byte());

    h.from_server(&ack(INNER_CONN, outer_conn));
    let relayed = h.recv_client().expect("ACK not relayed");
    assert_eq!(relayed[0], Opcode::Ack.as_byte());

    outer_conn
}

#[test]
fn test_end_to_end_over_sockets() {
    let mut h = Harness::new();
    let outer_addr = h.router.outer_addr();
    let inner_addr = h.router.inner_addr();
    let server_addr = h.server.local_addr().to_string();

    // Route open.
    h.client
        .send_to(&router_syn(0, INNER_CONN, CONNECT_ID, &server_addr), outer_addr)
        .unwrap();
    let router_ack = h.pump_recv_client().expect("no RouterACK");
    assert_eq!(router_ack[0], Opcode::RouterAck.as_byte());
    assert_eq!(u32_at(&router_ack, 1), INNER_CONN);
    let outer_conn = u32_at(&router_ack, 5);

    // Client handshake leg; the forward carries the client's real address.
    h.client.send_to(&syn(outer_conn, INNER_CONN), outer_addr).unwrap();
    let forwarded = h.pump_recv_server().expect("SYN not forwarded");
    assert_eq!(forwarded[0], Opcode::Syn.as_byte());
    let appended = std::str::from_utf8(&forwarded[9..]).unwrap();
    assert_eq!(appended, h.client.local_addr().to_string());

    // Server accepts.
    h.server.send_to(&ack(INNER_CONN, outer_conn), inner_addr).unwrap();
    let relayed = h.pump_recv_client().expect("ACK not relayed");
    assert_eq!(relayed[0], Opcode::Ack.as_byte());

    // Payload both ways, untouched.
    let out_msg = msg_outer(outer_conn, INNER_CONN, b"ping");
    h.client.send_to(&out_msg, outer_addr).unwrap();
    assert_eq!(h.pump_recv_server().expect("MSG not forwarded"), out_msg);

    let in_msg = msg_inner(INNER_CONN, outer_conn, b"pong");
    h.server.send_to(&in_msg, inner_addr).unwrap();
    assert_eq!(h.pump_recv_client().expect("MSG not relayed"), in_msg);
}

#[test]
fn test_close_drops_all_routes() {
    let mut h = Harness::new();
    establish(&mut h);
    assert_eq!(h.router.registry().len(), 1);

    h.router.close();
    assert!(h.router.registry().is_empty());
}
