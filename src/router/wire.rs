//! Wire Format Parsing and Serialization
//!
//! Defines the relay framing used on both sockets. Every datagram begins
//! with a single opcode byte; the remainder is opcode-specific. All
//! multi-byte integers are little-endian unsigned 32-bit.
//!
//! ## Opcodes
//!
//! | Opcode | Byte | Direction            | Layout after opcode byte                         |
//! |--------|------|----------------------|--------------------------------------------------|
//! | SYN    | 0x01 | outer → router → inner | outerConn(4) innerConn(4) [+clientAddr inward] |
//! | ACK    | 0x02 | inner → router → outer | innerConn(4) outerConn(4)                      |
//! | FIN    | 0x03 | either               | conn pair(8) error(4)                            |
//! | MSG    | 0x04 | either               | conn pair(8) opaque payload                      |
//! | ReconnectSYN | 0x05 | outer → router  | outerConn(4) innerConn(4) connectId(4) innerAddr |
//! | ReconnectACK | 0x06 | inner → router → outer | innerConn(4) outerConn(4) [connectId(4) inner side only] |
//! | RouterSYN    | 0x07 | outer → router  | outerConn(4) innerConn(4) connectId(4) innerAddr |
//! | RouterACK    | 0x08 | router → outer  | innerConn(4) outerConn(4)                        |
//!
//! The conn pair is directional: frames arriving on the outer socket carry
//! `outerConn` first, frames arriving on the inner socket carry `innerConn`
//! first. MSG payloads are never inspected; only the fixed header needed
//! for routing is read.

// ============================================================================
// Constants
// ============================================================================

/// Size of the opcode byte plus the conn pair (SYN, ACK, MSG header,
/// RouterACK, outbound ReconnectACK).
pub const CONN_HEADER_SIZE: usize = 9;

/// Size of a FIN frame: conn pair plus a u32 error code.
pub const FIN_SIZE: usize = 13;

/// Size of an inner-side ReconnectACK: conn pair plus connect id.
pub const RECONNECT_ACK_SIZE: usize = 13;

/// Minimum size of RouterSYN / ReconnectSYN: three u32 fields plus at
/// least one byte of inner address.
pub const ROUTER_SYN_MIN_SIZE: usize = 14;

// ============================================================================
// Opcode
// ============================================================================

/// Relay frame opcode. Byte values are fixed by the upstream transport.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum Opcode {
    /// Client-side handshake leg, forwarded inward with the client address.
    Syn = 0x01,
    /// Inner server handshake acknowledgment, forwarded outward.
    Ack = 0x02,
    /// Close notification, forwarded opaque in either direction.
    Fin = 0x03,
    /// Established payload traffic, forwarded opaque in either direction.
    Msg = 0x04,
    /// Router-level reconnect handshake after a client NAT rebind.
    ReconnectSyn = 0x05,
    /// Inner server reconnect acknowledgment, echoed outward.
    ReconnectAck = 0x06,
    /// Router-level handshake opening a new route.
    RouterSyn = 0x07,
    /// Router's direct reply to RouterSYN.
    RouterAck = 0x08,
}

impl Opcode {
    /// Parse an opcode byte. Unknown bytes yield `None` and the datagram
    /// is dropped by the caller.
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x01 => Some(Opcode::Syn),
            0x02 => Some(Opcode::Ack),
            0x03 => Some(Opcode::Fin),
            0x04 => Some(Opcode::Msg),
            0x05 => Some(Opcode::ReconnectSyn),
            0x06 => Some(Opcode::ReconnectAck),
            0x07 => Some(Opcode::RouterSyn),
            0x08 => Some(Opcode::RouterAck),
            _ => None,
        }
    }

    /// The wire byte for this opcode.
    pub fn as_byte(self) -> u8 {
        self as u8
    }
}

impl std::fmt::Display for Opcode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Opcode::Syn => "SYN",
            Opcode::Ack => "ACK",
            Opcode::Fin => "FIN",
            Opcode::Msg => "MSG",
            Opcode::ReconnectSyn => "ReconnectSYN",
            Opcode::ReconnectAck => "ReconnectACK",
            Opcode::RouterSyn => "RouterSYN",
            Opcode::RouterAck => "RouterACK",
        };
        write!(f, "{}", s)
    }
}

// ============================================================================
// Frame headers
// ============================================================================

fn read_u32(data: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        data[offset],
        data[offset + 1],
        data[offset + 2],
        data[offset + 3],
    ])
}

/// Parsed RouterSYN / ReconnectSYN frame (both share one layout).
///
/// Wire format (>= 14 bytes):
/// ```text
/// [opcode:1][outer_conn:4 LE][inner_conn:4 LE][connect_id:4 LE][inner_addr UTF-8]
/// ```
#[derive(Clone, Debug)]
pub struct RouterSynFrame {
    /// Stable route id, zero on a first handshake (not yet assigned).
    pub outer_conn: u32,
    /// Client-known inner connection id.
    pub inner_conn: u32,
    /// Transient client-chosen handshake key.
    pub connect_id: u32,
    /// Raw "ip:port" string naming the private game server endpoint.
    pub inner_addr: String,
}

impl RouterSynFrame {
    /// Parse from a full datagram. Returns `None` on wrong opcode, short
    /// datagram, or a non-UTF-8 address.
    pub fn parse(data: &[u8]) -> Option<Self> {
        if data.len() < ROUTER_SYN_MIN_SIZE {
            return None;
        }
        match Opcode::from_byte(data[0]) {
            Some(Opcode::RouterSyn) | Some(Opcode::ReconnectSyn) => {}
            _ => return None,
        }

        let inner_addr = std::str::from_utf8(&data[13..]).ok()?.to_string();

        Some(Self {
            outer_conn: read_u32(data, 1),
            inner_conn: read_u32(data, 5),
            connect_id: read_u32(data, 9),
            inner_addr,
        })
    }
}

/// Parsed conn pair from a frame arriving on the outer socket.
///
/// Wire format (>= 9 bytes):
/// ```text
/// [opcode:1][outer_conn:4 LE][inner_conn:4 LE][...]
/// ```
#[derive(Clone, Copy, Debug)]
pub struct OuterHeader {
    pub outer_conn: u32,
    pub inner_conn: u32,
}

impl OuterHeader {
    /// Parse from a full datagram. The opcode byte is the caller's to
    /// dispatch on; only the length is checked here.
    pub fn parse(data: &[u8]) -> Option<Self> {
        if data.len() < CONN_HEADER_SIZE {
            return None;
        }
        Some(Self {
            outer_conn: read_u32(data, 1),
            inner_conn: read_u32(data, 5),
        })
    }
}

/// Parsed conn pair from a frame arriving on the inner socket.
///
/// Wire format (>= 9 bytes):
/// ```text
/// [opcode:1][inner_conn:4 LE][outer_conn:4 LE][...]
/// ```
#[derive(Clone, Copy, Debug)]
pub struct InnerHeader {
    pub inner_conn: u32,
    pub outer_conn: u32,
}

impl InnerHeader {
    /// Parse from a full datagram.
    pub fn parse(data: &[u8]) -> Option<Self> {
        if data.len() < CONN_HEADER_SIZE {
            return None;
        }
        Some(Self {
            inner_conn: read_u32(data, 1),
            outer_conn: read_u32(data, 5),
        })
    }
}

/// Parsed inner-side ReconnectACK frame.
///
/// Wire format (exactly 13 bytes):
/// ```text
/// [0x06][inner_conn:4 LE][outer_conn:4 LE][connect_id:4 LE]
/// ```
#[derive(Clone, Copy, Debug)]
pub struct ReconnectAckFrame {
    pub inner_conn: u32,
    pub outer_conn: u32,
    pub connect_id: u32,
}

impl ReconnectAckFrame {
    /// Parse from a full datagram. Returns `None` on wrong opcode or size.
    pub fn parse(data: &[u8]) -> Option<Self> {
        if data.len() != RECONNECT_ACK_SIZE {
            return None;
        }
        if data[0] != Opcode::ReconnectAck.as_byte() {
            return None;
        }
        Some(Self {
            inner_conn: read_u32(data, 1),
            outer_conn: read_u32(data, 5),
            connect_id: read_u32(data, 9),
        })
    }
}

/// FIN error code, carried after the conn pair. Opaque to the router,
/// read only for logging.
pub fn fin_error(data: &[u8]) -> Option<u32> {
    if data.len() != FIN_SIZE {
        return None;
    }
    Some(read_u32(data, 9))
}

// ============================================================================
// Serialization helpers
// ============================================================================

fn build_conn_pair(opcode: Opcode, first: u32, second: u32) -> Vec<u8> {
    let mut packet = Vec::with_capacity(CONN_HEADER_SIZE);
    packet.push(opcode.as_byte());
    packet.extend_from_slice(&first.to_le_bytes());
    packet.extend_from_slice(&second.to_le_bytes());
    packet
}

/// Build a RouterACK reply to the client.
///
/// Format: `[0x08][inner_conn:4 LE][outer_conn:4 LE]`
pub fn build_router_ack(inner_conn: u32, outer_conn: u32) -> Vec<u8> {
    build_conn_pair(Opcode::RouterAck, inner_conn, outer_conn)
}

/// Build the outbound ReconnectACK echoed to the client (connect id stripped).
///
/// Format: `[0x06][inner_conn:4 LE][outer_conn:4 LE]`
pub fn build_reconnect_ack(inner_conn: u32, outer_conn: u32) -> Vec<u8> {
    build_conn_pair(Opcode::ReconnectAck, inner_conn, outer_conn)
}

/// Build the inward SYN forward with the true client address appended,
/// so the game server can log and bind the real client identity.
///
/// Format: `[0x01][outer_conn:4 LE][inner_conn:4 LE][client_addr UTF-8]`
pub fn build_syn_forward(outer_conn: u32, inner_conn: u32, client_addr: &str) -> Vec<u8> {
    let mut packet = Vec::with_capacity(CONN_HEADER_SIZE + client_addr.len());
    packet.push(Opcode::Syn.as_byte());
    packet.extend_from_slice(&outer_conn.to_le_bytes());
    packet.extend_from_slice(&inner_conn.to_le_bytes());
    packet.extend_from_slice(client_addr.as_bytes());
    packet
}

// ============================================================================
// Tests
// ============================================================================
