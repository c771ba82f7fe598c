//! krelay: UDP relay router for KCP-style game traffic.
//!
//! Sits between publicly reachable game clients (the "outer" network) and
//! privately addressed game servers (the "inner" network). Clients that
//! cannot reach a game server directly route their unreliable-datagram
//! transport through this process, which is reachable from both sides.
//!
//! The router terminates no game logic. It forwards framed datagrams
//! between two UDP sockets while maintaining per-route identity, validating
//! origin, surviving client NAT rebinds via a reconnect handshake, and
//! garbage-collecting idle or abusive routes. Payloads beyond the 9–13 byte
//! routing header are opaque.

pub mod config;
pub mod router;
pub mod transport;
pub mod utils;

// Re-export config types
pub use config::{BuffersConfig, Config, ConfigError, LimitsConfig, RouterConfig};

// Re-export transport types
pub use transport::{RelaySocket, TransportError};

// Re-export router types
pub use router::{
    EvictReason, NodeId, NodeRegistry, NodeStatus, Router, RouterError, RouterNode,
};

// Re-export allocator types
pub use utils::conn::{ConnIdAllocator, ConnIdError};
