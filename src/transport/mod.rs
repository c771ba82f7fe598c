//! Transport Layer
//!
//! Non-blocking UDP sockets for the relay. The router owns exactly two:
//! one bound to the public ("outer") endpoint and one bound to a private
//! ("inner") address on an ephemeral port. Receive never blocks; the drain
//! loop in `Router::update` polls until the queue is empty or the per-tick
//! budget runs out.

pub mod socket;

pub use socket::RelaySocket;

use std::net::SocketAddr;
use thiserror::Error;

/// Errors related to socket setup and I/O.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to create socket for {addr}: {source}")]
    CreateFailed {
        addr: SocketAddr,
        source: std::io::Error,
    },

    #[error("failed to bind {addr}: {source}")]
    BindFailed {
        addr: SocketAddr,
        source: std::io::Error,
    },

    #[error("failed to read local address: {0}")]
    LocalAddr(#[source] std::io::Error),
}
