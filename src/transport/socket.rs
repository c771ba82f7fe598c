//! Non-blocking UDP socket wrapper.

use super::TransportError;
use socket2::{Domain, Protocol, Socket, Type};
use std::io;
use std::net::{SocketAddr, UdpSocket};
use tracing::{debug, warn};

/// A bound, non-blocking UDP socket.
///
/// Built through socket2 so the kernel buffers can be sized generously
/// before binding; under load a relay absorbs bursts far larger than the
/// platform default of a few hundred KiB.
#[derive(Debug)]
pub struct RelaySocket {
    socket: UdpSocket,
    local_addr: SocketAddr,
}

impl RelaySocket {
    /// Bind a non-blocking socket at `addr` with the requested kernel
    /// buffer sizes.
    ///
    /// Buffer sizing is best-effort: the OS may cap the value well below
    /// the request (e.g. unraised `rmem_max` on Linux), which is logged
    /// and not treated as fatal.
    pub fn bind(addr: SocketAddr, buffer_bytes: usize) -> Result<Self, TransportError> {
        let socket = Socket::new(Domain::for_address(addr), Type::DGRAM, Some(Protocol::UDP))
            .map_err(|e| TransportError::CreateFailed { addr, source: e })?;

        if let Err(e) = socket.set_recv_buffer_size(buffer_bytes) {
            warn!(addr = %addr, requested = buffer_bytes, error = %e, "Could not set receive buffer size");
        }
        if let Err(e) = socket.set_send_buffer_size(buffer_bytes) {
            warn!(addr = %addr, requested = buffer_bytes, error = %e, "Could not set send buffer size");
        }

        socket
            .set_nonblocking(true)
            .map_err(|e| TransportError::CreateFailed { addr, source: e })?;
        socket
            .bind(&addr.into())
            .map_err(|e| TransportError::BindFailed { addr, source: e })?;

        let socket: UdpSocket = socket.into();
        let local_addr = socket.local_addr().map_err(TransportError::LocalAddr)?;

        debug!(local_addr = %local_addr, "UDP socket bound");

        Ok(Self { socket, local_addr })
    }

    /// The bound local address.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Poll for one datagram. Returns `Ok(None)` when the receive queue is
    /// empty; any other error is surfaced for the caller to log and skip.
    pub fn try_recv_from(&self, buf: &mut [u8]) -> io::Result<Option<(usize, SocketAddr)>> {
        match self.socket.recv_from(buf) {
            Ok((len, from)) => Ok(Some((len, from))),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Send one datagram. A full send buffer (`WouldBlock`) drops the
    /// datagram, which is acceptable for an unreliable transport; the
    /// upstream protocol retransmits.
    pub fn send_to(&self, data: &[u8], addr: SocketAddr) -> io::Result<usize> {
        match self.socket.send_to(data, addr) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                debug!(addr = %addr, bytes = data.len(), "Send buffer full, datagram dropped");
                Ok(0)
            }
            Err(e) => Err(e),
        }
    }
}
