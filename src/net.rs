//! UDP socket helpers
//!
//! Thin facade over `std::net::UdpSocket`: endpoint creation for both link
//! roles, IPv4-preferring peer resolution, fractional-second receive
//! timeouts, and the mapping of timeout-kind errors to the non-fatal
//! "nothing received" case.

use crate::error::{Error, Result};
use std::io;
use std::net::{Ipv4Addr, SocketAddr, ToSocketAddrs, UdpSocket};
use std::time::Duration;

/// Bind the server-side endpoint on all interfaces
pub fn bind_server(port: u16) -> io::Result<UdpSocket> {
    UdpSocket::bind((Ipv4Addr::UNSPECIFIED, port))
}

/// Bind a client-side endpoint on an ephemeral port
pub fn bind_client() -> io::Result<UdpSocket> {
    UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))
}

/// Resolve the peer address, preferring IPv4.
///
/// Accepts a literal IPv4 address or a hostname. The link runs AF_INET
/// only, so an IPv6-only name is rejected.
pub fn resolve_peer(host: &str, port: u16) -> Result<SocketAddr> {
    let addrs = (host, port)
        .to_socket_addrs()
        .map_err(|e| Error::Resolve(format!("'{}': {}", host, e)))?;

    addrs
        .into_iter()
        .find(SocketAddr::is_ipv4)
        .ok_or_else(|| Error::Resolve(format!("'{}' has no IPv4 address", host)))
}

/// Apply a receive timeout in seconds-with-fraction.
///
/// Microsecond granularity is preserved by `Duration::from_secs_f64`. The
/// caller guarantees `secs > 0` (config validation); `set_read_timeout`
/// rejects a zero duration.
pub fn set_recv_timeout(socket: &UdpSocket, secs: f64) -> io::Result<()> {
    socket.set_read_timeout(Some(Duration::from_secs_f64(secs)))
}

/// True if a receive error just means the timeout elapsed.
///
/// POSIX reports `SO_RCVTIMEO` expiry as `EAGAIN`/`EWOULDBLOCK`
/// (`WouldBlock`), Windows as `WSAETIMEDOUT` (`TimedOut`). Both are normal
/// in the steady state and the loop continues.
pub fn is_timeout(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
    )
}
