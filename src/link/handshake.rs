//! Width negotiation handshake
//!
//! Before streaming starts, the peers exchange one fixed-size datagram each
//! so both sides can verify the vector widths mirror each other and learn
//! the counterpart's sample encoding and staleness horizon.
//!
//! # Wire Format
//!
//! Exactly 7 bytes, all multi-byte fields little-endian:
//!
//! ```text
//! ┌──────────────────┬─────────────────┬───────────┬──────────────────┐
//! │ num_outputs (u16)│ num_inputs (u16)│ tag (u8)  │ max_age_s (u16)  │
//! └──────────────────┴─────────────────┴───────────┴──────────────────┘
//! ```
//!
//! The handshake is not CRC-framed; any datagram that is not exactly 7
//! bytes fails the negotiation. The client sends first and adopts the
//! address it hears the reply from (NAT and ephemeral-port rewrites change
//! the apparent peer address); the server replies to whatever address the
//! request came from and adopts that.

use crate::error::{Error, Result};
use crate::net;
use std::net::{SocketAddr, UdpSocket};
use std::time::Duration;

/// Handshake datagram size on the wire
pub const HANDSHAKE_LEN: usize = 7;

/// One side's advertisement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Handshake {
    /// Vector width this side transmits
    pub num_outputs: u16,
    /// Vector width this side expects to receive
    pub num_inputs: u16,
    /// Sample encoding tag (raw byte; unknown tags are carried as-is)
    pub send_type: u8,
    /// Staleness horizon in whole seconds, truncated to u16
    pub max_age_secs: u16,
}

impl Handshake {
    pub fn encode(&self) -> [u8; HANDSHAKE_LEN] {
        let mut buf = [0u8; HANDSHAKE_LEN];
        buf[0..2].copy_from_slice(&self.num_outputs.to_le_bytes());
        buf[2..4].copy_from_slice(&self.num_inputs.to_le_bytes());
        buf[4] = self.send_type;
        buf[5..7].copy_from_slice(&self.max_age_secs.to_le_bytes());
        buf
    }

    /// Parse a handshake datagram; anything but exactly 7 bytes is rejected
    pub fn decode(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != HANDSHAKE_LEN {
            return None;
        }
        Some(Self {
            num_outputs: u16::from_le_bytes([bytes[0], bytes[1]]),
            num_inputs: u16::from_le_bytes([bytes[2], bytes[3]]),
            send_type: bytes[4],
            max_age_secs: u16::from_le_bytes([bytes[5], bytes[6]]),
        })
    }
}

/// Check that the peer's advertised widths mirror ours.
pub(crate) fn validate_widths(ours: &Handshake, peer: &Handshake) -> Result<()> {
    if peer.num_inputs != ours.num_outputs {
        return Err(Error::Handshake(format!(
            "width mismatch: peer expects {} values per packet, we provide {}",
            peer.num_inputs, ours.num_outputs
        )));
    }
    if peer.num_outputs != ours.num_inputs {
        return Err(Error::Handshake(format!(
            "width mismatch: peer provides {} values per packet, we expect {}",
            peer.num_outputs, ours.num_inputs
        )));
    }
    Ok(())
}

/// Run the exchange and return the peer's advertisement plus the address to
/// use for the steady state.
///
/// The socket's receive timeout is swapped to `timeout` for the exchange
/// and restored to the steady-state value afterwards, success or not.
pub(super) fn exchange(
    socket: &UdpSocket,
    is_server: bool,
    remote: Option<SocketAddr>,
    ours: &Handshake,
    timeout: Duration,
    steady_timeout_secs: f64,
) -> Result<(Handshake, SocketAddr)> {
    socket
        .set_read_timeout(Some(timeout))
        .map_err(|e| Error::Handshake(format!("failed to set handshake timeout: {}", e)))?;

    let result = if is_server {
        exchange_server(socket, ours)
    } else {
        exchange_client(socket, remote, ours)
    };

    if let Err(e) = net::set_recv_timeout(socket, steady_timeout_secs) {
        log::warn!("Failed to restore receive timeout after handshake: {}", e);
    }

    result
}

fn exchange_client(
    socket: &UdpSocket,
    remote: Option<SocketAddr>,
    ours: &Handshake,
) -> Result<(Handshake, SocketAddr)> {
    let remote = remote.ok_or(Error::InvalidState("no remote address configured"))?;

    log::info!("Sending handshake to {}", remote);
    socket
        .send_to(&ours.encode(), remote)
        .map_err(|e| Error::Handshake(format!("send to {} failed: {}", remote, e)))?;

    recv_peer(socket)
}

fn exchange_server(socket: &UdpSocket, ours: &Handshake) -> Result<(Handshake, SocketAddr)> {
    log::info!("Waiting for handshake...");
    let (peer, peer_addr) = recv_peer(socket)?;

    socket
        .send_to(&ours.encode(), peer_addr)
        .map_err(|e| Error::Handshake(format!("reply to {} failed: {}", peer_addr, e)))?;

    Ok((peer, peer_addr))
}

/// Receive one datagram and require it to be a well-formed handshake.
fn recv_peer(socket: &UdpSocket) -> Result<(Handshake, SocketAddr)> {
    // Oversized datagrams must fail, so the buffer is larger than the frame
    let mut buf = [0u8; 2 * HANDSHAKE_LEN];

    let (n, peer_addr) = socket.recv_from(&mut buf).map_err(|e| {
        if net::is_timeout(&e) {
            Error::Handshake("timed out waiting for peer".to_string())
        } else {
            Error::Handshake(format!("receive failed: {}", e))
        }
    })?;

    let peer = Handshake::decode(&buf[..n]).ok_or_else(|| {
        Error::Handshake(format!(
            "malformed handshake: got {} bytes, expected {}",
            n, HANDSHAKE_LEN
        ))
    })?;

    Ok((peer, peer_addr))
}
