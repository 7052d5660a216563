//! UDP sample link
//!
//! This module manages one bidirectional UDP channel: lifecycle, the worker
//! threads, and the consumer-facing latest-sample delivery.
//!
//! # Architecture
//!
//! ## Thread Model
//!
//! 1. **Receive Thread** (continuous):
//!    - Blocks on the socket with the steady-state timeout
//!    - Validates framing (length, CRC, shape) into the packet counters
//!    - Publishes the newest intact sample under the data lock
//!    - On a fatal receive error: signals the supervisor and exits
//!
//! 2. **Watchdog Thread** (100 ms cycle, only when `num_inputs > 0`):
//!    - Compares time-since-last-packet against the staleness limit
//!    - On a stalled channel: signals the supervisor once and exits
//!
//! ## Lifecycle
//!
//! ```text
//! Fresh ──setup()──▶ Bound ──handshake()──▶ Ready ──start()──▶ Running
//!                                                                  │
//!                                              close() / Drop      ▼
//!                                                               Closed
//! ```
//!
//! Transitions are irreversible; a closed link cannot be revived. `close()`
//! is idempotent and callable from any state. A failed `setup()` leaves the
//! link Fresh, a failed `handshake()` leaves it Bound.
//!
//! ## Synchronization Strategy
//!
//! One `parking_lot` mutex guards the latest-sample slot, timestamps,
//! counters and delay statistics; `running`/`stop_requested` are SeqCst
//! atomics. Critical sections are a few field writes, held well under a
//! microsecond. Shutdown is cooperative: `close()` raises the stop flag and
//! joins both workers — the receive thread wakes within one socket timeout,
//! the watchdog within one poll period.
//!
//! ## Delivery Semantics
//!
//! Latest-only, at-most-once: a sample is handed to a consumer at most one
//! time, a newer sample silently replaces an unconsumed older one, and a
//! sample older than the staleness horizon is expired instead of delivered.
//! There is deliberately no queue — consumers that fall behind get the
//! newest state, not a backlog.

mod handshake;
mod receiver;
mod state;
mod watchdog;

pub use handshake::HANDSHAKE_LEN;

use crate::cleanup::CleanupClient;
use crate::config::LinkConfig;
use crate::error::{Error, Result};
use crate::frame;
use crate::net;
use handshake::Handshake;
use state::SharedState;
use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Default negotiation timeout
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(15);

/// Link lifecycle state. Transitions are irreversible.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Fresh,
    Bound,
    Ready,
    Running,
    Closed,
}

/// Point-in-time snapshot of counters, liveness and negotiated parameters.
#[derive(Debug, Clone)]
pub struct LinkStatus {
    pub running: bool,
    pub packets_received: u64,
    pub packets_sent: u64,
    pub packets_expired: u64,
    pub packets_corrupted: u64,
    pub packets_shape_invalid: u64,
    /// Seconds since the newest intact packet; `None` before `start()`
    pub time_since_last_packet: Option<f64>,
    /// True iff a sample (consumed or not) is held in the slot
    pub has_data: bool,
    /// Peer's advertised sample tag; `None` before the handshake
    pub receive_type: Option<char>,
    pub send_type: char,
    pub num_inputs: u16,
    pub num_outputs: u16,
}

/// Bidirectional UDP sample link.
///
/// One side binds as the server, the other initiates as the client; after
/// the width handshake both stream CRC-framed f32 vectors symmetrically.
///
/// # Examples
///
/// ```no_run
/// use setu_io::{LinkConfig, UdpLink, DEFAULT_HANDSHAKE_TIMEOUT};
///
/// # fn main() -> setu_io::Result<()> {
/// let mut link = UdpLink::new(LinkConfig::default())?;
/// link.setup("192.168.1.40", 9500, 4, 2, false)?;
/// link.handshake(DEFAULT_HANDSHAKE_TIMEOUT)?;
/// link.start()?;
///
/// link.send(&[0.25, -0.5])?;
/// if let Some(values) = link.get_latest() {
///     println!("joystick: {:?}", values);
/// }
///
/// link.close()?;
/// # Ok(())
/// # }
/// ```
pub struct UdpLink {
    config: LinkConfig,
    state: LinkState,

    /// Data slot, counters and stop flags shared with the workers
    shared: Arc<SharedState>,
    /// Distress channel to the supervisor; present from setup to close
    cleanup: Option<Arc<CleanupClient>>,
    /// UDP endpoint; present from setup to close
    socket: Option<Arc<UdpSocket>>,
    remote_addr: Option<SocketAddr>,
    is_server: bool,

    num_inputs: u16,
    num_outputs: u16,
    /// Peer's advertised sample tag (recorded, not enforced)
    receive_type: Option<u8>,
    /// Peer's advertised staleness horizon in whole seconds
    remote_max_age: Option<u16>,

    recv_handle: Option<JoinHandle<()>>,
    watchdog_handle: Option<JoinHandle<()>>,
}

impl UdpLink {
    /// Create an unconnected link from a validated configuration.
    pub fn new(config: LinkConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            state: LinkState::Fresh,
            shared: Arc::new(SharedState::new()),
            cleanup: None,
            socket: None,
            remote_addr: None,
            is_server: false,
            num_inputs: 0,
            num_outputs: 0,
            receive_type: None,
            remote_max_age: None,
            recv_handle: None,
            watchdog_handle: None,
        })
    }

    /// Connect the supervisor channel and create the UDP endpoint.
    ///
    /// Servers bind `0.0.0.0:port`; clients bind an ephemeral port and
    /// resolve `host:port` as the peer. On any failure the link is torn
    /// back down to Fresh.
    pub fn setup(
        &mut self,
        host: &str,
        port: u16,
        num_inputs: u16,
        num_outputs: u16,
        is_server: bool,
    ) -> Result<()> {
        if self.state != LinkState::Fresh {
            return Err(Error::InvalidState("setup requires a fresh link"));
        }

        // Supervisor channel comes first: without it nobody could clean up
        // after a mid-run failure, so the link refuses to come up at all.
        let cleanup = Arc::new(CleanupClient::connect(self.config.tcp_port)?);

        match self.open_socket(host, port, is_server) {
            Ok(()) => {}
            Err(e) => {
                cleanup.close();
                self.socket = None;
                self.remote_addr = None;
                return Err(e);
            }
        }

        self.cleanup = Some(cleanup);
        self.num_inputs = num_inputs;
        self.num_outputs = num_outputs;
        self.is_server = is_server;
        self.state = LinkState::Bound;
        Ok(())
    }

    fn open_socket(&mut self, host: &str, port: u16, is_server: bool) -> Result<()> {
        let socket = if is_server {
            let socket = net::bind_server(port)?;
            log::debug!("UDP server bound to port {}", port);
            socket
        } else {
            let socket = net::bind_client()?;
            self.remote_addr = Some(net::resolve_peer(host, port)?);
            log::debug!("UDP client prepared for {}:{}", host, port);
            socket
        };

        net::set_recv_timeout(&socket, self.config.socket_timeout_sec)?;
        self.socket = Some(Arc::new(socket));
        Ok(())
    }

    /// Exchange handshakes with the peer and validate vector widths.
    ///
    /// The peer's advertisement (sample tag, staleness horizon, observed
    /// address) is recorded before validation; a width mismatch leaves the
    /// link Bound so the handshake may be retried.
    pub fn handshake(&mut self, timeout: Duration) -> Result<()> {
        if self.state != LinkState::Bound {
            return Err(Error::InvalidState("handshake requires a bound link"));
        }
        let socket = self
            .socket
            .as_ref()
            .ok_or(Error::InvalidState("socket not initialized"))?;

        let ours = Handshake {
            num_outputs: self.num_outputs,
            num_inputs: self.num_inputs,
            send_type: self.config.send_type.tag(),
            // Whole seconds on the wire; fractional horizons stay local
            max_age_secs: self.config.max_age_seconds as u16,
        };

        let (peer, peer_addr) = handshake::exchange(
            socket,
            self.is_server,
            self.remote_addr,
            &ours,
            timeout,
            self.config.socket_timeout_sec,
        )?;

        self.remote_addr = Some(peer_addr);
        self.receive_type = Some(peer.send_type);
        self.remote_max_age = Some(peer.max_age_secs);

        handshake::validate_widths(&ours, &peer)?;

        log::debug!(
            "Handshake OK | peer {}: provides {}, expects {}, type '{}', max_age {} s | local: provides {}, expects {}",
            peer_addr,
            peer.num_outputs,
            peer.num_inputs,
            peer.send_type as char,
            peer.max_age_secs,
            self.num_outputs,
            self.num_inputs,
        );

        self.state = LinkState::Ready;
        Ok(())
    }

    /// Spawn the receive thread and (when inbound data is expected) the
    /// watchdog. Idempotent while Running.
    pub fn start(&mut self) -> Result<()> {
        if self.state == LinkState::Running {
            return Ok(());
        }
        if self.state != LinkState::Ready {
            return Err(Error::InvalidState("start requires a completed handshake"));
        }
        let socket = Arc::clone(
            self.socket
                .as_ref()
                .ok_or(Error::InvalidState("socket not initialized"))?,
        );
        let cleanup = Arc::clone(
            self.cleanup
                .as_ref()
                .ok_or(Error::InvalidState("supervisor not connected"))?,
        );

        self.shared.stop_requested.store(false, Ordering::SeqCst);
        self.shared.running.store(true, Ordering::SeqCst);
        // Seed the silence baseline so the watchdog measures from link start
        self.shared.data.lock().last_packet_time = Some(Instant::now());

        let recv_shared = Arc::clone(&self.shared);
        let recv_cleanup = Arc::clone(&cleanup);
        let num_inputs = self.num_inputs;
        let delay_tracking = self.config.delay_tracking;
        let debug_enabled = self.config.debug_enabled;
        self.recv_handle = Some(
            thread::Builder::new()
                .name("setu-recv".to_string())
                .spawn(move || {
                    receiver::receive_loop(
                        socket,
                        recv_shared,
                        recv_cleanup,
                        num_inputs,
                        delay_tracking,
                        debug_enabled,
                    );
                })
                .map_err(Error::Io)?,
        );

        // Watchdog only makes sense when something is expected to arrive
        if self.num_inputs > 0 {
            let limit = watchdog::staleness_limit(self.config.max_age_seconds);
            let wd_shared = Arc::clone(&self.shared);
            let wd_cleanup = Arc::clone(&cleanup);
            self.watchdog_handle = Some(
                thread::Builder::new()
                    .name("setu-watchdog".to_string())
                    .spawn(move || watchdog::watchdog_loop(wd_shared, wd_cleanup, limit))
                    .map_err(Error::Io)?,
            );
            log::info!("Watchdog started (staleness limit {} s)", limit.as_secs());
        }

        self.state = LinkState::Running;
        log::info!("Link started");
        Ok(())
    }

    /// Frame and transmit one outgoing sample vector.
    ///
    /// A send failure is returned to the caller but does not change the
    /// link state; UDP send failures are typically transient.
    pub fn send(&self, values: &[f32]) -> Result<()> {
        if self.state == LinkState::Fresh || self.state == LinkState::Closed {
            return Err(Error::InvalidState("send requires a bound link"));
        }
        let socket = self
            .socket
            .as_ref()
            .ok_or(Error::InvalidState("socket not initialized"))?;
        let remote = self
            .remote_addr
            .ok_or(Error::InvalidState("no remote address set"))?;

        if values.len() != self.num_outputs as usize {
            return Err(Error::ShapeMismatch {
                expected: self.num_outputs as usize,
                got: values.len(),
            });
        }

        match socket.send_to(&frame::encode(values), remote) {
            Ok(_) => {
                self.shared.data.lock().counters.sent += 1;
                Ok(())
            }
            Err(e) => {
                log::error!("Send to {} failed: {}", remote, e);
                Err(Error::Io(e))
            }
        }
    }

    /// Take the latest sample if it is fresh and not yet consumed.
    ///
    /// Returns each produced sample at most once. A sample older than the
    /// staleness horizon is counted as expired and withheld; the next
    /// intact packet replaces it.
    pub fn get_latest(&self) -> Option<Vec<f32>> {
        let mut data = self.shared.data.lock();
        if data.latest.is_none() || data.consumed {
            return None;
        }

        let age = data.last_packet_time?.elapsed().as_secs_f64();
        if age > self.config.max_age_seconds {
            data.counters.expired += 1;
            return None;
        }

        data.consumed = true;
        data.latest.clone()
    }

    /// Snapshot counters, liveness and negotiated parameters.
    pub fn get_status(&self) -> LinkStatus {
        let data = self.shared.data.lock();
        LinkStatus {
            running: self.shared.running.load(Ordering::SeqCst),
            packets_received: data.counters.received,
            packets_sent: data.counters.sent,
            packets_expired: data.counters.expired,
            packets_corrupted: data.counters.corrupted,
            packets_shape_invalid: data.counters.shape_invalid,
            time_since_last_packet: data.last_packet_time.map(|t| t.elapsed().as_secs_f64()),
            has_data: data.latest.is_some(),
            receive_type: self.receive_type.map(char::from),
            send_type: char::from(self.config.send_type.tag()),
            num_inputs: self.num_inputs,
            num_outputs: self.num_outputs,
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> LinkState {
        self.state
    }

    /// Peer's advertised staleness horizon, once negotiated
    pub fn remote_max_age(&self) -> Option<u16> {
        self.remote_max_age
    }

    /// Local address of the UDP endpoint, once bound
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.socket.as_ref().and_then(|s| s.local_addr().ok())
    }

    /// Size in bytes of a well-formed incoming datagram
    pub fn get_expected_recv_packet_size(&self) -> usize {
        self.num_inputs as usize * frame::SAMPLE_LEN + frame::CRC_LEN
    }

    /// Stop the workers, release the socket and drop the supervisor
    /// connection. Idempotent; safe from any state.
    pub fn close(&mut self) -> Result<()> {
        if self.state == LinkState::Closed {
            return Ok(());
        }
        log::info!("Closing link");

        self.shared.stop_requested.store(true, Ordering::SeqCst);
        self.shared.running.store(false, Ordering::SeqCst);

        // Receive thread wakes within one socket timeout, watchdog within
        // one poll period, so both joins are bounded.
        let mut panicked = false;
        if let Some(handle) = self.recv_handle.take() {
            if handle.join().is_err() {
                log::error!("Receive thread panicked");
                panicked = true;
            }
        }
        if let Some(handle) = self.watchdog_handle.take() {
            if handle.join().is_err() {
                log::error!("Watchdog thread panicked");
                panicked = true;
            }
        }

        // Workers are gone; dropping the last Arc closes the descriptor
        self.socket = None;
        self.remote_addr = None;

        if let Some(cleanup) = self.cleanup.take() {
            cleanup.close();
        }

        self.state = LinkState::Closed;
        log::info!("Link closed");

        if panicked {
            return Err(Error::ThreadPanic);
        }
        Ok(())
    }

    /// Log the packet counters at info level
    pub fn print_packet_stats(&self) {
        let st = self.get_status();
        log::info!(
            "Packets: recv={}, sent={}, expired={}, corrupt={}, invalid={}",
            st.packets_received,
            st.packets_sent,
            st.packets_expired,
            st.packets_corrupted,
            st.packets_shape_invalid
        );
    }

    /// Log the inter-arrival statistics at info level
    pub fn print_delay_stats(&self) {
        let data = self.shared.data.lock();
        if !self.config.delay_tracking || data.delay.count() == 0 {
            return;
        }
        log::info!(
            "Delay stats: mean={:.3} ms, stddev={:.3} ms, min={:.3} ms, max={:.3} ms",
            data.delay.mean() * 1000.0,
            data.delay.stddev() * 1000.0,
            data.delay.min() * 1000.0,
            data.delay.max() * 1000.0
        );
    }
}

impl Drop for UdpLink {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            log::error!("Close during drop failed: {}", e);
        }
    }
}
