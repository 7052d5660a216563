//! Receive thread for the UDP link
//!
//! This module contains the receive loop that drains incoming datagrams and
//! publishes the newest intact sample for consumers.
//!
//! # Loop Behavior
//!
//! - Receive timeouts are the normal idle case: the loop just re-checks the
//!   stop flag and blocks again, so shutdown latency is bounded by the
//!   configured socket timeout.
//! - Datagrams that fail framing (truncated, corrupt CRC, wrong payload
//!   size) are counted and dropped; the loop never stops for bad input.
//! - Any other receive error is fatal: it is logged, the supervisor is
//!   signaled, the running flag is cleared and the thread exits. If stop was
//!   already requested the error is the expected wake-up from `close()` and
//!   the thread exits silently.
//!
//! # Publishing
//!
//! A decoded sample replaces the previous one under the data lock together
//! with the consumed flag, arrival timestamp, received counter and (when
//! enabled) the inter-arrival statistics, so a consumer can never observe a
//! half-published sample.

use super::state::SharedState;
use crate::cleanup::CleanupClient;
use crate::frame::{self, FrameError};
use crate::net;
use std::net::UdpSocket;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;

/// Scratch buffer size; comfortably above the largest negotiable frame
const RECV_BUFFER_SIZE: usize = 2048;

pub(super) fn receive_loop(
    socket: Arc<UdpSocket>,
    shared: Arc<SharedState>,
    cleanup: Arc<CleanupClient>,
    num_inputs: u16,
    delay_tracking: bool,
    debug_enabled: bool,
) {
    let mut buf = [0u8; RECV_BUFFER_SIZE];

    while !shared.stop_requested.load(Ordering::SeqCst) {
        let (n, src) = match socket.recv_from(&mut buf) {
            Ok(r) => r,
            Err(e) if net::is_timeout(&e) => continue,
            Err(e) => {
                if !shared.stop_requested.load(Ordering::SeqCst) {
                    log::error!("Receive failed: {}", e);
                    if let Err(e) = cleanup.signal() {
                        log::error!("Failed to signal supervisor: {}", e);
                    }
                    shared.running.store(false, Ordering::SeqCst);
                }
                break;
            }
        };

        if debug_enabled {
            log::debug!("Received {} bytes from {}", n, src);
        }

        let values = match frame::decode(&buf[..n], num_inputs) {
            Ok(values) => values,
            Err(FrameError::Corrupt) => {
                shared.data.lock().counters.corrupted += 1;
                continue;
            }
            Err(FrameError::ShapeInvalid) => {
                shared.data.lock().counters.shape_invalid += 1;
                continue;
            }
        };

        let now = Instant::now();
        let mut data = shared.data.lock();
        let interval = data
            .last_packet_time
            .map(|t| now.duration_since(t).as_secs_f64());
        data.latest = Some(values);
        data.consumed = false;
        data.last_packet_time = Some(now);
        data.counters.received += 1;
        if delay_tracking {
            if let Some(interval) = interval {
                data.delay.record(interval);
            }
        }
    }

    log::info!("Receive thread exiting");
}
