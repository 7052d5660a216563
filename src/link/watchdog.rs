//! Heartbeat watchdog for the UDP link
//!
//! Detects a stalled channel: if no intact datagram has arrived for the
//! staleness limit, the watchdog signals the supervisor exactly once and
//! exits. It is only spawned when the link expects incoming data
//! (`num_inputs > 0`).
//!
//! The limit scales with the staleness horizon (3×, truncated to whole
//! seconds) with a 5 s floor, so short horizons do not trip on legitimate
//! inter-packet gaps while long horizons still get proportional slack.

use super::state::SharedState;
use crate::cleanup::CleanupClient;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Poll period for staleness checks
const WATCHDOG_POLL: Duration = Duration::from_millis(100);

/// Minimum staleness limit in seconds
const STALENESS_FLOOR_SECS: u64 = 5;

/// Watchdog threshold for a given staleness horizon.
pub(crate) fn staleness_limit(max_age_seconds: f64) -> Duration {
    let scaled = (3.0 * max_age_seconds) as u64;
    Duration::from_secs(scaled.max(STALENESS_FLOOR_SECS))
}

pub(super) fn watchdog_loop(shared: Arc<SharedState>, cleanup: Arc<CleanupClient>, limit: Duration) {
    while !shared.stop_requested.load(Ordering::SeqCst) {
        thread::sleep(WATCHDOG_POLL);

        let age = shared.data.lock().last_packet_time.map(|t| t.elapsed());
        let Some(age) = age else {
            continue;
        };

        if age > limit {
            if !shared.stop_requested.load(Ordering::SeqCst) {
                log::error!(
                    "Data timeout - no packet for {:.1} s (limit {} s), connection stale",
                    age.as_secs_f64(),
                    limit.as_secs()
                );
                if let Err(e) = cleanup.signal() {
                    log::error!("Failed to signal supervisor: {}", e);
                }
                shared.running.store(false, Ordering::SeqCst);
            }
            break;
        }
    }

    log::info!("Watchdog thread exiting");
}
