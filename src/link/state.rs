//! Shared state between the controlling thread and the worker threads
//!
//! One lock guards everything the receive loop publishes: the latest-sample
//! slot, the last-packet timestamp, the counters and the delay statistics.
//! The watchdog reads the timestamp under the same lock; consumers read the
//! slot under it. Keeping a single lock makes the happens-before story
//! trivial: whatever a consumer observes was fully published.

use crate::stats::{Counters, DelayStats};
use parking_lot::Mutex;
use std::sync::atomic::AtomicBool;
use std::time::Instant;

/// Everything guarded by the data lock.
pub(crate) struct LinkData {
    /// Most recent intact sample; `None` until the first packet lands
    pub latest: Option<Vec<f32>>,
    /// True once the current sample has been handed to a consumer
    pub consumed: bool,
    /// Arrival time of the newest intact packet; seeded with the start
    /// instant so the watchdog measures silence from link start
    pub last_packet_time: Option<Instant>,
    pub counters: Counters,
    pub delay: DelayStats,
}

impl LinkData {
    fn new() -> Self {
        Self {
            latest: None,
            consumed: false,
            last_packet_time: None,
            counters: Counters::default(),
            delay: DelayStats::new(),
        }
    }
}

/// State shared with the worker threads via `Arc`.
pub(crate) struct SharedState {
    pub data: Mutex<LinkData>,
    /// True while the link is live; cleared by `close()` and by workers
    /// exiting on a fatal error or stale channel
    pub running: AtomicBool,
    /// Cooperative cancellation flag; workers poll it between iterations
    pub stop_requested: AtomicBool,
}

impl SharedState {
    pub fn new() -> Self {
        Self {
            data: Mutex::new(LinkData::new()),
            running: AtomicBool::new(false),
            stop_requested: AtomicBool::new(false),
        }
    }
}
