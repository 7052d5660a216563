//! SetuIO - Real-time UDP sample link
//!
//! This library provides a bidirectional UDP channel between two peers that
//! exchange fixed-shape vectors of f32 samples at high rate, trading
//! reliability for latency: consumers always see only the most recent
//! intact sample.
//!
//! ## Features
//!
//! - 7-byte handshake negotiating vector widths, sample encoding and
//!   staleness horizon
//! - CRC-16/CCITT framing on every steady-state datagram
//! - Latest-only, at-most-once sample delivery with expiry accounting
//! - Heartbeat watchdog that reports a stalled channel to a supervising
//!   process over a one-byte TCP distress signal

pub mod cleanup;
pub mod config;
pub mod error;
pub mod frame;
pub mod link;
pub mod net;
pub mod stats;

// Re-export commonly used types
pub use config::LinkConfig;
pub use error::{Error, Result};
pub use frame::SampleType;
pub use link::{LinkState, LinkStatus, UdpLink, DEFAULT_HANDSHAKE_TIMEOUT};
