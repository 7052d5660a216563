//! Error types for setu-io
//!
//! # Error Recovery Strategies
//!
//! Different error types require different recovery approaches:
//!
//! ## Setup Errors (Fix Environment and Retry)
//!
//! - **`Supervisor`**: The cleanup TCP connection to the supervising process
//!   could not be established. Nothing else is attempted; check that the
//!   supervisor is listening on the configured port.
//!
//! - **`Io`**: Socket creation or bind failed. Usually a port conflict or
//!   missing permissions.
//!
//! - **`Resolve`**: The peer hostname could not be resolved to an IPv4
//!   address.
//!
//! ## Negotiation Errors (Check Peer Configuration)
//!
//! - **`Handshake`**: The peer never answered, answered with a malformed
//!   datagram, or advertised vector widths that do not mirror ours. The link
//!   stays in the bound state and the handshake may be retried.
//!
//! ## Usage Errors (Caller Bug)
//!
//! - **`InvalidState`**: An operation was called out of lifecycle order
//!   (e.g. `start()` before `handshake()`, anything after `close()`).
//! - **`ShapeMismatch`**: `send()` was given a vector of the wrong width.
//!
//! ## Fatal Errors (Restart the Link)
//!
//! - **`ThreadPanic`**: A worker thread panicked and could not be joined.
//!   The link is unusable; create a new one.
//!
//! Transient conditions — receive timeouts, corrupt or misshapen datagrams —
//! are never surfaced as errors. They are absorbed into the packet counters
//! and visible through `get_status()`.

use thiserror::Error;

/// Errors that can occur in setu-io
///
/// See module-level documentation for recovery strategies.
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Supervisor connection failed: {0}")]
    Supervisor(String),

    #[error("Failed to resolve peer address: {0}")]
    Resolve(String),

    #[error("Handshake failed: {0}")]
    Handshake(String),

    #[error("Invalid state: {0}")]
    InvalidState(&'static str),

    #[error("Expected {expected} values, got {got}")]
    ShapeMismatch { expected: usize, got: usize },

    #[error("Config error: {0}")]
    Config(String),

    #[error("Thread panic")]
    ThreadPanic,
}

pub type Result<T> = std::result::Result<T, Error>;
