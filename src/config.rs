//! Link configuration
//!
//! # Configuration File Format
//!
//! Configuration can be loaded from a TOML file:
//!
//! ```toml
//! max_age_seconds = 3.0      # staleness horizon for get_latest()
//! delay_tracking = false     # per-packet inter-arrival statistics
//! send_type = "f32"          # advertised sample encoding
//! socket_timeout_sec = 2.0   # steady-state receive timeout
//! debug_enabled = false      # per-datagram debug logging
//! tcp_port = 7123            # supervisor cleanup port
//! ```
//!
//! Every field has a default, so an empty file (or `LinkConfig::default()`)
//! yields a usable configuration.
//!
//! # Validation
//!
//! The receive timeout doubles as the worker wake-up period: a blocked
//! receive returns at least that often so the stop flag is observed. A zero
//! timeout would turn the receive loop into a busy spin (and
//! `set_read_timeout` rejects it), so validation requires it to be positive.

use crate::error::{Error, Result};
use crate::frame::SampleType;
use serde::Deserialize;
use std::fs;
use std::path::Path;

/// Link configuration, immutable after construction.
#[derive(Debug, Clone, Deserialize)]
pub struct LinkConfig {
    /// Staleness horizon in seconds; a received sample older than this is
    /// expired on consumption. Advertised to the peer truncated to whole
    /// u16 seconds.
    #[serde(default = "default_max_age")]
    pub max_age_seconds: f64,

    /// Enable per-packet inter-arrival (Welford) statistics
    #[serde(default)]
    pub delay_tracking: bool,

    /// Sample encoding advertised in the handshake
    #[serde(default)]
    pub send_type: SampleType,

    /// Steady-state receive timeout in seconds (must be positive)
    #[serde(default = "default_socket_timeout")]
    pub socket_timeout_sec: f64,

    /// Log every received datagram at debug level
    #[serde(default)]
    pub debug_enabled: bool,

    /// TCP port of the supervising process on localhost
    #[serde(default = "default_tcp_port")]
    pub tcp_port: u16,
}

fn default_max_age() -> f64 {
    3.0
}

fn default_socket_timeout() -> f64 {
    2.0
}

fn default_tcp_port() -> u16 {
    7123
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            max_age_seconds: default_max_age(),
            delay_tracking: false,
            send_type: SampleType::default(),
            socket_timeout_sec: default_socket_timeout(),
            debug_enabled: false,
            tcp_port: default_tcp_port(),
        }
    }
}

impl LinkConfig {
    /// Load configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .map_err(|e| Error::Config(format!("Failed to read config: {}", e)))?;

        let config: LinkConfig = basic_toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.max_age_seconds < 0.0 || !self.max_age_seconds.is_finite() {
            return Err(Error::Config(format!(
                "max_age_seconds must be non-negative (got {})",
                self.max_age_seconds
            )));
        }
        if self.socket_timeout_sec <= 0.0 || !self.socket_timeout_sec.is_finite() {
            return Err(Error::Config(format!(
                "socket_timeout_sec must be positive (got {})",
                self.socket_timeout_sec
            )));
        }
        Ok(())
    }
}
