//! Per-session tuning: outbound queue, write/ping timeouts, inbound limits.
//!
//! Each connection sends a WebSocket Ping every `heartbeat_interval` seconds.
//! Any inbound frame (data, ping or pong) pushes the liveness deadline
//! `liveness_timeout` seconds into the future; a connection whose deadline
//! lapses is torn down. The deadline must therefore exceed the heartbeat
//! interval, which [`super::validation::validate`] enforces.

use serde::Deserialize;
use std::num::NonZeroU32;
use std::time::Duration;

use super::defaults::{
    default_heartbeat_interval, default_inbound_burst, default_liveness_timeout,
    default_max_message_bytes, default_queue_capacity, default_write_timeout,
};

/// Session configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Outbound frames buffered per session before new ones are dropped (default: 256).
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Seconds a single write or ping may take before the session is closed (default: 10).
    #[serde(default = "default_write_timeout")]
    pub write_timeout: u64,

    /// Seconds between liveness pings (default: 30).
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval: u64,

    /// Seconds without any inbound frame before the session is closed (default: 60).
    #[serde(default = "default_liveness_timeout")]
    pub liveness_timeout: u64,

    /// Largest inbound WebSocket message accepted, in bytes (default: 64 KiB).
    #[serde(default = "default_max_message_bytes")]
    pub max_message_bytes: usize,

    /// Sustained inbound envelopes per second. Unset disables limiting.
    #[serde(default)]
    pub inbound_rate_per_second: Option<u32>,

    /// Envelopes allowed in a burst above the sustained rate (default: 20).
    #[serde(default = "default_inbound_burst")]
    pub inbound_burst: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            write_timeout: default_write_timeout(),
            heartbeat_interval: default_heartbeat_interval(),
            liveness_timeout: default_liveness_timeout(),
            max_message_bytes: default_max_message_bytes(),
            inbound_rate_per_second: None,
            inbound_burst: default_inbound_burst(),
        }
    }
}

impl SessionConfig {
    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.write_timeout)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval)
    }

    pub fn liveness_timeout(&self) -> Duration {
        Duration::from_secs(self.liveness_timeout)
    }

    /// Inbound quota as `(rate, burst)`, or `None` when limiting is off.
    pub fn inbound_quota(&self) -> Option<(NonZeroU32, NonZeroU32)> {
        let rate = NonZeroU32::new(self.inbound_rate_per_second?)?;
        let burst = NonZeroU32::new(self.inbound_burst).unwrap_or(rate);
        Some((rate, burst))
    }
}
