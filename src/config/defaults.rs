//! Default value functions for configuration.
//!
//! Separated into its own module for clarity and reuse.

use std::net::SocketAddr;

// =============================================================================
// Server Defaults
// =============================================================================

pub fn default_server_name() -> String {
    "merehub".to_string()
}

pub fn default_metrics_port() -> u16 {
    9090
}

// =============================================================================
// Listener Defaults
// =============================================================================

pub fn default_listen_address() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

pub fn default_ws_path() -> String {
    "/ws".to_string()
}

// =============================================================================
// Database Defaults
// =============================================================================

pub fn default_database_path() -> String {
    "merehub.db".to_string()
}

// =============================================================================
// Auth Defaults
// =============================================================================

pub fn default_leeway_secs() -> u64 {
    30
}

// =============================================================================
// Session Defaults
// =============================================================================

pub fn default_queue_capacity() -> usize {
    256
}

pub fn default_write_timeout() -> u64 {
    10
}

pub fn default_heartbeat_interval() -> u64 {
    30
}

pub fn default_liveness_timeout() -> u64 {
    60
}

pub fn default_max_message_bytes() -> usize {
    64 * 1024
}

pub fn default_inbound_burst() -> u32 {
    20
}
