//! Network listener configuration.

use serde::Deserialize;
use std::net::SocketAddr;

use super::defaults::{default_listen_address, default_ws_path};

/// WebSocket listener configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ListenConfig {
    /// Address to bind to (e.g., "0.0.0.0:8080").
    #[serde(default = "default_listen_address")]
    pub address: SocketAddr,
    /// Request path that accepts upgrades (e.g., "/ws").
    #[serde(default = "default_ws_path")]
    pub path: String,
    /// Allowed origins for CORS (e.g., `["https://example.com"]`).
    /// Empty list allows all origins.
    #[serde(default)]
    pub allow_origins: Vec<String>,
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            address: default_listen_address(),
            path: default_ws_path(),
            allow_origins: Vec::new(),
        }
    }
}

impl ListenConfig {
    /// Whether a handshake carrying `origin` passes the allowlist.
    ///
    /// Requests without an Origin header are only accepted when the list is empty.
    pub fn origin_allowed(&self, origin: Option<&str>) -> bool {
        if self.allow_origins.is_empty() {
            return true;
        }
        match origin {
            Some(origin) => self.allow_origins.iter().any(|a| a == origin || a == "*"),
            None => false,
        }
    }
}

/// TLS listener configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct TlsConfig {
    /// Path to certificate file (PEM format).
    pub cert_path: String,
    /// Path to private key file (PEM format).
    pub key_path: String,
}
