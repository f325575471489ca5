//! Network module.
//!
//! Contains the Gateway (TCP/TLS listener and WebSocket upgrade) and the
//! per-session Connection driver.

mod connection;
mod gateway;

pub use connection::Connection;
pub use gateway::Gateway;
