//! Configuration loading and management.
//!
//! This module is split into logical submodules:
//! - [`types`]: Core config struct definitions (Config, ServerConfig, AuthConfig, DatabaseConfig)
//! - [`listen`]: Network listener configuration (ListenConfig, TlsConfig)
//! - [`session`]: Per-connection tuning (queue capacity, timeouts, inbound limits)
//! - [`validation`]: Startup validation collecting every problem at once

mod defaults;
mod listen;
mod session;
mod types;
pub mod validation;

pub use listen::{ListenConfig, TlsConfig};
pub use session::SessionConfig;
pub use types::{AuthConfig, Config};
