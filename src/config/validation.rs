//! Configuration validation.
//!
//! Validates configuration at startup to catch common errors early.

use super::Config;
use std::path::Path;
use thiserror::Error;

/// Validation errors for configuration.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("server.name is required")]
    MissingServerName,
    #[error("listen.path must start with '/', got '{0}'")]
    InvalidListenPath(String),
    #[error("auth.jwt_secret is required")]
    MissingJwtSecret,
    #[error("session.queue_capacity must be at least 1")]
    ZeroQueueCapacity,
    #[error("session.write_timeout must be non-zero")]
    ZeroWriteTimeout,
    #[error("session.heartbeat_interval must be non-zero")]
    ZeroHeartbeatInterval,
    #[error("session.liveness_timeout ({liveness}s) must exceed heartbeat_interval ({heartbeat}s)")]
    LivenessNotAboveHeartbeat { liveness: u64, heartbeat: u64 },
    #[error("session.max_message_bytes must be non-zero")]
    ZeroMaxMessageBytes,
    #[error("tls.cert_path does not exist: {0}")]
    TlsCertNotFound(String),
    #[error("tls.key_path does not exist: {0}")]
    TlsKeyNotFound(String),
    #[error("database.path parent exists but is not a directory: {0}")]
    DatabasePathInvalid(String),
}

/// Validate a configuration, returning all errors found.
pub fn validate(config: &Config) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.server.name.is_empty() {
        errors.push(ValidationError::MissingServerName);
    }
    if !config.listen.path.starts_with('/') {
        errors.push(ValidationError::InvalidListenPath(config.listen.path.clone()));
    }
    if config.auth.jwt_secret.is_empty() {
        errors.push(ValidationError::MissingJwtSecret);
    }

    // Session timing
    let session = &config.session;
    if session.queue_capacity == 0 {
        errors.push(ValidationError::ZeroQueueCapacity);
    }
    if session.write_timeout == 0 {
        errors.push(ValidationError::ZeroWriteTimeout);
    }
    if session.heartbeat_interval == 0 {
        errors.push(ValidationError::ZeroHeartbeatInterval);
    }
    if session.liveness_timeout <= session.heartbeat_interval {
        errors.push(ValidationError::LivenessNotAboveHeartbeat {
            liveness: session.liveness_timeout,
            heartbeat: session.heartbeat_interval,
        });
    }
    if session.max_message_bytes == 0 {
        errors.push(ValidationError::ZeroMaxMessageBytes);
    }

    // TLS validation
    if let Some(ref tls) = config.tls {
        if !Path::new(&tls.cert_path).exists() {
            errors.push(ValidationError::TlsCertNotFound(tls.cert_path.clone()));
        }
        if !Path::new(&tls.key_path).exists() {
            errors.push(ValidationError::TlsKeyNotFound(tls.key_path.clone()));
        }
    }

    // A missing parent is created on open; one that is a file never can be.
    let db_path = Path::new(&config.database.path);
    if config.database.path != ":memory:"
        && let Some(parent) = db_path.parent()
        && parent.exists()
        && !parent.is_dir()
    {
        errors.push(ValidationError::DatabasePathInvalid(
            config.database.path.clone(),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
