//! Core configuration types and loading.

use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

use super::defaults::{
    default_database_path, default_leeway_secs, default_metrics_port, default_server_name,
};
use super::listen::{ListenConfig, TlsConfig};
use super::session::SessionConfig;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Hub configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Server identity and metrics.
    #[serde(default)]
    pub server: ServerConfig,
    /// WebSocket listener.
    #[serde(default)]
    pub listen: ListenConfig,
    /// Optional TLS for the listener (serves `wss://` when present).
    pub tls: Option<TlsConfig>,
    /// Database configuration.
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Token validation.
    pub auth: AuthConfig,
    /// Per-session tuning.
    #[serde(default)]
    pub session: SessionConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}

/// Server identity configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Instance name, used in logs.
    #[serde(default = "default_server_name")]
    pub name: String,
    /// Prometheus metrics HTTP port (default: 9090, 0 disables).
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: default_server_name(),
            metrics_port: default_metrics_port(),
        }
    }
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to SQLite database file (`:memory:` for an ephemeral store).
    #[serde(default = "default_database_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
        }
    }
}

/// Token validation configuration.
#[derive(Clone, Deserialize)]
pub struct AuthConfig {
    /// HMAC secret for HS256 tokens.
    pub jwt_secret: String,
    /// Expected `iss` claim; unchecked when absent.
    #[serde(default)]
    pub issuer: Option<String>,
    /// Clock skew tolerated on `exp`, in seconds.
    #[serde(default = "default_leeway_secs")]
    pub leeway_secs: u64,
}

// Keep the secret out of debug logs.
impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("jwt_secret", &"<redacted>")
            .field("issuer", &self.issuer)
            .field("leeway_secs", &self.leeway_secs)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_fills_defaults() {
        let config: Config = toml::from_str(
            r#"
[auth]
jwt_secret = "s3cret"
"#,
        )
        .unwrap();

        assert_eq!(config.server.name, "merehub");
        assert_eq!(config.server.metrics_port, 9090);
        assert_eq!(config.listen.path, "/ws");
        assert_eq!(config.database.path, "merehub.db");
        assert_eq!(config.auth.leeway_secs, 30);
        assert_eq!(config.session.queue_capacity, 256);
        assert!(config.tls.is_none());
    }

    #[test]
    fn missing_auth_section_is_a_parse_error() {
        let result: Result<Config, _> = toml::from_str("[server]\nname = \"x\"\n");
        assert!(result.is_err());
    }

    #[test]
    fn debug_output_redacts_secret() {
        let auth = AuthConfig {
            jwt_secret: "do-not-print".to_string(),
            issuer: None,
            leeway_secs: 0,
        };
        let rendered = format!("{auth:?}");
        assert!(!rendered.contains("do-not-print"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn load_reads_file_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hub.toml");
        std::fs::write(
            &path,
            "[server]\nname = \"disk\"\nmetrics_port = 0\n[auth]\njwt_secret = \"k\"\n",
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.server.name, "disk");
        assert_eq!(config.server.metrics_port, 0);
    }

    #[test]
    fn example_config_parses_and_validates() {
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/config.example.toml");
        let config = Config::load(path).unwrap();
        assert_eq!(config.listen.path, "/ws");
        assert!(config.session.inbound_rate_per_second.is_none());
        assert!(super::super::validation::validate(&config).is_ok());
    }

    #[test]
    fn load_missing_file_is_io_error() {
        let err = Config::load("/nonexistent/merehub.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
