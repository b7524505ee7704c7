//! Server configuration.
//!
//! Configuration is layered, later sources winning:
//! - Built-in defaults
//! - TOML configuration file
//! - Environment variables (`PARLEY_*`, nested with `__`, e.g.
//!   `PARLEY_AUTH__SECRET`)

use anyhow::{bail, Context, Result};
use parley_core::HubConfig;
use parley_protocol::Encoding;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Transport configuration.
    #[serde(default)]
    pub transport: TransportConfig,

    /// Resource limits.
    #[serde(default)]
    pub limits: LimitsConfig,

    /// Credential verification.
    #[serde(default)]
    pub auth: AuthConfig,

    /// REST boundary.
    #[serde(default)]
    pub api: ApiConfig,

    /// Metrics configuration.
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Transport configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Path for WebSocket endpoint.
    #[serde(default = "default_ws_path")]
    pub websocket_path: String,

    /// Outbound encoding when the client does not ask for one.
    #[serde(default)]
    pub default_encoding: Encoding,
}

/// Resource limits configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Maximum number of connected users.
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,

    /// Maximum WebSocket message size in bytes.
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,

    /// Maximum chat message length in characters.
    #[serde(default = "default_max_content_length")]
    pub max_content_length: usize,

    /// Broadcast buffer per private room.
    #[serde(default = "default_room_capacity")]
    pub room_capacity: usize,
}

/// Credential verification configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// HS256 shared secret. Required.
    #[serde(default)]
    pub secret: String,

    /// Lifetime of issued tokens in seconds.
    #[serde(default = "default_token_ttl")]
    pub token_ttl_secs: i64,

    /// Allowed clock skew when checking expiry.
    #[serde(default)]
    pub leeway_secs: u64,
}

/// REST boundary configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Serve the `/api` routes.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Maximum notifications returned by the list endpoint.
    #[serde(default = "default_notification_limit")]
    pub notification_limit: usize,
}

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Enable metrics export.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Metrics port.
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

// Default value functions
fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3001
}

fn default_true() -> bool {
    true
}

fn default_ws_path() -> String {
    "/ws".to_string()
}

fn default_max_connections() -> usize {
    100_000
}

fn default_max_message_size() -> usize {
    64 * 1024 // 64 KB
}

fn default_max_content_length() -> usize {
    parley_core::relay::DEFAULT_MAX_CONTENT_LENGTH
}

fn default_room_capacity() -> usize {
    parley_core::room::DEFAULT_ROOM_CAPACITY
}

fn default_token_ttl() -> i64 {
    parley_core::auth::DEFAULT_TOKEN_TTL_SECS
}

fn default_notification_limit() -> usize {
    50
}

fn default_metrics_port() -> u16 {
    9090
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            transport: TransportConfig::default(),
            limits: LimitsConfig::default(),
            auth: AuthConfig::default(),
            api: ApiConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            websocket_path: default_ws_path(),
            default_encoding: Encoding::default(),
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_connections: default_max_connections(),
            max_message_size: default_max_message_size(),
            max_content_length: default_max_content_length(),
            room_capacity: default_room_capacity(),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            secret: String::new(),
            token_ttl_secs: default_token_ttl(),
            leeway_secs: 0,
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            notification_limit: default_notification_limit(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: default_metrics_port(),
        }
    }
}

impl Config {
    /// Default config file locations, in search order.
    const SEARCH_PATHS: [&'static str; 3] = [
        "parley.toml",
        "/etc/parley/parley.toml",
        "~/.config/parley/parley.toml",
    ];

    /// Load configuration from the first existing default file (if any)
    /// and the environment.
    ///
    /// # Errors
    ///
    /// Returns an error if a source cannot be parsed.
    pub fn load() -> Result<Self> {
        let path = Self::SEARCH_PATHS
            .iter()
            .map(|p| PathBuf::from(shellexpand::tilde(p).as_ref()))
            .find(|p| p.exists());

        Self::load_from(path.as_deref())
    }

    /// Load configuration from a specific file (if given) and the environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or any source is invalid.
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            tracing::info!("Loading configuration from {}", path.display());
            builder = builder.add_source(
                config::File::from(path.to_path_buf()).format(config::FileFormat::Toml),
            );
        }

        let settings = builder
            .add_source(
                config::Environment::with_prefix("PARLEY")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to load configuration")?;

        settings
            .try_deserialize()
            .context("Failed to parse configuration")
    }

    /// Check settings that have no usable default.
    ///
    /// # Errors
    ///
    /// Returns an error describing the first invalid setting.
    pub fn validate(&self) -> Result<()> {
        if self.auth.secret.trim().is_empty() {
            bail!("auth.secret must be set (PARLEY_AUTH__SECRET)");
        }
        if !self.transport.websocket_path.starts_with('/') {
            bail!("transport.websocket_path must start with '/'");
        }
        if self.limits.max_connections == 0 {
            bail!("limits.max_connections must be greater than zero");
        }
        Ok(())
    }

    /// Get the socket address to bind to.
    ///
    /// # Errors
    ///
    /// Returns an error if host and port do not form a socket address.
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("Invalid bind address {}:{}", self.host, self.port))
    }

    /// Settings for the relay hub.
    #[must_use]
    pub fn hub_config(&self) -> HubConfig {
        HubConfig {
            max_content_length: self.limits.max_content_length,
            room_capacity: self.limits.room_capacity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.port, 3001);
        assert_eq!(config.transport.websocket_path, "/ws");
        assert_eq!(config.transport.default_encoding, Encoding::Json);
        assert_eq!(config.api.notification_limit, 50);
        assert_eq!(config.auth.token_ttl_secs, 24 * 60 * 60);
    }

    #[test]
    fn test_config_bind_addr() {
        let config = Config::default();
        let addr = config.bind_addr().unwrap();
        assert_eq!(addr.port(), 3001);

        let bad = Config {
            host: "not a host".into(),
            ..Config::default()
        };
        assert!(bad.bind_addr().is_err());
    }

    #[test]
    fn test_config_from_toml() {
        let toml_str = r#"
            host = "0.0.0.0"
            port = 9000

            [transport]
            default_encoding = "msgpack"

            [limits]
            max_connections = 50000
            max_content_length = 2000

            [auth]
            secret = "s3cret"
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 9000);
        assert_eq!(config.transport.default_encoding, Encoding::Msgpack);
        assert_eq!(config.limits.max_connections, 50000);
        assert_eq!(config.hub_config().max_content_length, 2000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_requires_secret() {
        let config = Config::default();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("auth.secret"));
    }

    #[test]
    fn test_load_from_file() {
        let path = std::env::temp_dir().join(format!("parley-test-{}.toml", std::process::id()));
        std::fs::write(&path, "port = 4100\n[auth]\nsecret = \"from-file\"\n").unwrap();

        let config = Config::load_from(Some(&path)).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(config.port, 4100);
        assert_eq!(config.auth.secret, "from-file");
    }
}
