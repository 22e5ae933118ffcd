//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and environment variable overrides.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub hub: HubConfig,

    #[serde(default)]
    pub auth: AuthConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    /// Seed entries for the in-memory user directory
    #[serde(default)]
    pub users: Vec<UserEntry>,
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl ServerConfig {
    /// Get the socket address string
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Session hub tuning
#[derive(Debug, Clone, Deserialize)]
pub struct HubConfig {
    /// Outbound frames buffered per connection before it is evicted
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Pending events buffered in front of each hub loop
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,

    /// Delay between a session emptying and its removal
    #[serde(default = "default_grace_period")]
    pub grace_period_ms: u64,
}

fn default_queue_capacity() -> usize {
    crate::websocket::DEFAULT_QUEUE_CAPACITY
}

fn default_event_capacity() -> usize {
    256
}

fn default_grace_period() -> u64 {
    5000 // 5 seconds
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            event_capacity: default_event_capacity(),
            grace_period_ms: default_grace_period(),
        }
    }
}

impl HubConfig {
    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }
}

/// Token verification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Shared HMAC secret used to verify (and mint) identity tokens
    #[serde(default)]
    pub jwt_secret: String,

    #[serde(default = "default_token_ttl")]
    pub token_ttl_hours: i64,
}

fn default_token_ttl() -> i64 {
    48
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            token_ttl_hours: default_token_ttl(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

/// A known user: token subject plus the name shown to other participants
#[derive(Debug, Clone, Deserialize)]
pub struct UserEntry {
    pub email: String,
    pub name: String,
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Ok(config)
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    }

    /// Load configuration with environment variable overrides
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from default locations or environment
    pub fn load_default() -> Self {
        let config_paths = [
            dirs::config_dir().map(|p| p.join("huddle").join("config.toml")),
            Some(PathBuf::from("/etc/huddle/config.toml")),
            Some(PathBuf::from("./config.toml")),
        ];

        for path_opt in config_paths.iter().flatten() {
            if path_opt.exists() {
                match Self::load_with_env(path_opt) {
                    Ok(config) => {
                        tracing::info!("Loaded config from {:?}", path_opt);
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load config from {:?}: {}", path_opt, e);
                    }
                }
            }
        }

        tracing::info!("Using default config with environment overrides");
        Self::from_env()
    }

    /// Reject configurations the server cannot start with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.auth.jwt_secret.is_empty() {
            return Err(ConfigError::MissingSecret);
        }
        if self.hub.queue_capacity == 0 || self.hub.event_capacity == 0 {
            return Err(ConfigError::Invalid(
                "hub queue and event capacities must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Apply environment variable overrides to an existing config
    fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("HUDDLE_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = std::env::var("HUDDLE_PORT") {
            if let Ok(p) = port.parse() {
                self.server.port = p;
            }
        }

        if let Ok(capacity) = std::env::var("HUDDLE_QUEUE_CAPACITY") {
            if let Ok(c) = capacity.parse() {
                self.hub.queue_capacity = c;
            }
        }
        if let Ok(grace) = std::env::var("HUDDLE_GRACE_PERIOD_MS") {
            if let Ok(g) = grace.parse() {
                self.hub.grace_period_ms = g;
            }
        }

        if let Ok(secret) = std::env::var("HUDDLE_JWT_KEY") {
            self.auth.jwt_secret = secret;
        }

        if let Ok(level) = std::env::var("HUDDLE_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("HUDDLE_LOG_FORMAT") {
            self.logging.format = format;
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },

    #[error("auth.jwt_secret is empty (set it in the config file or HUDDLE_JWT_KEY)")]
    MissingSecret,

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Generate a default config file content
pub fn generate_default_config() -> String {
    r#"# Huddle Configuration
#
# Environment variables override these settings:
# - HUDDLE_HOST
# - HUDDLE_PORT
# - HUDDLE_JWT_KEY
# - HUDDLE_QUEUE_CAPACITY
# - HUDDLE_GRACE_PERIOD_MS
# - HUDDLE_LOG_LEVEL
# - HUDDLE_LOG_FORMAT

[server]
host = "0.0.0.0"
port = 8080

[hub]
# Frames buffered per connection; a connection whose queue fills up is dropped
queue_capacity = 512

# Events buffered in front of each session loop
event_capacity = 256

# How long an empty session lingers before it is removed (ms)
grace_period_ms = 5000

[auth]
# HMAC secret shared with the service that issues identity tokens
jwt_secret = ""

# Lifetime of tokens minted with `huddle token` (hours)
token_ttl_hours = 48

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty (for development) or json (for production)
format = "pretty"

# Display names for token subjects
# [[users]]
# email = "ada@example.com"
# name = "Ada"
"#
    .to_string()
}
