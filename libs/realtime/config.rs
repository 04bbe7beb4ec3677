use pushsockets::{FixedDelay, TransportConfig};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

/// Environment variable holding the push server base URL
pub const URL_ENV_VAR: &str = "REALTIME_URL";

/// Endpoint used when nothing else is configured
pub const DEFAULT_URL: &str = "http://localhost:3001";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load config file: {0}")]
    FileError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Realtime session configuration
///
/// Everything the manager consumes at construction: endpoint, identity,
/// the desired channel and room sets, and the timing of acknowledgment races
/// and transport reconnection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Push server base URL (http(s):// or ws(s)://)
    #[serde(default = "default_url")]
    pub url: String,
    /// Open the transport as soon as the manager is constructed
    #[serde(default)]
    pub auto_connect: bool,
    /// Authenticate with `user_id`/`session_id` whenever the transport connects
    #[serde(default)]
    pub auto_authenticate: bool,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
    /// Desired channel subscriptions, re-established after every authentication
    #[serde(default)]
    pub channels: Vec<String>,
    /// Desired room memberships, re-established after every authentication
    #[serde(default)]
    pub rooms: Vec<String>,
    #[serde(default = "default_ack_timeout_ms")]
    pub ack_timeout_ms: u64,
    #[serde(default = "default_reconnect_attempts")]
    pub reconnect_attempts: usize,
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
}

fn default_url() -> String {
    DEFAULT_URL.to_string()
}

fn default_ack_timeout_ms() -> u64 {
    5000
}

fn default_reconnect_attempts() -> usize {
    5
}

fn default_reconnect_delay_ms() -> u64 {
    1000
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            auto_connect: false,
            auto_authenticate: false,
            user_id: None,
            session_id: None,
            channels: Vec::new(),
            rooms: Vec::new(),
            ack_timeout_ms: default_ack_timeout_ms(),
            reconnect_attempts: default_reconnect_attempts(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
        }
    }
}

impl SessionConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// Defaults, with the endpoint taken from `REALTIME_URL` (`.env` honored)
    pub fn from_env() -> Self {
        dotenv::dotenv().ok(); // Don't fail if .env doesn't exist

        let mut config = Self::default();
        config.apply_url_override(std::env::var(URL_ENV_VAR).ok());
        config
    }

    /// Load configuration from a YAML file, then apply `REALTIME_URL`
    pub fn load(config_path: impl AsRef<Path>) -> Result<Self> {
        dotenv::dotenv().ok();

        let yaml_content = std::fs::read_to_string(config_path)?;
        let mut config: SessionConfig = serde_yaml::from_str(&yaml_content)?;
        config.apply_url_override(std::env::var(URL_ENV_VAR).ok());

        config.validate()?;
        Ok(config)
    }

    /// Parse and validate YAML without touching the environment
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: SessionConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    fn apply_url_override(&mut self, url: Option<String>) {
        if let Some(url) = url.filter(|u| !u.trim().is_empty()) {
            info!("Overriding realtime URL from environment variable");
            self.url = url;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.url.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "url cannot be empty".to_string(),
            ));
        }
        if self.ack_timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "ack_timeout_ms must be greater than 0".to_string(),
            ));
        }
        if self.auto_authenticate && (self.user_id.is_none() || self.session_id.is_none()) {
            return Err(ConfigError::ValidationError(
                "auto_authenticate requires both user_id and session_id".to_string(),
            ));
        }
        if let Some(blank) = self
            .channels
            .iter()
            .chain(self.rooms.iter())
            .find(|name| name.trim().is_empty())
        {
            return Err(ConfigError::ValidationError(format!(
                "channel and room names cannot be blank (got {:?})",
                blank
            )));
        }
        Ok(())
    }

    pub fn with_identity(mut self, user_id: impl Into<String>, session_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_channels<I, S>(mut self, channels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.channels = channels.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_rooms<I, S>(mut self, rooms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.rooms = rooms.into_iter().map(Into::into).collect();
        self
    }

    pub fn auto_connect(mut self, enabled: bool) -> Self {
        self.auto_connect = enabled;
        self
    }

    pub fn auto_authenticate(mut self, enabled: bool) -> Self {
        self.auto_authenticate = enabled;
        self
    }

    pub fn with_ack_timeout(mut self, timeout: Duration) -> Self {
        self.ack_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_reconnect(mut self, attempts: usize, delay: Duration) -> Self {
        self.reconnect_attempts = attempts;
        self.reconnect_delay_ms = delay.as_millis() as u64;
        self
    }

    pub fn ack_timeout(&self) -> Duration {
        Duration::from_millis(self.ack_timeout_ms)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    /// Transport settings: endpoint plus the fixed reconnection policy
    pub fn transport_config(&self) -> pushsockets::Result<TransportConfig> {
        Ok(TransportConfig::new(&self.url)?.reconnect_strategy(FixedDelay::new(
            self.reconnect_delay(),
            Some(self.reconnect_attempts),
        )))
    }

    /// Log configuration summary
    pub fn log(&self) {
        info!("Configuration loaded:");
        info!("  URL: {}", self.url);
        info!("  Auto connect: {}", self.auto_connect);
        info!("  Auto authenticate: {}", self.auto_authenticate);
        info!("  User: {}", self.user_id.as_deref().unwrap_or("-"));
        info!("  Channels: {:?}", self.channels);
        info!("  Rooms: {:?}", self.rooms);
        info!("  Ack timeout: {} ms", self.ack_timeout_ms);
        info!(
            "  Reconnection: {} attempts, {} ms apart",
            self.reconnect_attempts, self.reconnect_delay_ms
        );
    }
}
