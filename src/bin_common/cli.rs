//! CLI utilities for binaries
//!
//! Handles configuration loading and environment variables
//! for all binary executables.

use realtime::{ConfigError, SessionConfig};
use std::path::PathBuf;
use tracing::info;

/// Type of configuration to load
#[derive(Debug, Clone)]
pub enum ConfigType {
    /// Realtime session configuration (realtime.yaml)
    Realtime,
    /// Custom path
    Custom(String),
}

impl ConfigType {
    /// Get the default path for this config type
    pub fn default_path(&self) -> &str {
        match self {
            ConfigType::Realtime => "config/realtime.yaml",
            ConfigType::Custom(path) => path,
        }
    }

    /// Get the environment variable name for this config type
    pub fn env_var_name(&self) -> &str {
        match self {
            ConfigType::Realtime => "REALTIME_CONFIG_PATH",
            ConfigType::Custom(_) => "CONFIG_PATH",
        }
    }
}

/// Load configuration path from environment or use default
///
/// A `Custom` type always resolves to its own path.
///
/// # Examples
/// ```
/// use coffee_realtime::bin_common::{load_config_from_env, ConfigType};
///
/// let path = load_config_from_env(ConfigType::Custom("session.yaml".into()));
/// assert_eq!(path.to_str(), Some("session.yaml"));
/// ```
pub fn load_config_from_env(config_type: ConfigType) -> PathBuf {
    if let ConfigType::Custom(path) = &config_type {
        return PathBuf::from(path);
    }
    std::env::var(config_type.env_var_name())
        .unwrap_or_else(|_| config_type.default_path().to_string())
        .into()
}

/// Load the session configuration for a binary
///
/// Reads the YAML file if it exists; otherwise falls back to defaults with
/// the endpoint from `REALTIME_URL`.
pub fn load_session_config(config_type: ConfigType) -> Result<SessionConfig, ConfigError> {
    let path = load_config_from_env(config_type);
    if path.exists() {
        info!("Loading configuration from {}", path.display());
        SessionConfig::load(&path)
    } else {
        info!(
            "No configuration file at {}, using environment defaults",
            path.display()
        );
        let config = SessionConfig::from_env();
        config.validate()?;
        Ok(config)
    }
}

/// Parse command line arguments for a binary
///
/// Returns a vector of arguments (excluding the program name)
pub fn parse_args() -> Vec<String> {
    std::env::args().skip(1).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_type_paths() {
        assert_eq!(ConfigType::Realtime.default_path(), "config/realtime.yaml");

        let custom = ConfigType::Custom("custom/path.yaml".to_string());
        assert_eq!(custom.default_path(), "custom/path.yaml");
    }

    #[test]
    fn test_config_type_env_vars() {
        assert_eq!(ConfigType::Realtime.env_var_name(), "REALTIME_CONFIG_PATH");
    }

    #[test]
    fn test_missing_custom_file_falls_back_to_defaults() {
        let config =
            load_session_config(ConfigType::Custom("does/not/exist.yaml".into())).unwrap();
        assert_eq!(config.ack_timeout_ms, 5000);
        assert!(!config.auto_connect);
    }
}
