//! Configuration management for the gambit server.
//!
//! This module handles loading, validation, and conversion of server
//! configuration from TOML files and command-line arguments.

use gambit_server::{SecurityConfig, ServerConfig};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use tracing::info;

/// Application configuration loaded from TOML file.
///
/// Every section may be omitted; missing sections and fields fall back to
/// their defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Network settings
    #[serde(default)]
    pub server: ServerSettings,
    /// Room lifecycle settings
    #[serde(default)]
    pub rooms: RoomSettings,
    /// Inbound frame limits
    #[serde(default)]
    pub security: SecuritySettings,
    /// Logging configuration settings
    #[serde(default)]
    pub logging: LoggingSettings,
}

/// Server-specific configuration settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Network address to bind the server to (e.g., "127.0.0.1:3000")
    pub bind_address: String,
    /// Maximum number of concurrent client connections
    pub max_connections: usize,
}

/// Room expiry settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoomSettings {
    /// Rooms older than this many seconds are removed
    pub max_age_secs: u64,
    /// Seconds between expired-room sweeps
    pub cleanup_interval_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecuritySettings {
    pub max_message_size: usize,
    pub max_json_depth: usize,
    pub max_string_length: usize,
    pub max_collection_size: usize,
}

/// Logging system configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Log level filter (trace, debug, info, warn, error)
    pub level: String,
    /// Whether to output logs in JSON format
    pub json_format: bool,
}

impl Default for ServerSettings {
    fn default() -> Self {
        let defaults = ServerConfig::default();
        Self {
            bind_address: defaults.bind_address.to_string(),
            max_connections: defaults.max_connections,
        }
    }
}

impl Default for RoomSettings {
    fn default() -> Self {
        let defaults = ServerConfig::default();
        Self {
            max_age_secs: defaults.room_max_age_secs,
            cleanup_interval_secs: defaults.cleanup_interval_secs,
        }
    }
}

impl Default for SecuritySettings {
    fn default() -> Self {
        let defaults = SecurityConfig::default();
        Self {
            max_message_size: defaults.max_message_size,
            max_json_depth: defaults.max_json_depth,
            max_string_length: defaults.max_string_length,
            max_collection_size: defaults.max_collection_size,
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}

impl AppConfig {
    /// Loads configuration from a TOML file.
    ///
    /// If the file doesn't exist, a default configuration is written to
    /// `path` and returned.
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    pub async fn load_from_file(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        if path.exists() {
            let content = tokio::fs::read_to_string(path).await?;
            let config: AppConfig = toml::from_str(&content)?;
            Ok(config)
        } else {
            let default_config = AppConfig::default();
            let toml_content = toml::to_string_pretty(&default_config)?;
            tokio::fs::write(path, toml_content).await?;
            info!("Created default configuration file: {}", path.display());
            Ok(default_config)
        }
    }

    /// Converts the application configuration into the library's
    /// [`ServerConfig`].
    pub fn to_server_config(&self) -> Result<ServerConfig, Box<dyn std::error::Error>> {
        let bind_address: SocketAddr = self.server.bind_address.parse()?;
        Ok(ServerConfig {
            bind_address,
            max_connections: self.server.max_connections,
            room_max_age_secs: self.rooms.max_age_secs,
            cleanup_interval_secs: self.rooms.cleanup_interval_secs,
            security: SecurityConfig {
                max_message_size: self.security.max_message_size,
                max_json_depth: self.security.max_json_depth,
                max_string_length: self.security.max_string_length,
                max_collection_size: self.security.max_collection_size,
            },
        })
    }

    /// Validates the configuration settings.
    ///
    /// # Returns
    ///
    /// `Ok(())` if valid, or an error message naming the first bad setting.
    pub fn validate(&self) -> Result<(), String> {
        if self.server.bind_address.parse::<SocketAddr>().is_err() {
            return Err(format!(
                "Invalid bind address: {}",
                &self.server.bind_address
            ));
        }

        if self.server.max_connections == 0 {
            return Err("server.max_connections must be greater than 0".to_string());
        }

        if self.rooms.max_age_secs == 0 {
            return Err("rooms.max_age_secs must be greater than 0".to_string());
        }
        if self.rooms.cleanup_interval_secs == 0 {
            return Err("rooms.cleanup_interval_secs must be greater than 0".to_string());
        }

        if self.security.max_message_size == 0 || self.security.max_json_depth == 0 {
            return Err("security limits must be greater than 0".to_string());
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(format!(
                "Invalid log level: {}. Must be one of: {valid_levels:?}",
                &self.logging.level
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::{tempdir, NamedTempFile};
    use tokio::fs;

    #[test]
    fn test_app_config_default() {
        let config = AppConfig::default();

        assert_eq!(config.server.bind_address, "127.0.0.1:3000");
        assert_eq!(config.server.max_connections, 1000);
        assert_eq!(config.rooms.max_age_secs, 86_400);
        assert_eq!(config.rooms.cleanup_interval_secs, 3_600);
        assert_eq!(config.logging.level, "info");
        assert!(!config.logging.json_format);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_to_server_config() {
        let mut config = AppConfig::default();
        config.server.bind_address = "0.0.0.0:9000".to_string();
        config.rooms.max_age_secs = 120;
        config.security.max_json_depth = 4;

        let server_config = config.to_server_config().unwrap();
        assert_eq!(server_config.bind_address.port(), 9000);
        assert_eq!(server_config.room_max_age(), Duration::from_secs(120));
        assert_eq!(server_config.cleanup_interval(), Duration::from_secs(3_600));
        assert_eq!(server_config.security.max_json_depth, 4);
    }

    #[test]
    fn test_config_validation() {
        let mut config = AppConfig::default();

        config.server.bind_address = "invalid".to_string();
        assert!(config.validate().is_err());
        assert!(config.to_server_config().is_err());

        config.server.bind_address = "127.0.0.1:3000".to_string();
        config.rooms.cleanup_interval_secs = 0;
        assert!(config.validate().unwrap_err().contains("cleanup_interval_secs"));

        config.rooms.cleanup_interval_secs = 60;
        config.logging.level = "loud".to_string();
        assert!(config.validate().unwrap_err().contains("Invalid log level"));
    }

    #[tokio::test]
    async fn test_missing_file_is_created_with_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let config = AppConfig::load_from_file(&path).await.unwrap();
        assert_eq!(config, AppConfig::default());
        assert!(path.exists());

        let reloaded = AppConfig::load_from_file(&path).await.unwrap();
        assert_eq!(reloaded, config);
    }

    #[tokio::test]
    async fn test_partial_file_uses_defaults() {
        let file = NamedTempFile::new().unwrap();
        fs::write(
            file.path(),
            "[server]\nbind_address = \"0.0.0.0:4444\"\n\n[logging]\nlevel = \"debug\"\n",
        )
        .await
        .unwrap();

        let config = AppConfig::load_from_file(file.path()).await.unwrap();
        assert_eq!(config.server.bind_address, "0.0.0.0:4444");
        assert_eq!(config.server.max_connections, 1000);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.rooms, RoomSettings::default());
    }

    #[tokio::test]
    async fn test_malformed_file_is_an_error() {
        let file = NamedTempFile::new().unwrap();
        fs::write(file.path(), "[server\nbind_address = 7").await.unwrap();
        assert!(AppConfig::load_from_file(file.path()).await.is_err());
    }
}
