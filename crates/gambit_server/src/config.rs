//! Server configuration types and defaults.
//!
//! This module contains the server configuration structure and default values
//! used to initialize and customize the game server behavior.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

/// Configuration structure for the game server.
/// 
/// Contains the network settings, connection limits, room lifecycle timings
/// and inbound frame limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// The socket address to bind the server to
    pub bind_address: SocketAddr,
    
    /// Maximum number of concurrent connections allowed
    pub max_connections: usize,
    
    /// Rooms older than this are removed by the sweep, regardless of activity
    pub room_max_age_secs: u64,
    
    /// Interval between expired-room sweeps
    pub cleanup_interval_secs: u64,
    
    /// Security configuration settings
    pub security: SecurityConfig,
}

impl ServerConfig {
    pub fn room_max_age(&self) -> Duration {
        Duration::from_secs(self.room_max_age_secs)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }
}

/// Limits applied to every inbound frame
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// Maximum message size in bytes
    pub max_message_size: usize,
    
    /// Maximum allowed nesting depth for JSON messages
    pub max_json_depth: usize,
    
    /// Maximum allowed string length in JSON
    pub max_string_length: usize,
    
    /// Maximum allowed array/object size
    pub max_collection_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from(([127, 0, 0, 1], 3000)),
            max_connections: 1000,
            room_max_age_secs: 24 * 60 * 60,
            cleanup_interval_secs: 60 * 60,
            security: SecurityConfig::default(),
        }
    }
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            max_message_size: 16 * 1024, // 16KB
            max_json_depth: 10,
            max_string_length: 256,
            max_collection_size: 32,
        }
    }
}
