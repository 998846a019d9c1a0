//! Utility functions and helper methods for the game server.
//!
//! This module provides convenient factory functions for creating server
//! instances with different configurations.

use crate::{config::ServerConfig, server::GameServer};

/// Creates a new game server with default configuration.
///
/// This is a convenience function for quickly setting up a server
/// with sensible defaults for development and testing.
///
/// # Returns
///
/// A new `GameServer` instance configured with default settings.
///
/// # Example
///
/// ```rust
/// use gambit_server::create_server;
///
/// let server = create_server();
/// assert_eq!(server.config().max_connections, 1000);
/// ```
pub fn create_server() -> GameServer {
    GameServer::new(ServerConfig::default())
}

/// Creates a new game server with custom configuration.
///
/// # Arguments
///
/// * `config` - Custom server configuration
///
/// # Returns
///
/// A new `GameServer` instance with the specified configuration.
pub fn create_server_with_config(config: ServerConfig) -> GameServer {
    GameServer::new(config)
}
