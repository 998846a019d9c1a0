//! Connection manager for tracking and messaging client connections.
//!
//! This module provides the central registry of open sockets. Frames are
//! never written to a socket directly from here: they are serialized and
//! queued on the connection's outbound channel, which preserves per-connection
//! ordering without holding any lock across socket I/O.

use super::{client::ClientConnection, ConnectionId, OutboundSender};
use crate::messaging::ServerMessage;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, error, info};

/// Central manager for all client connections.
///
/// # Architecture
///
/// * Uses `RwLock<HashMap>` for thread-safe connection storage
/// * Implements atomic connection ID generation
/// * Holds one outbound queue per connection
#[derive(Debug)]
pub struct ConnectionManager {
    /// Map of connection ID to client connection information
    connections: Arc<RwLock<HashMap<ConnectionId, ClientConnection>>>,

    /// Atomic counter for generating unique connection IDs
    next_id: Arc<AtomicUsize>,
}

impl ConnectionManager {
    /// Creates a new, empty connection manager.
    pub fn new() -> Self {
        Self {
            connections: Arc::new(RwLock::new(HashMap::new())),
            next_id: Arc::new(AtomicUsize::new(1)),
        }
    }

    /// Adds a new connection and returns its unique ID.
    ///
    /// # Arguments
    ///
    /// * `remote_addr` - The network address of the connecting client
    /// * `sender` - Outbound queue drained by the connection's writer task
    ///
    /// # Returns
    ///
    /// A unique `ConnectionId` assigned to this connection.
    pub async fn add_connection(&self, remote_addr: SocketAddr, sender: OutboundSender) -> ConnectionId {
        let connection_id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let connection = ClientConnection::new(remote_addr, sender);
        let mut connections = self.connections.write().await;
        connections.insert(connection_id, connection);
        info!("🔗 Connection {} from {}", connection_id, remote_addr);
        connection_id
    }

    /// Removes a connection from the manager.
    ///
    /// Dropping the entry drops its outbound sender, which ends the writer
    /// task once the queue is drained.
    pub async fn remove_connection(&self, connection_id: ConnectionId) {
        let mut connections = self.connections.write().await;
        if let Some(connection) = connections.remove(&connection_id) {
            info!(
                "❌ Connection {} from {} disconnected after {:?}",
                connection_id,
                connection.remote_addr,
                connection.uptime()
            );
        }
    }

    /// Serializes `message` and queues it for one connection.
    ///
    /// # Returns
    ///
    /// `true` if the frame was queued, `false` if the connection is gone.
    pub async fn send_to_connection(&self, connection_id: ConnectionId, message: &ServerMessage) -> bool {
        let frame = match serde_json::to_string(message) {
            Ok(frame) => frame,
            Err(e) => {
                error!("Failed to serialize {} for connection {}: {}", message.event_name(), connection_id, e);
                return false;
            }
        };

        let connections = self.connections.read().await;
        match connections.get(&connection_id) {
            Some(connection) if connection.send(frame) => {
                debug!("📤 {} -> connection {}", message.event_name(), connection_id);
                true
            }
            Some(_) => {
                debug!("Connection {} writer closed, dropping {}", connection_id, message.event_name());
                false
            }
            None => false,
        }
    }

    /// Returns the number of open connections.
    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use tokio::sync::mpsc;

    fn addr() -> SocketAddr {
        "127.0.0.1:9000".parse().unwrap()
    }

    #[tokio::test]
    async fn test_connection_lifecycle() {
        let manager = ConnectionManager::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let first = manager.add_connection(addr(), tx.clone()).await;
        let second = manager.add_connection(addr(), tx).await;
        assert_ne!(first, second);
        assert_eq!(manager.connection_count().await, 2);

        manager.remove_connection(first).await;
        assert_eq!(manager.connection_count().await, 1);
        manager.remove_connection(first).await;
        assert_eq!(manager.connection_count().await, 1);
    }

    #[tokio::test]
    async fn test_send_queues_serialized_frame() {
        let manager = ConnectionManager::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let conn = manager.add_connection(addr(), tx).await;

        let message = ServerMessage::error(ErrorCode::RoomFull, "Room is full");
        assert!(manager.send_to_connection(conn, &message).await);

        let frame: serde_json::Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(frame["event"], "error");
        assert_eq!(frame["data"]["code"], "ROOM_FULL");
    }

    #[tokio::test]
    async fn test_send_to_missing_or_closed_connection() {
        let manager = ConnectionManager::new();
        let message = ServerMessage::error(ErrorCode::ValidationError, "nope");
        assert!(!manager.send_to_connection(42, &message).await);

        let (tx, rx) = mpsc::unbounded_channel();
        let conn = manager.add_connection(addr(), tx).await;
        drop(rx);
        assert!(!manager.send_to_connection(conn, &message).await);
    }
}
