//! Client connection representation.
//!
//! This module defines the per-connection record the manager keeps for
//! every open socket.

use std::net::SocketAddr;
use std::time::SystemTime;
use tokio::sync::mpsc;

/// Queue of serialized frames waiting to be written to one socket.
pub type OutboundSender = mpsc::UnboundedSender<String>;

/// Represents an individual client connection to the server.
/// 
/// # Fields
/// 
/// * `remote_addr` - The network address of the connected client
/// * `connected_at` - Timestamp when the connection was established
/// * `sender` - Outbound queue drained by the connection's writer task
#[derive(Debug)]
pub struct ClientConnection {
    pub remote_addr: SocketAddr,
    pub connected_at: SystemTime,
    pub sender: OutboundSender,
}

impl ClientConnection {
    /// Creates a new client connection with the specified remote address.
    /// 
    /// # Arguments
    /// 
    /// * `remote_addr` - The network address of the connecting client
    /// * `sender` - Outbound queue for this connection
    pub fn new(remote_addr: SocketAddr, sender: OutboundSender) -> Self {
        Self {
            remote_addr,
            connected_at: SystemTime::now(),
            sender,
        }
    }

    /// Queues a text frame. Returns `false` if the writer task is gone.
    pub fn send(&self, frame: String) -> bool {
        self.sender.send(frame).is_ok()
    }

    /// How long this connection has been open.
    pub fn uptime(&self) -> std::time::Duration {
        self.connected_at.elapsed().unwrap_or_default()
    }
}
