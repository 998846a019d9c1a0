//! Connection management for client connections.
//!
//! This module tracks open WebSocket connections and the outbound channel
//! every outgoing frame is queued on.

pub mod client;
pub mod manager;

pub use client::{ClientConnection, OutboundSender};
pub use manager::ConnectionManager;

/// Type alias for connection identifiers.
/// 
/// Connection IDs are assigned from a monotonically increasing counter and
/// are never reused while the process runs.
pub type ConnectionId = usize;
