//! # Gambit Server - Two-Player Chess Rooms over WebSockets
//!
//! The server pairs players into password-protected rooms and referees the
//! games they play there. It owns no rendering and no accounts: a client opens
//! a WebSocket, creates a session with a nickname, then creates or joins a
//! room. Once both seats are taken the white player starts the game, and every
//! move is validated server-side before it is broadcast to the room.
//!
//! ## Architecture Overview
//!
//! * **Session Registry** ([`session`]) - connection ↔ player identity
//! * **Room Registry** ([`room`]) - rooms, seats, passwords and the
//!   player → room index
//! * **Game Controller** ([`game`]) - per-room game lifecycle on top of a
//!   pluggable [`game::RulesEngine`]
//! * **Event Dispatcher** ([`messaging`]) - turns client frames into
//!   operations and fans results out to room members
//! * **Connection Manager** - socket lifecycle and outbound queues
//!
//! ### Message Flow
//!
//! 1. Client sends `{"event": "...", "data": {...}}`
//! 2. The frame is size and shape checked ([`security`])
//! 3. The router parses it into a typed request
//! 4. The dispatcher runs it with the caller's room locked
//! 5. Replies and broadcasts are queued on each member's connection
//!
//! ## Error Handling
//!
//! Every failed request is answered with a machine-readable
//! [`error::ErrorCode`]; [`ServerError`] only covers server-level failures
//! like binding the listener.
//!
//! ## Thread Safety
//!
//! Each room sits behind its own `tokio::sync::Mutex`; requests touching
//! different rooms never contend. Registries are backed by [`store::KeyedStore`]
//! implementations that are safe to share across tasks.

// Re-export core types and functions for easy access
pub use config::{SecurityConfig, ServerConfig};
pub use error::{ErrorCode, ServerError};
pub use server::{GameServer, ServerStats};
pub use utils::{create_server, create_server_with_config};

// Public module declarations
pub mod config;
pub mod error;
pub mod game;
pub mod messaging;
pub mod room;
pub mod security;
pub mod server;
pub mod session;
pub mod store;
pub mod utils;

pub mod connection;
