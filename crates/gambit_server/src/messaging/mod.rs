//! Message handling and routing for client-server communication.
//!
//! This module provides the wire types, the parser that turns inbound frames
//! into typed requests, and the dispatcher that executes them.

pub mod dispatcher;
pub mod router;
pub mod types;

pub use dispatcher::EventDispatcher;
pub use router::{ClientRequest, ProtocolError};
pub use types::{ClientMessage, ErrorBody, PlayerView, ServerMessage};
