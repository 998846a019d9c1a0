//! Error types and handling for the game server.
//!
//! This module defines the infrastructure error type returned by server
//! startup and transport code, plus the closed set of protocol error codes
//! every domain error maps onto before it reaches a client.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Enumeration of possible server errors.
///
/// Failures of the transport layer: binding the listener, accepting sockets
/// and WebSocket handshakes.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Network-related errors such as binding failures or connection issues
    #[error("Network error: {0}")]
    Network(String),
}

/// Protocol error codes sent to clients in `error{code,message}` frames.
///
/// The set is closed: every failure a client can observe maps to exactly
/// one of these codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    InvalidMove,
    RoomFull,
    WrongPassword,
    SessionNotFound,
    RoomNotFound,
    NotYourTurn,
    GameNotActive,
    InvalidNickname,
    InvalidPassword,
    AlreadyInRoom,
    NoDrawOffer,
    ValidationError,
}

impl ErrorCode {
    /// Returns the wire representation of the code.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::InvalidMove => "INVALID_MOVE",
            ErrorCode::RoomFull => "ROOM_FULL",
            ErrorCode::WrongPassword => "WRONG_PASSWORD",
            ErrorCode::SessionNotFound => "SESSION_NOT_FOUND",
            ErrorCode::RoomNotFound => "ROOM_NOT_FOUND",
            ErrorCode::NotYourTurn => "NOT_YOUR_TURN",
            ErrorCode::GameNotActive => "GAME_NOT_ACTIVE",
            ErrorCode::InvalidNickname => "INVALID_NICKNAME",
            ErrorCode::InvalidPassword => "INVALID_PASSWORD",
            ErrorCode::AlreadyInRoom => "ALREADY_IN_ROOM",
            ErrorCode::NoDrawOffer => "NO_DRAW_OFFER",
            ErrorCode::ValidationError => "VALIDATION_ERROR",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_wire_format_matches_display() {
        let codes = [
            ErrorCode::InvalidMove,
            ErrorCode::RoomFull,
            ErrorCode::WrongPassword,
            ErrorCode::SessionNotFound,
            ErrorCode::RoomNotFound,
            ErrorCode::NotYourTurn,
            ErrorCode::GameNotActive,
            ErrorCode::InvalidNickname,
            ErrorCode::InvalidPassword,
            ErrorCode::AlreadyInRoom,
            ErrorCode::NoDrawOffer,
            ErrorCode::ValidationError,
        ];

        for code in codes {
            let json = serde_json::to_string(&code).unwrap();
            assert_eq!(json, format!("\"{}\"", code));
        }
    }

    #[test]
    fn test_server_error_display() {
        let err = ServerError::Network("bind failed".to_string());
        assert_eq!(err.to_string(), "Network error: bind failed");
    }
}
