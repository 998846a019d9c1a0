//! Ephemeral player identities.
//!
//! A [`Session`] is created when a connection claims a nickname and lives
//! until that connection closes. Nothing here outlives the process.

mod registry;

pub use registry::SessionRegistry;

use crate::connection::ConnectionId;
use crate::error::ErrorCode;
use crate::room::RoomId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

pub const NICKNAME_MIN_CHARS: usize = 2;
pub const NICKNAME_MAX_CHARS: usize = 20;

/// Unique identifier for a player session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(pub Uuid);

impl PlayerId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for PlayerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for PlayerId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// A connected player's identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: PlayerId,
    pub nickname: String,
    #[serde(skip)]
    pub connection_id: ConnectionId,
    pub room_id: Option<RoomId>,
    pub created_at: DateTime<Utc>,
}

impl Session {
    fn new(nickname: String, connection_id: ConnectionId) -> Self {
        Self {
            id: PlayerId::new(),
            nickname,
            connection_id,
            room_id: None,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("{0}")]
    InvalidNickname(String),
    #[error("Session already exists for this connection")]
    AlreadyExists,
    #[error("Session not found")]
    NotFound,
}

impl SessionError {
    pub fn code(&self) -> ErrorCode {
        match self {
            SessionError::InvalidNickname(_) => ErrorCode::InvalidNickname,
            SessionError::AlreadyExists => ErrorCode::ValidationError,
            SessionError::NotFound => ErrorCode::SessionNotFound,
        }
    }
}

/// Validates a nickname and returns its trimmed form.
///
/// Length is counted in characters after trimming. Allowed characters are
/// ASCII letters, digits, space, underscore and hyphen.
pub fn validate_nickname(nickname: Option<&str>) -> Result<String, SessionError> {
    let trimmed = match nickname.map(str::trim) {
        Some(value) if !value.is_empty() => value,
        _ => {
            return Err(SessionError::InvalidNickname(
                "Nickname is required".to_string(),
            ))
        }
    };

    let length = trimmed.chars().count();
    if length < NICKNAME_MIN_CHARS {
        return Err(SessionError::InvalidNickname(format!(
            "Nickname must be at least {NICKNAME_MIN_CHARS} characters"
        )));
    }
    if length > NICKNAME_MAX_CHARS {
        return Err(SessionError::InvalidNickname(format!(
            "Nickname must be at most {NICKNAME_MAX_CHARS} characters"
        )));
    }

    let allowed = |c: char| c.is_ascii_alphanumeric() || c == ' ' || c == '_' || c == '-';
    if !trimmed.chars().all(allowed) {
        return Err(SessionError::InvalidNickname(
            "Nickname may only contain letters, numbers, spaces, underscores and hyphens"
                .to_string(),
        ));
    }

    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_nicknames_are_trimmed() {
        assert_eq!(validate_nickname(Some("  alice ")).unwrap(), "alice");
        assert_eq!(validate_nickname(Some("Bo")).unwrap(), "Bo");
        assert_eq!(validate_nickname(Some("big_king-99 x")).unwrap(), "big_king-99 x");
        assert_eq!(
            validate_nickname(Some("abcdefghijklmnopqrst")).unwrap(),
            "abcdefghijklmnopqrst"
        );
    }

    #[test]
    fn test_invalid_nicknames_have_distinct_messages() {
        let message = |input: Option<&str>| validate_nickname(input).unwrap_err().to_string();

        assert_eq!(message(None), "Nickname is required");
        assert_eq!(message(Some("   ")), "Nickname is required");
        assert_eq!(message(Some(" a ")), "Nickname must be at least 2 characters");
        assert_eq!(
            message(Some("abcdefghijklmnopqrstu")),
            "Nickname must be at most 20 characters"
        );
        assert!(message(Some("bad!name")).starts_with("Nickname may only contain"));
        assert!(message(Some("émile")).starts_with("Nickname may only contain"));
    }

    #[test]
    fn test_nickname_errors_map_to_invalid_nickname() {
        let err = validate_nickname(Some("x")).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidNickname);
        assert_eq!(SessionError::AlreadyExists.code(), ErrorCode::ValidationError);
    }

    #[test]
    fn test_player_id_round_trips_through_string() {
        let id = PlayerId::new();
        let parsed: PlayerId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }
}
