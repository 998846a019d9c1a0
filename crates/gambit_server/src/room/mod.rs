//! Password-gated rooms pairing up to two players.
//!
//! Each [`Room`] sits behind its own `tokio::sync::Mutex` (a [`RoomHandle`]).
//! Holding that guard is the only way to read-then-write the room's members,
//! status or embedded game, so operations on one room are serialized while
//! different rooms never contend.

mod registry;

pub use registry::{JoinOutcome, LeaveOutcome, RoomRegistry, SweepReport, SweptRoom};

use crate::error::ErrorCode;
use crate::game::{Color, GameSession, GameState, GameStatus};
use crate::session::PlayerId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use uuid::Uuid;

pub const MAX_PLAYERS: usize = 2;
pub const PASSWORD_MIN_CHARS: usize = 3;
pub const PASSWORD_MAX_CHARS: usize = 50;
const ROOM_ID_LEN: usize = 8;

/// Shared handle to a room. The mutex is the room's serialization point.
pub type RoomHandle = Arc<Mutex<Room>>;

/// Short uppercase room code handed out to players.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(String);

impl RoomId {
    /// Generates a fresh 8-character code.
    pub fn generate() -> Self {
        let simple = Uuid::new_v4().simple().to_string().to_ascii_uppercase();
        Self(simple[..ROOM_ID_LEN].to_string())
    }

    /// Normalizes a client-supplied code (trimmed, uppercased).
    pub fn normalize(raw: &str) -> Self {
        Self(raw.trim().to_ascii_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for RoomId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomStatus {
    Waiting,
    Ready,
    Finished,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomMember {
    pub player_id: PlayerId,
    pub color: Color,
}

#[derive(Debug)]
pub struct Room {
    pub id: RoomId,
    password: String,
    pub players: Vec<RoomMember>,
    pub status: RoomStatus,
    pub created_at: DateTime<Utc>,
    pub game: Option<GameSession>,
    /// Set under the room's mutex just before the room leaves the store.
    pub closed: bool,
}

impl Room {
    fn new(id: RoomId, password: String, creator: PlayerId) -> Self {
        Self {
            id,
            password,
            players: vec![RoomMember {
                player_id: creator,
                color: Color::White,
            }],
            status: RoomStatus::Waiting,
            created_at: Utc::now(),
            game: None,
            closed: false,
        }
    }

    pub fn color_of(&self, player_id: PlayerId) -> Option<Color> {
        self.players
            .iter()
            .find(|member| member.player_id == player_id)
            .map(|member| member.color)
    }

    pub fn member(&self, color: Color) -> Option<PlayerId> {
        self.players
            .iter()
            .find(|member| member.color == color)
            .map(|member| member.player_id)
    }

    /// The other member of the room, if any.
    pub fn opponent_of(&self, player_id: PlayerId) -> Option<RoomMember> {
        self.players
            .iter()
            .find(|member| member.player_id != player_id)
            .copied()
    }

    /// Whether the room was created more than `max_age` ago.
    pub fn is_expired(&self, max_age: Duration) -> bool {
        let age = (Utc::now() - self.created_at).to_std().unwrap_or_default();
        age > max_age
    }

    pub fn is_full(&self) -> bool {
        self.players.len() >= MAX_PLAYERS
    }

    pub fn password_matches(&self, supplied: &str) -> bool {
        self.password == supplied.trim()
    }

    pub fn game_state(&self) -> Option<&GameState> {
        self.game.as_ref().map(GameSession::state)
    }

    pub fn is_game_active(&self) -> bool {
        self.game.as_ref().is_some_and(GameSession::is_active)
    }

    /// Derives the status from membership and the embedded game.
    pub fn refresh_status(&mut self) {
        let finished = self
            .game
            .as_ref()
            .is_some_and(|game| game.state().status == GameStatus::Finished);
        self.status = if finished {
            RoomStatus::Finished
        } else if self.is_full() {
            RoomStatus::Ready
        } else {
            RoomStatus::Waiting
        };
    }

    /// Read-only view without the password or the engine.
    pub fn snapshot(&self) -> RoomSnapshot {
        RoomSnapshot {
            id: self.id.clone(),
            players: self.players.clone(),
            status: self.status,
            created_at: self.created_at,
            game_state: self.game_state().cloned(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSnapshot {
    pub id: RoomId,
    pub players: Vec<RoomMember>,
    pub status: RoomStatus,
    pub created_at: DateTime<Utc>,
    pub game_state: Option<GameState>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RoomError {
    #[error("{0}")]
    InvalidPassword(String),
    #[error("Room not found")]
    NotFound,
    #[error("Wrong password")]
    WrongPassword,
    #[error("Room is full")]
    Full,
    #[error("Player is already in a room")]
    AlreadyInRoom,
}

impl RoomError {
    pub fn code(&self) -> ErrorCode {
        match self {
            RoomError::InvalidPassword(_) => ErrorCode::InvalidPassword,
            RoomError::NotFound => ErrorCode::RoomNotFound,
            RoomError::WrongPassword => ErrorCode::WrongPassword,
            RoomError::Full => ErrorCode::RoomFull,
            RoomError::AlreadyInRoom => ErrorCode::AlreadyInRoom,
        }
    }
}

/// Validates a room password and returns its trimmed form.
pub fn validate_password(password: Option<&str>) -> Result<String, RoomError> {
    let trimmed = match password.map(str::trim) {
        Some(value) if !value.is_empty() => value,
        _ => return Err(RoomError::InvalidPassword("Password is required".to_string())),
    };

    let length = trimmed.chars().count();
    if length < PASSWORD_MIN_CHARS {
        return Err(RoomError::InvalidPassword(format!(
            "Password must be at least {PASSWORD_MIN_CHARS} characters"
        )));
    }
    if length > PASSWORD_MAX_CHARS {
        return Err(RoomError::InvalidPassword(format!(
            "Password must be at most {PASSWORD_MAX_CHARS} characters"
        )));
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_password_validation_messages() {
        let message = |input: Option<&str>| validate_password(input).unwrap_err().to_string();

        assert_eq!(message(None), "Password is required");
        assert_eq!(message(Some("  ")), "Password is required");
        assert_eq!(message(Some("ab")), "Password must be at least 3 characters");
        assert_eq!(
            message(Some(&"x".repeat(51))),
            "Password must be at most 50 characters"
        );
        assert_eq!(validate_password(Some(" secret1 ")).unwrap(), "secret1");
        assert_eq!(validate_password(Some(&"x".repeat(50))).unwrap().len(), 50);
    }

    #[test]
    fn test_password_compare_is_trimmed_and_case_sensitive() {
        let room = Room::new(RoomId::generate(), "secret1".to_string(), PlayerId::new());
        assert!(room.password_matches("secret1"));
        assert!(room.password_matches("  secret1\t"));
        assert!(!room.password_matches("Secret1"));
        assert!(!room.password_matches("wrong"));
    }

    #[test]
    fn test_room_id_format() {
        let id = RoomId::generate();
        assert_eq!(id.as_str().len(), 8);
        assert!(id
            .as_str()
            .chars()
            .all(|c| c.is_ascii_digit() || c.is_ascii_uppercase()));
        assert_eq!(RoomId::normalize(" ab12cd34 "), RoomId::from("AB12CD34"));
    }

    #[test]
    fn test_new_room_has_white_creator() {
        let creator = PlayerId::new();
        let room = Room::new(RoomId::generate(), "pw1".to_string(), creator);
        assert_eq!(room.color_of(creator), Some(Color::White));
        assert_eq!(room.status, RoomStatus::Waiting);
        assert!(room.opponent_of(creator).is_none());
        assert!(!room.is_full());
    }
}
