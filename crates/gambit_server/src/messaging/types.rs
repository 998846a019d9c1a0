//! Message type definitions for client-server communication.
//!
//! Every frame in either direction is a JSON object with an `event` name and
//! an optional `data` payload:
//!
//! ```json
//! { "event": "make-move", "data": { "move": { "from": "e2", "to": "e4" } } }
//! ```

use crate::error::ErrorCode;
use crate::game::{Color, GameResult, GameState, MoveRecord};
use crate::room::RoomId;
use crate::session::{PlayerId, Session};
use serde::{Deserialize, Serialize};

/// A message sent from a client to the server.
///
/// # Fields
///
/// * `event` - Kebab-case event name (e.g. "create-room", "resign")
/// * `data` - The payload as a JSON value; `null` when omitted
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientMessage {
    pub event: String,

    #[serde(default)]
    pub data: serde_json::Value,
}

/// Error payload sent to the requesting connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: ErrorCode,
    pub message: String,
}

impl ErrorBody {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Public view of a player, as seen by the other member of a room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerView {
    pub id: PlayerId,
    pub nickname: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<Color>,
}

/// Move as echoed back by `move-validated`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveEcho {
    pub from: String,
    pub to: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub piece: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionCreated {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<Session>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomCreated {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub room_id: Option<RoomId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub player_color: Option<Color>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomJoined {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub room_id: Option<RoomId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub player_color: Option<Color>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub game_state: Option<GameState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub opponent: Option<PlayerView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomLeft {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub room_id: Option<RoomId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerJoined {
    pub opponent: PlayerView,
    pub game_state: Option<GameState>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GameStarted {
    pub game_state: GameState,
    pub player_color: Color,
    pub opponent: PlayerView,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomStatusReport {
    pub room_id: RoomId,
    pub player_color: Color,
    pub opponent: Option<PlayerView>,
    pub game_state: Option<GameState>,
    pub is_game_active: bool,
    pub is_room_ready: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveMade {
    #[serde(rename = "move")]
    pub record: MoveRecord,
    pub game_state: GameState,
    pub next_turn: Color,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MoveValidated {
    #[serde(rename = "move")]
    pub echo: MoveEcho,
    pub valid: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LegalMoves {
    pub square: String,
    pub destinations: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GameOver {
    pub result: GameResult,
    pub game_state: GameState,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DrawOffered {
    pub from_player: PlayerView,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DrawDeclined {
    pub by_player: PlayerView,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerResigned {
    pub result: GameResult,
    pub game_state: GameState,
    pub resigned_player: PlayerView,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerLeft {
    pub left_player: PlayerView,
}

/// A message sent from the server to a client.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ServerMessage {
    SessionCreated(SessionCreated),
    RoomCreated(RoomCreated),
    RoomJoined(RoomJoined),
    RoomLeft(RoomLeft),
    PlayerJoined(PlayerJoined),
    GameStarted(GameStarted),
    RoomStatus(RoomStatusReport),
    MoveMade(MoveMade),
    MoveValidated(MoveValidated),
    LegalMoves(LegalMoves),
    GameOver(GameOver),
    DrawOffered(DrawOffered),
    DrawAccepted(GameOver),
    DrawDeclined(DrawDeclined),
    PlayerResigned(PlayerResigned),
    PlayerLeft(PlayerLeft),
    Error(ErrorBody),
}

impl ServerMessage {
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        ServerMessage::Error(ErrorBody::new(code, message))
    }

    /// Wire name of the event, for logging.
    pub fn event_name(&self) -> &'static str {
        match self {
            ServerMessage::SessionCreated(_) => "session-created",
            ServerMessage::RoomCreated(_) => "room-created",
            ServerMessage::RoomJoined(_) => "room-joined",
            ServerMessage::RoomLeft(_) => "room-left",
            ServerMessage::PlayerJoined(_) => "player-joined",
            ServerMessage::GameStarted(_) => "game-started",
            ServerMessage::RoomStatus(_) => "room-status",
            ServerMessage::MoveMade(_) => "move-made",
            ServerMessage::MoveValidated(_) => "move-validated",
            ServerMessage::LegalMoves(_) => "legal-moves",
            ServerMessage::GameOver(_) => "game-over",
            ServerMessage::DrawOffered(_) => "draw-offered",
            ServerMessage::DrawAccepted(_) => "draw-accepted",
            ServerMessage::DrawDeclined(_) => "draw-declined",
            ServerMessage::PlayerResigned(_) => "player-resigned",
            ServerMessage::PlayerLeft(_) => "player-left",
            ServerMessage::Error(_) => "error",
        }
    }

    /// Failure response for requests that answer with their own event
    /// (`create-session`, `create-room`, `join-room`, `leave-room`); a plain
    /// `error` frame for everything else.
    pub fn failure_for(event: &str, error: ErrorBody) -> Self {
        match event {
            "create-session" => ServerMessage::SessionCreated(SessionCreated {
                success: false,
                session: None,
                error: Some(error),
            }),
            "create-room" => ServerMessage::RoomCreated(RoomCreated {
                success: false,
                room_id: None,
                player_color: None,
                error: Some(error),
            }),
            "join-room" => ServerMessage::RoomJoined(RoomJoined {
                success: false,
                room_id: None,
                player_color: None,
                game_state: None,
                opponent: None,
                error: Some(error),
            }),
            "leave-room" => ServerMessage::RoomLeft(RoomLeft {
                success: false,
                room_id: None,
                error: Some(error),
            }),
            _ => ServerMessage::Error(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_client_message_data_is_optional() {
        let message: ClientMessage = serde_json::from_str(r#"{"event":"start-game"}"#).unwrap();
        assert_eq!(message.event, "start-game");
        assert!(message.data.is_null());
    }

    #[test]
    fn test_server_message_envelope() {
        let message = ServerMessage::error(ErrorCode::NotYourTurn, "Not your turn");
        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(
            value,
            json!({"event": "error", "data": {"code": "NOT_YOUR_TURN", "message": "Not your turn"}})
        );
        assert_eq!(message.event_name(), "error");
    }

    #[test]
    fn test_failure_shapes() {
        let body = ErrorBody::new(ErrorCode::WrongPassword, "Wrong password");
        let value = serde_json::to_value(ServerMessage::failure_for("join-room", body.clone())).unwrap();
        assert_eq!(value["event"], "room-joined");
        assert_eq!(value["data"]["success"], false);
        assert_eq!(value["data"]["error"]["code"], "WRONG_PASSWORD");
        assert!(value["data"].get("roomId").is_none());

        let value = serde_json::to_value(ServerMessage::failure_for("resign", body)).unwrap();
        assert_eq!(value["event"], "error");
    }

    #[test]
    fn test_event_names_match_serialized_tags() {
        let view = PlayerView {
            id: PlayerId::new(),
            nickname: "alice".to_string(),
            color: Some(Color::White),
        };
        let messages = [
            ServerMessage::PlayerLeft(PlayerLeft { left_player: view.clone() }),
            ServerMessage::DrawOffered(DrawOffered { from_player: view.clone() }),
            ServerMessage::DrawDeclined(DrawDeclined { by_player: view }),
            ServerMessage::LegalMoves(LegalMoves {
                square: "e2".to_string(),
                destinations: vec!["e3".to_string(), "e4".to_string()],
            }),
        ];
        for message in messages {
            let value = serde_json::to_value(&message).unwrap();
            assert_eq!(value["event"], message.event_name());
        }
    }

    #[test]
    fn test_player_view_field_names() {
        let view = PlayerView {
            id: PlayerId::new(),
            nickname: "bob".to_string(),
            color: Some(Color::Black),
        };
        let value = serde_json::to_value(ServerMessage::DrawDeclined(DrawDeclined { by_player: view })).unwrap();
        assert_eq!(value["data"]["byPlayer"]["nickname"], "bob");
        assert_eq!(value["data"]["byPlayer"]["color"], "black");
    }
}
