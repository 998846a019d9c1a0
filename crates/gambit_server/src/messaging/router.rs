//! Parsing of inbound frames into typed requests.
//!
//! Payloads are validated here, before anything touches shared state: an
//! unknown event, a missing field or a malformed square is rejected with
//! `VALIDATION_ERROR` and never reaches the registries or the controller.

use super::types::ClientMessage;
use crate::error::ErrorCode;
use crate::game::MoveInput;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use shakmaty::Square;
use tracing::trace;

/// A fully parsed client request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientRequest {
    CreateSession { nickname: Option<String> },
    CreateRoom { password: Option<String> },
    JoinRoom { room_id: String, password: String },
    LeaveRoom,
    StartGame,
    GetRoomStatus,
    MakeMove(MoveInput),
    ValidateMove(MoveInput),
    GetLegalMoves(Square),
    OfferDraw,
    AcceptDraw,
    DeclineDraw,
    Resign,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("Invalid message: {0}")]
    InvalidJson(String),
    #[error("Unknown event: {0}")]
    UnknownEvent(String),
    #[error("Invalid {event} payload: {reason}")]
    InvalidPayload { event: String, reason: String },
}

impl ProtocolError {
    pub fn code(&self) -> ErrorCode {
        ErrorCode::ValidationError
    }
}

#[derive(Deserialize)]
struct NicknameData {
    nickname: Option<String>,
}

#[derive(Deserialize)]
struct PasswordData {
    password: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct JoinRoomData {
    room_id: String,
    #[serde(default)]
    password: String,
}

#[derive(Deserialize)]
struct RawMove {
    from: String,
    to: String,
    #[serde(default)]
    piece: Option<String>,
}

#[derive(Deserialize)]
struct MoveData {
    #[serde(rename = "move")]
    mv: RawMove,
}

#[derive(Deserialize)]
struct SquareData {
    square: String,
}

fn payload<T: DeserializeOwned>(event: &str, data: serde_json::Value) -> Result<T, ProtocolError> {
    let data = if data.is_null() {
        serde_json::Value::Object(serde_json::Map::new())
    } else {
        data
    };
    serde_json::from_value(data).map_err(|e| ProtocolError::InvalidPayload {
        event: event.to_string(),
        reason: e.to_string(),
    })
}

fn move_input(event: &str, data: serde_json::Value) -> Result<MoveInput, ProtocolError> {
    let MoveData { mv } = payload(event, data)?;
    MoveInput::parse(&mv.from, &mv.to, mv.piece.as_deref()).map_err(|reason| {
        ProtocolError::InvalidPayload {
            event: event.to_string(),
            reason,
        }
    })
}

impl ClientRequest {
    /// Converts an envelope into a typed request, validating its payload.
    pub fn from_message(message: ClientMessage) -> Result<Self, ProtocolError> {
        let ClientMessage { event, data } = message;
        trace!("Parsing '{}' request", event);

        let request = match event.as_str() {
            "create-session" => {
                let NicknameData { nickname } = payload(&event, data)?;
                ClientRequest::CreateSession { nickname }
            }
            "create-room" => {
                let PasswordData { password } = payload(&event, data)?;
                ClientRequest::CreateRoom { password }
            }
            "join-room" => {
                let JoinRoomData { room_id, password } = payload(&event, data)?;
                ClientRequest::JoinRoom { room_id, password }
            }
            "leave-room" => ClientRequest::LeaveRoom,
            "start-game" => ClientRequest::StartGame,
            "get-room-status" => ClientRequest::GetRoomStatus,
            "make-move" => ClientRequest::MakeMove(move_input(&event, data)?),
            "validate-move" => ClientRequest::ValidateMove(move_input(&event, data)?),
            "get-legal-moves" => {
                let SquareData { square } = payload(&event, data)?;
                let square = square
                    .trim()
                    .to_ascii_lowercase()
                    .parse::<Square>()
                    .map_err(|_| ProtocolError::InvalidPayload {
                        event: event.clone(),
                        reason: format!("Invalid square: {square:?}"),
                    })?;
                ClientRequest::GetLegalMoves(square)
            }
            "offer-draw" => ClientRequest::OfferDraw,
            "accept-draw" => ClientRequest::AcceptDraw,
            "decline-draw" => ClientRequest::DeclineDraw,
            "resign" => ClientRequest::Resign,
            _ => return Err(ProtocolError::UnknownEvent(event)),
        };
        Ok(request)
    }
}
