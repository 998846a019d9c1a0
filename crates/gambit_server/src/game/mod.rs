//! Game state, results and the per-room game session state machine.
//!
//! A room owns at most one [`GameSession`]: the rules engine instance plus
//! the serializable [`GameState`] clients see. The draw offer lives inside
//! the game state so that every read-then-write on a game touches a single
//! value behind the room's mutex.

pub mod controller;
pub mod engine;

pub use controller::GameController;
pub use engine::{standard_engine_factory, AppliedMove, EngineFactory, RulesEngine, ShakmatyEngine};

use crate::error::ErrorCode;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shakmaty::{Role, Square};
use std::fmt;

/// Side of the board. The first room entrant plays white.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Color {
    White,
    Black,
}

impl Color {
    pub fn opposite(self) -> Self {
        match self {
            Color::White => Color::Black,
            Color::Black => Color::White,
        }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Color::White => f.write_str("white"),
            Color::Black => f.write_str("black"),
        }
    }
}

impl From<Color> for Winner {
    fn from(color: Color) -> Self {
        match color {
            Color::White => Winner::White,
            Color::Black => Winner::Black,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Winner {
    White,
    Black,
    Draw,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GameEndReason {
    Checkmate,
    Stalemate,
    Resignation,
    Draw,
}

/// Outcome of a concluded game. Produced once, never mutated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameResult {
    pub winner: Winner,
    pub reason: GameEndReason,
}

impl GameResult {
    pub fn checkmate(winner: Color) -> Self {
        Self {
            winner: winner.into(),
            reason: GameEndReason::Checkmate,
        }
    }

    pub fn stalemate() -> Self {
        Self {
            winner: Winner::Draw,
            reason: GameEndReason::Stalemate,
        }
    }

    pub fn resignation(resigning: Color) -> Self {
        Self {
            winner: resigning.opposite().into(),
            reason: GameEndReason::Resignation,
        }
    }

    pub fn draw() -> Self {
        Self {
            winner: Winner::Draw,
            reason: GameEndReason::Draw,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GameStatus {
    Active,
    Finished,
}

/// A move as submitted by a client, after strict parsing at the edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MoveInput {
    pub from: Square,
    pub to: Square,
    /// Piece the client claims to be moving. Informational only: legality is
    /// decided by the rules engine from the position.
    pub piece: Option<Role>,
}

impl MoveInput {
    /// Parses squares in algebraic form (`e2`) and an optional piece given
    /// either as a letter (`p`, `N`) or a name (`knight`).
    pub fn parse(from: &str, to: &str, piece: Option<&str>) -> Result<Self, String> {
        let from = parse_square(from)?;
        let to = parse_square(to)?;
        if from == to {
            return Err("Move must change squares".to_string());
        }
        let piece = piece.map(parse_role).transpose()?;
        Ok(Self { from, to, piece })
    }
}

fn parse_square(raw: &str) -> Result<Square, String> {
    let trimmed = raw.trim().to_ascii_lowercase();
    if trimmed.len() != 2 {
        return Err(format!("Invalid square: {raw:?}"));
    }
    trimmed
        .parse::<Square>()
        .map_err(|_| format!("Invalid square: {raw:?}"))
}

fn parse_role(raw: &str) -> Result<Role, String> {
    let lower = raw.trim().to_ascii_lowercase();
    let role = match lower.as_str() {
        "pawn" => Some(Role::Pawn),
        "knight" => Some(Role::Knight),
        "bishop" => Some(Role::Bishop),
        "rook" => Some(Role::Rook),
        "queen" => Some(Role::Queen),
        "king" => Some(Role::King),
        single if single.chars().count() == 1 => single.chars().next().and_then(Role::from_char),
        _ => None,
    };
    role.ok_or_else(|| format!("Invalid piece: {raw:?}"))
}

/// One entry of the append-only move history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveRecord {
    pub from: String,
    pub to: String,
    pub piece: String,
    pub san: String,
    pub color: Color,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub promotion: Option<String>,
    pub captured: bool,
    pub timestamp: DateTime<Utc>,
}

impl MoveRecord {
    fn new(applied: &AppliedMove, color: Color) -> Self {
        Self {
            from: applied.from.to_string(),
            to: applied.to.to_string(),
            piece: applied.role.char().to_string(),
            san: applied.san.clone(),
            color,
            promotion: applied.promotion.map(|role| role.char().to_string()),
            captured: applied.captured,
            timestamp: Utc::now(),
        }
    }
}

/// The live record of one room's match, as sent to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameState {
    /// Board snapshot in FEN, produced by the rules engine.
    pub board: String,
    pub turn: Color,
    pub moves: Vec<MoveRecord>,
    pub in_check: bool,
    pub is_checkmate: bool,
    pub is_stalemate: bool,
    /// Colour of the player with an outstanding draw offer.
    pub draw_offer: Option<Color>,
    pub status: GameStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<GameResult>,
}

impl GameState {
    fn from_engine(engine: &dyn RulesEngine) -> Self {
        Self {
            board: engine.snapshot(),
            turn: engine.turn(),
            moves: Vec::new(),
            in_check: engine.in_check(),
            is_checkmate: engine.is_checkmate(),
            is_stalemate: engine.is_stalemate(),
            draw_offer: None,
            status: GameStatus::Active,
            result: None,
        }
    }
}

/// Rules engine instance plus the state derived from it.
#[derive(Debug)]
pub struct GameSession {
    engine: Box<dyn RulesEngine>,
    state: GameState,
}

impl GameSession {
    pub fn new(engine: Box<dyn RulesEngine>) -> Self {
        let state = GameState::from_engine(engine.as_ref());
        Self { engine, state }
    }

    pub fn state(&self) -> &GameState {
        &self.state
    }

    pub fn engine(&self) -> &dyn RulesEngine {
        self.engine.as_ref()
    }

    pub fn is_active(&self) -> bool {
        self.state.status == GameStatus::Active
    }

    /// Applies a move for `color`. State is untouched unless the engine
    /// accepts the move.
    fn apply_move(&mut self, color: Color, input: MoveInput) -> Result<MoveRecord, GameError> {
        if !self.is_active() {
            return Err(GameError::GameNotActive);
        }
        if color != self.state.turn {
            return Err(GameError::NotYourTurn {
                expected: self.state.turn,
            });
        }

        let applied = self
            .engine
            .apply_move(input.from, input.to, Some(Role::Queen))
            .ok_or(GameError::InvalidMove {
                from: input.from,
                to: input.to,
            })?;

        let record = MoveRecord::new(&applied, color);
        self.state.moves.push(record.clone());
        self.state.board = self.engine.snapshot();
        self.state.turn = self.engine.turn();
        self.state.in_check = self.engine.in_check();
        self.state.is_checkmate = self.engine.is_checkmate();
        self.state.is_stalemate = self.engine.is_stalemate();
        // A move is an implicit decline of any pending offer.
        self.state.draw_offer = None;
        Ok(record)
    }

    /// Terminal-condition check against the engine. Does not transition.
    pub fn evaluate(&self) -> Option<GameResult> {
        if self.engine.is_checkmate() {
            Some(GameResult::checkmate(self.engine.turn().opposite()))
        } else if self.engine.is_stalemate() {
            Some(GameResult::stalemate())
        } else if self.engine.is_other_draw() {
            Some(GameResult::draw())
        } else {
            None
        }
    }

    fn finish(&mut self, result: GameResult) {
        self.state.status = GameStatus::Finished;
        self.state.result = Some(result);
        self.state.draw_offer = None;
    }
}

/// Failures reported by the game session controller.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GameError {
    #[error("Room not found")]
    RoomNotFound,
    #[error("Player is not a member of this room")]
    NotInRoom,
    #[error("Room needs two players before a game can start")]
    RoomNotReady,
    #[error("A game has already been started in this room")]
    AlreadyStarted,
    #[error("No active game in this room")]
    GameNotActive,
    #[error("Not your turn - it is {expected}'s turn")]
    NotYourTurn { expected: Color },
    #[error("Illegal move {from}{to}")]
    InvalidMove { from: Square, to: Square },
    #[error("No draw offer is pending")]
    NoDrawOffer,
    #[error("You cannot accept your own draw offer")]
    CannotAcceptOwnOffer,
}

impl GameError {
    pub fn code(&self) -> ErrorCode {
        match self {
            GameError::RoomNotFound => ErrorCode::RoomNotFound,
            GameError::NotInRoom => ErrorCode::SessionNotFound,
            GameError::RoomNotReady | GameError::AlreadyStarted => ErrorCode::ValidationError,
            GameError::GameNotActive => ErrorCode::GameNotActive,
            GameError::NotYourTurn { .. } => ErrorCode::NotYourTurn,
            GameError::InvalidMove { .. } => ErrorCode::InvalidMove,
            GameError::NoDrawOffer | GameError::CannotAcceptOwnOffer => ErrorCode::NoDrawOffer,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_move_input() {
        let input = MoveInput::parse("e2", "E4", Some("p")).unwrap();
        assert_eq!(input.from, Square::E2);
        assert_eq!(input.to, Square::E4);
        assert_eq!(input.piece, Some(Role::Pawn));

        let input = MoveInput::parse(" g1 ", "f3", Some("Knight")).unwrap();
        assert_eq!(input.piece, Some(Role::Knight));

        assert!(MoveInput::parse("e2", "e4", None).unwrap().piece.is_none());
    }

    #[test]
    fn test_parse_move_input_rejects_malformed() {
        assert!(MoveInput::parse("e9", "e4", None).is_err());
        assert!(MoveInput::parse("i2", "e4", None).is_err());
        assert!(MoveInput::parse("e2e4", "e4", None).is_err());
        assert!(MoveInput::parse("", "e4", None).is_err());
        assert!(MoveInput::parse("e2", "e2", None).is_err());
        assert!(MoveInput::parse("e2", "e4", Some("dragon")).is_err());
        assert!(MoveInput::parse("e2", "e4", Some("x")).is_err());
    }

    #[test]
    fn test_resignation_result_names_opponent() {
        assert_eq!(GameResult::resignation(Color::White).winner, Winner::Black);
        assert_eq!(GameResult::resignation(Color::Black).winner, Winner::White);
        assert_eq!(
            GameResult::resignation(Color::Black).reason,
            GameEndReason::Resignation
        );
    }

    #[test]
    fn test_result_serialization() {
        let json = serde_json::to_value(GameResult::draw()).unwrap();
        assert_eq!(json, serde_json::json!({"winner": "draw", "reason": "draw"}));
    }

    #[test]
    fn test_new_session_starts_with_white() {
        let session = GameSession::new(Box::new(ShakmatyEngine::standard()));
        assert_eq!(session.state().turn, Color::White);
        assert!(session.state().moves.is_empty());
        assert!(session.state().draw_offer.is_none());
        assert!(session.is_active());
        assert!(session.evaluate().is_none());
    }

    #[test]
    fn test_game_error_codes() {
        assert_eq!(GameError::NotInRoom.code(), ErrorCode::SessionNotFound);
        assert_eq!(
            GameError::NotYourTurn { expected: Color::Black }.code(),
            ErrorCode::NotYourTurn
        );
        assert_eq!(GameError::CannotAcceptOwnOffer.code(), ErrorCode::NoDrawOffer);
        assert_eq!(GameError::GameNotActive.code(), ErrorCode::GameNotActive);
    }
}
