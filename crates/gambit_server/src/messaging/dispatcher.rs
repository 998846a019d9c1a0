//! Event dispatcher: the only component that talks to connections.
//!
//! Each inbound request resolves the caller's session and room, runs one
//! registry or controller operation, and answers with exactly one of a reply
//! to the requester, a broadcast to the room's members, or an error to the
//! requester. Anything touching a room runs with that room's guard held,
//! including the outbound sends, so members see events in the same order
//! the room applied them.
//!
//! `decline-draw` with no pending offer is a silent no-op: nothing changes and
//! nothing is sent back.

use super::router::{ClientRequest, ProtocolError};
use super::types::*;
use crate::connection::{ConnectionId, ConnectionManager};
use crate::error::ErrorCode;
use crate::game::{Color, GameController, GameError, GameResult, MoveInput};
use crate::room::{Room, RoomError, RoomId, RoomRegistry, SweepReport};
use crate::security::SecurityError;
use crate::session::{PlayerId, Session, SessionError, SessionRegistry};
use shakmaty::Square;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, info, warn};

impl From<SessionError> for ErrorBody {
    fn from(err: SessionError) -> Self {
        ErrorBody::new(err.code(), err.to_string())
    }
}

impl From<RoomError> for ErrorBody {
    fn from(err: RoomError) -> Self {
        ErrorBody::new(err.code(), err.to_string())
    }
}

impl From<GameError> for ErrorBody {
    fn from(err: GameError) -> Self {
        ErrorBody::new(err.code(), err.to_string())
    }
}

impl From<ProtocolError> for ErrorBody {
    fn from(err: ProtocolError) -> Self {
        ErrorBody::new(err.code(), err.to_string())
    }
}

impl From<SecurityError> for ErrorBody {
    fn from(err: SecurityError) -> Self {
        ErrorBody::new(err.code(), err.to_string())
    }
}

type HandlerResult = Result<(), ErrorBody>;

/// How a player is leaving their room.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Departure {
    /// Explicit `leave-room`; the session survives.
    Leave,
    /// Connection closed; the session is removed too.
    Disconnect,
}

#[derive(Debug)]
pub struct EventDispatcher {
    sessions: Arc<SessionRegistry>,
    rooms: Arc<RoomRegistry>,
    games: Arc<GameController>,
    connections: Arc<ConnectionManager>,
}

impl EventDispatcher {
    pub fn new(
        sessions: Arc<SessionRegistry>,
        rooms: Arc<RoomRegistry>,
        games: Arc<GameController>,
        connections: Arc<ConnectionManager>,
    ) -> Self {
        Self {
            sessions,
            rooms,
            games,
            connections,
        }
    }

    pub fn sessions(&self) -> &Arc<SessionRegistry> {
        &self.sessions
    }

    pub fn rooms(&self) -> &Arc<RoomRegistry> {
        &self.rooms
    }

    pub fn connections(&self) -> &Arc<ConnectionManager> {
        &self.connections
    }

    /// Handles one raw text frame from `connection_id`.
    pub async fn dispatch_text(&self, connection_id: ConnectionId, text: &str) {
        match serde_json::from_str::<serde_json::Value>(text) {
            Ok(value) => self.dispatch_value(connection_id, value).await,
            Err(e) => {
                warn!("Connection {} sent an invalid frame: {}", connection_id, e);
                self.reject(connection_id, ProtocolError::InvalidJson(e.to_string()).into())
                    .await;
            }
        }
    }

    /// Handles a frame that has already been decoded (and size-checked).
    pub async fn dispatch_value(&self, connection_id: ConnectionId, value: serde_json::Value) {
        match serde_json::from_value::<ClientMessage>(value) {
            Ok(message) => self.dispatch(connection_id, message).await,
            Err(e) => {
                warn!("Connection {} sent a frame without an event: {}", connection_id, e);
                self.reject(connection_id, ProtocolError::InvalidJson(e.to_string()).into())
                    .await;
            }
        }
    }

    /// Sends a plain `error` frame for input that never became a request.
    pub async fn reject(&self, connection_id: ConnectionId, body: ErrorBody) {
        self.reply(connection_id, &ServerMessage::Error(body)).await;
    }

    /// Handles one parsed envelope from `connection_id`.
    pub async fn dispatch(&self, connection_id: ConnectionId, message: ClientMessage) {
        let event = message.event.clone();
        debug!("📨 '{}' from connection {}", event, connection_id);

        let outcome = match ClientRequest::from_message(message) {
            Ok(request) => self.handle(connection_id, request).await,
            Err(e) => Err(ErrorBody::from(e)),
        };

        if let Err(body) = outcome {
            warn!(
                "Rejected '{}' from connection {}: {} ({})",
                event, connection_id, body.message, body.code
            );
            self.reply(connection_id, &ServerMessage::failure_for(&event, body))
                .await;
        }
    }

    async fn handle(&self, connection_id: ConnectionId, request: ClientRequest) -> HandlerResult {
        match request {
            ClientRequest::CreateSession { nickname } => {
                self.create_session(connection_id, nickname.as_deref()).await
            }
            ClientRequest::CreateRoom { password } => {
                self.create_room(connection_id, password.as_deref()).await
            }
            ClientRequest::JoinRoom { room_id, password } => {
                self.join_room(connection_id, &room_id, &password).await
            }
            ClientRequest::LeaveRoom => self.leave_room(connection_id).await,
            ClientRequest::StartGame => self.start_game(connection_id).await,
            ClientRequest::GetRoomStatus => self.room_status(connection_id).await,
            ClientRequest::MakeMove(input) => self.make_move(connection_id, input).await,
            ClientRequest::ValidateMove(input) => self.validate_move(connection_id, input).await,
            ClientRequest::GetLegalMoves(square) => self.legal_moves(connection_id, square).await,
            ClientRequest::OfferDraw => self.offer_draw(connection_id).await,
            ClientRequest::AcceptDraw => self.accept_draw(connection_id).await,
            ClientRequest::DeclineDraw => self.decline_draw(connection_id).await,
            ClientRequest::Resign => self.resign(connection_id).await,
        }
    }

    async fn reply(&self, connection_id: ConnectionId, message: &ServerMessage) {
        self.connections.send_to_connection(connection_id, message).await;
    }

    async fn send_to_player(&self, player_id: PlayerId, message: &ServerMessage) {
        if let Some(session) = self.sessions.get_session_by_id(player_id) {
            self.connections
                .send_to_connection(session.connection_id, message)
                .await;
        }
    }

    async fn broadcast(&self, room: &Room, message: &ServerMessage) {
        for member in &room.players {
            self.send_to_player(member.player_id, message).await;
        }
    }

    fn player_view(&self, player_id: PlayerId, color: Option<Color>) -> PlayerView {
        let nickname = self
            .sessions
            .nickname_of(player_id)
            .unwrap_or_default();
        PlayerView {
            id: player_id,
            nickname,
            color,
        }
    }

    fn opponent_view(&self, room: &Room, player_id: PlayerId) -> Option<PlayerView> {
        let opponent = room.opponent_of(player_id)?;
        Some(self.player_view(opponent.player_id, Some(opponent.color)))
    }

    fn require_session(&self, connection_id: ConnectionId) -> Result<Session, ErrorBody> {
        self.sessions
            .get_session(connection_id)
            .ok_or_else(|| SessionError::NotFound.into())
    }

    /// Resolves and locks the caller's room.
    async fn require_room(
        &self,
        session: &Session,
    ) -> Result<OwnedMutexGuard<Room>, ErrorBody> {
        let room_id = self
            .rooms
            .get_player_room(session.id)
            .ok_or_else(|| ErrorBody::new(ErrorCode::RoomNotFound, "You are not in a room"))?;
        self.rooms
            .lock_room(&room_id)
            .await
            .ok_or_else(|| RoomError::NotFound.into())
    }

    async fn create_session(&self, connection_id: ConnectionId, nickname: Option<&str>) -> HandlerResult {
        let session = self.sessions.create_session(nickname, connection_id).await?;
        self.reply(
            connection_id,
            &ServerMessage::SessionCreated(SessionCreated {
                success: true,
                session: Some(session),
                error: None,
            }),
        )
        .await;
        Ok(())
    }

    async fn create_room(&self, connection_id: ConnectionId, password: Option<&str>) -> HandlerResult {
        let session = self.require_session(connection_id)?;
        if self.rooms.get_player_room(session.id).is_some() {
            return Err(RoomError::AlreadyInRoom.into());
        }

        let room_id = self.rooms.create_room(password, session.id).await?;
        self.sessions
            .update_room(connection_id, Some(room_id.clone()))
            .await;
        self.reply(
            connection_id,
            &ServerMessage::RoomCreated(RoomCreated {
                success: true,
                room_id: Some(room_id),
                player_color: Some(Color::White),
                error: None,
            }),
        )
        .await;
        Ok(())
    }

    async fn join_room(&self, connection_id: ConnectionId, raw_room_id: &str, password: &str) -> HandlerResult {
        let session = self.require_session(connection_id)?;
        let room_id = RoomId::normalize(raw_room_id);

        let mut room = self
            .rooms
            .lock_room(&room_id)
            .await
            .ok_or(RoomError::NotFound)?;
        let outcome = self.rooms.join_in(&mut room, password, session.id)?;
        self.sessions
            .update_room(connection_id, Some(room_id.clone()))
            .await;

        let opponent = self.opponent_view(&room, session.id);
        self.reply(
            connection_id,
            &ServerMessage::RoomJoined(RoomJoined {
                success: true,
                room_id: Some(room_id),
                player_color: Some(outcome.color),
                game_state: room.game_state().cloned(),
                opponent: opponent.clone(),
                error: None,
            }),
        )
        .await;

        if let (false, Some(opponent)) = (outcome.already_member, opponent) {
            let joiner = self.player_view(session.id, Some(outcome.color));
            self.send_to_player(
                opponent.id,
                &ServerMessage::PlayerJoined(PlayerJoined {
                    opponent: joiner,
                    game_state: room.game_state().cloned(),
                }),
            )
            .await;
        }
        Ok(())
    }

    async fn leave_room(&self, connection_id: ConnectionId) -> HandlerResult {
        let session = self.require_session(connection_id)?;
        let room_id = self
            .rooms
            .get_player_room(session.id)
            .ok_or_else(|| ErrorBody::new(ErrorCode::RoomNotFound, "You are not in a room"))?;

        self.depart(connection_id, &session, &room_id, Departure::Leave)
            .await;
        self.reply(
            connection_id,
            &ServerMessage::RoomLeft(RoomLeft {
                success: true,
                room_id: Some(room_id),
                error: None,
            }),
        )
        .await;
        Ok(())
    }

    async fn start_game(&self, connection_id: ConnectionId) -> HandlerResult {
        let session = self.require_session(connection_id)?;
        let mut room = self.require_room(&session).await?;

        let color = room.color_of(session.id).ok_or(GameError::NotInRoom)?;
        if color != Color::White {
            return Err(ErrorBody::new(
                ErrorCode::ValidationError,
                "Only the white player can start the game",
            ));
        }
        let black = room.member(Color::Black).ok_or(GameError::RoomNotReady)?;
        let game_state = self.games.initialize_game_in(&mut room, session.id, black)?;

        for member in room.players.clone() {
            let opponent = match self.opponent_view(&room, member.player_id) {
                Some(opponent) => opponent,
                None => continue,
            };
            self.send_to_player(
                member.player_id,
                &ServerMessage::GameStarted(GameStarted {
                    game_state: game_state.clone(),
                    player_color: member.color,
                    opponent,
                }),
            )
            .await;
        }
        Ok(())
    }

    async fn room_status(&self, connection_id: ConnectionId) -> HandlerResult {
        let session = self.require_session(connection_id)?;
        let room = self.require_room(&session).await?;
        let player_color = room.color_of(session.id).ok_or(GameError::NotInRoom)?;

        let report = RoomStatusReport {
            room_id: room.id.clone(),
            player_color,
            opponent: self.opponent_view(&room, session.id),
            game_state: room.game_state().cloned(),
            is_game_active: room.is_game_active(),
            is_room_ready: room.is_full(),
        };
        self.reply(connection_id, &ServerMessage::RoomStatus(report))
            .await;
        Ok(())
    }

    async fn make_move(&self, connection_id: ConnectionId, input: MoveInput) -> HandlerResult {
        let session = self.require_session(connection_id)?;
        let mut room = self.require_room(&session).await?;
        let outcome = self.games.make_move_in(&mut room, session.id, input)?;

        self.broadcast(
            &room,
            &ServerMessage::MoveMade(MoveMade {
                record: outcome.record,
                next_turn: outcome.state.turn,
                game_state: outcome.state.clone(),
            }),
        )
        .await;

        if let Some(result) = outcome.result {
            self.broadcast(
                &room,
                &ServerMessage::GameOver(GameOver {
                    result,
                    game_state: outcome.state,
                }),
            )
            .await;
        }
        Ok(())
    }

    async fn validate_move(&self, connection_id: ConnectionId, input: MoveInput) -> HandlerResult {
        let session = self.require_session(connection_id)?;
        let mut room = self.require_room(&session).await?;
        let valid = self.games.validate_move_in(&mut room, input)?;
        drop(room);

        self.reply(
            connection_id,
            &ServerMessage::MoveValidated(MoveValidated {
                echo: MoveEcho {
                    from: input.from.to_string(),
                    to: input.to.to_string(),
                    piece: input.piece.map(|role| role.char().to_string()),
                },
                valid,
            }),
        )
        .await;
        Ok(())
    }

    async fn legal_moves(&self, connection_id: ConnectionId, square: Square) -> HandlerResult {
        let session = self.require_session(connection_id)?;
        let mut room = self.require_room(&session).await?;
        let destinations = self.games.legal_moves_in(&mut room, square)?;
        drop(room);

        self.reply(
            connection_id,
            &ServerMessage::LegalMoves(LegalMoves {
                square: square.to_string(),
                destinations: destinations.iter().map(ToString::to_string).collect(),
            }),
        )
        .await;
        Ok(())
    }

    async fn offer_draw(&self, connection_id: ConnectionId) -> HandlerResult {
        let session = self.require_session(connection_id)?;
        let mut room = self.require_room(&session).await?;
        let color = self.games.offer_draw_in(&mut room, session.id)?;

        let from_player = self.player_view(session.id, Some(color));
        self.broadcast(&room, &ServerMessage::DrawOffered(DrawOffered { from_player }))
            .await;
        Ok(())
    }

    async fn accept_draw(&self, connection_id: ConnectionId) -> HandlerResult {
        let session = self.require_session(connection_id)?;
        let mut room = self.require_room(&session).await?;
        let result = self.games.accept_draw_in(&mut room, session.id)?;

        if let Some(game_state) = room.game_state().cloned() {
            self.broadcast(
                &room,
                &ServerMessage::DrawAccepted(GameOver { result, game_state }),
            )
            .await;
        }
        Ok(())
    }

    async fn decline_draw(&self, connection_id: ConnectionId) -> HandlerResult {
        let session = self.require_session(connection_id)?;
        let mut room = self.require_room(&session).await?;
        let color = room.color_of(session.id).ok_or(GameError::NotInRoom)?;
        if self.games.decline_draw_in(&mut room)?.is_none() {
            debug!("decline-draw from {} with no pending offer", session.id);
            return Ok(());
        }

        let by_player = self.player_view(session.id, Some(color));
        self.broadcast(&room, &ServerMessage::DrawDeclined(DrawDeclined { by_player }))
            .await;
        Ok(())
    }

    async fn resign(&self, connection_id: ConnectionId) -> HandlerResult {
        let session = self.require_session(connection_id)?;
        let mut room = self.require_room(&session).await?;
        let result = self.games.resign_in(&mut room, session.id)?;

        let color = room.color_of(session.id);
        let resigned_player = self.player_view(session.id, color);
        if let Some(game_state) = room.game_state().cloned() {
            self.broadcast(
                &room,
                &ServerMessage::PlayerResigned(PlayerResigned {
                    result,
                    game_state,
                    resigned_player,
                }),
            )
            .await;
        }
        Ok(())
    }

    /// Runs the departure sequence for `session` under its room's guard.
    ///
    /// Order: implicit resignation and `game-over` to the opponent if a game
    /// is active, `player-left` to the opponent, removal from the room, game
    /// discard, then the session update (room pointer cleared or session
    /// removed).
    async fn depart(
        &self,
        connection_id: ConnectionId,
        session: &Session,
        room_id: &RoomId,
        departure: Departure,
    ) {
        let mut guard = self.rooms.lock_room(room_id).await;
        if let Some(room) = guard.as_mut() {
            let color = room.color_of(session.id);

            if let Some(opponent) = room.opponent_of(session.id) {
                if room.is_game_active() {
                    if let Ok(result) = self.games.resign_in(room, session.id) {
                        if let Some(game_state) = room.game_state().cloned() {
                            self.send_to_player(
                                opponent.player_id,
                                &ServerMessage::GameOver(GameOver { result, game_state }),
                            )
                            .await;
                        }
                    }
                }

                let left_player = self.player_view(session.id, color);
                self.send_to_player(
                    opponent.player_id,
                    &ServerMessage::PlayerLeft(PlayerLeft { left_player }),
                )
                .await;
            }

            let outcome = self.rooms.leave_in(room, session.id);
            if outcome.removed && !outcome.room_deleted {
                self.games.cleanup_game_in(room);
            }
            info!(
                "🚶 Player {} left room {} ({:?}, room deleted: {})",
                session.id, room_id, departure, outcome.room_deleted
            );
        }

        self.finish_departure(connection_id, departure).await;
        drop(guard);
    }

    async fn finish_departure(&self, connection_id: ConnectionId, departure: Departure) {
        match departure {
            Departure::Leave => {
                self.sessions.update_room(connection_id, None).await;
            }
            Departure::Disconnect => {
                self.sessions.remove_session(connection_id).await;
            }
        }
    }

    /// Tears down everything bound to a closed connection.
    pub async fn handle_disconnect(&self, connection_id: ConnectionId) {
        if let Some(session) = self.sessions.get_session(connection_id) {
            match self.rooms.get_player_room(session.id) {
                Some(room_id) => {
                    self.depart(connection_id, &session, &room_id, Departure::Disconnect)
                        .await
                }
                None => {
                    self.sessions.remove_session(connection_id).await;
                }
            }
        }
        self.connections.remove_connection(connection_id).await;
    }

    /// Tears down every room created more than `max_age` ago.
    ///
    /// Each expired room is handled under its guard: an active game ends as a
    /// draw with `game-over` to both members, every member then gets a
    /// `player-left` naming themselves, and the room is evicted. A member's
    /// room pointer is cleared only while it still names the swept room.
    pub async fn sweep_expired_rooms(&self, max_age: Duration) -> SweepReport {
        let mut report = SweepReport::default();

        for room_id in self.rooms.room_ids() {
            let Some(mut room) = self.rooms.lock_room(&room_id).await else {
                continue;
            };
            if !room.is_expired(max_age) {
                continue;
            }

            let game_was_active = room.is_game_active();
            if game_was_active {
                let result = GameResult::draw();
                if self.games.finish_game_in(&mut room, result).is_ok() {
                    if let Some(game_state) = room.game_state().cloned() {
                        self.broadcast(
                            &room,
                            &ServerMessage::GameOver(GameOver { result, game_state }),
                        )
                        .await;
                    }
                }
            }

            for member in room.players.clone() {
                let left_player = self.player_view(member.player_id, Some(member.color));
                self.send_to_player(
                    member.player_id,
                    &ServerMessage::PlayerLeft(PlayerLeft { left_player }),
                )
                .await;
            }

            let swept = self.rooms.evict_in(&mut room, game_was_active);
            for member in &swept.members {
                self.sessions.clear_room_if(member.player_id, &swept.room_id).await;
            }
            drop(room);

            info!(
                "🧹 Room {} expired with {} member(s)",
                swept.room_id,
                swept.members.len()
            );
            report.rooms.push(swept);
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::standard_engine_factory;
    use serde_json::{json, Value};
    use tokio::sync::mpsc;

    fn dispatcher() -> EventDispatcher {
        let rooms = Arc::new(RoomRegistry::new());
        EventDispatcher::new(
            Arc::new(SessionRegistry::new()),
            rooms.clone(),
            Arc::new(GameController::new(rooms, standard_engine_factory())),
            Arc::new(ConnectionManager::new()),
        )
    }

    async fn connect(dispatcher: &EventDispatcher) -> (ConnectionId, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let conn = dispatcher
            .connections()
            .add_connection("127.0.0.1:4000".parse().unwrap(), tx)
            .await;
        (conn, rx)
    }

    fn next(rx: &mut mpsc::UnboundedReceiver<String>) -> Value {
        serde_json::from_str(&rx.try_recv().expect("expected a frame")).unwrap()
    }

    #[tokio::test]
    async fn test_requests_before_session_are_rejected() {
        let dispatcher = dispatcher();
        let (conn, mut rx) = connect(&dispatcher).await;

        dispatcher
            .dispatch_text(conn, &json!({"event": "start-game"}).to_string())
            .await;
        let frame = next(&mut rx);
        assert_eq!(frame["event"], "error");
        assert_eq!(frame["data"]["code"], "SESSION_NOT_FOUND");

        dispatcher
            .dispatch_text(conn, &json!({"event": "create-room", "data": {"password": "pw1"}}).to_string())
            .await;
        let frame = next(&mut rx);
        assert_eq!(frame["event"], "room-created");
        assert_eq!(frame["data"]["success"], false);
        assert_eq!(frame["data"]["error"]["code"], "SESSION_NOT_FOUND");
    }

    #[tokio::test]
    async fn test_invalid_nickname_reply() {
        let dispatcher = dispatcher();
        let (conn, mut rx) = connect(&dispatcher).await;

        dispatcher
            .dispatch_text(conn, &json!({"event": "create-session", "data": {"nickname": "a"}}).to_string())
            .await;
        let frame = next(&mut rx);
        assert_eq!(frame["event"], "session-created");
        assert_eq!(frame["data"]["success"], false);
        assert_eq!(frame["data"]["error"]["code"], "INVALID_NICKNAME");
        assert_eq!(
            frame["data"]["error"]["message"],
            "Nickname must be at least 2 characters"
        );
    }

    #[tokio::test]
    async fn test_garbage_frame_is_validation_error() {
        let dispatcher = dispatcher();
        let (conn, mut rx) = connect(&dispatcher).await;

        dispatcher.dispatch_text(conn, "{{{").await;
        assert_eq!(next(&mut rx)["data"]["code"], "VALIDATION_ERROR");

        dispatcher
            .dispatch_text(conn, &json!({"event": "teleport"}).to_string())
            .await;
        assert_eq!(next(&mut rx)["data"]["code"], "VALIDATION_ERROR");

        dispatcher.dispatch_value(conn, json!({"data": {}})).await;
        let frame = next(&mut rx);
        assert_eq!(frame["event"], "error");
        assert_eq!(frame["data"]["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_security_rejection_is_error_frame() {
        let dispatcher = dispatcher();
        let (conn, mut rx) = connect(&dispatcher).await;

        dispatcher
            .reject(conn, SecurityError::MessageTooLarge(99_999).into())
            .await;
        let frame = next(&mut rx);
        assert_eq!(frame["event"], "error");
        assert_eq!(frame["data"]["code"], "VALIDATION_ERROR");
    }
}
