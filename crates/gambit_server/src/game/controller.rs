//! Game session controller.
//!
//! Drives a room's game through Uninitialized → Active → Finished. Each
//! operation comes in two shapes: a `*_in` variant that works on a room the
//! caller has already locked (so it can be combined with other steps and
//! broadcasts under one guard), and an async variant keyed by room id that
//! takes the lock itself.

use super::{
    Color, EngineFactory, GameError, GameResult, GameSession, GameState, MoveInput, MoveRecord,
};
use crate::room::{Room, RoomId, RoomRegistry};
use crate::session::PlayerId;
use shakmaty::Square;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

/// What a successful move produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveOutcome {
    pub record: MoveRecord,
    pub state: GameState,
    /// Set when the move ended the game; the Finished transition has
    /// already been applied.
    pub result: Option<GameResult>,
}

pub struct GameController {
    rooms: Arc<RoomRegistry>,
    engine_factory: EngineFactory,
}

impl fmt::Debug for GameController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GameController")
            .field("rooms", &self.rooms.room_count())
            .finish_non_exhaustive()
    }
}

fn active_game(room: &mut Room) -> Result<&mut GameSession, GameError> {
    match room.game.as_mut() {
        Some(game) if game.is_active() => Ok(game),
        _ => Err(GameError::GameNotActive),
    }
}

impl GameController {
    pub fn new(rooms: Arc<RoomRegistry>, engine_factory: EngineFactory) -> Self {
        Self {
            rooms,
            engine_factory,
        }
    }

    async fn with_room<T>(
        &self,
        room_id: &RoomId,
        op: impl FnOnce(&mut Room) -> Result<T, GameError>,
    ) -> Result<T, GameError> {
        let mut room = self
            .rooms
            .lock_room(room_id)
            .await
            .ok_or(GameError::RoomNotFound)?;
        op(&mut *room)
    }

    /// Starts a game between the room's two members.
    ///
    /// # Errors
    ///
    /// * [`GameError::AlreadyStarted`] if the room already embeds a game
    /// * [`GameError::RoomNotReady`] if the room doesn't have two members
    /// * [`GameError::NotInRoom`] if `white`/`black` aren't the room's seats
    pub fn initialize_game_in(
        &self,
        room: &mut Room,
        white: PlayerId,
        black: PlayerId,
    ) -> Result<GameState, GameError> {
        if room.game.is_some() {
            return Err(GameError::AlreadyStarted);
        }
        if !room.is_full() {
            return Err(GameError::RoomNotReady);
        }
        if white == black
            || room.member(Color::White) != Some(white)
            || room.member(Color::Black) != Some(black)
        {
            return Err(GameError::NotInRoom);
        }

        let game = GameSession::new((self.engine_factory)());
        let state = game.state().clone();
        room.game = Some(game);
        room.refresh_status();

        info!("♟️ Game started in room {} ({} vs {})", room.id, white, black);
        Ok(state)
    }

    pub async fn initialize_game(
        &self,
        room_id: &RoomId,
        white: PlayerId,
        black: PlayerId,
    ) -> Result<GameState, GameError> {
        self.with_room(room_id, |room| self.initialize_game_in(room, white, black))
            .await
    }

    /// Applies `input` for `player`, then checks for a terminal position.
    ///
    /// On rejection the game state is unchanged.
    pub fn make_move_in(
        &self,
        room: &mut Room,
        player: PlayerId,
        input: MoveInput,
    ) -> Result<MoveOutcome, GameError> {
        let color = room.color_of(player);
        let game = active_game(room)?;
        let color = color.ok_or(GameError::NotInRoom)?;

        let record = game.apply_move(color, input)?;
        let result = game.evaluate();
        if let Some(result) = result {
            game.finish(result);
        }
        let state = game.state().clone();

        debug!("Room {}: {} played {}", room.id, color, record.san);
        if let Some(result) = result {
            room.refresh_status();
            info!("🏁 Game over in room {}: {:?}", room.id, result);
        }

        Ok(MoveOutcome {
            record,
            state,
            result,
        })
    }

    pub async fn make_move(
        &self,
        room_id: &RoomId,
        player: PlayerId,
        input: MoveInput,
    ) -> Result<MoveOutcome, GameError> {
        self.with_room(room_id, |room| self.make_move_in(room, player, input))
            .await
    }

    /// Dry run against a copy of the engine. Never mutates the room.
    pub fn validate_move_in(&self, room: &mut Room, input: MoveInput) -> Result<bool, GameError> {
        let game = active_game(room)?;
        let mut scratch = game.engine().fork();
        Ok(scratch
            .apply_move(input.from, input.to, Some(shakmaty::Role::Queen))
            .is_some())
    }

    pub async fn validate_move(&self, room_id: &RoomId, input: MoveInput) -> Result<bool, GameError> {
        self.with_room(room_id, |room| self.validate_move_in(room, input))
            .await
    }

    /// Terminal-condition query. Does not transition the game.
    pub fn is_game_over_in(&self, room: &Room) -> Option<GameResult> {
        room.game.as_ref()?.evaluate()
    }

    pub async fn is_game_over(&self, room_id: &RoomId) -> Option<GameResult> {
        let room = self.rooms.lock_room(room_id).await?;
        self.is_game_over_in(&room)
    }

    /// Records a draw offer from `player`. Either side may offer on any turn.
    pub fn offer_draw_in(&self, room: &mut Room, player: PlayerId) -> Result<Color, GameError> {
        let color = room.color_of(player);
        let game = active_game(room)?;
        let color = color.ok_or(GameError::NotInRoom)?;
        game.state.draw_offer = Some(color);
        Ok(color)
    }

    pub async fn offer_draw(&self, room_id: &RoomId, player: PlayerId) -> Result<Color, GameError> {
        self.with_room(room_id, |room| self.offer_draw_in(room, player))
            .await
    }

    /// Accepts the opponent's pending offer and finishes the game as a draw.
    pub fn accept_draw_in(&self, room: &mut Room, player: PlayerId) -> Result<GameResult, GameError> {
        let color = room.color_of(player);
        let game = active_game(room)?;
        let color = color.ok_or(GameError::NotInRoom)?;

        match game.state.draw_offer {
            None => return Err(GameError::NoDrawOffer),
            Some(offerer) if offerer == color => return Err(GameError::CannotAcceptOwnOffer),
            Some(_) => {}
        }

        let result = GameResult::draw();
        game.finish(result);
        room.refresh_status();
        info!("🤝 Draw agreed in room {}", room.id);
        Ok(result)
    }

    pub async fn accept_draw(
        &self,
        room_id: &RoomId,
        player: PlayerId,
    ) -> Result<GameResult, GameError> {
        self.with_room(room_id, |room| self.accept_draw_in(room, player))
            .await
    }

    /// Clears any pending offer, returning who had offered.
    pub fn decline_draw_in(&self, room: &mut Room) -> Result<Option<Color>, GameError> {
        let game = active_game(room)?;
        Ok(game.state.draw_offer.take())
    }

    pub async fn decline_draw(&self, room_id: &RoomId) -> Result<Option<Color>, GameError> {
        self.with_room(room_id, |room| self.decline_draw_in(room))
            .await
    }

    /// Concedes the game for `player`. The opponent wins.
    pub fn resign_in(&self, room: &mut Room, player: PlayerId) -> Result<GameResult, GameError> {
        let color = room.color_of(player).ok_or(GameError::NotInRoom)?;
        let game = active_game(room)?;

        let result = GameResult::resignation(color);
        game.finish(result);
        room.refresh_status();
        info!("🏳️ {} resigned in room {}", color, room.id);
        Ok(result)
    }

    pub async fn resign(&self, room_id: &RoomId, player: PlayerId) -> Result<GameResult, GameError> {
        self.with_room(room_id, |room| self.resign_in(room, player))
            .await
    }

    /// Moves an active game to Finished with `result`.
    pub fn finish_game_in(&self, room: &mut Room, result: GameResult) -> Result<(), GameError> {
        let game = active_game(room)?;
        game.finish(result);
        room.refresh_status();
        Ok(())
    }

    pub async fn finish_game(&self, room_id: &RoomId, result: GameResult) -> Result<(), GameError> {
        self.with_room(room_id, |room| self.finish_game_in(room, result))
            .await
    }

    /// Discards the room's game. Idempotent.
    pub fn cleanup_game_in(&self, room: &mut Room) -> bool {
        let removed = room.game.take().is_some();
        room.refresh_status();
        if removed {
            debug!("Game discarded in room {}", room.id);
        }
        removed
    }

    pub async fn cleanup_game(&self, room_id: &RoomId) -> bool {
        match self.rooms.lock_room(room_id).await {
            Some(mut room) => self.cleanup_game_in(&mut room),
            None => false,
        }
    }

    pub fn legal_moves_in(&self, room: &mut Room, from: Square) -> Result<Vec<Square>, GameError> {
        let game = active_game(room)?;
        Ok(game.engine().legal_destinations(from))
    }

    pub async fn legal_moves(&self, room_id: &RoomId, from: Square) -> Result<Vec<Square>, GameError> {
        self.with_room(room_id, |room| self.legal_moves_in(room, from))
            .await
    }

    pub async fn game_state(&self, room_id: &RoomId) -> Option<GameState> {
        let room = self.rooms.lock_room(room_id).await?;
        room.game_state().cloned()
    }
}
