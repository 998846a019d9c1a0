//! Room registry: room table plus the player → room index.
//!
//! Lock order is always room mutex first, then stores. Stores are never
//! held across an await, so the order can't invert.

use super::{validate_password, Room, RoomError, RoomHandle, RoomId, RoomMember, RoomSnapshot};
use crate::game::Color;
use crate::session::PlayerId;
use crate::store::{KeyedStore, MemoryStore};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info};

/// Result of a successful join.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JoinOutcome {
    pub color: Color,
    /// The player was already a member; nothing changed.
    pub already_member: bool,
}

/// Result of removing a player from a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LeaveOutcome {
    pub removed: bool,
    pub room_deleted: bool,
}

/// A room removed by the expired-room sweep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweptRoom {
    pub room_id: RoomId,
    /// Members at the moment of eviction.
    pub members: Vec<RoomMember>,
    /// A game was still in progress when the room was torn down.
    pub game_was_active: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub rooms: Vec<SweptRoom>,
}

impl SweepReport {
    pub fn removed(&self) -> usize {
        self.rooms.len()
    }

    pub fn evicted_players(&self) -> impl Iterator<Item = PlayerId> + '_ {
        self.rooms
            .iter()
            .flat_map(|room| room.members.iter().map(|member| member.player_id))
    }
}

#[derive(Debug)]
pub struct RoomRegistry {
    rooms: Arc<dyn KeyedStore<RoomId, RoomHandle>>,
    player_rooms: Arc<dyn KeyedStore<PlayerId, RoomId>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::with_stores(Arc::new(MemoryStore::new()), Arc::new(MemoryStore::new()))
    }

    pub fn with_stores(
        rooms: Arc<dyn KeyedStore<RoomId, RoomHandle>>,
        player_rooms: Arc<dyn KeyedStore<PlayerId, RoomId>>,
    ) -> Self {
        Self {
            rooms,
            player_rooms,
        }
    }

    /// Creates a room with `creator` as its white player.
    ///
    /// # Arguments
    ///
    /// * `password` - Raw password as sent by the client; trimmed before storing
    /// * `creator` - The player opening the room
    ///
    /// # Errors
    ///
    /// [`RoomError::InvalidPassword`] on a policy violation, or
    /// [`RoomError::AlreadyInRoom`] if the creator is indexed to a room.
    pub async fn create_room(
        &self,
        password: Option<&str>,
        creator: PlayerId,
    ) -> Result<RoomId, RoomError> {
        let password = validate_password(password)?;
        if self.player_rooms.contains(&creator) {
            return Err(RoomError::AlreadyInRoom);
        }

        let mut id = RoomId::generate();
        while self.rooms.contains(&id) {
            id = RoomId::generate();
        }

        let handle: RoomHandle = Arc::new(Mutex::new(Room::new(id.clone(), password, creator)));
        let _guard = handle.lock().await;
        self.rooms.set(id.clone(), handle.clone());
        self.player_rooms.set(creator, id.clone());

        info!("🏠 Room {} created by {}", id, creator);
        Ok(id)
    }

    /// Locks a room for a read-then-write sequence.
    ///
    /// Returns `None` for unknown rooms and for rooms that were closed while
    /// the caller waited on the lock.
    pub async fn lock_room(&self, room_id: &RoomId) -> Option<OwnedMutexGuard<Room>> {
        let handle = self.rooms.get(room_id)?;
        let guard = handle.lock_owned().await;
        if guard.closed {
            return None;
        }
        Some(guard)
    }

    /// Adds `player` to an already-locked room.
    ///
    /// Checks run in this order: password, existing membership (idempotent),
    /// membership elsewhere, capacity. The free colour is assigned.
    pub fn join_in(
        &self,
        room: &mut Room,
        password: &str,
        player: PlayerId,
    ) -> Result<JoinOutcome, RoomError> {
        if !room.password_matches(password) {
            return Err(RoomError::WrongPassword);
        }

        if let Some(color) = room.color_of(player) {
            return Ok(JoinOutcome {
                color,
                already_member: true,
            });
        }

        if self
            .player_rooms
            .get(&player)
            .is_some_and(|existing| existing != room.id)
        {
            return Err(RoomError::AlreadyInRoom);
        }

        if room.is_full() {
            return Err(RoomError::Full);
        }

        let color = match room.member(Color::White) {
            Some(_) => Color::Black,
            None => Color::White,
        };
        room.players.push(RoomMember {
            player_id: player,
            color,
        });
        room.refresh_status();
        self.player_rooms.set(player, room.id.clone());

        info!("🚪 Player {} joined room {} as {}", player, room.id, color);
        Ok(JoinOutcome {
            color,
            already_member: false,
        })
    }

    pub async fn join_room(
        &self,
        room_id: &RoomId,
        password: &str,
        player: PlayerId,
    ) -> Result<JoinOutcome, RoomError> {
        let mut room = self.lock_room(room_id).await.ok_or(RoomError::NotFound)?;
        self.join_in(&mut room, password, player)
    }

    /// Removes `player` from an already-locked room.
    ///
    /// An emptied room is closed and deleted before the guard is released.
    /// The embedded game is left for the caller to clean up.
    pub fn leave_in(&self, room: &mut Room, player: PlayerId) -> LeaveOutcome {
        let before = room.players.len();
        room.players.retain(|member| member.player_id != player);
        if room.players.len() == before {
            return LeaveOutcome::default();
        }

        if self.player_rooms.get(&player).as_ref() == Some(&room.id) {
            self.player_rooms.delete(&player);
        }

        if room.players.is_empty() {
            room.closed = true;
            room.game = None;
            self.rooms.delete(&room.id);
            info!("🗑️ Room {} deleted (last player left)", room.id);
            return LeaveOutcome {
                removed: true,
                room_deleted: true,
            };
        }

        room.refresh_status();
        debug!("Player {} left room {}", player, room.id);
        LeaveOutcome {
            removed: true,
            room_deleted: false,
        }
    }

    /// Removes `player` from whatever room they are indexed to.
    pub async fn leave_room(&self, player: PlayerId) -> bool {
        let Some(room_id) = self.player_rooms.get(&player) else {
            return false;
        };
        match self.lock_room(&room_id).await {
            Some(mut room) => self.leave_in(&mut room, player).removed,
            None => {
                self.player_rooms.delete(&player);
                false
            }
        }
    }

    pub async fn get_room_state(&self, room_id: &RoomId) -> Option<RoomSnapshot> {
        let room = self.lock_room(room_id).await?;
        Some(room.snapshot())
    }

    pub async fn is_room_full(&self, room_id: &RoomId) -> bool {
        match self.lock_room(room_id).await {
            Some(room) => room.is_full(),
            None => false,
        }
    }

    pub async fn members(&self, room_id: &RoomId) -> Vec<RoomMember> {
        match self.lock_room(room_id).await {
            Some(room) => room.players.clone(),
            None => Vec::new(),
        }
    }

    pub fn get_player_room(&self, player: PlayerId) -> Option<RoomId> {
        self.player_rooms.get(&player)
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Ids of every room currently in the store.
    pub fn room_ids(&self) -> Vec<RoomId> {
        self.rooms.entries().into_iter().map(|(id, _)| id).collect()
    }

    /// Tears down an already-locked room.
    ///
    /// The room is closed, stripped of its game and removed along with the
    /// index entries pointing at it. `game_was_active` is recorded as given,
    /// since callers may already have finished the game before evicting.
    pub fn evict_in(&self, room: &mut Room, game_was_active: bool) -> SweptRoom {
        room.closed = true;
        room.game = None;

        let members: Vec<RoomMember> = room.players.drain(..).collect();
        for member in &members {
            if self.player_rooms.get(&member.player_id).as_ref() == Some(&room.id) {
                self.player_rooms.delete(&member.player_id);
            }
        }
        self.rooms.delete(&room.id);

        SweptRoom {
            room_id: room.id.clone(),
            members,
            game_was_active,
        }
    }

    /// Deletes every room created more than `max_age` ago.
    ///
    /// This is the bare sweep: members are not notified. The dispatcher's
    /// sweep wraps [`evict_in`](Self::evict_in) with the outbound messages.
    pub async fn cleanup_expired_rooms(&self, max_age: Duration) -> SweepReport {
        let mut report = SweepReport::default();

        for room_id in self.room_ids() {
            let Some(mut room) = self.lock_room(&room_id).await else {
                continue;
            };
            if !room.is_expired(max_age) {
                continue;
            }
            let game_was_active = room.is_game_active();
            report.rooms.push(self.evict_in(&mut room, game_was_active));
            debug!("Swept room {}", room_id);
        }

        if report.removed() > 0 {
            info!("🧹 Swept {} expired room(s)", report.removed());
        }
        report
    }
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::room::RoomStatus;
    use chrono::Utc;

    #[tokio::test]
    async fn test_create_room_indexes_creator_as_white() {
        let registry = RoomRegistry::new();
        let creator = PlayerId::new();
        let room_id = registry.create_room(Some(" secret1 "), creator).await.unwrap();

        let state = registry.get_room_state(&room_id).await.unwrap();
        assert_eq!(state.players.len(), 1);
        assert_eq!(state.players[0].color, Color::White);
        assert_eq!(state.status, RoomStatus::Waiting);
        assert_eq!(registry.get_player_room(creator), Some(room_id));
        assert_eq!(registry.room_count(), 1);
    }

    #[tokio::test]
    async fn test_create_room_rejects_bad_password_and_double_create() {
        let registry = RoomRegistry::new();
        let creator = PlayerId::new();
        let err = registry.create_room(Some("ab"), creator).await.unwrap_err();
        assert!(matches!(err, RoomError::InvalidPassword(_)));
        assert_eq!(registry.room_count(), 0);

        registry.create_room(Some("secret1"), creator).await.unwrap();
        assert_eq!(
            registry.create_room(Some("secret1"), creator).await.unwrap_err(),
            RoomError::AlreadyInRoom
        );
    }

    #[tokio::test]
    async fn test_join_scenario() {
        let registry = RoomRegistry::new();
        let white = PlayerId::new();
        let black = PlayerId::new();
        let room_id = registry.create_room(Some("secret1"), white).await.unwrap();

        assert_eq!(
            registry.join_room(&room_id, "wrong", black).await.unwrap_err(),
            RoomError::WrongPassword
        );
        assert_eq!(registry.members(&room_id).await.len(), 1);

        let outcome = registry.join_room(&room_id, "secret1", black).await.unwrap();
        assert_eq!(outcome.color, Color::Black);
        assert!(!outcome.already_member);
        let state = registry.get_room_state(&room_id).await.unwrap();
        assert_eq!(state.status, RoomStatus::Ready);
        assert!(registry.is_room_full(&room_id).await);
    }

    #[tokio::test]
    async fn test_join_is_idempotent_for_members() {
        let registry = RoomRegistry::new();
        let white = PlayerId::new();
        let black = PlayerId::new();
        let room_id = registry.create_room(Some("secret1"), white).await.unwrap();
        registry.join_room(&room_id, "secret1", black).await.unwrap();

        let again = registry.join_room(&room_id, "secret1", black).await.unwrap();
        assert_eq!(again.color, Color::Black);
        assert!(again.already_member);
        let creator_again = registry.join_room(&room_id, "secret1", white).await.unwrap();
        assert_eq!(creator_again.color, Color::White);
        assert_eq!(registry.members(&room_id).await.len(), 2);
    }

    #[tokio::test]
    async fn test_join_full_unknown_and_elsewhere() {
        let registry = RoomRegistry::new();
        let room_id = registry.create_room(Some("secret1"), PlayerId::new()).await.unwrap();
        registry.join_room(&room_id, "secret1", PlayerId::new()).await.unwrap();

        assert_eq!(
            registry.join_room(&room_id, "secret1", PlayerId::new()).await.unwrap_err(),
            RoomError::Full
        );
        assert_eq!(
            registry
                .join_room(&RoomId::from("NOPE0000"), "secret1", PlayerId::new())
                .await
                .unwrap_err(),
            RoomError::NotFound
        );

        let elsewhere = PlayerId::new();
        let other_room = registry.create_room(Some("pw123"), elsewhere).await.unwrap();
        let third = registry.create_room(Some("pw123"), PlayerId::new()).await.unwrap();
        assert_eq!(
            registry.join_room(&third, "pw123", elsewhere).await.unwrap_err(),
            RoomError::AlreadyInRoom
        );
        assert_eq!(registry.get_player_room(elsewhere), Some(other_room));
    }

    #[tokio::test]
    async fn test_leave_reverts_then_deletes() {
        let registry = RoomRegistry::new();
        let white = PlayerId::new();
        let black = PlayerId::new();
        let room_id = registry.create_room(Some("secret1"), white).await.unwrap();
        registry.join_room(&room_id, "secret1", black).await.unwrap();

        assert!(registry.leave_room(white).await);
        let state = registry.get_room_state(&room_id).await.unwrap();
        assert_eq!(state.status, RoomStatus::Waiting);
        assert_eq!(state.players.len(), 1);
        assert_eq!(state.players[0].color, Color::Black);
        assert!(registry.get_player_room(white).is_none());

        // The vacated white seat is the one handed out next.
        let newcomer = PlayerId::new();
        let outcome = registry.join_room(&room_id, "secret1", newcomer).await.unwrap();
        assert_eq!(outcome.color, Color::White);
        assert!(registry.leave_room(newcomer).await);

        assert!(registry.leave_room(black).await);
        assert!(registry.get_room_state(&room_id).await.is_none());
        assert_eq!(registry.room_count(), 0);
        assert!(!registry.leave_room(black).await);
    }

    #[tokio::test]
    async fn test_stale_handle_observes_closed_room() {
        let registry = RoomRegistry::new();
        let creator = PlayerId::new();
        let room_id = registry.create_room(Some("secret1"), creator).await.unwrap();
        let handle = registry.rooms.get(&room_id).unwrap();

        assert!(registry.leave_room(creator).await);
        assert!(handle.lock().await.closed);
        assert!(registry.lock_room(&room_id).await.is_none());
    }

    #[tokio::test]
    async fn test_cleanup_expired_rooms() {
        let registry = RoomRegistry::new();
        let old_white = PlayerId::new();
        let old_black = PlayerId::new();
        let fresh_player = PlayerId::new();
        let old_room = registry.create_room(Some("secret1"), old_white).await.unwrap();
        registry.join_room(&old_room, "secret1", old_black).await.unwrap();
        let fresh_room = registry.create_room(Some("secret1"), fresh_player).await.unwrap();

        {
            let mut room = registry.lock_room(&old_room).await.unwrap();
            room.created_at = Utc::now() - chrono::Duration::hours(25);
        }

        let report = registry
            .cleanup_expired_rooms(Duration::from_secs(24 * 60 * 60))
            .await;
        assert_eq!(report.removed(), 1);
        assert_eq!(report.rooms[0].room_id, old_room);
        assert!(!report.rooms[0].game_was_active);
        let evicted: Vec<PlayerId> = report.evicted_players().collect();
        assert_eq!(evicted, vec![old_white, old_black]);
        assert!(registry.get_room_state(&old_room).await.is_none());
        assert!(registry.get_player_room(old_black).is_none());
        assert_eq!(registry.get_player_room(fresh_player), Some(fresh_room));

        let again = registry
            .cleanup_expired_rooms(Duration::from_secs(24 * 60 * 60))
            .await;
        assert_eq!(again, SweepReport::default());
    }
}
