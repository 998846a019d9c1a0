//! Session registry: connection ↔ player identity mapping.

use super::{validate_nickname, PlayerId, Session, SessionError};
use crate::connection::ConnectionId;
use crate::room::RoomId;
use crate::store::{KeyedStore, MemoryStore};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Maps connections to live sessions, indexed both ways.
///
/// Reads go straight to the stores. Every write takes `write_gate`, so the
/// two indices change together: a session is inserted before its connection
/// entry and removed after it, which means a reader resolving a connection
/// never finds a dangling id.
#[derive(Debug)]
pub struct SessionRegistry {
    sessions: Arc<dyn KeyedStore<PlayerId, Session>>,
    connections: Arc<dyn KeyedStore<ConnectionId, PlayerId>>,
    write_gate: Mutex<()>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::with_stores(Arc::new(MemoryStore::new()), Arc::new(MemoryStore::new()))
    }

    /// Creates a registry over caller-supplied stores.
    pub fn with_stores(
        sessions: Arc<dyn KeyedStore<PlayerId, Session>>,
        connections: Arc<dyn KeyedStore<ConnectionId, PlayerId>>,
    ) -> Self {
        Self {
            sessions,
            connections,
            write_gate: Mutex::new(()),
        }
    }

    /// Validates `nickname` and binds a new session to `connection_id`.
    ///
    /// # Errors
    ///
    /// * [`SessionError::InvalidNickname`] if the nickname fails validation
    /// * [`SessionError::AlreadyExists`] if the connection already has a session
    pub async fn create_session(
        &self,
        nickname: Option<&str>,
        connection_id: ConnectionId,
    ) -> Result<Session, SessionError> {
        let nickname = validate_nickname(nickname)?;

        let _gate = self.write_gate.lock().await;
        if self.connections.contains(&connection_id) {
            return Err(SessionError::AlreadyExists);
        }

        let mut session = Session::new(nickname, connection_id);
        while self.sessions.contains(&session.id) {
            session.id = PlayerId::new();
        }

        self.sessions.set(session.id, session.clone());
        self.connections.set(connection_id, session.id);

        info!(
            "👤 Session {} ({}) bound to connection {}",
            session.id, session.nickname, connection_id
        );
        Ok(session)
    }

    pub fn get_session(&self, connection_id: ConnectionId) -> Option<Session> {
        let player_id = self.connections.get(&connection_id)?;
        self.sessions.get(&player_id)
    }

    pub fn get_session_by_id(&self, player_id: PlayerId) -> Option<Session> {
        self.sessions.get(&player_id)
    }

    /// Deletes both index entries for `connection_id`.
    ///
    /// # Returns
    ///
    /// `true` if a session was bound to the connection.
    pub async fn remove_session(&self, connection_id: ConnectionId) -> bool {
        let _gate = self.write_gate.lock().await;
        let Some(player_id) = self.connections.delete(&connection_id) else {
            return false;
        };
        self.sessions.delete(&player_id);
        info!("👋 Session {} removed (connection {})", player_id, connection_id);
        true
    }

    /// Sets the current-room pointer of the session bound to `connection_id`.
    pub async fn update_room(&self, connection_id: ConnectionId, room_id: Option<RoomId>) -> bool {
        let _gate = self.write_gate.lock().await;
        let Some(player_id) = self.connections.get(&connection_id) else {
            return false;
        };
        self.replace_room(player_id, room_id)
    }

    /// Clears the room pointer of `player_id` only while it still names
    /// `room_id`.
    pub async fn clear_room_if(&self, player_id: PlayerId, room_id: &RoomId) -> bool {
        let _gate = self.write_gate.lock().await;
        match self.sessions.get(&player_id) {
            Some(session) if session.room_id.as_ref() == Some(room_id) => {
                self.replace_room(player_id, None)
            }
            _ => false,
        }
    }

    fn replace_room(&self, player_id: PlayerId, room_id: Option<RoomId>) -> bool {
        let Some(mut session) = self.sessions.get(&player_id) else {
            return false;
        };
        debug!("Session {} room pointer -> {:?}", player_id, room_id);
        session.room_id = room_id;
        self.sessions.set(player_id, session);
        true
    }

    pub fn nickname_of(&self, player_id: PlayerId) -> Option<String> {
        self.sessions.get(&player_id).map(|session| session.nickname)
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_and_lookup_session() {
        let registry = SessionRegistry::new();
        let session = registry.create_session(Some(" alice "), 1).await.unwrap();

        assert_eq!(session.nickname, "alice");
        assert_eq!(session.connection_id, 1);
        assert!(session.room_id.is_none());

        let by_conn = registry.get_session(1).unwrap();
        let by_id = registry.get_session_by_id(session.id).unwrap();
        assert_eq!(by_conn, session);
        assert_eq!(by_id, session);
        assert_eq!(registry.session_count(), 1);
    }

    #[tokio::test]
    async fn test_invalid_nickname_stores_nothing() {
        let registry = SessionRegistry::new();
        let err = registry.create_session(Some("!"), 1).await.unwrap_err();
        assert!(matches!(err, SessionError::InvalidNickname(_)));
        assert!(registry.get_session(1).is_none());
        assert_eq!(registry.session_count(), 0);
    }

    #[tokio::test]
    async fn test_one_session_per_connection() {
        let registry = SessionRegistry::new();
        registry.create_session(Some("alice"), 1).await.unwrap();
        let err = registry.create_session(Some("bob"), 1).await.unwrap_err();
        assert_eq!(err, SessionError::AlreadyExists);
        assert_eq!(registry.session_count(), 1);
    }

    #[tokio::test]
    async fn test_remove_session_clears_both_indices() {
        let registry = SessionRegistry::new();
        let session = registry.create_session(Some("alice"), 7).await.unwrap();

        assert!(registry.remove_session(7).await);
        assert!(!registry.remove_session(7).await);
        assert!(registry.get_session(7).is_none());
        assert!(registry.get_session_by_id(session.id).is_none());
    }

    #[tokio::test]
    async fn test_update_room_pointer() {
        let registry = SessionRegistry::new();
        let session = registry.create_session(Some("alice"), 3).await.unwrap();
        let room = RoomId::from("ABCD1234");

        assert!(registry.update_room(3, Some(room.clone())).await);
        assert_eq!(registry.get_session(3).unwrap().room_id, Some(room));

        assert!(registry.update_room(3, None).await);
        assert!(registry.get_session_by_id(session.id).unwrap().room_id.is_none());

        assert!(!registry.update_room(99, None).await);
    }

    #[tokio::test]
    async fn test_clear_room_only_when_pointer_matches() {
        let registry = SessionRegistry::new();
        let session = registry.create_session(Some("alice"), 4).await.unwrap();
        let swept = RoomId::from("OLD00000");
        let current = RoomId::from("NEW00000");

        registry.update_room(4, Some(current.clone())).await;
        assert!(!registry.clear_room_if(session.id, &swept).await);
        assert_eq!(registry.get_session(4).unwrap().room_id, Some(current.clone()));

        assert!(registry.clear_room_if(session.id, &current).await);
        assert!(registry.get_session(4).unwrap().room_id.is_none());
    }
}
