//! Core game server implementation.
//!
//! This module contains the main `GameServer` struct: it wires the registries,
//! controller and dispatcher together, runs the accept loop and the periodic
//! expired-room sweep, and coordinates shutdown.

use crate::{
    config::ServerConfig,
    connection::ConnectionManager,
    error::ServerError,
    game::{standard_engine_factory, EngineFactory, GameController},
    messaging::EventDispatcher,
    room::RoomRegistry,
    security::FrameValidator,
    server::handlers::handle_connection,
    session::SessionRegistry,
};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Point-in-time counters for health reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ServerStats {
    pub sessions: usize,
    pub rooms: usize,
    pub connections: usize,
}

/// One reserved place in the connection budget.
///
/// Taken when a socket is accepted, before the handshake, and given back when
/// the connection's handler returns.
struct ConnectionSlot {
    open: Arc<AtomicUsize>,
}

impl ConnectionSlot {
    fn reserve(open: &Arc<AtomicUsize>, max: usize) -> Option<Self> {
        open.fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
            (current < max).then_some(current + 1)
        })
        .ok()?;
        Some(Self { open: open.clone() })
    }
}

impl Drop for ConnectionSlot {
    fn drop(&mut self) {
        self.open.fetch_sub(1, Ordering::AcqRel);
    }
}

/// The core game server structure.
///
/// # Architecture
///
/// * **Session Registry**: connection ↔ player identity
/// * **Room Registry**: password-gated rooms and the player → room index
/// * **Game Controller**: per-room game state machine over a rules engine
/// * **Event Dispatcher**: executes client requests and fans out results
/// * **Connection Management**: socket lifecycle and outbound queues
pub struct GameServer {
    /// Server configuration settings
    config: ServerConfig,

    /// Executes client requests against the registries and controller
    dispatcher: Arc<EventDispatcher>,

    /// Inbound frame limits
    validator: Arc<FrameValidator>,

    /// Sockets accepted and not yet finished, handshakes included
    open_slots: Arc<AtomicUsize>,

    /// Channel for coordinating server shutdown
    shutdown_sender: broadcast::Sender<()>,
}

impl GameServer {
    /// Creates a new game server using the standard chess engine.
    ///
    /// # Arguments
    ///
    /// * `config` - Configuration parameters for server behavior
    pub fn new(config: ServerConfig) -> Self {
        Self::with_engine_factory(config, standard_engine_factory())
    }

    /// Creates a new game server with a caller-supplied rules engine factory.
    pub fn with_engine_factory(config: ServerConfig, engine_factory: EngineFactory) -> Self {
        let sessions = Arc::new(SessionRegistry::new());
        let rooms = Arc::new(RoomRegistry::new());
        let games = Arc::new(GameController::new(rooms.clone(), engine_factory));
        let connection_manager = Arc::new(ConnectionManager::new());
        let dispatcher = Arc::new(EventDispatcher::new(
            sessions,
            rooms,
            games,
            connection_manager,
        ));
        let validator = Arc::new(FrameValidator::new(config.security.clone()));
        let (shutdown_sender, _) = broadcast::channel(1);

        Self {
            config,
            dispatcher,
            validator,
            open_slots: Arc::new(AtomicUsize::new(0)),
            shutdown_sender,
        }
    }

    /// Binds the configured address and serves until shutdown.
    ///
    /// # Returns
    ///
    /// `Ok(())` if the server started and stopped cleanly, or a `ServerError`
    /// if the address could not be bound.
    pub async fn start(&self) -> Result<(), ServerError> {
        info!("🚀 Starting game server on {}", self.config.bind_address);
        let listener = TcpListener::bind(self.config.bind_address)
            .await
            .map_err(|e| ServerError::Network(format!("Failed to bind {}: {e}", self.config.bind_address)))?;
        self.serve(listener).await
    }

    /// Serves connections from an already-bound listener until shutdown.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), ServerError> {
        let local_addr = listener
            .local_addr()
            .map_err(|e| ServerError::Network(e.to_string()))?;
        info!("🎧 Listening for WebSocket connections on {}", local_addr);

        self.spawn_room_sweep();

        let mut shutdown_receiver = self.shutdown_sender.subscribe();
        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, addr)) => self.accept_connection(stream, addr),
                    Err(e) => {
                        error!("Failed to accept connection: {}", e);
                    }
                },
                _ = shutdown_receiver.recv() => {
                    info!("Internal shutdown signal received");
                    break;
                }
            }
        }

        info!("✅ Server stopped");
        Ok(())
    }

    fn accept_connection(&self, stream: TcpStream, addr: SocketAddr) {
        let Some(slot) = ConnectionSlot::reserve(&self.open_slots, self.config.max_connections) else {
            warn!(
                "🚫 Refusing connection from {}: all {} connection slots in use",
                addr, self.config.max_connections
            );
            return;
        };

        let dispatcher = self.dispatcher.clone();
        let validator = self.validator.clone();
        tokio::spawn(async move {
            let _slot = slot;
            if let Err(e) = handle_connection(stream, addr, dispatcher, validator).await {
                error!("Connection error: {:?}", e);
            }
        });
    }

    fn spawn_room_sweep(&self) {
        let every = self.config.cleanup_interval();
        if every.is_zero() {
            warn!("⏸️ Room sweep disabled (interval: 0s)");
            return;
        }

        let max_age = self.config.room_max_age();
        let dispatcher = self.dispatcher.clone();
        let mut shutdown_receiver = self.shutdown_sender.subscribe();

        tokio::spawn(async move {
            let mut ticker = interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let report = dispatcher.sweep_expired_rooms(max_age).await;
                        debug!("🧹 Room sweep removed {} room(s)", report.removed());
                    }
                    _ = shutdown_receiver.recv() => {
                        info!("🧹 Room sweep stopping - shutdown initiated");
                        break;
                    }
                }
            }
        });
        info!("🕒 Room sweep every {:?} (max age {:?})", every, max_age);
    }

    /// Signals the accept loop and background tasks to stop.
    pub async fn shutdown(&self) -> Result<(), ServerError> {
        info!("🛑 Shutting down server...");
        let _ = self.shutdown_sender.send(());
        Ok(())
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub async fn stats(&self) -> ServerStats {
        ServerStats {
            sessions: self.dispatcher.sessions().session_count(),
            rooms: self.dispatcher.rooms().room_count(),
            connections: self.dispatcher.connections().connection_count().await,
        }
    }
}
