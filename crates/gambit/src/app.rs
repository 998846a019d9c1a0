//! Main application logic and lifecycle management.
//!
//! This module contains the `Application` struct that orchestrates server
//! startup, periodic health reporting, and shutdown.

use crate::{
    cli::CliArgs,
    config::AppConfig,
    logging::display_banner,
    signals::{setup_signal_handlers, setup_signal_handlers_silent},
};
use gambit_server::GameServer;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

const HEALTH_INTERVAL: Duration = Duration::from_secs(60);
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(8);

/// Main application struct.
///
/// # Architecture
///
/// * **Configuration Management**: Loads and validates configuration from files and CLI
/// * **Server Orchestration**: Owns the game server instance
/// * **Health Monitoring**: Logs session, room and connection counts every minute
/// * **Graceful Shutdown**: Handles termination signals and cleanup procedures
pub struct Application {
    /// Loaded application configuration
    config: AppConfig,
    /// Game server instance
    server: Arc<GameServer>,
}

impl Application {
    /// Creates a new application instance.
    ///
    /// # Arguments
    ///
    /// * `args` - Parsed command-line arguments
    ///
    /// # Process
    ///
    /// 1. Load configuration from file (creating default if missing)
    /// 2. Apply command-line argument overrides
    /// 3. Validate merged configuration
    /// 4. Display startup banner
    /// 5. Initialize game server with configuration
    pub async fn new(args: CliArgs) -> Result<Self, Box<dyn std::error::Error>> {
        info!("🔧 Loading configuration from: {}", args.config_path.display());
        let mut config = AppConfig::load_from_file(&args.config_path).await?;
        apply_overrides(&mut config, &args);

        if let Err(e) = config.validate() {
            return Err(format!("Configuration validation failed: {e}").into());
        }
        info!("✅ Configuration loaded and validated successfully");

        display_banner();

        let server_config = config.to_server_config()?;
        let server = Arc::new(GameServer::new(server_config));

        Ok(Self { config, server })
    }

    /// Runs the server until a shutdown signal arrives or the server fails.
    ///
    /// # Returns
    ///
    /// `Ok(())` after a graceful shutdown, or the error that stopped the
    /// server.
    pub async fn run(self) -> Result<(), Box<dyn std::error::Error>> {
        info!("🌟 Starting Gambit Chess Server");
        self.log_configuration_summary();

        let mut server_handle = {
            let server = self.server.clone();
            tokio::spawn(async move { server.start().await })
        };

        let monitoring_handle = {
            let server = self.server.clone();

            tokio::spawn(async move {
                let mut interval = tokio::time::interval(HEALTH_INTERVAL);
                interval.tick().await;

                loop {
                    interval.tick().await;
                    let stats = server.stats().await;
                    info!(
                        "📊 System Health - {} sessions | {} rooms | {} connections",
                        stats.sessions, stats.rooms, stats.connections
                    );
                }
            })
        };

        info!("✅ Gambit Server is now running!");
        info!("🎮 Ready to accept connections on {}", self.config.server.bind_address);
        info!("🛑 Press Ctrl+C to gracefully shutdown");

        tokio::select! {
            signal = setup_signal_handlers() => signal?,
            finished = &mut server_handle => {
                monitoring_handle.abort();
                return match finished {
                    Ok(Ok(())) => Ok(()),
                    Ok(Err(e)) => {
                        error!("❌ Server error: {}", e);
                        Err(e.into())
                    }
                    Err(e) => Err(e.into()),
                };
            }
        }

        // A second signal skips the graceful path.
        tokio::spawn(async move {
            if let Err(e) = setup_signal_handlers_silent().await {
                error!("Failed to set up merciless shutdown signal handler: {e}");
                return;
            }

            warn!("Shutdown handler received again! I'll make this quick.");
            std::process::exit(1);
        });

        monitoring_handle.abort();
        self.server.shutdown().await?;

        match tokio::time::timeout(SHUTDOWN_TIMEOUT, server_handle).await {
            Ok(_) => info!("✅ Server task completed gracefully"),
            Err(_) => warn!("⏰ Server task did not complete within {:?}", SHUTDOWN_TIMEOUT),
        }

        let stats = self.server.stats().await;
        info!("📊 Final Statistics:");
        info!("  - Sessions: {}", stats.sessions);
        info!("  - Rooms: {}", stats.rooms);
        info!("  - Connections: {}", stats.connections);
        info!("✅ Gambit Server shutdown complete");

        Ok(())
    }

    fn log_configuration_summary(&self) {
        info!("📋 Configuration Summary:");
        info!("  🌐 Bind address: {}", self.config.server.bind_address);
        info!("  👥 Max connections: {}", self.config.server.max_connections);
        info!(
            "  ⏱️ Room max age: {}s (swept every {}s)",
            self.config.rooms.max_age_secs, self.config.rooms.cleanup_interval_secs
        );
        info!(
            "  🛡️ Max frame: {} bytes, depth {}",
            self.config.security.max_message_size, self.config.security.max_json_depth
        );
    }
}

/// Applies command-line overrides on top of the file configuration.
pub fn apply_overrides(config: &mut AppConfig, args: &CliArgs) {
    if let Some(bind_address) = &args.bind_address {
        config.server.bind_address = bind_address.clone();
    }
    if let Some(log_level) = &args.log_level {
        config.logging.level = log_level.clone();
    }
    if args.json_logs {
        config.logging.json_format = true;
    }
}
