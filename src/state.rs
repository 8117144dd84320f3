//! Application state module
//!
//! Contains the shared state used across all server connections.

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::info;

use crate::config::ServerConfig;
use crate::game::handlers::DisconnectPolicy;
use crate::game::world::{GameWorld, WorldSettings};
use crate::net::session::SessionManager;

/// Application state shared across all connections
pub struct AppState {
    /// Server configuration
    pub config: ServerConfig,
    /// Session manager for tracking connected clients
    pub session_manager: SessionManager,
    /// Shared world state
    pub world: Arc<GameWorld>,
    /// Shutdown signal sender
    pub shutdown_tx: broadcast::Sender<()>,
}

impl AppState {
    /// Create a new application state with an empty, loading world
    pub fn new(config: ServerConfig, shutdown_tx: broadcast::Sender<()>) -> Self {
        let world_settings = Self::create_world_settings(&config);
        let world = Arc::new(GameWorld::new(world_settings));

        Self {
            session_manager: SessionManager::new(config.max_connections),
            config,
            world,
            shutdown_tx,
        }
    }

    /// Create world settings from server config
    fn create_world_settings(config: &ServerConfig) -> WorldSettings {
        let policy = if config.world.return_items_on_disconnect {
            DisconnectPolicy::ReturnToWorld
        } else {
            DisconnectPolicy::Discard
        };

        info!(
            disconnect_policy = ?policy,
            broadcast_capacity = config.broadcast_capacity,
            "Configuring world"
        );

        WorldSettings::default()
            .with_name(config.server_name.clone())
            .with_broadcast_capacity(config.broadcast_capacity)
            .with_disconnect_policy(policy)
    }
}
