//! Neon World Server Library
//!
//! This library provides the core functionality for the Neon World server,
//! an authoritative shared-world state server for browser clients.
//!
//! ## Modules
//!
//! - `api` - HTTP health, readiness and snapshot endpoints
//! - `config` - Server configuration management
//! - `error` - Error types and result definitions
//! - `game` - Entity store, mutation handlers, broadcasts and the item catalog
//! - `net` - WebSocket handling and session management
//! - `protocol` - JSON event protocol

pub mod api;
pub mod config;
pub mod error;
pub mod game;
pub mod net;
pub mod protocol;
pub mod state;

// Re-export commonly used types
pub use config::ServerConfig;
pub use error::{Result, WorldError};
pub use state::AppState;

/// Server version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
