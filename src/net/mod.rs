//! Networking module
//!
//! This module handles all network-related functionality for the Neon World server:
//! - WebSocket handling for browser clients
//! - Session management
//! - Connection lifecycle

pub mod handler;
pub mod session;
pub mod transport;
