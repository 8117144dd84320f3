//! API response types for consistent JSON responses
//!
//! This module provides standardized response types for the REST API,
//! ensuring consistent response structures across all endpoints.

use std::collections::BTreeMap;

use serde::Serialize;

/// Standard API response wrapper
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    /// Whether the request was successful
    pub success: bool,
    /// Response message
    pub message: String,
    /// Response data (if any)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T: Serialize> ApiResponse<T> {
    /// Create a successful response with data
    pub fn success(message: impl Into<String>, data: T) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: Some(data),
        }
    }
}

/// Server status summary
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorldStatus {
    /// World name
    pub name: String,
    /// Server version
    pub version: &'static str,
    /// Lifecycle state of the world
    pub state: String,
    /// Joined users
    pub users: usize,
    /// Items lying in the world
    pub items: usize,
    /// Open WebSocket sessions
    pub sessions: usize,
    /// Open sessions keyed by lifecycle state
    pub sessions_by_state: BTreeMap<&'static str, usize>,
    /// Seconds since the world was created
    pub uptime_secs: u64,
}
