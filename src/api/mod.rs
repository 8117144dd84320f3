//! REST API module for the Neon World server
//!
//! This module provides HTTP endpoints for:
//! - Liveness and readiness probes
//! - Read-only world snapshots
//! - Server status
//!
//! The API is built with Axum and shares the world with the WebSocket server.

pub mod error;
pub mod response;

use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderValue, Method},
    routing::get,
    Json, Router,
};
use serde_json::Value;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::warn;

use crate::api::error::ApiError;
use crate::api::response::{ApiResponse, WorldStatus};
use crate::game::broadcast as snapshots;
use crate::state::AppState;
use crate::VERSION;

/// API version prefix
pub const API_VERSION: &str = "v1";

/// Shared API state
#[derive(Clone)]
pub struct ApiState {
    /// Application state shared with the WebSocket server
    pub app: Arc<AppState>,
}

impl ApiState {
    /// Create a new API state
    pub fn new(app: Arc<AppState>) -> Self {
        Self { app }
    }
}

/// Build the CORS layer for the configured client origin
fn cors_layer(client_url: &str) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_credentials(true);

    match client_url.parse::<HeaderValue>() {
        Ok(origin) => cors.allow_origin(origin),
        Err(e) => {
            warn!(client_url = %client_url, error = %e, "Invalid client URL, CORS origin not set");
            cors
        }
    }
}

/// Create the API router with all endpoints
pub fn create_router(state: ApiState) -> Router {
    // Health check routes
    let health_routes = Router::new()
        .route("/", get(health_check))
        .route("/ready", get(readiness_check));

    // World snapshot routes
    let world_routes = Router::new()
        .route("/items", get(world_items))
        .route("/users", get(world_users));

    // Combine all routes under the API version prefix
    let api_routes = Router::new()
        .nest("/health", health_routes)
        .nest("/world", world_routes)
        .route("/status", get(status));

    let cors = cors_layer(&state.app.config.client_url);

    // Create the main router
    Router::new()
        .nest(&format!("/api/{}", API_VERSION), api_routes)
        .layer(cors)
        // Add request tracing
        .layer(TraceLayer::new_for_http())
        // Add state
        .with_state(state)
}

/// Health check endpoint
async fn health_check() -> &'static str {
    "OK"
}

/// Readiness check endpoint (catalog loaded)
async fn readiness_check(State(state): State<ApiState>) -> Result<&'static str, ApiError> {
    if state.app.world.is_ready() {
        Ok("Ready")
    } else {
        Err(ApiError::NotReady)
    }
}

/// Current items snapshot
async fn world_items(State(state): State<ApiState>) -> Result<Json<ApiResponse<Value>>, ApiError> {
    let items = state
        .app
        .world
        .read(|store| snapshots::items_snapshot(store).payload())?;
    Ok(Json(ApiResponse::success("Items snapshot", items)))
}

/// Current users snapshot
async fn world_users(State(state): State<ApiState>) -> Result<Json<ApiResponse<Value>>, ApiError> {
    let users = state
        .app
        .world
        .read(|store| snapshots::users_snapshot(store).payload())?;
    Ok(Json(ApiResponse::success("Users snapshot", users)))
}

/// Server status summary
async fn status(State(state): State<ApiState>) -> Json<ApiResponse<WorldStatus>> {
    let world = &state.app.world;
    let sessions_by_state = state
        .app
        .session_manager
        .count_by_state()
        .into_iter()
        .map(|(session_state, count)| (session_state.name(), count))
        .collect();
    let status = WorldStatus {
        name: world.settings.name.clone(),
        version: VERSION,
        state: format!("{:?}", world.state()),
        users: world.user_count(),
        items: world.item_count(),
        sessions: state.app.session_manager.count(),
        sessions_by_state,
        uptime_secs: world.uptime_secs(),
    };
    Json(ApiResponse::success("Server status", status))
}
