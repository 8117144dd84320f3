//! Neon World Server
//!
//! Authoritative shared-world server: browser clients connect over WebSocket
//! and receive full item and user snapshots after every change. A small
//! REST API exposes health checks and read-only snapshots.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use neon_world_server::api::{self, ApiState};
use neon_world_server::config::ServerConfig;
use neon_world_server::game::catalog;
use neon_world_server::game::world::WorldState;
use neon_world_server::net::handler::ConnectionHandler;
use neon_world_server::state::AppState;
use neon_world_server::VERSION;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration, then initialize logging at the configured level
    let config = ServerConfig::load().await?;
    init_logging(config.log_filter());

    info!("Neon World Server v{}", VERSION);
    if config.config_path.exists() {
        info!(
            "Configuration loaded from: {}",
            config.config_path.display()
        );
    } else {
        warn!(
            "Config file not found at {}, using defaults",
            config.config_path.display()
        );
    }

    // Create shutdown channel
    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    let state = Arc::new(AppState::new(config.clone(), shutdown_tx.clone()));
    info!("Application state initialized");

    // Start HTTP API server first so readiness can be probed while loading
    let api_addr: SocketAddr = config.http_addr().parse()?;
    let api_listener = TcpListener::bind(api_addr).await?;
    info!("REST API server listening on: {}", api_addr);

    let api_state = ApiState::new(state.clone());
    let api_shutdown_rx = shutdown_tx.subscribe();
    let api_handle = tokio::spawn(async move {
        run_api_server(api_listener, api_state, api_shutdown_rx).await;
    });

    // Load the item catalog, then open the world
    let items = catalog::load_catalog(&config.catalog).await;
    let seeded = state.world.seed(items);
    state.world.mark_ready();
    info!(items = seeded, "Item catalog loaded");

    // Start WebSocket listener for browser clients
    let ws_addr: SocketAddr = config.websocket_addr().parse()?;
    let ws_listener = TcpListener::bind(ws_addr).await?;
    info!("WebSocket server listening on: {}", ws_addr);

    // Spawn WebSocket connection acceptor
    let ws_state = state.clone();
    let mut ws_shutdown_rx = shutdown_tx.subscribe();
    let ws_handle = tokio::spawn(async move {
        accept_websocket_connections(ws_listener, ws_state, &mut ws_shutdown_rx).await;
    });

    info!("Server startup complete!");
    info!("{}", state.world.info());

    // Wait for shutdown signal
    wait_for_shutdown(shutdown_tx.clone()).await;

    info!("Shutting down server...");
    state.world.set_state(WorldState::ShuttingDown);

    // Wait for handlers to finish
    let _ = ws_handle.await;
    let _ = api_handle.await;

    info!(
        sessions = state.session_manager.count(),
        "Server shutdown complete. Goodbye!"
    );
    Ok(())
}

/// Initialize the logging/tracing system
fn init_logging(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_level(true)
        .init();
}

/// Accept incoming WebSocket connections (for browser clients)
async fn accept_websocket_connections(
    listener: TcpListener,
    state: Arc<AppState>,
    shutdown_rx: &mut broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, addr)) => {
                        info!("New WebSocket connection from: {}", addr);
                        let handler = ConnectionHandler::new(state.clone());
                        tokio::spawn(async move {
                            if let Err(e) = handler.handle_websocket(stream, addr).await {
                                warn!("WebSocket connection error from {}: {}", addr, e);
                            }
                        });
                    }
                    Err(e) => {
                        error!("Failed to accept WebSocket connection: {}", e);
                    }
                }
            }
            _ = shutdown_rx.recv() => {
                info!("WebSocket connection acceptor shutting down");
                break;
            }
        }
    }
}

/// Run the HTTP API server
async fn run_api_server(
    listener: TcpListener,
    state: ApiState,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    // Create the API router
    let router = api::create_router(state);

    info!("Starting REST API server...");

    let shutdown_signal = async move {
        let _ = shutdown_rx.recv().await;
        info!("REST API server shutting down");
    };

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal)
        .await
        .unwrap_or_else(|e| error!("API server error: {}", e));
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn wait_for_shutdown(shutdown_tx: broadcast::Sender<()>) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        }
    }

    // Signal all tasks to shut down
    let _ = shutdown_tx.send(());
}
