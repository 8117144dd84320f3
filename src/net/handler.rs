//! Connection handler module
//!
//! Handles the lifecycle of client connections including:
//! - WebSocket upgrade and session registration
//! - Initial items snapshot and welcome delivery
//! - Event decoding and dispatch into the world
//! - Broadcast fan-out with lag recovery
//! - Graceful disconnection

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc};
use tokio_tungstenite::{accept_async, WebSocketStream};
use tracing::{debug, info, trace, warn};

use crate::error::{NetworkError, ProtocolError, Result, WorldError};
use crate::game::world::GameWorld;
use crate::net::session::{Session, SessionId, SessionState};
use crate::net::transport::{self, FrameSink, FrameStream, Inbound};
use crate::protocol::{ClientEvent, Frame};
use crate::AppState;

/// Frames queued for a single session before sends start waiting
const OUTBOUND_QUEUE_SIZE: usize = 64;

/// Connection handler for processing client connections
pub struct ConnectionHandler {
    /// Shared application state
    state: Arc<AppState>,
}

impl ConnectionHandler {
    /// Create a new connection handler
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }

    /// Handle a WebSocket connection (browser client)
    pub async fn handle_websocket(&self, stream: TcpStream, addr: SocketAddr) -> Result<()> {
        debug!(address = %addr, "Handling WebSocket connection");

        if !self.state.world.state().accepting_connections() {
            warn!(address = %addr, state = ?self.state.world.state(), "Refusing connection");
            return Err(WorldError::Network(NetworkError::NotAccepting));
        }

        // Set TCP options before upgrade
        stream.set_nodelay(true)?;

        // Perform WebSocket handshake
        let ws_stream = accept_async(stream)
            .await
            .map_err(|e| WorldError::Network(NetworkError::WebSocket(e.to_string())))?;

        info!(address = %addr, "WebSocket connection established");

        self.serve(ws_stream, addr).await
    }

    /// Run a session over an upgraded WebSocket until either side closes it
    pub async fn serve<S>(&self, ws_stream: WebSocketStream<S>, addr: SocketAddr) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_QUEUE_SIZE);
        let session = self
            .state
            .session_manager
            .create_session(addr, outbound_tx)?;

        let result = self.handle_connection(ws_stream, &session, outbound_rx).await;

        // Cleanup
        debug!(session_id = %session.id, "Connection handler ending");
        session.set_state(SessionState::Disconnected);
        let changes = self.state.world.disconnect(session.id);
        trace!(session_id = %session.id, changes = ?changes, "User removed");
        self.state.session_manager.remove(session.id);

        match result {
            Err(WorldError::Network(NetworkError::ConnectionClosed)) => Ok(()),
            other => other,
        }
    }

    /// Main connection handling loop
    async fn handle_connection<S>(
        &self,
        ws_stream: WebSocketStream<S>,
        session: &Arc<Session>,
        outbound_rx: mpsc::Receiver<Frame>,
    ) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        debug!(
            session_id = %session.id,
            address = %session.address,
            "Starting connection handler"
        );

        // Snapshot and subscription are taken together; the snapshot is queued
        // ahead of anything the subscription yields
        let (snapshot, updates) = self.state.world.connect()?;
        session.send(snapshot).await?;
        session
            .send(self.state.world.welcome_frame(session.id)?)
            .await?;

        let (sink, mut stream) = transport::split(ws_stream);
        let mut writer = tokio::spawn(write_loop(
            sink,
            outbound_rx,
            updates,
            self.state.world.clone(),
            session.id,
        ));

        if !session.transition_state(SessionState::Connecting, SessionState::Active) {
            warn!(session_id = %session.id, state = %session.state(), "Unexpected session state");
        }

        let result = tokio::select! {
            read = self.read_loop(&mut stream, session) => read,
            written = &mut writer => match written {
                Ok(result) => result,
                Err(e) => Err(WorldError::Internal(format!("writer task failed: {}", e))),
            },
        };

        writer.abort();
        result
    }

    /// Read inbound frames until the peer closes
    async fn read_loop<S>(&self, stream: &mut FrameStream<S>, session: &Session) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        while let Some(inbound) = stream.next_inbound().await? {
            match inbound {
                Inbound::Text(text) => self.dispatch(session, &text),
                Inbound::Unsupported(kind) => {
                    let e = ProtocolError::UnsupportedFrame(kind);
                    warn!(session_id = %session.id, error = %e, "Dropping frame");
                }
            }
        }

        debug!(session_id = %session.id, "Connection closed by peer");
        Ok(())
    }

    /// Decode, authorize and apply one client event
    ///
    /// Failures are logged and the session carries on.
    fn dispatch(&self, session: &Session, text: &str) {
        if !session.accepts_events() {
            debug!(session_id = %session.id, state = %session.state(), "Ignoring event");
            return;
        }

        let event = match ClientEvent::decode(text)
            .and_then(|event| event.verify_user(session.id).map(|_| event))
        {
            Ok(event) => event,
            Err(e) => {
                warn!(session_id = %session.id, error = %e, "Dropping client event");
                return;
            }
        };

        let name = event.name();
        let changes = self.state.world.apply(session.id, event);
        trace!(
            session_id = %session.id,
            event = name,
            changes = ?changes,
            "Event applied"
        );
    }
}

/// Forward direct and broadcast frames to the socket
///
/// Direct frames always go first. A session that falls behind the broadcast
/// backlog is resynchronized with fresh snapshots.
async fn write_loop<S>(
    mut sink: FrameSink<S>,
    mut direct: mpsc::Receiver<Frame>,
    mut updates: broadcast::Receiver<Frame>,
    world: Arc<GameWorld>,
    session_id: SessionId,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    loop {
        let frame = tokio::select! {
            biased;
            frame = direct.recv() => match frame {
                Some(frame) => frame,
                None => break,
            },
            update = updates.recv() => match update {
                Ok(frame) => frame,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(session_id = %session_id, skipped = skipped, "Session lagged, resending snapshots");
                    let (items, users, fresh) = world.resync()?;
                    updates = fresh;
                    sink.send_frame(&items).await?;
                    users
                }
                Err(RecvError::Closed) => break,
            },
        };

        sink.send_frame(&frame).await?;
    }

    // Best effort; the peer may already be gone
    let _ = sink.close().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use crate::game::item::{Item, Position};
    use futures_util::{SinkExt, StreamExt};
    use tokio_tungstenite::tungstenite::protocol::Role;
    use tokio_tungstenite::tungstenite::Message;

    fn state() -> Arc<AppState> {
        let (shutdown_tx, _) = broadcast::channel(1);
        let state = AppState::new(ServerConfig::default(), shutdown_tx);
        state.world.seed([
            Item::new("gem", "Gem", "💠", "glow", "collectible").place(Position::new(350.0, 400.0))
        ]);
        state.world.mark_ready();
        Arc::new(state)
    }

    async fn next_json(client: &mut WebSocketStream<tokio::io::DuplexStream>) -> serde_json::Value {
        loop {
            match client.next().await.unwrap().unwrap() {
                Message::Text(text) => return serde_json::from_str(&text).unwrap(),
                _ => continue,
            }
        }
    }

    #[tokio::test]
    async fn test_session_lifecycle() {
        let state = state();
        let (a, b) = tokio::io::duplex(64 * 1024);
        let server = WebSocketStream::from_raw_socket(a, Role::Server, None).await;
        let mut client = WebSocketStream::from_raw_socket(b, Role::Client, None).await;

        let handler = ConnectionHandler::new(state.clone());
        let addr: SocketAddr = "127.0.0.1:40000".parse().unwrap();
        let task = tokio::spawn(async move { handler.serve(server, addr).await });

        let first = next_json(&mut client).await;
        assert_eq!(first["event"], "items:update");
        assert_eq!(first["data"][0]["id"], "gem");

        let welcome = next_json(&mut client).await;
        assert_eq!(welcome["event"], "session:welcome");
        let user_id = welcome["data"]["userId"].as_str().unwrap().to_string();

        client
            .send(Message::Text("garbage".to_string()))
            .await
            .unwrap();
        client
            .send(Message::Text(
                r#"{"event":"user:join","data":{"name":"Neo"}}"#.to_string(),
            ))
            .await
            .unwrap();

        let users = next_json(&mut client).await;
        assert_eq!(users["event"], "users:update");
        assert_eq!(users["data"][0]["id"], user_id.as_str());
        assert_eq!(users["data"][0]["name"], "Neo");
        assert_eq!(state.session_manager.count(), 1);

        client.send(Message::Close(None)).await.unwrap();
        task.await.unwrap().unwrap();

        assert_eq!(state.session_manager.count(), 0);
        assert_eq!(state.world.user_count(), 0);
    }

    #[tokio::test]
    async fn test_refuses_while_loading() {
        let (shutdown_tx, _) = broadcast::channel(1);
        let state = Arc::new(AppState::new(ServerConfig::default(), shutdown_tx));
        let handler = ConnectionHandler::new(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let connect = tokio::spawn(async move { TcpStream::connect(addr).await });
        let (stream, peer) = listener.accept().await.unwrap();

        let err = handler.handle_websocket(stream, peer).await.unwrap_err();
        assert!(matches!(
            err,
            WorldError::Network(NetworkError::NotAccepting)
        ));
        drop(connect);
    }
}
