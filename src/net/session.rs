//! Session management module
//!
//! Manages client sessions including:
//! - Session lifecycle (creation, tracking, cleanup)
//! - Session state machine (connecting -> active -> disconnected)
//! - Per-session outbound channel for direct frames
//! - Thread-safe session registry

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{NetworkError, Result, WorldError};
use crate::protocol::Frame;

/// Unique session identifier, also the id of the session's user
pub type SessionId = Uuid;

/// Session state in the connection lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// Transport open, initial snapshot not yet delivered
    Connecting,
    /// Snapshot delivered, events accepted
    Active,
    /// Transport closed
    Disconnected,
}

impl SessionState {
    /// Check if the session may submit events
    pub fn accepts_events(&self) -> bool {
        matches!(self, SessionState::Active)
    }

    /// Get a human-readable name for the state
    pub fn name(&self) -> &'static str {
        match self {
            SessionState::Connecting => "Connecting",
            SessionState::Active => "Active",
            SessionState::Disconnected => "Disconnected",
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A connected client session
pub struct Session {
    /// Unique session identifier
    pub id: SessionId,
    /// Remote address of the client
    pub address: SocketAddr,
    /// Current session state
    state: RwLock<SessionState>,
    /// Time of session creation
    pub created_at: Instant,
    /// Frames addressed to this session only
    outbound_tx: mpsc::Sender<Frame>,
}

impl Session {
    /// Create a new session feeding the given outbound channel
    pub fn new(id: SessionId, address: SocketAddr, outbound_tx: mpsc::Sender<Frame>) -> Self {
        Self {
            id,
            address,
            state: RwLock::new(SessionState::Connecting),
            created_at: Instant::now(),
            outbound_tx,
        }
    }

    /// Get the current session state
    pub fn state(&self) -> SessionState {
        *self.state.read()
    }

    /// Set the session state
    pub fn set_state(&self, new_state: SessionState) {
        let old_state = {
            let mut state = self.state.write();
            let old = *state;
            *state = new_state;
            old
        };
        debug!(
            session_id = %self.id,
            old_state = %old_state,
            new_state = %new_state,
            "Session state changed"
        );
    }

    /// Transition to a new state if currently in the expected state
    pub fn transition_state(&self, expected: SessionState, new_state: SessionState) -> bool {
        let mut state = self.state.write();
        if *state == expected {
            *state = new_state;
            true
        } else {
            false
        }
    }

    /// Check if the session may submit events
    pub fn accepts_events(&self) -> bool {
        self.state().accepts_events()
    }

    /// Queue a frame for this session only
    pub async fn send(&self, frame: Frame) -> Result<()> {
        self.outbound_tx
            .send(frame)
            .await
            .map_err(|_| WorldError::Network(NetworkError::ConnectionClosed))
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("address", &self.address)
            .field("state", &self.state())
            .field("connected_for", &self.created_at.elapsed())
            .finish()
    }
}

/// Thread-safe session manager
pub struct SessionManager {
    /// Map of session ID to session
    sessions: DashMap<SessionId, Arc<Session>>,
    /// Reserved slots; claimed before insert, released on remove
    reserved: AtomicUsize,
    /// Maximum concurrent sessions
    max_sessions: usize,
}

impl SessionManager {
    /// Create a session manager with the given connection limit
    pub fn new(max_sessions: usize) -> Self {
        Self {
            sessions: DashMap::new(),
            reserved: AtomicUsize::new(0),
            max_sessions,
        }
    }

    /// Claim a slot under the connection limit and allocate a fresh id
    fn reserve(&self) -> Result<SessionId> {
        self.reserved
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                (current < self.max_sessions).then_some(current + 1)
            })
            .map_err(|current| {
                warn!(
                    count = current,
                    max = self.max_sessions,
                    "Connection limit reached"
                );
                WorldError::Network(NetworkError::TooManyConnections(current))
            })?;
        Ok(Uuid::new_v4())
    }

    /// Create a session feeding the given outbound channel and register it
    pub fn create_session(
        &self,
        address: SocketAddr,
        outbound_tx: mpsc::Sender<Frame>,
    ) -> Result<Arc<Session>> {
        let id = self.reserve()?;
        let session = Arc::new(Session::new(id, address, outbound_tx));
        self.sessions.insert(id, session.clone());

        info!(session_id = %id, address = %address, "Session created");

        Ok(session)
    }

    /// Get a session by ID
    pub fn get(&self, id: SessionId) -> Option<Arc<Session>> {
        self.sessions.get(&id).map(|r| r.clone())
    }

    /// Remove a session and release its slot
    pub fn remove(&self, id: SessionId) {
        if let Some((_, session)) = self.sessions.remove(&id) {
            self.reserved.fetch_sub(1, Ordering::AcqRel);
            info!(
                session_id = %id,
                connected_for = ?session.created_at.elapsed(),
                "Session removed"
            );
        }
    }

    /// Get the count of registered sessions
    pub fn count(&self) -> usize {
        self.sessions.len()
    }

    /// Get the count of sessions per state
    pub fn count_by_state(&self) -> HashMap<SessionState, usize> {
        let mut counts = HashMap::new();
        for session in self.sessions.iter() {
            *counts.entry(session.state()).or_insert(0) += 1;
        }
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn test_address() -> SocketAddr {
        "127.0.0.1:12345".parse().unwrap()
    }

    fn test_session(manager: &SessionManager) -> Result<Arc<Session>> {
        let (tx, _rx) = mpsc::channel(1);
        manager.create_session(test_address(), tx)
    }

    #[test]
    fn test_session_creation() {
        let id = Uuid::new_v4();
        let (tx, _rx) = mpsc::channel(1);
        let session = Session::new(id, test_address(), tx);
        assert_eq!(session.id, id);
        assert_eq!(session.state(), SessionState::Connecting);
        assert!(!session.accepts_events());
    }

    #[test]
    fn test_session_state_transition() {
        let (tx, _rx) = mpsc::channel(1);
        let session = Session::new(Uuid::new_v4(), test_address(), tx);

        assert!(session.transition_state(SessionState::Connecting, SessionState::Active));
        assert_eq!(session.state(), SessionState::Active);
        assert!(session.accepts_events());

        // Should fail - not in Connecting state anymore
        assert!(!session.transition_state(SessionState::Connecting, SessionState::Active));

        session.set_state(SessionState::Disconnected);
        assert!(!session.accepts_events());
        assert_eq!(session.state().to_string(), "Disconnected");
    }

    #[test]
    fn test_session_manager_create() {
        let manager = SessionManager::new(8);
        let a = test_session(&manager).unwrap();
        let b = test_session(&manager).unwrap();

        assert_ne!(a.id, b.id);
        assert_eq!(manager.count(), 2);
    }

    #[test]
    fn test_session_manager_get_and_remove() {
        let manager = SessionManager::new(8);
        let session = test_session(&manager).unwrap();
        let id = session.id;

        assert_eq!(manager.get(id).unwrap().id, id);

        manager.remove(id);
        manager.remove(id);

        assert!(manager.get(id).is_none());
        assert_eq!(manager.count(), 0);
        assert_eq!(session.state(), SessionState::Connecting);
    }

    #[test]
    fn test_session_manager_limit() {
        let manager = SessionManager::new(2);

        let first = test_session(&manager).unwrap();
        assert!(test_session(&manager).is_ok());

        let err = test_session(&manager).unwrap_err();
        assert!(matches!(
            err,
            WorldError::Network(NetworkError::TooManyConnections(2))
        ));

        // Removing a session frees its slot exactly once
        manager.remove(first.id);
        manager.remove(first.id);
        assert!(test_session(&manager).is_ok());
        assert!(test_session(&manager).is_err());
    }

    #[test]
    fn test_session_manager_limit_under_concurrency() {
        let manager = Arc::new(SessionManager::new(4));

        let handles: Vec<_> = (0..32)
            .map(|_| {
                let manager = manager.clone();
                thread::spawn(move || test_session(&manager).is_ok())
            })
            .collect();

        let created = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();

        assert_eq!(created, 4);
        assert_eq!(manager.count(), 4);
    }

    #[test]
    fn test_session_count_by_state() {
        let manager = SessionManager::new(8);

        let s1 = test_session(&manager).unwrap();
        let s2 = test_session(&manager).unwrap();
        test_session(&manager).unwrap();

        s1.set_state(SessionState::Active);
        s2.set_state(SessionState::Active);

        let counts = manager.count_by_state();
        assert_eq!(counts.get(&SessionState::Active), Some(&2));
        assert_eq!(counts.get(&SessionState::Connecting), Some(&1));
    }

    #[tokio::test]
    async fn test_session_channel() {
        let (tx, mut rx) = mpsc::channel(1);
        let session = Session::new(Uuid::new_v4(), test_address(), tx);

        session.send(Frame::from("one")).await.unwrap();
        assert_eq!(&*rx.recv().await.unwrap(), "one");

        drop(rx);
        assert!(session.send(Frame::from("two")).await.is_err());
    }
}
