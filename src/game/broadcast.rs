//! Broadcast engine
//!
//! Turns store contents into full snapshots and fans them out to every
//! subscribed session. Each snapshot is encoded once and shared as a
//! [`Frame`]; clients replace their state wholesale on receipt.

use tokio::sync::broadcast;
use tracing::{error, trace};

use super::handlers::Changes;
use super::store::EntityStore;
use super::user::ChatMessage;
use crate::error::ProtocolError;
use crate::protocol::outbound::UserView;
use crate::protocol::{Frame, ServerEvent};

/// Build the items snapshot event
///
/// Sorted by id so identical states encode identically.
pub fn items_snapshot(store: &EntityStore) -> ServerEvent<'_> {
    let mut items: Vec<_> = store.list_items().collect();
    items.sort_by(|a, b| a.id().cmp(b.id()));
    ServerEvent::ItemsUpdate(items)
}

/// Build the users snapshot event
pub fn users_snapshot(store: &EntityStore) -> ServerEvent<'_> {
    let mut users: Vec<_> = store.list_users().map(UserView::from).collect();
    users.sort_by_key(|user| user.id);
    ServerEvent::UsersUpdate(users)
}

/// Encode the current items snapshot
pub fn encode_items(store: &EntityStore) -> Result<Frame, ProtocolError> {
    items_snapshot(store).encode()
}

/// Encode the current users snapshot
pub fn encode_users(store: &EntityStore) -> Result<Frame, ProtocolError> {
    users_snapshot(store).encode()
}

/// Fan-out channel for encoded frames
pub struct Broadcaster {
    tx: broadcast::Sender<Frame>,
}

impl Broadcaster {
    /// Create a broadcaster with the given per-subscriber backlog
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Register a new receiver
    pub fn subscribe(&self) -> broadcast::Receiver<Frame> {
        self.tx.subscribe()
    }

    /// Number of live receivers
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Send a frame to every receiver
    pub fn publish(&self, frame: Frame) {
        // An error only means nobody is connected
        if self.tx.send(frame).is_err() {
            trace!("Broadcast with no receivers");
        }
    }

    /// Encode and send an event, logging encode failures
    pub fn publish_event(&self, event: &ServerEvent<'_>) {
        match event.encode() {
            Ok(frame) => self.publish(frame),
            Err(e) => error!(event = event.name(), error = %e, "Failed to encode broadcast"),
        }
    }

    /// Publish the snapshots a mutation calls for
    ///
    /// The items snapshot is always sent before the users snapshot.
    pub fn publish_changes(&self, store: &EntityStore, changes: Changes) {
        if changes.contains(Changes::ITEMS) {
            self.publish_event(&items_snapshot(store));
        }
        if changes.contains(Changes::USERS) {
            self.publish_event(&users_snapshot(store));
        }
    }

    /// Publish a chat line, then the user list if it changed
    pub fn publish_chat(&self, store: &EntityStore, message: &ChatMessage, changes: Changes) {
        self.publish_event(&ServerEvent::ChatMessage(message));
        self.publish_changes(store, changes);
    }
}
