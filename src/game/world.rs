//! World module
//!
//! Owns the authoritative entity store and serializes every mutation:
//! - Single-writer lock around validate, apply and publish
//! - Catalog seeding and the ready signal
//! - Snapshot fan-out through the broadcast engine

use std::time::Instant;

use parking_lot::{Mutex, RwLock};
use tokio::sync::broadcast;
use tracing::{debug, info};

use super::broadcast::{self as snapshots, Broadcaster};
use super::handlers::{self, Changes, DisconnectPolicy};
use super::item::WorldItem;
use super::store::EntityStore;
use super::user::UserId;
use crate::error::ProtocolError;
use crate::protocol::{ClientEvent, Frame, ServerEvent};

/// Default per-session broadcast backlog
pub const DEFAULT_BROADCAST_CAPACITY: usize = 256;

/// World settings
#[derive(Debug, Clone)]
pub struct WorldSettings {
    /// World name
    pub name: String,
    /// Per-session broadcast backlog
    pub broadcast_capacity: usize,
    /// What happens to a departing user's items
    pub disconnect_policy: DisconnectPolicy,
}

impl Default for WorldSettings {
    fn default() -> Self {
        Self {
            name: "Neon World".to_string(),
            broadcast_capacity: DEFAULT_BROADCAST_CAPACITY,
            disconnect_policy: DisconnectPolicy::default(),
        }
    }
}

impl WorldSettings {
    /// Set the world name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the disconnect policy
    pub fn with_disconnect_policy(mut self, policy: DisconnectPolicy) -> Self {
        self.disconnect_policy = policy;
        self
    }

    /// Set the broadcast backlog
    pub fn with_broadcast_capacity(mut self, capacity: usize) -> Self {
        self.broadcast_capacity = capacity;
        self
    }
}

/// World state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorldState {
    /// Item catalog is loading
    Loading,
    /// Catalog loaded, sessions accepted
    Ready,
    /// World is shutting down
    ShuttingDown,
}

impl WorldState {
    /// Check if the world is accepting new sessions
    pub fn accepting_connections(&self) -> bool {
        matches!(self, WorldState::Ready)
    }
}

/// The shared world
pub struct GameWorld {
    /// World settings
    pub settings: WorldSettings,
    state: RwLock<WorldState>,
    /// Held for the whole validate-apply-publish span of each mutation
    store: Mutex<EntityStore>,
    broadcaster: Broadcaster,
    start_time: Instant,
}

impl GameWorld {
    /// Create an empty world
    pub fn new(settings: WorldSettings) -> Self {
        info!(name = %settings.name, "Creating game world");

        Self {
            broadcaster: Broadcaster::new(settings.broadcast_capacity),
            settings,
            state: RwLock::new(WorldState::Loading),
            store: Mutex::new(EntityStore::new()),
            start_time: Instant::now(),
        }
    }

    /// Get the current world state
    pub fn state(&self) -> WorldState {
        *self.state.read()
    }

    /// Set the world state
    pub fn set_state(&self, new_state: WorldState) {
        let mut state = self.state.write();
        let old_state = *state;
        *state = new_state;
        info!(
            old_state = ?old_state,
            new_state = ?new_state,
            "World state changed"
        );
    }

    /// Signal that the catalog is loaded
    pub fn mark_ready(&self) {
        self.set_state(WorldState::Ready);
    }

    /// Check if the catalog is loaded
    pub fn is_ready(&self) -> bool {
        self.state() == WorldState::Ready
    }

    /// Add catalog items to the world, replacing any with the same id
    pub fn seed(&self, items: impl IntoIterator<Item = WorldItem>) -> usize {
        let mut store = self.store.lock();
        let mut count = 0;
        for item in items {
            store.upsert_item(item);
            count += 1;
        }
        debug!(seeded = count, total = store.item_count(), "World items seeded");
        count
    }

    /// Subscribe a new session
    ///
    /// The returned items snapshot and the receiver are taken under the same
    /// lock, so the receiver only yields frames newer than the snapshot.
    pub fn connect(&self) -> Result<(Frame, broadcast::Receiver<Frame>), ProtocolError> {
        let store = self.store.lock();
        let frame = snapshots::encode_items(&store)?;
        Ok((frame, self.broadcaster.subscribe()))
    }

    /// Resubscribe a session that fell behind the broadcast backlog
    ///
    /// Returns fresh items and users snapshots taken under the same lock as
    /// the new receiver.
    pub fn resync(&self) -> Result<(Frame, Frame, broadcast::Receiver<Frame>), ProtocolError> {
        let store = self.store.lock();
        let items = snapshots::encode_items(&store)?;
        let users = snapshots::encode_users(&store)?;
        Ok((items, users, self.broadcaster.subscribe()))
    }

    /// Apply a client event on behalf of a session and broadcast the result
    pub fn apply(&self, user_id: UserId, event: ClientEvent) -> Changes {
        let mut store = self.store.lock();

        let changes = match event {
            ClientEvent::Join(payload) => handlers::join(&mut store, user_id, payload.into()),
            ClientEvent::Move(payload) => handlers::move_user(&mut store, user_id, payload.position),
            ClientEvent::Pickup(payload) => handlers::pickup(&mut store, user_id, &payload.item_id),
            ClientEvent::Drop(payload) => {
                handlers::drop_item(&mut store, user_id, &payload.item_id, payload.position)
            }
            ClientEvent::Use(payload) => handlers::use_item(&mut store, user_id, &payload.item_id),
            ClientEvent::Unuse(_) => handlers::unuse_item(&mut store, user_id),
            ClientEvent::Chat(payload) => {
                let mut request: handlers::ChatRequest = payload.into();
                request.user_id = user_id;
                match handlers::chat(&mut store, request) {
                    Some(outcome) => {
                        self.broadcaster
                            .publish_chat(&store, &outcome.message, outcome.changes);
                        return outcome.changes;
                    }
                    None => Changes::empty(),
                }
            }
        };

        self.broadcaster.publish_changes(&store, changes);
        changes
    }

    /// Remove a departed session's user and broadcast the result
    pub fn disconnect(&self, user_id: UserId) -> Changes {
        let mut store = self.store.lock();
        let changes = handlers::disconnect(&mut store, user_id, self.settings.disconnect_policy);
        self.broadcaster.publish_changes(&store, changes);
        changes
    }

    /// Encode a welcome event for a session
    pub fn welcome_frame(&self, user_id: UserId) -> Result<Frame, ProtocolError> {
        ServerEvent::Welcome { user_id }.encode()
    }

    /// Run a read-only closure against the store
    pub fn read<R>(&self, f: impl FnOnce(&EntityStore) -> R) -> R {
        f(&*self.store.lock())
    }

    /// Number of users
    pub fn user_count(&self) -> usize {
        self.store.lock().user_count()
    }

    /// Number of items in the world
    pub fn item_count(&self) -> usize {
        self.store.lock().item_count()
    }

    /// Number of sessions receiving broadcasts
    pub fn subscriber_count(&self) -> usize {
        self.broadcaster.receiver_count()
    }

    /// Get the uptime in seconds
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Get world info as a string
    pub fn info(&self) -> String {
        format!(
            "World {} - {} users - {} items - Uptime {}s",
            self.settings.name,
            self.user_count(),
            self.item_count(),
            self.uptime_secs()
        )
    }
}

impl std::fmt::Debug for GameWorld {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GameWorld")
            .field("settings", &self.settings)
            .field("state", &self.state())
            .field("users", &self.user_count())
            .field("items", &self.item_count())
            .field("uptime_secs", &self.uptime_secs())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::item::{Item, Position};
    use uuid::Uuid;

    fn world() -> GameWorld {
        let world = GameWorld::new(WorldSettings::default());
        world.seed([Item::new("gem", "Gem", "💠", "glow", "collectible")
            .place(Position::new(350.0, 400.0))]);
        world.mark_ready();
        world
    }

    fn decode(text: &str) -> ClientEvent {
        ClientEvent::decode(text).unwrap()
    }

    fn events(rx: &mut broadcast::Receiver<Frame>) -> Vec<serde_json::Value> {
        let mut out = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            out.push(serde_json::from_str(&frame).unwrap());
        }
        out
    }

    #[test]
    fn test_world_state() {
        let world = GameWorld::new(WorldSettings::default());
        assert_eq!(world.state(), WorldState::Loading);
        assert!(!world.state().accepting_connections());

        world.mark_ready();
        assert!(world.is_ready());
        assert!(world.state().accepting_connections());

        world.set_state(WorldState::ShuttingDown);
        assert!(!world.state().accepting_connections());
    }

    #[test]
    fn test_settings_builder() {
        let settings = WorldSettings::default()
            .with_name("Test World")
            .with_disconnect_policy(DisconnectPolicy::ReturnToWorld)
            .with_broadcast_capacity(8);

        assert_eq!(settings.name, "Test World");
        assert_eq!(settings.disconnect_policy, DisconnectPolicy::ReturnToWorld);
        assert_eq!(settings.broadcast_capacity, 8);
    }

    #[test]
    fn test_connect_returns_items_snapshot() {
        let world = world();
        let (frame, _rx) = world.connect().unwrap();
        let value: serde_json::Value = serde_json::from_str(&frame).unwrap();

        assert_eq!(value["event"], "items:update");
        assert_eq!(value["data"][0]["id"], "gem");
        assert_eq!(world.subscriber_count(), 1);
    }

    #[test]
    fn test_resync_skips_backlog() {
        let world = GameWorld::new(WorldSettings::default().with_broadcast_capacity(1));
        world.mark_ready();
        let (_, mut stale) = world.connect().unwrap();
        let id = Uuid::new_v4();

        world.apply(id, decode(r#"{"event":"user:join","data":{"name":"u1"}}"#));
        world.apply(id, decode(r#"{"event":"user:join","data":{"name":"u2"}}"#));
        assert!(matches!(
            stale.try_recv(),
            Err(broadcast::error::TryRecvError::Lagged(_))
        ));

        let (items, users, mut fresh) = world.resync().unwrap();
        let users: serde_json::Value = serde_json::from_str(&users).unwrap();
        assert!(items.starts_with(r#"{"event":"items:update""#));
        assert_eq!(users["data"][0]["name"], "u2");
        assert!(fresh.try_recv().is_err());
    }

    #[test]
    fn test_join_broadcasts_users() {
        let world = world();
        let (_, mut rx) = world.connect().unwrap();
        let id = Uuid::new_v4();

        let changes = world.apply(id, decode(r#"{"event":"user:join","data":{"name":"u1"}}"#));

        assert_eq!(changes, Changes::USERS);
        let sent = events(&mut rx);
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0]["event"], "users:update");
        assert_eq!(sent[0]["data"][0]["name"], "u1");
    }

    #[test]
    fn test_pickup_broadcasts_both_snapshots() {
        let world = world();
        let id = Uuid::new_v4();
        world.apply(id, decode(r#"{"event":"user:join","data":{"name":"u1"}}"#));
        let (_, mut rx) = world.connect().unwrap();

        let text = format!(
            r#"{{"event":"item:pickup","data":{{"userId":"{}","itemId":"gem"}}}}"#,
            id
        );
        world.apply(id, decode(&text));

        let sent = events(&mut rx);
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0]["event"], "items:update");
        assert_eq!(sent[0]["data"].as_array().unwrap().len(), 0);
        assert_eq!(sent[1]["event"], "users:update");
        assert_eq!(sent[1]["data"][0]["inventory"][0]["id"], "gem");
        assert_eq!(sent[1]["data"][0]["stats"]["xp"], 10);
    }

    #[test]
    fn test_failed_pickup_broadcasts_nothing() {
        let world = world();
        let id = Uuid::new_v4();
        world.apply(id, decode(r#"{"event":"user:join"}"#));
        let (_, mut rx) = world.connect().unwrap();

        let text = format!(
            r#"{{"event":"item:pickup","data":{{"userId":"{}","itemId":"unicorn"}}}}"#,
            id
        );
        assert!(world.apply(id, decode(&text)).is_empty());
        assert!(events(&mut rx).is_empty());
        assert_eq!(world.item_count(), 1);
    }

    #[test]
    fn test_chat_broadcasts_message_then_users() {
        let world = world();
        let id = Uuid::new_v4();
        world.apply(id, decode(r#"{"event":"user:join"}"#));
        let (_, mut rx) = world.connect().unwrap();

        let text = format!(
            r#"{{"event":"chat:message","data":{{"userId":"{}","message":"hi"}}}}"#,
            id
        );
        world.apply(id, decode(&text));

        let sent = events(&mut rx);
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0]["event"], "chat:message");
        assert_eq!(sent[0]["data"]["name"], "Unknown User");
        assert_eq!(sent[1]["event"], "users:update");
        assert_eq!(sent[1]["data"][0]["latestMessage"]["message"], "hi");
    }

    #[test]
    fn test_chat_before_join_only_broadcasts_message() {
        let world = world();
        let id = Uuid::new_v4();
        let (_, mut rx) = world.connect().unwrap();

        let text = format!(
            r#"{{"event":"chat:message","data":{{"userId":"{}","message":"hi"}}}}"#,
            id
        );
        world.apply(id, decode(&text));

        let sent = events(&mut rx);
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0]["event"], "chat:message");
    }

    #[test]
    fn test_disconnect_broadcasts_users() {
        let world = world();
        let id = Uuid::new_v4();
        world.apply(id, decode(r#"{"event":"user:join"}"#));
        let (_, mut rx) = world.connect().unwrap();

        assert_eq!(world.disconnect(id), Changes::USERS);

        let sent = events(&mut rx);
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0]["event"], "users:update");
        assert_eq!(sent[0]["data"].as_array().unwrap().len(), 0);
    }

    #[test]
    fn test_disconnect_without_join_is_silent() {
        let world = world();
        let (_, mut rx) = world.connect().unwrap();

        assert!(world.disconnect(Uuid::new_v4()).is_empty());
        assert!(events(&mut rx).is_empty());
    }

    #[test]
    fn test_concurrent_pickups_award_item_once() {
        use std::sync::Arc;

        let world = Arc::new(world());
        let ids: Vec<_> = (0..8).map(|_| Uuid::new_v4()).collect();
        for id in &ids {
            world.apply(*id, decode(r#"{"event":"user:join"}"#));
        }

        let handles: Vec<_> = ids
            .iter()
            .map(|id| {
                let world = world.clone();
                let id = *id;
                std::thread::spawn(move || {
                    let text = format!(
                        r#"{{"event":"item:pickup","data":{{"userId":"{}","itemId":"gem"}}}}"#,
                        id
                    );
                    world.apply(id, ClientEvent::decode(&text).unwrap())
                })
            })
            .collect();

        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|changes| !changes.is_empty())
            .count();

        assert_eq!(winners, 1);
        world.read(|store| {
            assert!(store.ownership_is_disjoint());
            assert_eq!(store.owned_item_ids().count(), 1);
            assert_eq!(store.list_users().map(|u| u.stats.xp).sum::<u32>(), 10);
        });
    }
}
