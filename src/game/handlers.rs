//! Mutation handlers
//!
//! One validate-then-apply function per inbound event kind. Each handler
//! either applies its whole effect to the [`EntityStore`] or leaves it
//! untouched, and reports which collections changed so the caller knows
//! which snapshots to broadcast.

use bitflags::bitflags;
use serde::Deserialize;
use tracing::{debug, trace, warn};

use super::item::Position;
use super::store::EntityStore;
use super::user::{ChatMessage, User, UserId, DEFAULT_DISPLAY_NAME};

/// Experience awarded for every successful pickup
pub const PICKUP_XP: u32 = 10;

bitflags! {
    /// Collections touched by a mutation
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Changes: u8 {
        const USERS = 0b01;
        const ITEMS = 0b10;
    }
}

/// What happens to a departing user's inventory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DisconnectPolicy {
    /// Held items leave the world with the user
    #[default]
    Discard,
    /// Held items are dropped at the user's last position
    ReturnToWorld,
}

/// Profile fields supplied on join
#[derive(Debug, Clone, Default, Deserialize)]
pub struct JoinProfile {
    pub name: Option<String>,
    pub avatar: Option<String>,
    pub position: Option<Position>,
}

/// A chat line as received from a client
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub user_id: UserId,
    pub message: String,
    pub name: Option<String>,
    pub timestamp: Option<String>,
    pub avatar: Option<String>,
}

/// Result of a chat event
#[derive(Debug, Clone)]
pub struct ChatOutcome {
    /// Normalized message (always broadcast)
    pub message: ChatMessage,
    pub changes: Changes,
}

/// Create a user, or refresh the profile of an existing one
///
/// Inventory, stats and the active item survive a re-join.
pub fn join(store: &mut EntityStore, user_id: UserId, profile: JoinProfile) -> Changes {
    let existing = store.get_user(&user_id).cloned();
    let rejoin = existing.is_some();
    let mut user = existing.unwrap_or_else(|| User::new(user_id, DEFAULT_DISPLAY_NAME));

    if let Some(name) = profile.name.filter(|n| !n.is_empty()) {
        user.name = name;
    }
    if profile.avatar.is_some() {
        user.avatar = profile.avatar;
    }
    if let Some(position) = profile.position {
        user.position = position;
    }

    debug!(
        user_id = %user_id,
        name = %user.name,
        rejoin = rejoin,
        "User joined"
    );
    store.upsert_user(user);
    Changes::USERS
}

/// Set a user's position
pub fn move_user(store: &mut EntityStore, user_id: UserId, position: Position) -> Changes {
    match store.get_user_mut(&user_id) {
        Some(user) => {
            user.position = position;
            trace!(user_id = %user_id, position = %position, "User moved");
            Changes::USERS
        }
        None => {
            trace!(user_id = %user_id, "Move for unknown user ignored");
            Changes::empty()
        }
    }
}

/// Move an item from the world into a user's inventory and award XP
///
/// Serves both `item:pickup` and `item:collect`.
pub fn pickup(store: &mut EntityStore, user_id: UserId, item_id: &str) -> Changes {
    if store.get_item(item_id).is_none() {
        warn!(user_id = %user_id, item_id = %item_id, "Item not found in world");
        return Changes::empty();
    }
    if store.get_user(&user_id).is_none() {
        warn!(user_id = %user_id, item_id = %item_id, "User not found for pickup");
        return Changes::empty();
    }

    // Both preconditions hold, so neither lookup below can miss
    let Some(world_item) = store.remove_item(item_id) else {
        return Changes::empty();
    };
    let Some(user) = store.get_user_mut(&user_id) else {
        store.upsert_item(world_item);
        return Changes::empty();
    };

    user.inventory.push(world_item.take());
    user.stats.xp = user.stats.xp.saturating_add(PICKUP_XP);
    debug!(
        user_id = %user_id,
        item_id = %item_id,
        xp = user.stats.xp,
        inventory = user.inventory.len(),
        "Item picked up"
    );
    Changes::USERS | Changes::ITEMS
}

/// Move an item from a user's inventory back into the world
pub fn drop_item(
    store: &mut EntityStore,
    user_id: UserId,
    item_id: &str,
    position: Position,
) -> Changes {
    let Some(user) = store.get_user_mut(&user_id) else {
        trace!(user_id = %user_id, "Drop for unknown user ignored");
        return Changes::empty();
    };
    let Some(index) = user.find_item(item_id) else {
        warn!(user_id = %user_id, item_id = %item_id, "Item not found in user inventory");
        return Changes::empty();
    };

    let item = user.inventory.remove(index);
    if user.active_item.as_deref() == Some(item_id) {
        user.active_item = None;
    }

    debug!(
        user_id = %user_id,
        item_id = %item_id,
        position = %position,
        "Item dropped"
    );
    store.upsert_item(item.place(position));
    Changes::USERS | Changes::ITEMS
}

/// Mark a held item as the user's active item
pub fn use_item(store: &mut EntityStore, user_id: UserId, item_id: &str) -> Changes {
    let Some(user) = store.get_user_mut(&user_id) else {
        warn!(user_id = %user_id, "User not found for item use");
        return Changes::empty();
    };
    if !user.holds(item_id) {
        warn!(
            user_id = %user_id,
            item_id = %item_id,
            available = ?user.inventory.iter().map(|i| i.id.as_str()).collect::<Vec<_>>(),
            "Item not found in user inventory"
        );
        return Changes::empty();
    }

    user.active_item = Some(item_id.to_string());
    debug!(user_id = %user_id, item_id = %item_id, "Item activated");
    Changes::USERS
}

/// Clear a user's active item
pub fn unuse_item(store: &mut EntityStore, user_id: UserId) -> Changes {
    match store.get_user_mut(&user_id) {
        Some(user) => {
            user.active_item = None;
            Changes::USERS
        }
        None => Changes::empty(),
    }
}

/// Normalize a chat line and record it as the sender's latest message
///
/// Returns `None` for an empty message. The message is broadcast even when
/// the sender has not joined; only the user-list update is skipped then.
pub fn chat(store: &mut EntityStore, request: ChatRequest) -> Option<ChatOutcome> {
    if request.message.is_empty() {
        warn!(user_id = %request.user_id, "Empty chat message dropped");
        return None;
    }

    let message = ChatMessage::normalized(
        request.user_id,
        request.message,
        request.name,
        request.timestamp,
        request.avatar,
    );

    let changes = match store.get_user_mut(&request.user_id) {
        Some(user) => {
            user.latest_message = Some(message.clone());
            Changes::USERS
        }
        None => {
            debug!(user_id = %request.user_id, "Chat from user without a profile");
            Changes::empty()
        }
    };

    Some(ChatOutcome { message, changes })
}

/// Remove a departing user
pub fn disconnect(store: &mut EntityStore, user_id: UserId, policy: DisconnectPolicy) -> Changes {
    let Some(user) = store.remove_user(&user_id) else {
        return Changes::empty();
    };

    let held = user.inventory.len();
    if held == 0 {
        return Changes::USERS;
    }

    match policy {
        DisconnectPolicy::Discard => {
            debug!(user_id = %user_id, held = held, "Held items discarded with user");
            Changes::USERS
        }
        DisconnectPolicy::ReturnToWorld => {
            for item in user.inventory {
                store.upsert_item(item.place(user.position));
            }
            debug!(
                user_id = %user_id,
                held = held,
                position = %user.position,
                "Held items returned to world"
            );
            Changes::USERS | Changes::ITEMS
        }
    }
}
