//! Entity store
//!
//! Canonical mappings of live users and unowned world items. Every operation
//! is a plain read or write; absence is reported as `None`, never as an error.
//! Callers are responsible for serializing access (see [`super::world::GameWorld`]).

use std::collections::{HashMap, HashSet};

use super::item::{ItemId, WorldItem};
use super::user::{User, UserId};

/// In-memory store of users and world items
#[derive(Debug, Default)]
pub struct EntityStore {
    users: HashMap<UserId, User>,
    items: HashMap<ItemId, WorldItem>,
}

impl EntityStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store seeded with world items
    pub fn with_items(items: impl IntoIterator<Item = WorldItem>) -> Self {
        let mut store = Self::new();
        for item in items {
            store.upsert_item(item);
        }
        store
    }

    /// Insert or replace a user, returning the previous record
    pub fn upsert_user(&mut self, user: User) -> Option<User> {
        self.users.insert(user.id, user)
    }

    /// Remove a user
    pub fn remove_user(&mut self, id: &UserId) -> Option<User> {
        self.users.remove(id)
    }

    /// Get a user
    pub fn get_user(&self, id: &UserId) -> Option<&User> {
        self.users.get(id)
    }

    /// Get a user for in-place mutation
    pub fn get_user_mut(&mut self, id: &UserId) -> Option<&mut User> {
        self.users.get_mut(id)
    }

    /// All users, in no particular order
    pub fn list_users(&self) -> impl Iterator<Item = &User> {
        self.users.values()
    }

    /// Insert or replace a world item, returning the previous record
    pub fn upsert_item(&mut self, item: WorldItem) -> Option<WorldItem> {
        self.items.insert(item.item.id.clone(), item)
    }

    /// Remove a world item
    pub fn remove_item(&mut self, id: &str) -> Option<WorldItem> {
        self.items.remove(id)
    }

    /// Get a world item
    pub fn get_item(&self, id: &str) -> Option<&WorldItem> {
        self.items.get(id)
    }

    /// All world items, in no particular order
    pub fn list_items(&self) -> impl Iterator<Item = &WorldItem> {
        self.items.values()
    }

    /// Number of users
    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    /// Number of items in the world
    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    /// Ids of every item held in any inventory
    pub fn owned_item_ids(&self) -> impl Iterator<Item = &str> {
        self.users
            .values()
            .flat_map(|user| user.inventory.iter().map(|item| item.id.as_str()))
    }

    /// Check that no item is both in the world and held, or held twice
    pub fn ownership_is_disjoint(&self) -> bool {
        let mut seen: HashSet<&str> = self.items.keys().map(String::as_str).collect();
        self.owned_item_ids().all(|id| seen.insert(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::item::{Item, Position};
    use uuid::Uuid;

    fn world_item(id: &str) -> WorldItem {
        Item::new(id, id, "*", "glow", "collectible").place(Position::new(1.0, 1.0))
    }

    #[test]
    fn test_user_crud() {
        let mut store = EntityStore::new();
        let id = Uuid::new_v4();

        assert!(store.get_user(&id).is_none());
        assert!(store.upsert_user(User::new(id, "Neo")).is_none());
        assert_eq!(store.user_count(), 1);
        assert_eq!(store.get_user(&id).unwrap().name, "Neo");

        let previous = store.upsert_user(User::new(id, "Thomas")).unwrap();
        assert_eq!(previous.name, "Neo");
        assert_eq!(store.user_count(), 1);

        assert!(store.remove_user(&id).is_some());
        assert!(store.remove_user(&id).is_none());
        assert_eq!(store.list_users().count(), 0);
    }

    #[test]
    fn test_item_crud() {
        let mut store = EntityStore::with_items([world_item("gem"), world_item("trophy")]);

        assert_eq!(store.item_count(), 2);
        assert!(store.get_item("gem").is_some());
        assert!(store.remove_item("gem").is_some());
        assert!(store.get_item("gem").is_none());
        assert!(store.remove_item("gem").is_none());
        assert_eq!(store.list_items().count(), 1);
    }

    #[test]
    fn test_ownership_check() {
        let mut store = EntityStore::with_items([world_item("gem")]);
        let id = Uuid::new_v4();
        let mut user = User::new(id, "Neo");
        user.inventory.push(world_item("trophy").take());
        store.upsert_user(user);
        assert!(store.ownership_is_disjoint());

        store
            .get_user_mut(&id)
            .unwrap()
            .inventory
            .push(world_item("gem").take());
        assert!(!store.ownership_is_disjoint());
    }
}
