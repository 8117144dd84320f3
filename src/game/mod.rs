//! Game module
//!
//! This module contains the shared-world state engine:
//! - Items and users (the entity model)
//! - Entity store and mutation handlers
//! - Snapshot broadcasting
//! - World ownership, seeding and serialization of mutations
//! - Item catalog loading

pub mod broadcast;
pub mod catalog;
pub mod handlers;
pub mod item;
pub mod store;
pub mod user;
pub mod world;
