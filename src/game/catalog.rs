//! Item catalog loading
//!
//! Supplies the items the world starts with: a built-in set, optionally
//! overlaid with rows from a PostgreSQL `items` table. A failing database
//! never blocks startup; the world simply starts with what it has.

use std::time::Duration;

use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::{error, info, warn};

use super::item::{Item, Position, WorldItem};
use crate::config::CatalogConfig;
use crate::error::{CatalogError, Result};

/// Row shape of the `items` table
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ItemRecord {
    pub id: String,
    pub name: String,
    pub icon: String,
    pub effect: String,
    pub item_type: String,
    pub position_x: f64,
    pub position_y: f64,
}

impl TryFrom<ItemRecord> for WorldItem {
    type Error = CatalogError;

    fn try_from(record: ItemRecord) -> std::result::Result<Self, Self::Error> {
        if record.id.trim().is_empty() {
            return Err(CatalogError::InvalidRow {
                id: record.id,
                reason: "empty id".to_string(),
            });
        }
        if !record.position_x.is_finite() || !record.position_y.is_finite() {
            return Err(CatalogError::InvalidRow {
                id: record.id,
                reason: "non-finite position".to_string(),
            });
        }

        Ok(Item::new(
            record.id,
            record.name,
            record.icon,
            record.effect,
            record.item_type,
        )
        .place(Position::new(record.position_x, record.position_y)))
    }
}

/// The built-in item set
pub fn default_catalog() -> Vec<WorldItem> {
    [
        ("neon-heart", "Neon Heart", "💗", 200.0, 150.0),
        ("neon-star", "Neon Star", "⭐", 400.0, 250.0),
        ("neon-bolt", "Neon Lightning", "⚡", 600.0, 350.0),
        ("neon-crown", "Neon Crown", "👑", 300.0, 400.0),
        ("diamond", "Diamond", "💎", 150.0, 300.0),
        ("crystal-ball", "Crystal Ball", "🔮", 500.0, 200.0),
        ("gem", "Gem", "💠", 350.0, 400.0),
        ("trophy", "Trophy", "🏆", 250.0, 350.0),
    ]
    .into_iter()
    .map(|(id, name, icon, x, y)| {
        Item::new(id, name, icon, "glow", "collectible").place(Position::new(x, y))
    })
    .collect()
}

/// Read every valid row of the `items` table
///
/// Invalid rows are logged and skipped.
pub async fn fetch_items(pool: &PgPool) -> Result<Vec<WorldItem>> {
    let records = sqlx::query_as::<_, ItemRecord>(
        r#"
        SELECT
            id, name, icon, effect, type AS item_type,
            position_x, position_y
        FROM items
        "#,
    )
    .fetch_all(pool)
    .await?;

    let items = records
        .into_iter()
        .filter_map(|record| match WorldItem::try_from(record) {
            Ok(item) => Some(item),
            Err(e) => {
                warn!(error = %e, "Skipping catalog row");
                None
            }
        })
        .collect();

    Ok(items)
}

/// Connect to the catalog database and read its items
pub async fn load_from_database(config: &CatalogConfig) -> Result<Vec<WorldItem>> {
    let url = config
        .database_url
        .as_deref()
        .ok_or(CatalogError::NotConfigured)?;

    let pool = PgPoolOptions::new()
        .max_connections(config.pool_size)
        .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
        .connect(url)
        .await?;

    let items = fetch_items(&pool).await;
    pool.close().await;
    items
}

/// Overlay database items on the built-in set
///
/// An overlay item replaces any earlier item with the same id in place;
/// new ids are appended. The result has unique ids.
pub fn merge_catalog(base: Vec<WorldItem>, overlay: Vec<WorldItem>) -> Vec<WorldItem> {
    let mut items = base;
    for item in overlay {
        match items.iter().position(|existing| existing.id() == item.id()) {
            Some(index) => items[index] = item,
            None => items.push(item),
        }
    }
    items
}

/// Assemble the starting item set
///
/// Database rows replace built-in items with the same id.
pub async fn load_catalog(config: &CatalogConfig) -> Vec<WorldItem> {
    let items = if config.use_default_items {
        default_catalog()
    } else {
        Vec::new()
    };

    if config.database_url.is_none() {
        info!(items = items.len(), "No catalog database configured, using built-in items");
        return items;
    }

    match load_from_database(config).await {
        Ok(db_items) => {
            info!(count = db_items.len(), "Items loaded from database");
            merge_catalog(items, db_items)
        }
        Err(e) => {
            error!(error = %e, "Error loading items from database");
            items
        }
    }
}
