//! Row shapes returned by repository queries.
//!
//! Keep these structs focused on the columns a query selects. Business logic
//! lives in `reconcile` and `publisher`.

use crate::model::{CatalogEntry, PostedMessage};
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CatalogRow {
    pub id: i64,
    pub name: Option<String>,
    pub category: Option<String>,
    pub visible: bool,
    pub stock: Option<i64>,
    pub needs_update: bool,
    pub posted_messages: i64,
}

impl From<CatalogRow> for CatalogEntry {
    fn from(row: CatalogRow) -> Self {
        CatalogEntry {
            id: row.id,
            name: row.name,
            category: row.category,
            visible: row.visible,
            stock: row.stock,
            needs_update: row.needs_update,
            posted_messages: row.posted_messages,
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ProductRow {
    pub id: i64,
    pub name: Option<String>,
    pub url: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PostedMessageRow {
    pub product_id: i64,
    pub message_id: i64,
    pub posted_at: DateTime<Utc>,
}

impl From<PostedMessageRow> for PostedMessage {
    fn from(row: PostedMessageRow) -> Self {
        PostedMessage {
            product_id: row.product_id,
            message_id: row.message_id as i32,
            posted_at: row.posted_at,
        }
    }
}
