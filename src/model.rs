use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Per-product slice of the catalog that reconciliation decides on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub id: i64,
    pub name: Option<String>,
    pub category: Option<String>,
    pub visible: bool,
    /// `None` means unknown or unavailable.
    pub stock: Option<i64>,
    pub needs_update: bool,
    /// Number of live posted-message records.
    pub posted_messages: i64,
}

impl CatalogEntry {
    pub fn is_posted(&self) -> bool {
        self.posted_messages > 0
    }
}

/// Everything the publisher needs to render one post.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Product {
    pub id: i64,
    pub name: String,
    pub url: Option<String>,
    pub description: Option<String>,
    /// Ordered; only the first one is ever posted.
    pub images: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostedMessage {
    pub product_id: i64,
    pub message_id: i32,
    pub posted_at: DateTime<Utc>,
}

/// Row written by the import collaborator.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewProduct {
    pub name: String,
    pub url: Option<String>,
    pub description: Option<String>,
    pub visible: bool,
    pub category: Option<String>,
    pub article: Option<String>,
    pub price: Option<f64>,
    pub old_price: Option<f64>,
    pub stock: Option<i64>,
    pub needs_update: bool,
    pub images: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkButton {
    pub text: String,
    pub url: String,
}

/// Inline keyboard attached to a post, one `Vec` per row.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Keyboard {
    pub rows: Vec<Vec<LinkButton>>,
}
