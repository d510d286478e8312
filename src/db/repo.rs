use super::model::{CatalogRow, PostedMessageRow, ProductRow};
use crate::model::{CatalogEntry, NewProduct, PostedMessage, Product};
use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::{Row, SqlitePool};
use tracing::instrument;

pub type Pool = SqlitePool;

pub async fn init_pool(database_url: &str) -> Result<Pool> {
    let normalized = prepare_sqlite_url(database_url);
    let pool = SqlitePool::connect(&normalized)
        .await
        .with_context(|| format!("failed to open catalog database {}", normalized))?;
    // Enable WAL and stricter durability.
    sqlx::query("PRAGMA journal_mode=WAL;")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA synchronous=FULL;")
        .execute(&pool)
        .await?;
    Ok(pool)
}

/// If using a file-backed SQLite URL, expand a leading `~/` and ensure the parent
/// directory exists. Leaves in-memory URLs untouched. Returns possibly-updated URL.
fn prepare_sqlite_url(url: &str) -> String {
    if !url.starts_with("sqlite:") || url.starts_with("sqlite::memory") {
        return url.to_string();
    }

    let rest = &url["sqlite:".len()..];
    let path_with_query = rest.strip_prefix("//").unwrap_or(rest);
    let (path_part, query_part) = match path_with_query.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (path_with_query, None),
    };
    if path_part.is_empty() {
        return url.to_string();
    }

    let expanded_path = match (path_part.strip_prefix("~/"), std::env::var("HOME")) {
        (Some(rest), Ok(home)) => format!("{}/{}", home.trim_end_matches('/'), rest),
        _ => path_part.to_string(),
    };

    if let Some(parent) = std::path::Path::new(&expanded_path).parent() {
        if !parent.as_os_str().is_empty() {
            let _ = std::fs::create_dir_all(parent);
        }
    }

    // The database file is created on first start; the import pipeline may not
    // have run yet.
    let mut rebuilt = format!("sqlite://{}", expanded_path);
    match query_part {
        Some(q) if q.contains("mode=") => {
            rebuilt.push('?');
            rebuilt.push_str(q);
        }
        Some(q) => {
            rebuilt.push('?');
            rebuilt.push_str(q);
            rebuilt.push_str("&mode=rwc");
        }
        None => rebuilt.push_str("?mode=rwc"),
    }
    rebuilt
}

pub async fn run_migrations(pool: &Pool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Reconciliation view of the whole catalog, read with a single statement so
/// that every loop iteration decides on one consistent state.
#[instrument(skip_all)]
pub async fn load_catalog_snapshot(pool: &Pool) -> Result<Vec<CatalogEntry>> {
    let rows: Vec<CatalogRow> = sqlx::query_as(
        "SELECT p.id, p.name, p.category, \
                COALESCE(p.visible, 0) AS visible, \
                p.stock, \
                COALESCE(p.needs_update, 0) AS needs_update, \
                COUNT(pm.message_id) AS posted_messages \
         FROM products p \
         LEFT JOIN product_messages pm ON pm.product_id = p.id \
         GROUP BY p.id \
         ORDER BY p.id ASC",
    )
    .fetch_all(pool)
    .await
    .context("failed to read catalog snapshot")?;
    Ok(rows.into_iter().map(CatalogEntry::from).collect())
}

/// Product with its image URLs, or `None` when it is missing or hidden.
#[instrument(skip(pool))]
pub async fn fetch_visible_product(pool: &Pool, product_id: i64) -> Result<Option<Product>> {
    let row: Option<ProductRow> = sqlx::query_as(
        "SELECT id, name, url, description FROM products WHERE id = ? AND visible = 1",
    )
    .bind(product_id)
    .fetch_optional(pool)
    .await?;
    let Some(row) = row else {
        return Ok(None);
    };

    let images: Vec<String> = sqlx::query_scalar(
        "SELECT image_url FROM product_images WHERE product_id = ? ORDER BY id ASC",
    )
    .bind(product_id)
    .fetch_all(pool)
    .await?;

    Ok(Some(Product {
        id: row.id,
        name: row.name.unwrap_or_default(),
        url: row.url.filter(|u| !u.trim().is_empty()),
        description: row.description,
        images: images
            .into_iter()
            .map(|u| u.trim().to_string())
            .filter(|u| !u.is_empty())
            .collect(),
    }))
}

#[instrument(skip(pool))]
pub async fn posted_messages(pool: &Pool, product_id: i64) -> Result<Vec<PostedMessage>> {
    let rows: Vec<PostedMessageRow> = sqlx::query_as(
        "SELECT product_id, message_id, posted_at FROM product_messages WHERE product_id = ? ORDER BY message_id ASC",
    )
    .bind(product_id)
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(PostedMessage::from).collect())
}

pub async fn all_posted_messages(pool: &Pool) -> Result<Vec<PostedMessage>> {
    let rows: Vec<PostedMessageRow> = sqlx::query_as(
        "SELECT product_id, message_id, posted_at FROM product_messages ORDER BY product_id ASC, message_id ASC",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(PostedMessage::from).collect())
}

/// Whether the product still carries its "needs republish" flag.
pub async fn is_flagged(pool: &Pool, product_id: i64) -> Result<bool> {
    let flagged: Option<bool> = sqlx::query_scalar("SELECT needs_update FROM products WHERE id = ?")
        .bind(product_id)
        .fetch_optional(pool)
        .await?;
    Ok(flagged.unwrap_or(false))
}

/// Remove every posted-message record of a product. Returns the number of
/// records removed.
#[instrument(skip(pool))]
pub async fn clear_posted_messages(pool: &Pool, product_id: i64) -> Result<u64> {
    let mut tx = pool.begin().await?;
    let res = sqlx::query("DELETE FROM product_messages WHERE product_id = ?")
        .bind(product_id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;
    Ok(res.rows_affected())
}

/// Store freshly sent message ids and clear the "needs republish" flag.
#[instrument(skip(pool))]
pub async fn record_publish(pool: &Pool, product_id: i64, message_ids: &[i32]) -> Result<()> {
    let mut tx = pool.begin().await?;
    let now = Utc::now();
    for message_id in message_ids {
        sqlx::query(
            "INSERT INTO product_messages (product_id, message_id, posted_at) VALUES (?, ?, ?)",
        )
        .bind(product_id)
        .bind(*message_id)
        .bind(now)
        .execute(&mut *tx)
        .await?;
    }
    sqlx::query("UPDATE products SET needs_update = 0 WHERE id = ?")
        .bind(product_id)
        .execute(&mut *tx)
        .await?;
    tx.commit()
        .await
        .context("failed to persist posted message ids")?;
    Ok(())
}

/// Flag products for republishing. Returns how many rows matched.
#[instrument(skip_all)]
pub async fn mark_needs_update(pool: &Pool, product_ids: &[i64]) -> Result<u64> {
    let mut tx = pool.begin().await?;
    let mut touched = 0_u64;
    for id in product_ids {
        let res = sqlx::query("UPDATE products SET needs_update = 1 WHERE id = ?")
            .bind(*id)
            .execute(&mut *tx)
            .await?;
        touched += res.rows_affected();
    }
    tx.commit().await?;
    Ok(touched)
}

/// Forget every post and every pending republish so autopost starts over.
#[instrument(skip_all)]
pub async fn reset_publication_history(pool: &Pool) -> Result<u64> {
    let mut tx = pool.begin().await?;
    let res = sqlx::query("DELETE FROM product_messages")
        .execute(&mut *tx)
        .await?;
    sqlx::query("UPDATE products SET needs_update = 0")
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;
    Ok(res.rows_affected())
}

#[instrument(skip_all)]
pub async fn insert_product(pool: &Pool, product: &NewProduct) -> Result<i64> {
    let mut tx = pool.begin().await?;
    let id: i64 = sqlx::query(
        "INSERT INTO products (name, url, description, visible, category, article, price, old_price, stock, needs_update) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?) RETURNING id",
    )
    .bind(&product.name)
    .bind(&product.url)
    .bind(&product.description)
    .bind(product.visible)
    .bind(&product.category)
    .bind(&product.article)
    .bind(product.price)
    .bind(product.old_price)
    .bind(product.stock)
    .bind(product.needs_update)
    .fetch_one(&mut *tx)
    .await?
    .get("id");

    for url in &product.images {
        sqlx::query("INSERT INTO product_images (product_id, image_url) VALUES (?, ?)")
            .bind(id)
            .bind(url)
            .execute(&mut *tx)
            .await?;
    }
    tx.commit().await?;
    Ok(id)
}

pub async fn update_stock(pool: &Pool, product_id: i64, stock: Option<i64>) -> Result<()> {
    sqlx::query("UPDATE products SET stock = ? WHERE id = ?")
        .bind(stock)
        .bind(product_id)
        .execute(pool)
        .await
        .context("failed to update stock")?;
    Ok(())
}
