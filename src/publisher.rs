//! Rate-limited publishing of one product at a time.
//!
//! Both loops share one [`Publisher`]. Work on a single product is serialised
//! behind a per-product lock, so a retract or publish never interleaves with
//! another one for the same product.
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{error, info, instrument, warn};

use crate::caption::{build_caption, build_keyboard};
use crate::channel::{Channel, ChannelError};
use crate::db::{self, Pool};
use crate::model::{Keyboard, Product};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishSettings {
    /// Attempts per product per cycle when the channel throttles us.
    pub max_retries: u32,
    /// Pause after every successful post.
    pub pacing: Duration,
    pub manager_url: String,
}

/// Where the publisher waits. Tests swap in a recorder.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Why a caller wants the product posted. Checked again once the product lock
/// is held, since the caller's snapshot may be stale by then.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// Post unconditionally.
    Always,
    /// Republish while the "needs republish" flag is still set.
    Flagged,
    /// First post, only while nothing is recorded for the product.
    Unposted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
    Posted(Vec<i32>),
    /// Missing or hidden by the time we got to it.
    NotPublishable,
    /// Someone else already handled it.
    NoLongerDue,
}

/// Why a product was abandoned for the current cycle. Its flag stays set, so
/// the next poll tries again.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("product {product_id} still rate limited after {attempts} attempts")]
    Throttled { product_id: i64, attempts: u32 },
    #[error("channel rejected product {product_id}: {source}")]
    Channel {
        product_id: i64,
        #[source]
        source: ChannelError,
    },
    #[error("catalog store error: {0:#}")]
    Store(#[from] anyhow::Error),
}

pub struct Publisher {
    pool: Pool,
    channel: Arc<dyn Channel>,
    sleeper: Arc<dyn Sleeper>,
    settings: PublishSettings,
    locks: Mutex<HashMap<i64, Arc<Mutex<()>>>>,
}

impl Publisher {
    pub fn new(
        pool: Pool,
        channel: Arc<dyn Channel>,
        sleeper: Arc<dyn Sleeper>,
        settings: PublishSettings,
    ) -> Self {
        Self {
            pool,
            channel,
            sleeper,
            settings,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    async fn lock_product(&self, product_id: i64) -> OwnedMutexGuard<()> {
        let lock = self.locks.lock().await.entry(product_id).or_default().clone();
        lock.lock_owned().await
    }

    /// Replace whatever is posted for the product with a fresh post, then
    /// record the new message ids and clear its "needs republish" flag.
    pub async fn publish(&self, product_id: i64) -> Result<PublishOutcome, PublishError> {
        self.publish_for(product_id, Trigger::Always).await
    }

    /// Like [`Publisher::publish`], but skips the product when `trigger` no
    /// longer holds once its lock is acquired.
    #[instrument(skip(self))]
    pub async fn publish_for(
        &self,
        product_id: i64,
        trigger: Trigger,
    ) -> Result<PublishOutcome, PublishError> {
        let guard = self.lock_product(product_id).await;

        let Some(product) = db::fetch_visible_product(&self.pool, product_id).await? else {
            warn!(product_id, "product missing or hidden; nothing to publish");
            return Ok(PublishOutcome::NotPublishable);
        };

        let due = match trigger {
            Trigger::Always => true,
            Trigger::Flagged => db::is_flagged(&self.pool, product_id).await?,
            Trigger::Unposted => db::posted_messages(&self.pool, product_id)
                .await?
                .is_empty(),
        };
        if !due {
            info!(product_id, ?trigger, "product already handled; skipping");
            return Ok(PublishOutcome::NoLongerDue);
        }

        self.retract_locked(product_id).await?;

        let caption = build_caption(&product);
        let keyboard = build_keyboard(product.url.as_deref(), &self.settings.manager_url);
        let message_ids = self.send_with_retry(&product, &caption, &keyboard).await?;

        if let Err(err) = db::record_publish(&self.pool, product_id, &message_ids).await {
            error!(
                product_id,
                ?message_ids,
                error = ?err,
                "post is live but could not be recorded; delete it by hand"
            );
            return Err(err.into());
        }
        info!(product_id, ?message_ids, "product posted");
        drop(guard);

        self.sleeper.sleep(self.settings.pacing).await;
        Ok(PublishOutcome::Posted(message_ids))
    }

    async fn send_with_retry(
        &self,
        product: &Product,
        caption: &str,
        keyboard: &Keyboard,
    ) -> Result<Vec<i32>, PublishError> {
        let max = self.settings.max_retries.max(1);
        for attempt in 1..=max {
            let sent = match product.images.first() {
                Some(photo) => self.channel.send_photo(photo, caption, keyboard).await,
                None => self.channel.send_text(caption, keyboard).await,
            };
            match sent {
                Ok(message_id) => return Ok(vec![message_id]),
                Err(ChannelError::RetryAfter(wait)) => {
                    if attempt == max {
                        break;
                    }
                    let backoff = wait * attempt;
                    warn!(
                        product_id = product.id,
                        attempt,
                        max,
                        backoff_secs = backoff.as_secs_f64(),
                        "flood control hit; backing off"
                    );
                    self.sleeper.sleep(backoff).await;
                }
                Err(source) => {
                    error!(product_id = product.id, error = %source, "unexpected error sending product");
                    return Err(PublishError::Channel {
                        product_id: product.id,
                        source,
                    });
                }
            }
        }
        error!(product_id = product.id, attempts = max, "giving up on product for this cycle");
        Err(PublishError::Throttled {
            product_id: product.id,
            attempts: max,
        })
    }

    /// Delete every recorded post of the product and forget the records.
    /// Records are cleared even when some deletions fail. Returns how many
    /// records were cleared; zero means there was nothing to do.
    #[instrument(skip(self))]
    pub async fn retract(&self, product_id: i64) -> anyhow::Result<u64> {
        let _guard = self.lock_product(product_id).await;
        self.retract_locked(product_id).await
    }

    async fn retract_locked(&self, product_id: i64) -> anyhow::Result<u64> {
        let posted = db::posted_messages(&self.pool, product_id).await?;
        if posted.is_empty() {
            return Ok(0);
        }

        for record in &posted {
            match self.channel.delete_message(record.message_id).await {
                Ok(()) => info!(product_id, message_id = record.message_id, "deleted message"),
                Err(ChannelError::MessageGone(reason)) => warn!(
                    product_id,
                    message_id = record.message_id,
                    %reason,
                    "message could not be deleted (already removed)"
                ),
                Err(err) => error!(
                    product_id,
                    message_id = record.message_id,
                    error = %err,
                    "failed to delete message; dropping record anyway"
                ),
            }
        }

        let cleared = db::clear_posted_messages(&self.pool, product_id).await?;
        Ok(cleared)
    }
}
