//! Slow loop: first-time posts of never-posted products, by priority.
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, instrument};

use crate::db;
use crate::publisher::{PublishOutcome, Publisher, Trigger};
use crate::reconcile;

pub struct Autoposter {
    publisher: Arc<Publisher>,
    interval: Duration,
    batch_size: usize,
    min_stock: i64,
}

impl Autoposter {
    pub fn new(
        publisher: Arc<Publisher>,
        interval: Duration,
        batch_size: usize,
        min_stock: i64,
    ) -> Self {
        Self {
            publisher,
            interval,
            batch_size,
            min_stock,
        }
    }

    pub async fn run(self: Arc<Self>) -> Result<()> {
        info!(
            interval_secs = self.interval.as_secs(),
            batch_size = self.batch_size,
            "autopost started"
        );
        loop {
            if let Err(err) = self.run_cycle().await {
                error!(error = ?err, "autopost cycle failed");
            }
            tokio::time::sleep(self.interval).await;
        }
    }

    /// Publish the next batch strictly one after another. Returns the ids that
    /// were posted.
    #[instrument(skip_all)]
    pub async fn run_cycle(&self) -> Result<Vec<i64>> {
        let snapshot = db::load_catalog_snapshot(self.publisher.pool()).await?;
        let candidates = reconcile::autopost_candidates(&snapshot, self.min_stock, self.batch_size);
        if candidates.is_empty() {
            info!("autopost: nothing to post");
            return Ok(Vec::new());
        }

        info!(count = candidates.len(), "autopost: posting products");
        let mut posted = Vec::with_capacity(candidates.len());
        for product_id in candidates {
            match self.publisher.publish_for(product_id, Trigger::Unposted).await {
                Ok(PublishOutcome::Posted(_)) => posted.push(product_id),
                Ok(PublishOutcome::NotPublishable | PublishOutcome::NoLongerDue) => {}
                Err(err) => error!(product_id, error = %err, "autopost failed for product"),
            }
        }
        Ok(posted)
    }
}
