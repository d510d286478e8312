//! Near-real-time loop: retract sold-out posts, then republish flagged products.
use anyhow::Result;
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument};

use crate::db;
use crate::publisher::{PublishOutcome, Publisher, Trigger};
use crate::reconcile;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CycleReport {
    pub retracted: usize,
    pub published: usize,
    pub skipped: usize,
    pub failed: usize,
}

pub struct Watcher {
    publisher: Arc<Publisher>,
    interval: Duration,
    concurrent_limit: usize,
}

impl Watcher {
    pub fn new(publisher: Arc<Publisher>, interval: Duration, concurrent_limit: usize) -> Self {
        Self {
            publisher,
            interval,
            concurrent_limit: concurrent_limit.max(1),
        }
    }

    /// Poll forever. Cycle failures are logged and retried after one interval.
    pub async fn run(self: Arc<Self>) -> Result<()> {
        info!(interval_secs = self.interval.as_secs(), "watcher started");
        loop {
            if let Err(err) = self.run_cycle().await {
                error!(error = ?err, "watcher cycle failed");
            }
            tokio::time::sleep(self.interval).await;
        }
    }

    /// One pass: every retraction is issued before any update starts.
    #[instrument(skip_all)]
    pub async fn run_cycle(&self) -> Result<CycleReport> {
        let snapshot = db::load_catalog_snapshot(self.publisher.pool()).await?;
        let retractions = reconcile::retraction_set(&snapshot);
        let updates = reconcile::update_set(&snapshot);
        let mut report = CycleReport::default();

        for product_id in retractions {
            info!(product_id, "product out of stock; removing posts");
            match self.publisher.retract(product_id).await {
                Ok(_) => report.retracted += 1,
                Err(err) => {
                    error!(product_id, error = ?err, "failed to retract product");
                    report.failed += 1;
                }
            }
        }

        if updates.is_empty() {
            debug!("no updates found");
            return Ok(report);
        }

        // at most `concurrent_limit` publishes in flight, completion order is free
        let publisher = &self.publisher;
        let results: Vec<_> = stream::iter(updates)
            .map(|product_id| async move {
                let result = publisher.publish_for(product_id, Trigger::Flagged).await;
                (product_id, result)
            })
            .buffer_unordered(self.concurrent_limit)
            .collect()
            .await;

        for (product_id, result) in results {
            match result {
                Ok(PublishOutcome::Posted(_)) => report.published += 1,
                Ok(PublishOutcome::NotPublishable | PublishOutcome::NoLongerDue) => {
                    report.skipped += 1
                }
                Err(err) => {
                    error!(product_id, error = %err, "product left flagged for next cycle");
                    report.failed += 1;
                }
            }
        }

        info!(
            retracted = report.retracted,
            published = report.published,
            failed = report.failed,
            "watcher cycle done"
        );
        Ok(report)
    }
}
