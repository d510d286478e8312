//! Process-level restart policy for the sync loops.
use anyhow::Result;
use futures::future::BoxFuture;
use std::future::Future;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

/// A named loop that is expected to run until the process stops.
pub type LoopTask = (&'static str, BoxFuture<'static, Result<()>>);

/// Run every loop produced by `spawn_loops` concurrently until `shutdown`
/// resolves. When any loop returns or panics, all of them are stopped, and after
/// `cooldown` a fresh set is started.
pub async fn supervise<F, S>(mut spawn_loops: F, cooldown: Duration, shutdown: S) -> Result<()>
where
    F: FnMut() -> Vec<LoopTask>,
    S: Future<Output = ()>,
{
    tokio::pin!(shutdown);
    loop {
        let mut running = JoinSet::new();
        for (name, task) in spawn_loops() {
            running.spawn(async move { (name, task.await) });
        }
        info!(loops = running.len(), "starting sync loops");

        let exited = tokio::select! {
            _ = &mut shutdown => {
                info!("shutdown requested; stopping loops");
                running.shutdown().await;
                return Ok(());
            }
            exited = running.join_next() => exited,
        };

        match exited {
            Some(Ok((name, Ok(())))) => warn!(task = name, "loop exited unexpectedly"),
            Some(Ok((name, Err(err)))) => error!(task = name, error = ?err, "loop crashed"),
            Some(Err(join_err)) => error!(error = %join_err, "loop panicked"),
            None => warn!("no loops to run"),
        }
        running.shutdown().await;

        info!(cooldown_secs = cooldown.as_secs_f64(), "restarting loops after cooldown");
        tokio::select! {
            _ = &mut shutdown => {
                info!("shutdown requested during cooldown");
                return Ok(());
            }
            _ = tokio::time::sleep(cooldown) => {}
        }
    }
}
