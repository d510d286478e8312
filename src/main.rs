use anyhow::Result;
use clap::Parser;
use futures::FutureExt;
use std::path::PathBuf;
use std::sync::Arc;
use teloxide::Bot;
use tracing::{info, warn};

use tg_catalogbot::autopost::Autoposter;
use tg_catalogbot::channel::TelegramChannel;
use tg_catalogbot::config;
use tg_catalogbot::db;
use tg_catalogbot::publisher::{Publisher, TokioSleeper};
use tg_catalogbot::supervisor::{self, LoopTask};
use tg_catalogbot::watcher::Watcher;

#[derive(Debug, Parser)]
#[command(author, version, about = "Keep a Telegram channel in sync with the product catalog")]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let cfg = config::load(Some(&args.config))?;
    cfg.ensure_dirs()?;

    let database_url = cfg.database_url();
    let pool = db::init_pool(&database_url).await?;
    db::run_migrations(&pool).await?;

    let bot = Bot::new(cfg.telegram.bot_token.clone());
    let channel = Arc::new(TelegramChannel::new(bot, &cfg.telegram.channel_id));
    let publisher = Arc::new(Publisher::new(
        pool,
        channel,
        Arc::new(TokioSleeper),
        cfg.publish_settings(),
    ));

    let sync = cfg.sync.clone();
    let spawn_loops = move || -> Vec<LoopTask> {
        let watcher = Arc::new(Watcher::new(
            publisher.clone(),
            sync.check_interval(),
            sync.concurrent_limit,
        ));
        let autoposter = Arc::new(Autoposter::new(
            publisher.clone(),
            sync.autopost_interval(),
            sync.autopost_batch_size,
            sync.min_stock_to_post,
        ));
        vec![
            ("watcher", watcher.run().boxed()),
            ("autopost", autoposter.run().boxed()),
        ]
    };

    let shutdown = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(?err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    info!(database_url = %database_url, channel = %cfg.telegram.channel_id, "starting catalog sync");
    supervisor::supervise(spawn_loops, cfg.sync.restart_cooldown(), shutdown).await?;
    info!("bot stopped");
    Ok(())
}
