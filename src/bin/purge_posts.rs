use anyhow::Result;
use clap::Parser;
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;
use teloxide::Bot;
use tracing::{info, warn};

use tg_catalogbot::channel::{Channel, TelegramChannel};
use tg_catalogbot::config;
use tg_catalogbot::db;

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Delete every recorded channel post and reset publication history"
)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Pause between deletions, in milliseconds
    #[arg(long, default_value = "50")]
    pause_ms: u64,

    /// Print the summary as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Default, Serialize)]
struct PurgeReport {
    found: usize,
    deleted: usize,
    failed: usize,
    records_cleared: u64,
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

    let pool = db::init_pool(&cfg.database_url()).await?;
    db::run_migrations(&pool).await?;

    let channel = TelegramChannel::new(
        Bot::new(cfg.telegram.bot_token.clone()),
        &cfg.telegram.channel_id,
    );

    let posted = db::all_posted_messages(&pool).await?;
    let mut report = PurgeReport {
        found: posted.len(),
        ..Default::default()
    };
    info!(found = report.found, "purging channel posts");

    let pause = Duration::from_millis(args.pause_ms);
    for record in &posted {
        match channel.delete_message(record.message_id).await {
            Ok(()) => report.deleted += 1,
            Err(err) => {
                report.failed += 1;
                warn!(
                    product_id = record.product_id,
                    message_id = record.message_id,
                    error = %err,
                    "could not delete message"
                );
            }
        }
        tokio::time::sleep(pause).await;
    }

    // autopost starts over; nothing is republished through the flag path
    report.records_cleared = db::reset_publication_history(&pool).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!(
            "Deleted: {}, failed: {}. Publication history cleared ({} records).",
            report.deleted, report.failed, report.records_cleared
        );
    }
    Ok(())
}
