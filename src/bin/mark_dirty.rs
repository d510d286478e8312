use anyhow::{bail, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::{info, warn};

use tg_catalogbot::config;
use tg_catalogbot::db;

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Flag products so the watcher republishes them on its next poll"
)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Product ids to flag
    #[arg(required = true)]
    ids: Vec<i64>,
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

    let touched = db::mark_needs_update(&pool, &args.ids).await?;
    if touched == 0 {
        bail!("none of the given product ids exist");
    }
    if touched < args.ids.len() as u64 {
        warn!(
            requested = args.ids.len(),
            flagged = touched,
            "some product ids were not found"
        );
    }
    info!(flagged = touched, "products marked for republish");
    println!("Marked {} product(s) as needing update.", touched);
    Ok(())
}
