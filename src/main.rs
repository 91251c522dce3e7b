use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use geowx_core::Config;
use geowx_enrich::{EnrichmentPipeline, Scheduler};
use geowx_store::Database;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<()> {
    geowx_core::init()?;

    // Optional explicit config file as the first argument
    let config_path = std::env::args_os().nth(1).map(PathBuf::from);
    let (config, _) = Config::load_validated(config_path.as_deref())?;

    let db = Database::open(&config.database_path).with_context(|| {
        format!("Failed to open database at {}", config.database_path.display())
    })?;
    tracing::info!("Using database {}", config.database_path.display());

    let pipeline = EnrichmentPipeline::from_config(&config, &db)?;
    let scheduler = Scheduler::new(
        Arc::new(pipeline),
        Duration::from_secs(config.scheduler.interval_secs),
    );

    let cancel = CancellationToken::new();
    let scheduler_task = tokio::spawn(scheduler.run(cancel.clone()));

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    tracing::info!("Shutdown requested");

    cancel.cancel();
    scheduler_task.await.context("Scheduler task failed")?;

    tracing::info!("geowx stopped");
    Ok(())
}
