#![warn(missing_docs)]

//! Entry point for the snapshot copier.

use anyhow::Result;
use clap::Parser;
use rds_snapcopy::aws::AwsRdsClient;
use rds_snapcopy::cli::Cli;
use rds_snapcopy::{LoopDriver, RdsApi};
use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = cli.into_config();

    let default_level = config
        .as_ref()
        .map(|c| c.log_level.clone())
        .unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .init();

    let config = match config {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "Invalid configuration");
            return Err(e.into());
        }
    };

    tracing::info!(
        source_region = %config.source_region,
        target_region = %config.target_region,
        tag = %config.tag,
        max_copy_in_flight = config.max_copy_in_flight,
        max_snapshots = config.max_snapshots,
        run_every_mins = config.run_every_mins,
        encrypted = config.encrypted(),
        dry_run = config.dry_run,
        "Snapshot copier starting"
    );

    if config.run_every_mins == 0 {
        tracing::warn!("Run interval is 0, iterations will run back to back");
    }

    let source: Arc<dyn RdsApi> = Arc::new(AwsRdsClient::connect(&config.source_region).await?);
    let target: Arc<dyn RdsApi> = Arc::new(AwsRdsClient::connect(&config.target_region).await?);

    let mut driver = LoopDriver::new(config, source, target);
    if let Err(e) = driver.run_forever().await {
        tracing::error!(error = %e, "Snapshot copier stopped");
        return Err(e.into());
    }

    Ok(())
}
