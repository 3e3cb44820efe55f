///
/// This module implements the CLI interface for po-ingest: command parsing,
/// the async `run` entrypoint shared by `main()` and integration tests, and
/// user-visible output.
///
/// All pipeline logic lives in the library modules; this is glue only.
///
/// ## Commands
/// - `sync`: ingest new archives, republish attachments, update the ledger.
/// - `pending`: list archives the next `sync` would process, read-only.
///
/// Staging is cleaned after every `sync`, whether it succeeded or not.
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::SynchroniseConfig;
use crate::contract::ObjectStore;
use crate::load_config::load_config;
use crate::s3::S3Store;
use crate::staging::Staging;
use crate::synchronise::{pending, synchronise, SynchroniseReport};

/// CLI for po-ingest: republish purchase-order attachments from archive drops.
#[derive(Parser)]
#[clap(
    name = "po-ingest",
    version,
    about = "Ingest purchase-order archives from a bucket and republish their attachments by PO number"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Process every archive not yet in the ledger
    Sync {
        /// Path to the YAML config file
        #[clap(long)]
        config: PathBuf,
    },
    /// List archives waiting to be processed without changing anything
    Pending {
        /// Path to the YAML config file
        #[clap(long)]
        config: PathBuf,
    },
}

/// Extracted async CLI logic entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<()> {
    // Emit a top-level 'trace_initialised' event at the very start
    tracing::info!("trace_initialised");

    match cli.command {
        Commands::Sync { config } => {
            let config = load_config(config)?;
            tracing::info!(command = "sync", "Starting ingestion");
            let store = S3Store::connect(&config.store).await;
            let report = sync_then_clean(&config.pipeline, &store).await?;
            tracing::info!(command = "sync", ?report, "Ingestion complete");
            println!(
                "{}",
                serde_json::to_string_pretty(&report).context("Serialising report failed")?
            );
            Ok(())
        }
        Commands::Pending { config } => {
            let config = load_config(config)?;
            let store = S3Store::connect(&config.store).await;
            let candidates = pending(&config.pipeline, &store)
                .await
                .context("Listing pending archives failed")?;
            tracing::info!(command = "pending", count = candidates.len(), "Pending archives listed");
            for candidate in &candidates {
                println!("{}", candidate.key);
            }
            Ok(())
        }
    }
}

/// Run one ingestion and empty the staging root afterwards, whatever the outcome.
pub async fn sync_then_clean<S>(pipeline: &SynchroniseConfig, store: &S) -> Result<SynchroniseReport>
where
    S: ObjectStore + ?Sized,
{
    pipeline.validate().context("Refusing to sync")?;
    let result = synchronise(pipeline, store).await.context("Ingestion failed");

    let staging = Staging::new(&pipeline.staging_dir);
    if let Err(e) = staging.clean().await {
        tracing::warn!(error = ?e, root = %staging.root().display(), "Failed to clean staging directory");
    }
    result
}
