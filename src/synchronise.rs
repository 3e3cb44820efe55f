//! High-level pipeline: reconcile the bucket against the ledger and ingest new archives.
//!
//! One run walks through:
//!   - loading the ledger (bootstrapping an empty one on first use)
//!   - listing archives the ledger does not know about
//!   - for each, in listing order: download, unpack, parse the mapping file,
//!     republish every claim's attachments, record a ledger entry, release staging
//!   - persisting the ledger once at the end (or after every archive, see [`LedgerCommit`])
//!
//! # Error Handling
//! Fail-fast: the first error aborts the run and nothing further is written,
//! so the persisted ledger keeps its state from the previous run. Archives
//! processed before the failure are picked up again next time.
//!
//! # Navigation
//! - Main entrypoint: [`synchronise`]
//! - Read-only variant: [`pending`]
//! - Output: [`SynchroniseReport`]

use serde::Serialize;
use tracing::{error, info, warn, Instrument};
use uuid::Uuid;

use crate::config::{LedgerCommit, SynchroniseConfig};
use crate::contract::ObjectStore;
use crate::error::IngestError;
use crate::extract;
use crate::ledger::{Ledger, LedgerEntry};
use crate::listing::{self, ArchiveCandidate};
use crate::mapping;
use crate::republish;
use crate::staging::Staging;

#[derive(Debug, Clone, Default, Serialize)]
pub struct SynchroniseReport {
    pub run_id: String,
    pub candidates: usize,
    pub archives: Vec<ArchiveReport>,
    pub ledger_persisted: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ArchiveReport {
    pub archive_key: String,
    pub claims: usize,
    pub claims_skipped: usize,
    pub uploaded: Vec<String>,
    pub missing: Vec<String>,
}

/// Run the ingestion pipeline once against `store`.
pub async fn synchronise<S>(
    config: &SynchroniseConfig,
    store: &S,
) -> Result<SynchroniseReport, IngestError>
where
    S: ObjectStore + ?Sized,
{
    config.validate()?;
    let run_id = Uuid::new_v4().to_string();
    let span = tracing::info_span!("synchronise", run_id = %run_id, bucket = %config.bucket);

    async move {
        info!("[SYNC] Starting ingestion run");
        let result = run(config, store, run_id).await;
        match &result {
            Ok(report) => info!(
                archives = report.archives.len(),
                ledger_persisted = report.ledger_persisted,
                "[SYNC] Ingestion run complete"
            ),
            Err(e) => error!(error = %e, "[SYNC][ERROR] Ingestion run aborted"),
        }
        result
    }
    .instrument(span)
    .await
}

async fn run<S>(
    config: &SynchroniseConfig,
    store: &S,
    run_id: String,
) -> Result<SynchroniseReport, IngestError>
where
    S: ObjectStore + ?Sized,
{
    let staging = Staging::prepare(&config.staging_dir).await.map_err(|e| {
        IngestError::io(format!("preparing staging dir {}", config.staging_dir.display()), e)
    })?;

    let mut ledger = Ledger::load(store, &config.bucket, &config.ledger_key).await?;
    info!(entries = ledger.len(), "[SYNC] Ledger loaded");

    let candidates =
        listing::list_candidates(store, &config.bucket, &ledger, &config.archive_extension).await?;

    let mut report = SynchroniseReport {
        run_id,
        candidates: candidates.len(),
        ..Default::default()
    };
    if candidates.is_empty() {
        info!("[SYNC] No new archives, ledger left untouched");
        return Ok(report);
    }

    for candidate in &candidates {
        info!(archive = %candidate.key, "[SYNC] Processing archive");
        let processed = process_archive(config, store, &staging, candidate).await;
        if let Err(e) = staging.release(&candidate.key).await {
            warn!(archive = %candidate.key, error = ?e, "[SYNC] Failed to release archive staging");
        }
        let (entry, archive_report) = processed?;

        ledger.record(entry);
        report.archives.push(archive_report);

        if config.ledger_commit == LedgerCommit::PerArchive {
            ledger.persist(store, &config.bucket, &config.ledger_key).await?;
            report.ledger_persisted = true;
        }
    }

    if config.ledger_commit == LedgerCommit::EndOfRun {
        ledger.persist(store, &config.bucket, &config.ledger_key).await?;
        report.ledger_persisted = true;
    }
    Ok(report)
}

async fn process_archive<S>(
    config: &SynchroniseConfig,
    store: &S,
    staging: &Staging,
    candidate: &ArchiveCandidate,
) -> Result<(LedgerEntry, ArchiveReport), IngestError>
where
    S: ObjectStore + ?Sized,
{
    let extraction = extract::extract(store, candidate, staging, &config.mapping).await?;
    let claims = mapping::parse_claims(&extraction.mapping_file, config.mapping_delimiter()?).await?;

    let mut archive_report = ArchiveReport {
        archive_key: candidate.key.clone(),
        claims: claims.len(),
        ..Default::default()
    };
    let mut flattened = String::new();

    for claim in &claims {
        if !claim.is_actionable() {
            archive_report.claims_skipped += 1;
            continue;
        }
        let outcome = republish::republish(
            store,
            &config.bucket,
            &extraction.extracted_dir,
            claim,
            &config.attachments,
        )
        .await?;
        flattened.push_str(&outcome.ledger_suffix);
        archive_report.uploaded.extend(outcome.uploaded);
        archive_report.missing.extend(outcome.missing);
    }

    info!(
        archive = %candidate.key,
        claims = archive_report.claims,
        skipped = archive_report.claims_skipped,
        uploaded = archive_report.uploaded.len(),
        missing = archive_report.missing.len(),
        "[SYNC] Archive processed"
    );
    Ok((LedgerEntry::new(candidate.key.clone(), flattened), archive_report))
}

/// List the archives the next [`synchronise`] would process, without writing anything.
pub async fn pending<S>(
    config: &SynchroniseConfig,
    store: &S,
) -> Result<Vec<ArchiveCandidate>, IngestError>
where
    S: ObjectStore + ?Sized,
{
    config.validate()?;
    let ledger = Ledger::peek(store, &config.bucket, &config.ledger_key).await?;
    listing::list_candidates(store, &config.bucket, &ledger, &config.archive_extension).await
}
