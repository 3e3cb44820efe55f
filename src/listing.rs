//! Discovery of archives that still need processing.

use std::path::Path;

use tracing::{debug, info};

use crate::contract::{ObjectStore, StoreError};
use crate::error::IngestError;
use crate::ledger::Ledger;

/// An archive in the bucket that the ledger does not know about yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveCandidate {
    pub bucket: String,
    pub key: String,
}

/// Matches on the last `/` segment only, so folder markers such as `exports.zip/` never qualify.
fn has_extension(key: &str, extension: &str) -> bool {
    let name = key.rsplit('/').next().unwrap_or_default();
    Path::new(name).extension().and_then(|e| e.to_str()) == Some(extension)
}

/// Walk every page of the bucket listing and keep unprocessed archives, in listing order.
pub async fn list_candidates<S>(
    store: &S,
    bucket: &str,
    ledger: &Ledger,
    archive_extension: &str,
) -> Result<Vec<ArchiveCandidate>, IngestError>
where
    S: ObjectStore + ?Sized,
{
    let mut candidates = Vec::new();
    let mut token: Option<String> = None;
    let mut pages = 0usize;

    loop {
        let page = store.list(bucket, token.take()).await?;
        pages += 1;

        let listed = page.entries.len();
        candidates.extend(
            page.entries
                .into_iter()
                .filter(|entry| has_extension(&entry.key, archive_extension))
                .filter(|entry| !ledger.contains(&entry.key))
                .map(|entry| ArchiveCandidate {
                    bucket: entry.bucket,
                    key: entry.key,
                }),
        );
        debug!(page = pages, listed, candidates = candidates.len(), "[LIST] Listing page scanned");

        if !page.is_truncated {
            break;
        }
        match page.next_token {
            Some(next) => token = Some(next),
            None => {
                return Err(StoreError::Transport(format!(
                    "listing of {bucket} reported more pages without a continuation token"
                ))
                .into())
            }
        }
    }

    info!(bucket, pages, candidates = candidates.len(), "[LIST] Candidate archives discovered");
    Ok(candidates)
}
