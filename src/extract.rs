//! Download, unpack and mapping-file discovery for a single archive.

use std::path::{Path, PathBuf};

use futures::TryStreamExt;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::config::{MappingConfig, MappingFilePolicy};
use crate::contract::ObjectStore;
use crate::error::IngestError;
use crate::listing::ArchiveCandidate;
use crate::staging::{self, Staging};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionResult {
    pub mapping_file: PathBuf,
    pub extracted_dir: PathBuf,
}

/// Fetch `candidate` into staging, unpack it and locate its mapping file.
pub async fn extract<S>(
    store: &S,
    candidate: &ArchiveCandidate,
    staging: &Staging,
    mapping: &MappingConfig,
) -> Result<ExtractionResult, IngestError>
where
    S: ObjectStore + ?Sized,
{
    let archive_path = staging.archive_path(&candidate.key);
    let bytes = download(store, candidate, &archive_path).await?;
    info!(archive = %candidate.key, bytes, path = %archive_path.display(), "[EXTRACT] Archive downloaded");

    let extracted_dir = staging.extract_dir(&candidate.key);
    unpack_zip(&archive_path, &extracted_dir).await?;
    debug!(archive = %candidate.key, dir = %extracted_dir.display(), "[EXTRACT] Archive unpacked");

    let mapping_file = locate_mapping_file(&extracted_dir, &mapping.extension, mapping.policy).await?;
    info!(archive = %candidate.key, mapping_file = %mapping_file.display(), "[EXTRACT] Mapping file located");

    Ok(ExtractionResult {
        mapping_file,
        extracted_dir,
    })
}

/// Stream the archive body into `destination`, returning the byte count.
async fn download<S>(
    store: &S,
    candidate: &ArchiveCandidate,
    destination: &Path,
) -> Result<u64, IngestError>
where
    S: ObjectStore + ?Sized,
{
    let mut body = store.get(&candidate.bucket, &candidate.key).await?;
    let context = || format!("writing {}", destination.display());

    let mut file = tokio::fs::File::create(destination)
        .await
        .map_err(|e| IngestError::io(context(), e))?;
    let mut written = 0u64;
    while let Some(chunk) = body.try_next().await? {
        file.write_all(&chunk)
            .await
            .map_err(|e| IngestError::io(context(), e))?;
        written += chunk.len() as u64;
    }
    file.flush().await.map_err(|e| IngestError::io(context(), e))?;
    Ok(written)
}

/// Unpack the zip archive at `archive` into `destination`, replacing leftovers from earlier runs.
pub async fn unpack_zip(archive: &Path, destination: &Path) -> Result<(), IngestError> {
    staging::remove_dir_if_present(destination)
        .await
        .map_err(|e| IngestError::io(format!("clearing {}", destination.display()), e))?;

    let archive_owned = archive.to_path_buf();
    let destination_owned = destination.to_path_buf();
    let unpacked = tokio::task::spawn_blocking(move || -> Result<(), zip::result::ZipError> {
        let file = std::fs::File::open(&archive_owned)?;
        let mut zip = zip::ZipArchive::new(file)?;
        zip.extract(&destination_owned)
    })
    .await;

    match unpacked {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(IngestError::Archive {
            path: archive.to_path_buf(),
            message: e.to_string(),
        }),
        Err(e) => Err(IngestError::Archive {
            path: archive.to_path_buf(),
            message: format!("unpack task failed: {e}"),
        }),
    }
}

/// Find the mapping file among the top-level files of `dir`.
pub async fn locate_mapping_file(
    dir: &Path,
    extension: &str,
    policy: MappingFilePolicy,
) -> Result<PathBuf, IngestError> {
    let context = || format!("scanning {}", dir.display());
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .map_err(|e| IngestError::io(context(), e))?;

    let mut matches = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| IngestError::io(context(), e))?
    {
        let path = entry.path();
        let is_file = entry
            .file_type()
            .await
            .map_err(|e| IngestError::io(context(), e))?
            .is_file();
        if is_file && path.extension().and_then(|e| e.to_str()) == Some(extension) {
            matches.push(path);
        }
    }
    matches.sort();

    let found = matches.len();
    let ambiguous = found > 1 && policy == MappingFilePolicy::Single;
    if found == 0 || ambiguous {
        return Err(IngestError::MappingFile {
            dir: dir.to_path_buf(),
            extension: extension.to_string(),
            found,
        });
    }
    if found > 1 {
        tracing::warn!(dir = %dir.display(), found, "[EXTRACT] Several mapping files, using the first by name");
    }
    Ok(matches.swap_remove(0))
}
