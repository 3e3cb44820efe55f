//! Local staging area for downloaded and unpacked archives.
//!
//! Layout under the staging root, per archive key `incoming/batch1.zip`:
//! - `batch1.zip`: the downloaded archive
//! - `batch1/`: its unpacked contents

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct Staging {
    root: PathBuf,
}

fn archive_file_name(archive_key: &str) -> &str {
    archive_key.rsplit('/').next().unwrap_or(archive_key)
}

impl Staging {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Create the staging root if needed.
    pub async fn prepare(root: impl Into<PathBuf>) -> std::io::Result<Self> {
        let staging = Self::new(root);
        tokio::fs::create_dir_all(&staging.root).await?;
        Ok(staging)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Where the archive stored at `archive_key` is downloaded to.
    pub fn archive_path(&self, archive_key: &str) -> PathBuf {
        self.root.join(archive_file_name(archive_key))
    }

    /// Where the archive stored at `archive_key` is unpacked to (extension stripped).
    pub fn extract_dir(&self, archive_key: &str) -> PathBuf {
        let name = archive_file_name(archive_key);
        let stem = Path::new(name)
            .file_stem()
            .map(|s| s.to_os_string())
            .unwrap_or_else(|| name.into());
        self.root.join(stem)
    }

    /// Remove the downloaded archive and its unpacked directory.
    pub async fn release(&self, archive_key: &str) -> std::io::Result<()> {
        remove_file_if_present(&self.archive_path(archive_key)).await?;
        remove_dir_if_present(&self.extract_dir(archive_key)).await?;
        debug!(archive = %archive_key, "[STAGING] Released archive staging");
        Ok(())
    }

    /// Delete every file and directory under the root, keeping the root itself.
    ///
    /// A missing root is already clean.
    pub async fn clean(&self) -> std::io::Result<()> {
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e),
        };
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let result = if entry.file_type().await?.is_dir() {
                remove_dir_if_present(&path).await
            } else {
                remove_file_if_present(&path).await
            };
            if let Err(e) = result {
                warn!(error = ?e, path = %path.display(), "[STAGING] Failed to remove staged path");
                return Err(e);
            }
        }
        debug!(root = %self.root.display(), "[STAGING] Staging root cleaned");
        Ok(())
    }
}

async fn remove_file_if_present(path: &Path) -> std::io::Result<()> {
    match tokio::fs::remove_file(path).await {
        Err(e) if e.kind() != ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

/// Remove a directory tree; an absent one counts as removed.
pub(crate) async fn remove_dir_if_present(path: &Path) -> std::io::Result<()> {
    match tokio::fs::remove_dir_all(path).await {
        Err(e) if e.kind() != ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}
