use serde::{Deserialize, Serialize};
use std::path::{Component, PathBuf};
use tracing::{debug, info};

use crate::error::IngestError;

/// What to do when an archive holds more than one mapping file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MappingFilePolicy {
    /// Exactly one mapping file is required; anything else fails the run.
    #[default]
    Single,
    /// Take the first mapping file by file name.
    First,
}

/// When the ledger object is rewritten.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerCommit {
    /// Once, after every candidate has been processed.
    #[default]
    EndOfRun,
    /// After each processed archive.
    PerArchive,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MappingConfig {
    pub extension: String,
    /// Field delimiter of the mapping file. Never `,`: attachment lists use commas internally.
    pub delimiter: char,
    pub policy: MappingFilePolicy,
}

impl Default for MappingConfig {
    fn default() -> Self {
        Self {
            extension: "csv".to_string(),
            delimiter: '~',
            policy: MappingFilePolicy::Single,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AttachmentConfig {
    /// Republished attachments land under `{prefix}/{po number}/{file name}`.
    pub prefix: String,
    pub content_type: String,
}

impl Default for AttachmentConfig {
    fn default() -> Self {
        Self {
            prefix: "by-po".to_string(),
            content_type: "application/pdf".to_string(),
        }
    }
}

fn default_ledger_key() -> String {
    "StatPurchaseOrderProcessingMetadata.csv".to_string()
}

fn default_staging_dir() -> PathBuf {
    PathBuf::from("TempFileProcessing")
}

fn default_archive_extension() -> String {
    "zip".to_string()
}

/// Everything one ingestion run needs, passed explicitly to [`crate::synchronise::synchronise`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SynchroniseConfig {
    pub bucket: String,
    #[serde(default = "default_ledger_key")]
    pub ledger_key: String,
    #[serde(default = "default_staging_dir")]
    pub staging_dir: PathBuf,
    #[serde(default = "default_archive_extension")]
    pub archive_extension: String,
    #[serde(default)]
    pub mapping: MappingConfig,
    #[serde(default)]
    pub attachments: AttachmentConfig,
    #[serde(default)]
    pub ledger_commit: LedgerCommit,
}

impl SynchroniseConfig {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            ledger_key: default_ledger_key(),
            staging_dir: default_staging_dir(),
            archive_extension: default_archive_extension(),
            mapping: MappingConfig::default(),
            attachments: AttachmentConfig::default(),
            ledger_commit: LedgerCommit::default(),
        }
    }

    pub fn validate(&self) -> Result<(), IngestError> {
        if self.bucket.trim().is_empty() {
            return Err(IngestError::Config("bucket must not be empty".into()));
        }
        if self.ledger_key.trim().is_empty() {
            return Err(IngestError::Config("ledger_key must not be empty".into()));
        }
        if self.archive_extension.is_empty() || self.mapping.extension.is_empty() {
            return Err(IngestError::Config("file extensions must not be empty".into()));
        }
        // Staging is wiped after every sync, so it must name a dedicated directory.
        if !matches!(self.staging_dir.components().next_back(), Some(Component::Normal(_))) {
            return Err(IngestError::Config(format!(
                "staging_dir {:?} must name a dedicated directory, not the current, parent or root directory",
                self.staging_dir
            )));
        }
        self.mapping_delimiter()?;
        Ok(())
    }

    /// The mapping delimiter as the single byte the codec expects.
    pub fn mapping_delimiter(&self) -> Result<u8, IngestError> {
        let delimiter = self.mapping.delimiter;
        if delimiter == ',' {
            return Err(IngestError::Config(
                "mapping.delimiter cannot be ',' because attachment lists are comma separated"
                    .into(),
            ));
        }
        u8::try_from(delimiter)
            .ok()
            .filter(u8::is_ascii)
            .ok_or_else(|| {
                IngestError::Config(format!("mapping.delimiter {delimiter:?} is not an ASCII character"))
            })
    }

    pub fn trace_loaded(&self) {
        info!(
            bucket = %self.bucket,
            ledger_key = %self.ledger_key,
            staging_dir = %self.staging_dir.display(),
            ledger_commit = ?self.ledger_commit,
            "Loaded SynchroniseConfig"
        );
        debug!(?self, "SynchroniseConfig loaded (full debug)");
    }
}
