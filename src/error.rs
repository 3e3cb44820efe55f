use std::path::PathBuf;

use crate::codec::CodecError;
use crate::contract::StoreError;

/// Pipeline-level failure. Any of these aborts the current run.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("put of s3://{bucket}/{key} returned status {status_code}")]
    PutRejected {
        bucket: String,
        key: String,
        status_code: u16,
    },

    #[error("ledger s3://{bucket}/{key} is unreadable: {source}")]
    Ledger {
        bucket: String,
        key: String,
        #[source]
        source: CodecError,
    },

    #[error("mapping file {path} is malformed: {source}")]
    Mapping {
        path: PathBuf,
        #[source]
        source: CodecError,
    },

    #[error("expected exactly one *.{extension} mapping file in {dir}, found {found}")]
    MappingFile {
        dir: PathBuf,
        extension: String,
        found: usize,
    },

    #[error("failed to unpack archive {path}: {message}")]
    Archive { path: PathBuf, message: String },

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl IngestError {
    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        IngestError::Io {
            context: context.into(),
            source,
        }
    }
}
