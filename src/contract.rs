//! # contract: the object-store seam
//!
//! The pipeline only ever talks to a bucket through the [`ObjectStore`] trait
//! defined here. Three calls are consumed: a paged `list`, a streaming `get`
//! and a `put` that reports the transport's status code.
//!
//! ## Implementations
//! - [`crate::s3::S3Store`]: AWS S3 (or any S3-compatible endpoint).
//! - [`crate::memory::MemoryStore`]: in-process store for tests and local runs.
//! - `MockObjectStore`: generated by `mockall` (under `test-export-mocks`) for
//!   tests that need to script individual responses.
//!
//! ## Errors
//! Every call returns [`StoreError`]. `NotFound` is the only variant callers
//! are expected to branch on (ledger bootstrap); everything else is a
//! transport failure that aborts the run.

use std::path::PathBuf;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;

#[cfg(any(test, feature = "test-export-mocks"))]
use mockall::automock;

/// Streamed object body, yielded chunk by chunk.
pub type ByteStream = BoxStream<'static, Result<Bytes, StoreError>>;

/// Errors raised by an [`ObjectStore`].
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("object s3://{bucket}/{key} does not exist")]
    NotFound { bucket: String, key: String },

    #[error("object store transport failure: {0}")]
    Transport(String),

    #[error("failed to read upload body {path}: {source}")]
    Body {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// One key returned by a listing page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectEntry {
    pub bucket: String,
    pub key: String,
    pub size: Option<i64>,
}

/// One page of a bucket listing.
#[derive(Debug, Clone, Default)]
pub struct ListPage {
    pub entries: Vec<ObjectEntry>,
    /// Token to pass to the next `list` call while `is_truncated` holds.
    pub next_token: Option<String>,
    pub is_truncated: bool,
}

/// Content handed to [`ObjectStore::put`].
#[derive(Debug, Clone)]
pub enum PutBody {
    /// In-memory payload (the serialized ledger).
    Bytes(Bytes),
    /// A staged local file (an extracted attachment), read by the transport.
    File(PathBuf),
}

/// Result of a successful `put` round trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PutOutcome {
    pub status_code: u16,
}

impl PutOutcome {
    pub fn ok() -> Self {
        Self { status_code: 200 }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }
}

/// Minimal bucket interface consumed by the ingestion pipeline.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// List one page of `bucket`, continuing from `continuation_token` when given.
    async fn list(
        &self,
        bucket: &str,
        continuation_token: Option<String>,
    ) -> Result<ListPage, StoreError>;

    /// Open the object at `key` as a byte stream.
    ///
    /// Returns [`StoreError::NotFound`] when the key does not exist.
    async fn get(&self, bucket: &str, key: &str) -> Result<ByteStream, StoreError>;

    /// Write `body` to `key`, replacing any previous object.
    async fn put(
        &self,
        bucket: &str,
        key: &str,
        body: PutBody,
        content_type: &str,
    ) -> Result<PutOutcome, StoreError>;
}
