//! Processing ledger: which archives have already been ingested.
//!
//! The ledger lives in the bucket as a single comma-delimited object with the
//! columns `ZipFileName`, `ExtractDate` and `ExtractedFileNamesFlattened`. It
//! is read once when a run starts and overwritten in full when it ends.

use std::collections::HashSet;

use bytes::Bytes;
use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use futures::TryStreamExt;
use tracing::{debug, info, warn};

use crate::codec::{self, CodecError, MappedRow, SchemaMapping, TabularRecord};
use crate::contract::{ObjectStore, PutBody, StoreError};
use crate::error::IngestError;

pub const LEDGER_CONTENT_TYPE: &str = "application/csv";

const LEDGER_DELIMITER: u8 = b',';

/// Formats accepted for `ExtractDate` besides RFC 3339, oldest ledgers first.
const LEGACY_DATE_FORMATS: &[&str] = &["%m/%d/%Y %I:%M:%S %p", "%m/%d/%Y %H:%M:%S"];

/// One processed archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerEntry {
    pub archive_key: String,
    pub extracted_at: DateTime<Utc>,
    /// Republished attachment names as accumulated, e.g. `",a.pdf,b.pdf"`.
    pub extracted_file_names: String,
}

impl LedgerEntry {
    pub fn new(archive_key: impl Into<String>, extracted_file_names: impl Into<String>) -> Self {
        Self {
            archive_key: archive_key.into(),
            extracted_at: Utc::now(),
            extracted_file_names: extracted_file_names.into(),
        }
    }

    /// Attachment names without the accumulation artifact.
    pub fn file_names(&self) -> impl Iterator<Item = &str> {
        self.extracted_file_names
            .split(',')
            .filter(|name| !name.is_empty())
    }
}

fn parse_extract_date(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    LEGACY_DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}

impl TabularRecord for LedgerEntry {
    fn schema() -> SchemaMapping {
        SchemaMapping::new(&[
            ("ZipFileName", "archive_key"),
            ("ExtractDate", "extracted_at"),
            ("ExtractedFileNamesFlattened", "extracted_file_names"),
        ])
    }

    fn from_row(row: &MappedRow<'_>) -> Result<Self, CodecError> {
        let raw_date = row.get("extracted_at")?.trim();
        let extracted_at = parse_extract_date(raw_date)
            .ok_or_else(|| row.invalid("extracted_at", format!("unrecognised timestamp {raw_date:?}")))?;
        Ok(LedgerEntry {
            archive_key: row.get("archive_key")?.to_string(),
            extracted_at,
            extracted_file_names: row.get("extracted_file_names")?.to_string(),
        })
    }

    fn to_row(&self) -> Vec<String> {
        vec![
            self.archive_key.clone(),
            self.extracted_at.to_rfc3339_opts(SecondsFormat::Secs, true),
            self.extracted_file_names.clone(),
        ]
    }
}

/// In-memory view of the ledger with an index over archive keys.
#[derive(Debug, Clone, Default)]
pub struct Ledger {
    entries: Vec<LedgerEntry>,
    keys: HashSet<String>,
}

impl Ledger {
    pub fn from_entries(entries: Vec<LedgerEntry>) -> Self {
        let keys = entries.iter().map(|e| e.archive_key.clone()).collect();
        Self { entries, keys }
    }

    pub fn entries(&self) -> &[LedgerEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, archive_key: &str) -> bool {
        self.keys.contains(archive_key)
    }

    /// Append an entry for a newly processed archive.
    ///
    /// Returns `false`, leaving the ledger untouched, if the archive is already recorded.
    pub fn record(&mut self, entry: LedgerEntry) -> bool {
        if !self.keys.insert(entry.archive_key.clone()) {
            warn!(archive = %entry.archive_key, "[LEDGER] Archive already recorded, ignoring duplicate entry");
            return false;
        }
        self.entries.push(entry);
        true
    }

    /// Load the ledger, creating an empty ledger object first if none exists.
    pub async fn load<S>(store: &S, bucket: &str, key: &str) -> Result<Ledger, IngestError>
    where
        S: ObjectStore + ?Sized,
    {
        match fetch(store, bucket, key).await {
            Err(IngestError::Store(StoreError::NotFound { .. })) => {
                info!(bucket, key, "[LEDGER] No ledger object yet, bootstrapping an empty one");
                write_object(store, bucket, key, Bytes::new()).await?;
                fetch(store, bucket, key).await
            }
            other => other,
        }
    }

    /// Load the ledger without writing anything; a missing object reads as empty.
    pub async fn peek<S>(store: &S, bucket: &str, key: &str) -> Result<Ledger, IngestError>
    where
        S: ObjectStore + ?Sized,
    {
        match fetch(store, bucket, key).await {
            Err(IngestError::Store(StoreError::NotFound { .. })) => Ok(Ledger::default()),
            other => other,
        }
    }

    /// Overwrite the ledger object with every entry held in memory.
    pub async fn persist<S>(&self, store: &S, bucket: &str, key: &str) -> Result<(), IngestError>
    where
        S: ObjectStore + ?Sized,
    {
        let mut buf = Vec::new();
        codec::write_typed(&self.entries, &mut buf, LEDGER_DELIMITER).map_err(|source| {
            IngestError::Ledger {
                bucket: bucket.to_string(),
                key: key.to_string(),
                source,
            }
        })?;
        write_object(store, bucket, key, Bytes::from(buf)).await?;
        info!(bucket, key, entries = self.entries.len(), "[LEDGER] Ledger persisted");
        Ok(())
    }
}

async fn fetch<S>(store: &S, bucket: &str, key: &str) -> Result<Ledger, IngestError>
where
    S: ObjectStore + ?Sized,
{
    let stream = store.get(bucket, key).await?;
    let chunks: Vec<Bytes> = stream.try_collect().await?;
    let raw = chunks.concat();
    let entries: Vec<LedgerEntry> =
        codec::read_typed(raw.as_slice(), LEDGER_DELIMITER).map_err(|source| IngestError::Ledger {
            bucket: bucket.to_string(),
            key: key.to_string(),
            source,
        })?;
    debug!(bucket, key, entries = entries.len(), "[LEDGER] Ledger loaded");
    Ok(Ledger::from_entries(entries))
}

async fn write_object<S>(store: &S, bucket: &str, key: &str, body: Bytes) -> Result<(), IngestError>
where
    S: ObjectStore + ?Sized,
{
    let outcome = store
        .put(bucket, key, PutBody::Bytes(body), LEDGER_CONTENT_TYPE)
        .await?;
    if !outcome.is_success() {
        return Err(IngestError::PutRejected {
            bucket: bucket.to_string(),
            key: key.to_string(),
            status_code: outcome.status_code,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::{MockObjectStore, PutOutcome};
    use crate::memory::MemoryStore;
    use chrono::TimeZone;
    use futures::StreamExt;

    const BUCKET: &str = "intake";
    const KEY: &str = "ledger.csv";

    #[tokio::test]
    async fn load_bootstraps_missing_ledger() {
        let store = MemoryStore::new();
        let ledger = Ledger::load(&store, BUCKET, KEY).await.unwrap();
        assert!(ledger.is_empty());
        assert_eq!(store.object(BUCKET, KEY), Some(Bytes::new()));
    }

    #[tokio::test]
    async fn peek_does_not_bootstrap() {
        let store = MemoryStore::new();
        let ledger = Ledger::peek(&store, BUCKET, KEY).await.unwrap();
        assert!(ledger.is_empty());
        assert_eq!(store.object(BUCKET, KEY), None);
    }

    #[tokio::test]
    async fn load_reads_rfc3339_and_legacy_dates() {
        let store = MemoryStore::new();
        store.insert(
            BUCKET,
            KEY,
            "ZipFileName,ExtractDate,ExtractedFileNamesFlattened\n\
             a.zip,2026-10-01T08:00:00Z,\",x.pdf\"\n\
             b.zip,3/7/2024 2:15:00 PM,\n",
        );

        let ledger = Ledger::load(&store, BUCKET, KEY).await.unwrap();

        assert_eq!(ledger.len(), 2);
        assert!(ledger.contains("a.zip"));
        assert!(ledger.contains("b.zip"));
        assert!(!ledger.contains("c.zip"));
        let b = &ledger.entries()[1];
        assert_eq!(b.extracted_at, Utc.with_ymd_and_hms(2024, 3, 7, 14, 15, 0).unwrap());
        assert_eq!(ledger.entries()[0].file_names().collect::<Vec<_>>(), vec!["x.pdf"]);
    }

    #[tokio::test]
    async fn unreadable_timestamp_is_fatal() {
        let store = MemoryStore::new();
        store.insert(
            BUCKET,
            KEY,
            "ZipFileName,ExtractDate,ExtractedFileNamesFlattened\na.zip,yesterday,\n",
        );
        let err = Ledger::load(&store, BUCKET, KEY).await.unwrap_err();
        assert!(matches!(err, IngestError::Ledger { .. }), "got {err:?}");
    }

    #[tokio::test]
    async fn persist_overwrites_with_all_entries() {
        let store = MemoryStore::new();
        store.insert(BUCKET, KEY, "");
        let mut ledger = Ledger::load(&store, BUCKET, KEY).await.unwrap();
        let mut entry = LedgerEntry::new("batch1.zip", ",inv1.pdf,inv2.pdf");
        entry.extracted_at = Utc.with_ymd_and_hms(2026, 10, 19, 9, 30, 0).unwrap();
        assert!(ledger.record(entry.clone()));
        assert!(!ledger.record(entry));

        ledger.persist(&store, BUCKET, KEY).await.unwrap();

        let written = store.object(BUCKET, KEY).unwrap();
        assert_eq!(
            std::str::from_utf8(&written).unwrap(),
            "ZipFileName,ExtractDate,ExtractedFileNamesFlattened\n\
             batch1.zip,2026-10-19T09:30:00Z,\",inv1.pdf,inv2.pdf\"\n"
        );
        let reloaded = Ledger::load(&store, BUCKET, KEY).await.unwrap();
        assert_eq!(reloaded.entries(), ledger.entries());
    }

    #[tokio::test]
    async fn persist_rejects_non_success_status() {
        let mut store = MockObjectStore::new();
        store
            .expect_put()
            .times(1)
            .returning(|_, _, _, _| Ok(PutOutcome { status_code: 503 }));

        let ledger = Ledger::from_entries(vec![LedgerEntry::new("a.zip", "")]);
        let err = ledger.persist(&store, BUCKET, KEY).await.unwrap_err();
        assert!(
            matches!(err, IngestError::PutRejected { status_code: 503, .. }),
            "got {err:?}"
        );
    }

    #[tokio::test]
    async fn bootstrap_put_failure_is_fatal() {
        let mut store = MockObjectStore::new();
        store.expect_get().times(1).returning(|bucket, key| {
            Err(StoreError::NotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            })
        });
        store
            .expect_put()
            .times(1)
            .returning(|_, _, _, _| Ok(PutOutcome { status_code: 500 }));

        let err = Ledger::load(&store, BUCKET, KEY).await.unwrap_err();
        assert!(matches!(err, IngestError::PutRejected { .. }), "got {err:?}");
    }

    #[tokio::test]
    async fn bootstrap_retries_load_only_once() {
        let mut store = MockObjectStore::new();
        store.expect_get().times(2).returning(|bucket, key| {
            Err(StoreError::NotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            })
        });
        store.expect_put().times(1).returning(|_, _, _, _| Ok(PutOutcome::ok()));

        let err = Ledger::load(&store, BUCKET, KEY).await.unwrap_err();
        assert!(matches!(err, IngestError::Store(StoreError::NotFound { .. })));
    }

    #[tokio::test]
    async fn other_fetch_failures_propagate_without_bootstrap() {
        let mut store = MockObjectStore::new();
        store
            .expect_get()
            .times(1)
            .returning(|_, _| Err(StoreError::Transport("access denied".into())));
        store.expect_put().never();

        let err = Ledger::load(&store, BUCKET, KEY).await.unwrap_err();
        assert!(matches!(err, IngestError::Store(StoreError::Transport(_))));
    }

    #[tokio::test]
    async fn chunked_body_is_reassembled() {
        let mut store = MockObjectStore::new();
        store.expect_get().returning(|_, _| {
            let chunks: Vec<Result<Bytes, StoreError>> = vec![
                Ok(Bytes::from_static(b"ZipFileName,ExtractDate,Extracted")),
                Ok(Bytes::from_static(b"FileNamesFlattened\nz.zip,2026-01-01T00:00:00Z,\n")),
            ];
            Ok(futures::stream::iter(chunks).boxed())
        });

        let ledger = Ledger::load(&store, BUCKET, KEY).await.unwrap();
        assert!(ledger.contains("z.zip"));
    }
}
