//! In-memory [`ObjectStore`] for tests and local dry runs.
//!
//! Keys are kept sorted, so listings come back in lexicographic order like S3.
//! Listing is paged (`with_page_size`) and puts under a prefix can be made to
//! fail, which lets tests drive pagination and abort paths deterministically.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;

use crate::contract::{ByteStream, ListPage, ObjectEntry, ObjectStore, PutBody, PutOutcome, StoreError};

const DEFAULT_PAGE_SIZE: usize = 1000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutRecord {
    pub bucket: String,
    pub key: String,
    pub content_type: String,
}

#[derive(Debug, Default)]
struct Inner {
    objects: BTreeMap<(String, String), Bytes>,
    failing_prefixes: Vec<String>,
    puts: Vec<PutRecord>,
    list_calls: usize,
}

/// Shared, cloneable in-memory bucket set.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    inner: Arc<RwLock<Inner>>,
    page_size: usize,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self {
            inner: Arc::default(),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

fn poisoned() -> StoreError {
    StoreError::Transport("memory store lock poisoned".into())
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return at most `page_size` keys per `list` call.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn insert(&self, bucket: &str, key: &str, data: impl Into<Bytes>) {
        if let Ok(mut inner) = self.inner.write() {
            inner
                .objects
                .insert((bucket.to_string(), key.to_string()), data.into());
        }
    }

    pub fn object(&self, bucket: &str, key: &str) -> Option<Bytes> {
        let inner = self.inner.read().ok()?;
        inner
            .objects
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
    }

    pub fn keys(&self, bucket: &str) -> Vec<String> {
        match self.inner.read() {
            Ok(inner) => inner
                .objects
                .keys()
                .filter(|(b, _)| b == bucket)
                .map(|(_, k)| k.clone())
                .collect(),
            Err(_) => Vec::new(),
        }
    }

    /// Every successful `put`, in call order.
    pub fn puts(&self) -> Vec<PutRecord> {
        self.inner.read().map(|i| i.puts.clone()).unwrap_or_default()
    }

    pub fn list_calls(&self) -> usize {
        self.inner.read().map(|i| i.list_calls).unwrap_or_default()
    }

    /// Make every subsequent `put` whose key starts with `prefix` fail with a transport error.
    pub fn fail_puts_under(&self, prefix: &str) {
        if let Ok(mut inner) = self.inner.write() {
            inner.failing_prefixes.push(prefix.to_string());
        }
    }

    pub fn clear_failures(&self) {
        if let Ok(mut inner) = self.inner.write() {
            inner.failing_prefixes.clear();
        }
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn list(
        &self,
        bucket: &str,
        continuation_token: Option<String>,
    ) -> Result<ListPage, StoreError> {
        let mut inner = self.inner.write().map_err(|_| poisoned())?;
        inner.list_calls += 1;

        let mut remaining = inner
            .objects
            .iter()
            .filter(|((b, k), _)| {
                b == bucket && continuation_token.as_deref().map_or(true, |t| k.as_str() > t)
            })
            .map(|((b, k), data)| ObjectEntry {
                bucket: b.clone(),
                key: k.clone(),
                size: Some(data.len() as i64),
            });

        let entries: Vec<ObjectEntry> = remaining.by_ref().take(self.page_size).collect();
        let is_truncated = remaining.next().is_some();
        let next_token = if is_truncated {
            entries.last().map(|e| e.key.clone())
        } else {
            None
        };

        Ok(ListPage {
            entries,
            next_token,
            is_truncated,
        })
    }

    async fn get(&self, bucket: &str, key: &str) -> Result<ByteStream, StoreError> {
        let data = self
            .object(bucket, key)
            .ok_or_else(|| StoreError::NotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            })?;
        Ok(futures::stream::once(async move { Ok::<_, StoreError>(data) }).boxed())
    }

    async fn put(
        &self,
        bucket: &str,
        key: &str,
        body: PutBody,
        content_type: &str,
    ) -> Result<PutOutcome, StoreError> {
        let data = match body {
            PutBody::Bytes(bytes) => bytes,
            PutBody::File(path) => tokio::fs::read(&path)
                .await
                .map(Bytes::from)
                .map_err(|source| StoreError::Body { path, source })?,
        };

        let mut inner = self.inner.write().map_err(|_| poisoned())?;
        if inner.failing_prefixes.iter().any(|p| key.starts_with(p.as_str())) {
            return Err(StoreError::Transport(format!(
                "injected failure for s3://{bucket}/{key}"
            )));
        }
        inner
            .objects
            .insert((bucket.to_string(), key.to_string()), data);
        inner.puts.push(PutRecord {
            bucket: bucket.to_string(),
            key: key.to_string(),
            content_type: content_type.to_string(),
        });
        Ok(PutOutcome::ok())
    }
}
