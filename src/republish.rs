//! Republication of claim attachments under `{prefix}/{po number}/{file name}`.

use std::path::Path;

use tracing::{debug, info};

use crate::config::AttachmentConfig;
use crate::contract::{ObjectStore, PutBody};
use crate::error::IngestError;
use crate::mapping::ClaimRecord;

/// What republishing one claim produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClaimOutcome {
    /// `,{name}` for every uploaded attachment, in mapping order.
    pub ledger_suffix: String,
    pub uploaded: Vec<String>,
    /// Referenced attachments absent from the archive.
    pub missing: Vec<String>,
}

/// Reduce a mapping-file entry to the bare file name; either separator style may appear.
pub fn attachment_file_name(entry: &str) -> &str {
    entry
        .trim()
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
}

/// Upload every attachment of `claim` found in `extracted_dir`.
///
/// Missing files are skipped. A non-actionable claim uploads nothing.
pub async fn republish<S>(
    store: &S,
    bucket: &str,
    extracted_dir: &Path,
    claim: &ClaimRecord,
    attachments: &AttachmentConfig,
) -> Result<ClaimOutcome, IngestError>
where
    S: ObjectStore + ?Sized,
{
    let mut outcome = ClaimOutcome::default();
    if !claim.is_actionable() {
        debug!(po = %claim.purchase_order_number, "[REPUBLISH] Claim lacks a PO number or attachments, skipping");
        return Ok(outcome);
    }
    let po = claim.purchase_order_number.trim();

    for file_name in claim
        .file_names
        .split(',')
        .map(attachment_file_name)
        .filter(|name| !name.is_empty())
    {
        let local_path = extracted_dir.join(file_name);
        let present = tokio::fs::metadata(&local_path)
            .await
            .map(|m| m.is_file())
            .unwrap_or(false);
        if !present {
            debug!(po, file = file_name, "[REPUBLISH] Attachment not in archive, skipping");
            outcome.missing.push(file_name.to_string());
            continue;
        }

        let key = format!("{}/{}/{}", attachments.prefix, po, file_name);
        let put = store
            .put(bucket, &key, PutBody::File(local_path), &attachments.content_type)
            .await?;
        if !put.is_success() {
            return Err(IngestError::PutRejected {
                bucket: bucket.to_string(),
                key,
                status_code: put.status_code,
            });
        }
        info!(po, file = file_name, key = %key, "[REPUBLISH] Attachment republished");

        outcome.ledger_suffix.push(',');
        outcome.ledger_suffix.push_str(file_name);
        outcome.uploaded.push(file_name.to_string());
    }

    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::{MockObjectStore, PutOutcome, StoreError};
    use crate::memory::MemoryStore;
    use tempfile::{tempdir, TempDir};

    fn claim(po: &str, files: &str) -> ClaimRecord {
        ClaimRecord {
            purchase_order_number: po.into(),
            file_names: files.into(),
        }
    }

    fn extracted(files: &[&str]) -> TempDir {
        let dir = tempdir().unwrap();
        for name in files {
            std::fs::write(dir.path().join(name), format!("%PDF {name}")).unwrap();
        }
        dir
    }

    #[test]
    fn file_names_lose_any_path_prefix() {
        assert_eq!(attachment_file_name("inv1.pdf"), "inv1.pdf");
        assert_eq!(attachment_file_name("scans/2024/inv1.pdf"), "inv1.pdf");
        assert_eq!(attachment_file_name(r"C:\scans\inv1.pdf"), "inv1.pdf");
        assert_eq!(attachment_file_name(" inv2.pdf "), "inv2.pdf");
        assert_eq!(attachment_file_name("dir/"), "");
    }

    #[tokio::test]
    async fn uploads_present_files_and_skips_missing_ones() {
        let dir = extracted(&["a.pdf", "c.pdf"]);
        let store = MemoryStore::new();

        let outcome = republish(
            &store,
            "bkt",
            dir.path(),
            &claim("1001", "a.pdf,b.pdf,c.pdf"),
            &AttachmentConfig::default(),
        )
        .await
        .unwrap();

        assert_eq!(outcome.ledger_suffix, ",a.pdf,c.pdf");
        assert_eq!(outcome.uploaded, vec!["a.pdf", "c.pdf"]);
        assert_eq!(outcome.missing, vec!["b.pdf"]);
        assert_eq!(store.keys("bkt"), vec!["by-po/1001/a.pdf", "by-po/1001/c.pdf"]);
        assert!(store.puts().iter().all(|p| p.content_type == "application/pdf"));
        assert_eq!(
            store.object("bkt", "by-po/1001/c.pdf").unwrap().as_ref(),
            b"%PDF c.pdf"
        );
    }

    #[tokio::test]
    async fn suffix_accumulates_with_leading_delimiter() {
        let dir = extracted(&["a.pdf", "b.pdf"]);
        let store = MemoryStore::new();

        let outcome = republish(
            &store,
            "bkt",
            dir.path(),
            &claim("7", "nested/a.pdf, b.pdf,"),
            &AttachmentConfig::default(),
        )
        .await
        .unwrap();

        assert_eq!(outcome.ledger_suffix, ",a.pdf,b.pdf");
        assert_eq!(store.keys("bkt"), vec!["by-po/7/a.pdf", "by-po/7/b.pdf"]);
    }

    #[tokio::test]
    async fn claims_without_po_or_files_upload_nothing() {
        let dir = extracted(&["a.pdf"]);
        let mut store = MockObjectStore::new();
        store.expect_put().never();

        for c in [claim("", "a.pdf"), claim("1001", ""), claim("  ", " ")] {
            let outcome = republish(&store, "bkt", dir.path(), &c, &AttachmentConfig::default())
                .await
                .unwrap();
            assert_eq!(outcome, ClaimOutcome::default());
        }
    }

    #[tokio::test]
    async fn every_file_missing_yields_empty_suffix() {
        let dir = extracted(&[]);
        let store = MemoryStore::new();
        let outcome = republish(&store, "bkt", dir.path(), &claim("9", "x.pdf,y.pdf"), &AttachmentConfig::default())
            .await
            .unwrap();
        assert_eq!(outcome.ledger_suffix, "");
        assert!(store.puts().is_empty());
    }

    #[tokio::test]
    async fn non_success_status_is_fatal() {
        let dir = extracted(&["a.pdf"]);
        let mut store = MockObjectStore::new();
        store
            .expect_put()
            .withf(|bucket, key, _, content_type| {
                bucket.to_string() == "bkt"
                    && key.to_string() == "by-po/1/a.pdf"
                    && content_type.to_string() == "application/pdf"
            })
            .times(1)
            .returning(|_, _, _, _| Ok(PutOutcome { status_code: 403 }));

        let err = republish(&store, "bkt", dir.path(), &claim("1", "a.pdf"), &AttachmentConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::PutRejected { status_code: 403, .. }));
    }

    #[tokio::test]
    async fn transport_failure_propagates() {
        let dir = extracted(&["a.pdf", "b.pdf"]);
        let mut store = MockObjectStore::new();
        store
            .expect_put()
            .times(1)
            .returning(|_, _, _, _| Err(StoreError::Transport("connection reset".into())));

        let err = republish(&store, "bkt", dir.path(), &claim("1", "a.pdf,b.pdf"), &AttachmentConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::Store(StoreError::Transport(_))));
    }
}
