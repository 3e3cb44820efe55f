//! Mapping-file interpretation: one claim per row.

use std::path::Path;

use tracing::debug;

use crate::codec::{self, CodecError, MappedRow, SchemaMapping, TabularRecord};
use crate::error::IngestError;

/// One mapping-file row: a purchase order and the attachments filed under it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimRecord {
    pub purchase_order_number: String,
    /// Comma-separated attachment names, as written in the mapping file.
    pub file_names: String,
}

impl ClaimRecord {
    /// Claims without a purchase order or without attachments are not republished.
    pub fn is_actionable(&self) -> bool {
        !self.purchase_order_number.trim().is_empty() && !self.file_names.trim().is_empty()
    }
}

impl TabularRecord for ClaimRecord {
    fn schema() -> SchemaMapping {
        SchemaMapping::new(&[
            ("PO Number", "purchase_order_number"),
            ("Attachment List", "file_names"),
        ])
    }

    fn from_row(row: &MappedRow<'_>) -> Result<Self, CodecError> {
        Ok(ClaimRecord {
            purchase_order_number: row.get("purchase_order_number")?.to_string(),
            file_names: row.get("file_names")?.to_string(),
        })
    }

    fn to_row(&self) -> Vec<String> {
        vec![self.purchase_order_number.clone(), self.file_names.clone()]
    }
}

/// Parse every claim in `path`, in file order. Any malformed row fails the whole file.
pub async fn parse_claims(path: &Path, delimiter: u8) -> Result<Vec<ClaimRecord>, IngestError> {
    let raw = tokio::fs::read(path)
        .await
        .map_err(|e| IngestError::io(format!("reading {}", path.display()), e))?;
    let claims: Vec<ClaimRecord> =
        codec::read_typed(raw.as_slice(), delimiter).map_err(|source| IngestError::Mapping {
            path: path.to_path_buf(),
            source,
        })?;
    debug!(path = %path.display(), claims = claims.len(), "[MAPPING] Mapping file parsed");
    Ok(claims)
}
