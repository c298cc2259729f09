//! Reading the target table back.
//!
//! Resolves the manifest, then loads the data file it names. Used by the
//! integration tests and by anything downstream that wants the latest
//! committed aggregate without touching pipeline internals.

use std::collections::BTreeMap;

use snafu::prelude::*;

use crate::error::{SinkError, StorageError};
use crate::storage::{StorageProvider, StorageProviderRef};

use super::writer::{TableManifest, MANIFEST_PATH};

/// One fully resolved table version.
#[derive(Debug, Clone)]
pub struct TableSnapshot {
    /// The manifest this snapshot was resolved from.
    pub manifest: TableManifest,
    /// Rows as column-name → value maps, in data-file order.
    pub rows: Vec<BTreeMap<String, String>>,
}

impl TableSnapshot {
    /// Interpret the snapshot as a `(key → count)` mapping.
    ///
    /// Rows whose count fails to parse are skipped.
    pub fn counts(&self, key_column: &str, count_column: &str) -> BTreeMap<String, u64> {
        self.rows
            .iter()
            .filter_map(|row| {
                let key = row.get(key_column)?;
                let count = row.get(count_column)?.parse().ok()?;
                Some((key.clone(), count))
            })
            .collect()
    }
}

/// Read handle on a target table directory.
pub struct TargetTable {
    storage: StorageProviderRef,
}

impl TargetTable {
    /// Open a table rooted at the given directory.
    pub async fn open(path: &str) -> Result<Self, StorageError> {
        let storage = StorageProvider::for_path(path).await?;
        Ok(Self {
            storage: std::sync::Arc::new(storage),
        })
    }

    /// Load the current snapshot; `None` if the table has never been committed.
    pub async fn snapshot(&self) -> Result<Option<TableSnapshot>, SinkError> {
        let manifest_bytes = match self.storage.get(MANIFEST_PATH).await {
            Ok(bytes) => bytes,
            Err(e) if e.is_not_found() => return Ok(None),
            Err(source) => return Err(SinkError::ManifestRead { source }),
        };
        let manifest: TableManifest = serde_json::from_slice(&manifest_bytes)
            .context(crate::error::ManifestParseSnafu)?;

        let data = self
            .storage
            .get(manifest.data_file.clone())
            .await
            .map_err(|source| SinkError::ManifestRead { source })?;

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_reader(&data[..]);
        let headers: Vec<String> = reader
            .headers()
            .context(crate::error::SnapshotEncodeSnafu)?
            .iter()
            .map(str::to_string)
            .collect();

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record.context(crate::error::SnapshotEncodeSnafu)?;
            let row: BTreeMap<String, String> = headers
                .iter()
                .zip(record.iter())
                .map(|(h, v)| (h.clone(), v.to_string()))
                .collect();
            rows.push(row);
        }

        Ok(Some(TableSnapshot { manifest, rows }))
    }
}
