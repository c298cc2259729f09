//! Complete-overwrite snapshot commits to the target table.
//!
//! The table is a directory holding versioned data files under `data/` and
//! a `_latest.json` manifest naming the current one. A commit writes the
//! new data file first and then swaps the manifest atomically, so readers
//! resolve either the old snapshot or the new one, never a mix. Each commit
//! replaces the table's full content, which makes retries idempotent.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use snafu::prelude::*;
use tracing::{debug, info, warn};

use crate::aggregate::AggregateRow;
use crate::error::{ManifestParseSnafu, SinkError, SnapshotEncodeSnafu};
use crate::metrics::emit;
use crate::metrics::events::{CommitRetried, SnapshotCommitted};
use crate::storage::StorageProviderRef;

/// Manifest file naming the table's current snapshot.
pub const MANIFEST_PATH: &str = "_latest.json";

/// Manifest describing one committed table version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableManifest {
    /// Monotonically increasing commit version, starting at 0.
    pub version: i64,
    /// Data file holding this version's rows, relative to the table root.
    pub data_file: String,
    /// Table columns. Grows by union when a commit carries new columns.
    pub columns: Vec<String>,
    /// Number of rows in this version.
    pub row_count: u64,
    /// Commit timestamp.
    pub committed_at: DateTime<Utc>,
}

/// Writer that commits aggregate snapshots to a table directory.
pub struct TableWriter {
    storage: StorageProviderRef,
    stream: String,
    max_retries: usize,
    retry_backoff: Duration,
}

impl TableWriter {
    pub fn new(
        storage: StorageProviderRef,
        stream: String,
        max_retries: usize,
        retry_backoff: Duration,
    ) -> Self {
        Self {
            storage,
            stream,
            // At least one attempt
            max_retries: max_retries.max(1),
            retry_backoff,
        }
    }

    /// Load the current manifest, if the table has ever been committed.
    pub async fn load_manifest(&self) -> Result<Option<TableManifest>, SinkError> {
        match self.storage.get(MANIFEST_PATH).await {
            Ok(bytes) => {
                let manifest = serde_json::from_slice(&bytes).context(ManifestParseSnafu)?;
                Ok(Some(manifest))
            }
            Err(e) if e.is_not_found() => Ok(None),
            Err(source) => Err(SinkError::ManifestRead { source }),
        }
    }

    /// Commit a full snapshot, retrying transient storage failures.
    ///
    /// Returns the new manifest. Retries restart the whole commit; the
    /// overwrite shape makes a repeated commit harmless.
    pub async fn commit(
        &self,
        rows: &[AggregateRow],
        key_column: &str,
        count_column: &str,
    ) -> Result<TableManifest, SinkError> {
        let mut last_error: Option<SinkError> = None;

        for attempt in 1..=self.max_retries {
            match self.try_commit(rows, key_column, count_column).await {
                Ok(manifest) => {
                    emit(SnapshotCommitted {
                        version: manifest.version,
                        rows: manifest.row_count,
                        stream: self.stream.clone(),
                    });
                    info!(
                        target = %self.stream,
                        version = manifest.version,
                        rows = manifest.row_count,
                        "Committed snapshot"
                    );
                    return Ok(manifest);
                }
                Err(e) => {
                    if attempt < self.max_retries {
                        warn!(
                            target = %self.stream,
                            attempt,
                            error = %e,
                            "Snapshot commit failed, retrying"
                        );
                        emit(CommitRetried {
                            attempt,
                            stream: self.stream.clone(),
                        });
                        tokio::time::sleep(self.retry_backoff).await;
                    }
                    last_error = Some(e);
                }
            }
        }

        let message = last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "unknown".to_string());
        Err(SinkError::RetriesExhausted {
            attempts: self.max_retries,
            message,
        })
    }

    async fn try_commit(
        &self,
        rows: &[AggregateRow],
        key_column: &str,
        count_column: &str,
    ) -> Result<TableManifest, SinkError> {
        let previous = self.load_manifest().await?;
        let version = previous.as_ref().map(|m| m.version + 1).unwrap_or(0);

        let columns = merge_columns(
            previous.as_ref().map(|m| m.columns.as_slice()),
            &[key_column.to_string(), count_column.to_string()],
        );

        let data_file = format!("data/part-{version:020}.csv");
        let data = encode_snapshot(rows, &columns, key_column, count_column)?;
        self.storage
            .put(data_file.clone(), data)
            .await
            .map_err(|source| SinkError::TableWrite { source })?;

        let manifest = TableManifest {
            version,
            data_file,
            columns,
            row_count: rows.len() as u64,
            committed_at: Utc::now(),
        };
        let manifest_json = serde_json::to_vec_pretty(&manifest)
            .expect("table manifest should always serialize");
        self.storage
            .atomic_write(MANIFEST_PATH, manifest_json)
            .await
            .map_err(|source| SinkError::TableWrite { source })?;

        // Superseded data files are dead once the manifest points away;
        // deletion is best-effort
        if let Some(previous) = previous {
            if let Err(e) = self.storage.delete(previous.data_file.clone()).await {
                debug!(
                    target = %self.stream,
                    file = %previous.data_file,
                    error = %e,
                    "Failed to delete superseded data file"
                );
            }
        }

        Ok(manifest)
    }
}

/// Union of existing table columns and the columns of this commit.
///
/// Existing order is preserved; new columns append. This is what lets the
/// table tolerate schema additions without failing.
fn merge_columns(existing: Option<&[String]>, incoming: &[String]) -> Vec<String> {
    let mut merged: Vec<String> = existing.map(<[String]>::to_vec).unwrap_or_default();
    for column in incoming {
        if !merged.contains(column) {
            merged.push(column.clone());
        }
    }
    merged
}

fn encode_snapshot(
    rows: &[AggregateRow],
    columns: &[String],
    key_column: &str,
    count_column: &str,
) -> Result<Vec<u8>, SinkError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(columns).context(SnapshotEncodeSnafu)?;

    for row in rows {
        let count = row.count.to_string();
        let record: Vec<&str> = columns
            .iter()
            .map(|column| {
                if column == key_column {
                    row.key.as_str()
                } else if column == count_column {
                    count.as_str()
                } else {
                    // Columns inherited from an earlier table shape
                    ""
                }
            })
            .collect();
        writer.write_record(&record).context(SnapshotEncodeSnafu)?;
    }

    writer.flush().ok();
    Ok(writer
        .into_inner()
        .expect("in-memory CSV writer cannot fail to flush"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::StorageProvider;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn rows(pairs: &[(&str, u64)]) -> Vec<AggregateRow> {
        pairs
            .iter()
            .map(|(key, count)| AggregateRow {
                key: key.to_string(),
                count: *count,
            })
            .collect()
    }

    async fn writer_for(temp_dir: &TempDir) -> TableWriter {
        let storage = Arc::new(StorageProvider::for_path(temp_dir.path()).await.unwrap());
        TableWriter::new(storage, "test".to_string(), 3, Duration::from_millis(1))
    }

    #[tokio::test]
    async fn test_first_commit_creates_version_zero() {
        let temp_dir = TempDir::new().unwrap();
        let writer = writer_for(&temp_dir).await;

        let manifest = writer
            .commit(&rows(&[("CA", 2), ("NY", 1)]), "state", "customer_count")
            .await
            .unwrap();

        assert_eq!(manifest.version, 0);
        assert_eq!(manifest.row_count, 2);
        assert_eq!(manifest.columns, vec!["state", "customer_count"]);
        assert!(temp_dir.path().join(&manifest.data_file).exists());
    }

    #[tokio::test]
    async fn test_commit_overwrites_and_bumps_version() {
        let temp_dir = TempDir::new().unwrap();
        let writer = writer_for(&temp_dir).await;

        let first = writer
            .commit(&rows(&[("CA", 1)]), "state", "customer_count")
            .await
            .unwrap();
        let second = writer
            .commit(&rows(&[("CA", 2), ("NY", 1)]), "state", "customer_count")
            .await
            .unwrap();

        assert_eq!(second.version, first.version + 1);
        // Old data file is gone, new one present
        assert!(!temp_dir.path().join(&first.data_file).exists());
        assert!(temp_dir.path().join(&second.data_file).exists());

        let reloaded = writer.load_manifest().await.unwrap().unwrap();
        assert_eq!(reloaded, second);
    }

    #[tokio::test]
    async fn test_schema_addition_merges_columns() {
        let temp_dir = TempDir::new().unwrap();
        let writer = writer_for(&temp_dir).await;

        writer
            .commit(&rows(&[("CA", 1)]), "state", "customer_count")
            .await
            .unwrap();
        let manifest = writer
            .commit(&rows(&[("CA", 1)]), "state", "distinct_customers")
            .await
            .unwrap();

        assert_eq!(
            manifest.columns,
            vec!["state", "customer_count", "distinct_customers"]
        );
    }

    #[tokio::test]
    async fn test_empty_snapshot_commits() {
        let temp_dir = TempDir::new().unwrap();
        let writer = writer_for(&temp_dir).await;

        let manifest = writer.commit(&[], "state", "customer_count").await.unwrap();
        assert_eq!(manifest.row_count, 0);
    }

    #[tokio::test]
    async fn test_commit_surfaces_retries_exhausted() {
        let temp_dir = TempDir::new().unwrap();
        let storage = Arc::new(StorageProvider::for_path(temp_dir.path()).await.unwrap());
        let writer = TableWriter::new(storage, "test".to_string(), 2, Duration::from_millis(1));

        // A stray file where the data directory belongs fails every write
        std::fs::write(temp_dir.path().join("data"), b"in the way").unwrap();

        let err = writer
            .commit(&rows(&[("CA", 1)]), "state", "customer_count")
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            SinkError::RetriesExhausted { attempts: 2, .. }
        ));
        // No manifest was ever committed
        assert!(writer.load_manifest().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_commit_recovers_from_transient_write_failure() {
        let temp_dir = TempDir::new().unwrap();
        let storage = Arc::new(StorageProvider::for_path(temp_dir.path()).await.unwrap());
        let writer = TableWriter::new(storage, "test".to_string(), 20, Duration::from_millis(25));

        std::fs::write(temp_dir.path().join("data"), b"in the way").unwrap();
        let blocker = temp_dir.path().join("data");
        let unblock = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(60)).await;
            std::fs::remove_file(blocker).unwrap();
        });

        let manifest = writer
            .commit(&rows(&[("CA", 1)]), "state", "customer_count")
            .await
            .unwrap();
        unblock.await.unwrap();

        assert_eq!(manifest.version, 0);
        assert_eq!(manifest.row_count, 1);
        assert!(temp_dir.path().join(&manifest.data_file).exists());
    }

    #[test]
    fn test_merge_columns_is_stable() {
        let existing = vec!["state".to_string(), "customer_count".to_string()];
        let merged = merge_columns(Some(&existing), &existing);
        assert_eq!(merged, existing);
    }
}
