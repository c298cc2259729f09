//! Schema inference and persistence.
//!
//! The schema is inferred once from the header row of the first available
//! source file and then pinned: it is persisted into the source checkpoint
//! partition and reused on every subsequent run until an explicit cleanup.
//! Columns are all read as text unless explicitly cast downstream; every
//! inferred schema carries an implicit rescued-data column for values that
//! do not fit the pinned shape.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::InferenceError;
use crate::source::listing::list_csv_files;
use crate::storage::StorageProvider;

/// Column capturing data that did not conform to the pinned schema.
pub const RESCUED_COLUMN: &str = "_rescued_data";

/// Location of the persisted schema within the checkpoint store.
pub const SCHEMA_PATH: &str = "source/schema.json";

fn default_schema_format_version() -> u32 {
    1
}

/// A pinned, ordered CSV schema.
///
/// All columns are text; the final column is always [`RESCUED_COLUMN`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    /// Serialization format version for forward compatibility.
    #[serde(default = "default_schema_format_version")]
    pub format_version: u32,
    /// Ordered column names, rescued column included.
    pub columns: Vec<String>,
}

impl Schema {
    /// Build a schema from declared column names, appending the rescued column.
    pub fn from_columns(columns: impl IntoIterator<Item = String>) -> Self {
        let mut columns: Vec<String> = columns.into_iter().collect();
        if !columns.iter().any(|c| c == RESCUED_COLUMN) {
            columns.push(RESCUED_COLUMN.to_string());
        }
        Self {
            format_version: default_schema_format_version(),
            columns,
        }
    }

    /// Columns that carry source data (everything except the rescued column).
    pub fn data_columns(&self) -> impl Iterator<Item = &str> {
        self.columns
            .iter()
            .map(String::as_str)
            .filter(|c| *c != RESCUED_COLUMN)
    }

    /// Number of data columns expected per row.
    pub fn data_column_count(&self) -> usize {
        self.data_columns().count()
    }

    /// Whether the schema contains the given column.
    pub fn contains(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }

    /// Load the persisted schema from the checkpoint store, if present.
    pub async fn load(
        storage: &StorageProvider,
    ) -> Result<Option<Self>, crate::error::StorageError> {
        match storage.get(SCHEMA_PATH).await {
            Ok(bytes) => match serde_json::from_slice::<Schema>(&bytes) {
                Ok(schema) => Ok(Some(schema)),
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to parse persisted schema, re-inferring");
                    Ok(None)
                }
            },
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Persist the schema into the checkpoint store.
    pub async fn persist(
        &self,
        storage: &StorageProvider,
    ) -> Result<(), crate::error::StorageError> {
        let json =
            serde_json::to_vec_pretty(self).expect("schema should always serialize to JSON");
        storage.atomic_write(SCHEMA_PATH, json).await
    }
}

/// Infer a schema from the header row of the first available source file.
pub async fn infer_schema_from_source(
    source: &StorageProvider,
    stream: &str,
) -> Result<Schema, InferenceError> {
    let files = list_csv_files(source, None)
        .await
        .map_err(|source| InferenceError::ReadSample { source })?;

    let path = files.first().ok_or(InferenceError::NoFilesFound)?;
    debug!(target = %stream, "Inferring schema from {path}");

    let bytes = source
        .get(path.clone())
        .await
        .map_err(|source| InferenceError::ReadSample { source })?;

    let schema = infer_schema_from_bytes(&bytes, path.as_ref())?;
    info!(
        target = %stream,
        columns = schema.columns.len(),
        "Inferred schema from {path}: {:?}",
        schema.data_columns().collect::<Vec<_>>()
    );
    Ok(schema)
}

/// Infer a schema from raw CSV bytes.
pub fn infer_schema_from_bytes(bytes: &[u8], path: &str) -> Result<Schema, InferenceError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(bytes);

    let headers = reader
        .headers()
        .map_err(|e| InferenceError::HeaderParse {
            path: path.to_string(),
            message: e.to_string(),
        })?
        .clone();

    if headers.is_empty() || headers.iter().all(str::is_empty) {
        return Err(InferenceError::EmptyHeader {
            path: path.to_string(),
        });
    }

    Ok(Schema::from_columns(
        headers.iter().map(|h| h.trim().to_string()),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_infer_from_bytes_appends_rescued_column() {
        let schema =
            infer_schema_from_bytes(b"customer_id,customer_name,state\n1,Alice,CA\n", "a.csv")
                .unwrap();

        assert_eq!(
            schema.columns,
            vec!["customer_id", "customer_name", "state", RESCUED_COLUMN]
        );
        assert_eq!(schema.data_column_count(), 3);
    }

    #[test]
    fn test_infer_empty_file_is_an_error() {
        let result = infer_schema_from_bytes(b"", "empty.csv");
        assert!(matches!(result, Err(InferenceError::EmptyHeader { .. })));
    }

    #[tokio::test]
    async fn test_infer_from_source_no_files() {
        let temp_dir = TempDir::new().unwrap();
        let source = StorageProvider::for_path(temp_dir.path()).await.unwrap();

        let result = infer_schema_from_source(&source, "test").await;
        assert!(matches!(result, Err(InferenceError::NoFilesFound)));
    }

    #[tokio::test]
    async fn test_persist_and_load_roundtrip() {
        let temp_dir = TempDir::new().unwrap();
        let store = StorageProvider::for_path(temp_dir.path()).await.unwrap();

        let schema = Schema::from_columns(vec!["state".to_string(), "city".to_string()]);
        schema.persist(&store).await.unwrap();

        let loaded = Schema::load(&store).await.unwrap();
        assert_eq!(loaded, Some(schema));
    }

    #[tokio::test]
    async fn test_load_missing_schema_is_none() {
        let temp_dir = TempDir::new().unwrap();
        let store = StorageProvider::for_path(temp_dir.path()).await.unwrap();

        assert!(Schema::load(&store).await.unwrap().is_none());
    }
}
