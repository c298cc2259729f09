//! Incremental file discovery for the source directory.
//!
//! Listing returns every `.csv` file under the source root, sorted
//! lexicographically for deterministic batch ordering. Internal directories
//! and files (any path segment starting with `_` or `.`) are skipped so
//! checkpoint or staging data colocated with the source never gets ingested.

use object_store::path::Path;

use crate::error::StorageError;
use crate::storage::StorageProvider;

/// File extension for source files.
const CSV_EXTENSION: &str = ".csv";

/// List CSV files under the source root, sorted lexicographically.
pub async fn list_csv_files(
    storage: &StorageProvider,
    prefix: Option<&str>,
) -> Result<Vec<Path>, StorageError> {
    let paths = storage.list(prefix).await?;
    Ok(paths.into_iter().filter(is_source_file).collect())
}

fn is_source_file(path: &Path) -> bool {
    if !path.as_ref().ends_with(CSV_EXTENSION) {
        return false;
    }
    // Skip internal paths like `_schema/` or hidden files
    !path
        .parts()
        .any(|part| part.as_ref().starts_with('_') || part.as_ref().starts_with('.'))
}
