//! Error types for the tally loader.

use snafu::prelude::*;

/// Errors that can occur during storage operations.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum StorageError {
    /// Object store operation failed.
    #[snafu(display("Storage operation failed: {source}"))]
    ObjectStore { source: object_store::Error },

    /// IO error during storage operations.
    #[snafu(display("IO error: {source}"))]
    Io { source: std::io::Error },

    /// The configured path could not be used as a storage root.
    #[snafu(display("Invalid storage root {path}: {source}"))]
    InvalidRoot {
        path: String,
        source: object_store::Error,
    },
}

impl StorageError {
    /// Check if this error represents a "not found" condition.
    pub fn is_not_found(&self) -> bool {
        match self {
            StorageError::ObjectStore { source } => {
                matches!(source, object_store::Error::NotFound { .. })
            }
            StorageError::Io { source } => source.kind() == std::io::ErrorKind::NotFound,
            _ => false,
        }
    }
}

/// Errors that can occur during configuration parsing and validation.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[snafu(display("Failed to read configuration file: {source}"))]
    ReadFile { source: std::io::Error },

    /// Failed to parse YAML configuration.
    #[snafu(display("Failed to parse YAML configuration: {source}"))]
    YamlParse { source: serde_yaml::Error },

    /// Environment variable interpolation failed.
    #[snafu(display("Environment variable interpolation failed:\n{message}"))]
    EnvInterpolation { message: String },

    /// Source path is empty.
    #[snafu(display("Source path cannot be empty"))]
    EmptySourcePath,

    /// Checkpoint path is empty.
    #[snafu(display("Checkpoint path cannot be empty"))]
    EmptyCheckpointPath,

    /// Table URI is empty.
    #[snafu(display("Table URI cannot be empty"))]
    EmptyTableUri,

    /// Aggregate key column is empty.
    #[snafu(display("Aggregate key column cannot be empty"))]
    EmptyKeyColumn,
}

/// Errors that can occur during schema inference from CSV files.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum InferenceError {
    /// No files found for schema inference.
    #[snafu(display("No files found for schema inference"))]
    NoFilesFound,

    /// Failed to read file for inference.
    #[snafu(display("Failed to read file for inference: {source}"))]
    ReadSample { source: StorageError },

    /// Failed to parse the CSV header row.
    #[snafu(display("Failed to parse CSV header in {path}: {message}"))]
    HeaderParse { path: String, message: String },

    /// The sampled file had no header row.
    #[snafu(display("No header row found in {path}"))]
    EmptyHeader { path: String },
}

/// Errors that can occur while committing aggregate snapshots to the table.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum SinkError {
    /// Failed to write to table storage.
    #[snafu(display("Failed to write to table storage: {source}"))]
    TableWrite { source: StorageError },

    /// Failed to read the table manifest.
    #[snafu(display("Failed to read table manifest: {source}"))]
    ManifestRead { source: StorageError },

    /// Failed to parse the table manifest.
    #[snafu(display("Failed to parse table manifest: {source}"))]
    ManifestParse { source: serde_json::Error },

    /// Failed to encode the snapshot data file.
    #[snafu(display("Failed to encode snapshot data: {source}"))]
    SnapshotEncode { source: csv::Error },

    /// All commit attempts failed.
    #[snafu(display("Snapshot commit failed after {attempts} attempt(s): {message}"))]
    RetriesExhausted { attempts: usize, message: String },
}

/// Top-level pipeline errors.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum PipelineError {
    /// Configuration error.
    #[snafu(display("Configuration error: {source}"))]
    Config { source: ConfigError },

    /// Storage error.
    #[snafu(display("Storage error: {source}"))]
    Storage { source: StorageError },

    /// Schema inference error.
    #[snafu(display("Schema inference error: {source}"))]
    Inference { source: InferenceError },

    /// Sink error.
    #[snafu(display("Sink error: {source}"))]
    Sink { source: SinkError },

    /// The configured aggregate key column is not part of the schema.
    #[snafu(display("Key column '{column}' is not present in the ingested schema"))]
    MissingKeyColumn { column: String },

    /// Task join error.
    #[snafu(display("Task join error: {source}"))]
    TaskJoin { source: tokio::task::JoinError },
}

impl From<StorageError> for PipelineError {
    fn from(source: StorageError) -> Self {
        PipelineError::Storage { source }
    }
}

impl From<ConfigError> for PipelineError {
    fn from(source: ConfigError) -> Self {
        PipelineError::Config { source }
    }
}

impl From<InferenceError> for PipelineError {
    fn from(source: InferenceError) -> Self {
        PipelineError::Inference { source }
    }
}

impl From<SinkError> for PipelineError {
    fn from(source: SinkError) -> Self {
        PipelineError::Sink { source }
    }
}
