//! Internal events for tally metrics emission.
//!
//! Each event struct represents a measurable occurrence in the pipeline.
//! Metrics carry a `stream` label so multiple pipelines sharing a process
//! stay distinguishable.

use metrics::{counter, gauge};
use tracing::trace;

use super::InternalEvent;

/// Event emitted when source files are discovered for a batch.
pub struct FilesDiscovered {
    pub count: u64,
    pub stream: String,
}

impl InternalEvent for FilesDiscovered {
    fn emit(self) {
        trace!(count = self.count, stream = %self.stream, "Files discovered");
        counter!("tally_files_discovered_total", "stream" => self.stream).increment(self.count);
    }
}

/// Event emitted when records are ingested from a source file.
pub struct RecordsIngested {
    pub count: u64,
    pub stream: String,
}

impl InternalEvent for RecordsIngested {
    fn emit(self) {
        trace!(count = self.count, stream = %self.stream, "Records ingested");
        counter!("tally_records_ingested_total", "stream" => self.stream).increment(self.count);
    }
}

/// Event emitted when rows are diverted into the rescued-data column.
pub struct RowsRescued {
    pub count: u64,
    pub stream: String,
}

impl InternalEvent for RowsRescued {
    fn emit(self) {
        trace!(count = self.count, stream = %self.stream, "Rows rescued");
        counter!("tally_rows_rescued_total", "stream" => self.stream).increment(self.count);
    }
}

/// Event emitted when an aggregate snapshot is committed to the table.
pub struct SnapshotCommitted {
    pub version: i64,
    pub rows: u64,
    pub stream: String,
}

impl InternalEvent for SnapshotCommitted {
    fn emit(self) {
        trace!(
            version = self.version,
            rows = self.rows,
            stream = %self.stream,
            "Snapshot committed"
        );
        counter!("tally_snapshots_committed_total", "stream" => self.stream.clone()).increment(1);
        gauge!("tally_table_version", "stream" => self.stream).set(self.version as f64);
    }
}

/// Event emitted when a snapshot commit attempt fails and will be retried.
pub struct CommitRetried {
    pub attempt: usize,
    pub stream: String,
}

impl InternalEvent for CommitRetried {
    fn emit(self) {
        trace!(attempt = self.attempt, stream = %self.stream, "Commit retried");
        counter!("tally_commit_retries_total", "stream" => self.stream).increment(1);
    }
}

/// Event emitted when a checkpoint partition is saved.
pub struct CheckpointSaved {
    pub partition: &'static str,
    pub stream: String,
}

impl InternalEvent for CheckpointSaved {
    fn emit(self) {
        trace!(partition = self.partition, stream = %self.stream, "Checkpoint saved");
        counter!(
            "tally_checkpoints_saved_total",
            "partition" => self.partition,
            "stream" => self.stream
        )
        .increment(1);
    }
}
