//! Checkpoint state serialization.
//!
//! Two disjoint partitions under the checkpoint root:
//! - `source/checkpoint.json`: which files have been consumed
//! - `sink/checkpoint.json`: last committed table version and the
//!   aggregate state it was computed from

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::aggregate::AggregateState;

fn default_state_version() -> u32 {
    1
}

/// Per-file ingest stats recorded when a file is marked consumed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    /// Number of records read from the file.
    pub records: u64,
    /// Number of rows that carried rescued data.
    pub rescued: u64,
    /// When the file was ingested.
    pub ingested_at: DateTime<Utc>,
}

/// Source partition state: consumed-file bookkeeping.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceCheckpoint {
    /// Serialization version for forward compatibility.
    #[serde(default = "default_state_version")]
    pub state_version: u32,
    /// Consumed files, keyed by path relative to the source root.
    #[serde(default)]
    pub files: BTreeMap<String, FileEntry>,
}

impl SourceCheckpoint {
    /// Whether the file has already been consumed.
    pub fn is_consumed(&self, path: &str) -> bool {
        self.files.contains_key(path)
    }

    /// Mark a file consumed.
    pub fn mark_consumed(&mut self, path: String, records: u64, rescued: u64) {
        self.files.insert(
            path,
            FileEntry {
                records,
                rescued,
                ingested_at: Utc::now(),
            },
        );
    }
}

/// Sink partition state: last committed version plus aggregate state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SinkCheckpoint {
    /// Serialization version for forward compatibility.
    #[serde(default = "default_state_version")]
    pub state_version: u32,
    /// Last committed table version; `None` before the first commit.
    #[serde(default)]
    pub table_version: Option<i64>,
    /// Aggregate state as of the last committed batch.
    #[serde(default)]
    pub aggregate: Option<AggregateState>,
    /// When the last commit happened.
    #[serde(default)]
    pub committed_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_checkpoint_tracks_consumed_files() {
        let mut state = SourceCheckpoint::default();
        assert!(!state.is_consumed("a.csv"));

        state.mark_consumed("a.csv".to_string(), 10, 1);
        assert!(state.is_consumed("a.csv"));
        assert_eq!(state.files["a.csv"].records, 10);
    }

    #[test]
    fn test_source_checkpoint_roundtrip() {
        let mut state = SourceCheckpoint::default();
        state.mark_consumed("date=2026-08-24/part-0.csv".to_string(), 3, 0);

        let json = serde_json::to_string(&state).unwrap();
        let restored: SourceCheckpoint = serde_json::from_str(&json).unwrap();

        assert!(restored.is_consumed("date=2026-08-24/part-0.csv"));
    }

    #[test]
    fn test_sink_checkpoint_default_has_no_commit() {
        let state = SinkCheckpoint::default();
        assert!(state.table_version.is_none());
        assert!(state.aggregate.is_none());
    }

    #[test]
    fn test_sink_checkpoint_minimal_json_deserializes() {
        // An older checkpoint without optional fields still loads
        let state: SinkCheckpoint = serde_json::from_str(r#"{"state_version":1}"#).unwrap();
        assert!(state.table_version.is_none());
    }
}
