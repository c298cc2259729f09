//! Sink for committing aggregate snapshots to the target table.

pub mod table;
pub mod writer;

pub use table::{TableSnapshot, TargetTable};
pub use writer::{TableManifest, TableWriter, MANIFEST_PATH};
