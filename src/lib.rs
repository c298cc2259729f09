//! Tally: incremental CSV loader with grouped-count snapshots.
//!
//! This crate handles:
//! - Discovering CSV files in a source directory exactly once, with
//!   checkpointed resumption across restarts
//! - Inferring and pinning a text schema, rescuing nonconforming values
//!   into a `_rescued_data` column instead of failing
//! - Maintaining a running count per group key (count-all or
//!   count-distinct over a configured value column)
//! - Committing the full aggregate snapshot to a versioned table directory
//!   in complete-overwrite mode, run-once or continuously

pub mod aggregate;
pub mod checkpoint;
pub mod config;
pub mod error;
pub mod metrics;
pub mod pipeline;
pub mod polling;
pub mod schema;
pub mod signal;
pub mod sink;
pub mod source;
pub mod storage;

// Re-export commonly used items
pub use aggregate::{AggregateRow, AggregateState, Aggregator};
pub use config::{Config, CountPolicy, TriggerMode};
pub use error::PipelineError;
pub use pipeline::{Pipeline, PipelineHandle, RunSummary};
pub use schema::{RESCUED_COLUMN, Schema};
pub use signal::shutdown_signal;
pub use sink::{TableSnapshot, TargetTable};
