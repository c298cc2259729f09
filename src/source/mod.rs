//! Source coordinator for reading CSV files.
//!
//! Lists input files, reads them against the pinned schema, and diverts
//! nonconforming values into the rescued-data column instead of failing.

pub mod listing;
pub mod reader;

pub use listing::list_csv_files;
pub use reader::{CsvReader, FileReadResult, Record};
