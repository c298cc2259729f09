//! CSV reading against a pinned schema, with rescued-data capture.
//!
//! Rows are mapped onto the pinned schema by header name. Values under
//! columns the schema does not know, values from rows the parser could not
//! decode, and missing-column shortfalls are all diverted into the record's
//! rescued-data field as a JSON object. A malformed row never aborts the
//! file read.

use std::sync::Arc;

use indexmap::IndexMap;
use serde::Serialize;
use tracing::debug;

use crate::schema::{RESCUED_COLUMN, Schema};

/// One ingested row, interpreted against the pinned schema.
#[derive(Debug, Clone)]
pub struct Record {
    /// Column values in schema order; `None` where the row had no value.
    fields: IndexMap<String, Option<String>>,
    /// JSON capture of anything that did not fit the schema.
    rescued: Option<String>,
}

impl Record {
    /// Get a column value. The rescued column is addressable like any other.
    pub fn get(&self, column: &str) -> Option<&str> {
        if column == RESCUED_COLUMN {
            return self.rescued.as_deref();
        }
        self.fields.get(column).and_then(|v| v.as_deref())
    }

    /// The rescued-data payload, if any part of the row failed to conform.
    pub fn rescued(&self) -> Option<&str> {
        self.rescued.as_deref()
    }
}

/// Result of reading one source file.
#[derive(Debug, Default)]
pub struct FileReadResult {
    /// All parsed records, malformed rows included.
    pub records: Vec<Record>,
    /// Number of rows that carried rescued data.
    pub rescued_rows: usize,
}

#[derive(Serialize)]
struct RescuedData<'a> {
    #[serde(rename = "_file")]
    file: &'a str,
    #[serde(rename = "_row")]
    row: u64,
    #[serde(flatten)]
    values: IndexMap<String, String>,
    #[serde(rename = "_error", skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<'a> RescuedData<'a> {
    fn new(file: &'a str, row: u64) -> Self {
        Self {
            file,
            row,
            values: IndexMap::new(),
            error: None,
        }
    }

    fn is_empty(&self) -> bool {
        self.values.is_empty() && self.error.is_none()
    }

    fn into_json(self) -> String {
        serde_json::to_string(&self).expect("rescued data should always serialize to JSON")
    }
}

/// Reader that interprets CSV files against a pinned schema.
pub struct CsvReader {
    schema: Arc<Schema>,
    stream: String,
}

impl CsvReader {
    pub fn new(schema: Arc<Schema>, stream: String) -> Self {
        Self { schema, stream }
    }

    /// The pinned schema this reader validates against.
    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Read raw CSV bytes into records.
    ///
    /// Row-level problems are captured per record; this only inspects the
    /// header and then consumes every row.
    pub fn read(&self, data: &[u8], path: &str) -> FileReadResult {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(data);

        // Map file column positions onto schema columns by header name.
        // A file whose header the parser rejects outright is treated as
        // positional against the schema.
        let header: Vec<String> = match reader.headers() {
            Ok(h) => h.iter().map(|c| c.trim().to_string()).collect(),
            Err(e) => {
                debug!(target = %self.stream, "Unreadable header in {path}: {e}");
                self.schema.data_columns().map(str::to_string).collect()
            }
        };

        let mut result = FileReadResult::default();
        for (index, row) in reader.records().enumerate() {
            // Header occupies line 1
            let row_number = index as u64 + 2;
            let record = match row {
                Ok(row) => self.interpret_row(&header, &row, path, row_number),
                Err(e) => self.unparseable_row(path, row_number, e.to_string()),
            };
            if record.rescued.is_some() {
                result.rescued_rows += 1;
            }
            result.records.push(record);
        }
        result
    }

    fn interpret_row(
        &self,
        header: &[String],
        row: &csv::StringRecord,
        path: &str,
        row_number: u64,
    ) -> Record {
        let mut fields: IndexMap<String, Option<String>> = self
            .schema
            .data_columns()
            .map(|c| (c.to_string(), None))
            .collect();
        let mut rescued = RescuedData::new(path, row_number);

        for (position, value) in row.iter().enumerate() {
            match header.get(position) {
                Some(column) if fields.contains_key(column.as_str()) => {
                    fields.insert(column.clone(), Some(value.to_string()));
                }
                Some(column) => {
                    // Header names a column the schema does not know
                    rescued.values.insert(column.clone(), value.to_string());
                }
                None => {
                    // Row is wider than the header; keep the stray value
                    // under a positional key
                    rescued
                        .values
                        .insert(format!("_c{position}"), value.to_string());
                }
            }
        }

        if row.len() < header.len() {
            rescued.error = Some(format!(
                "row has {} of {} expected fields",
                row.len(),
                header.len()
            ));
        }

        Record {
            fields,
            rescued: (!rescued.is_empty()).then(|| rescued.into_json()),
        }
    }

    fn unparseable_row(&self, path: &str, row_number: u64, message: String) -> Record {
        let fields = self
            .schema
            .data_columns()
            .map(|c| (c.to_string(), None))
            .collect();
        let mut rescued = RescuedData::new(path, row_number);
        rescued.error = Some(message);

        Record {
            fields,
            rescued: Some(rescued.into_json()),
        }
    }
}
