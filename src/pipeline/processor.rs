//! Batch processing: list pending files, fold records into the aggregate,
//! commit the snapshot, checkpoint.
//!
//! Commit ordering within a batch: table commit, then sink checkpoint
//! (aggregate state + version), then source checkpoint (consumed files).
//! A crash before the sink checkpoint is saved replays the batch against
//! the previous aggregate state and recommits identical content; each
//! commit is a full overwrite, so replays are idempotent.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::aggregate::Aggregator;
use crate::checkpoint::{
    CheckpointManager, SINK_PARTITION, SOURCE_PARTITION, SinkCheckpoint, SourceCheckpoint,
};
use crate::config::Config;
use crate::error::PipelineError;
use crate::metrics::emit;
use crate::metrics::events::{FilesDiscovered, RecordsIngested, RowsRescued};
use crate::polling::{IterationResult, PollingProcessor};
use crate::schema::{Schema, infer_schema_from_source};
use crate::sink::TableWriter;
use crate::source::{CsvReader, list_csv_files};
use crate::storage::{StorageProvider, StorageProviderRef};

/// Summary of one completed batch (or an idle trigger).
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    /// Files consumed in this batch.
    pub files: usize,
    /// Records ingested in this batch.
    pub records: u64,
    /// Rows that carried rescued data.
    pub rescued: u64,
    /// Distinct group keys in the committed snapshot.
    pub groups: usize,
    /// Table version committed by this batch; `None` for an idle trigger.
    pub table_version: Option<i64>,
}

/// Per-stream batch processor owned by the run coordinator.
pub struct Processor {
    stream: String,
    config: Config,
    source_storage: StorageProviderRef,
    source_checkpoint: CheckpointManager<SourceCheckpoint>,
    sink_checkpoint: CheckpointManager<SinkCheckpoint>,
    checkpoint_storage: StorageProviderRef,
    /// Present once a schema has been loaded or inferred.
    reader: Option<CsvReader>,
    aggregator: Aggregator,
    writer: TableWriter,
    shutdown: CancellationToken,
}

impl Processor {
    /// Set up storage, load checkpoints, and resume aggregate state.
    ///
    /// An unreadable source directory or unwritable checkpoint/table
    /// location surfaces here as a fatal error.
    pub async fn new(config: Config, shutdown: CancellationToken) -> Result<Self, PipelineError> {
        let stream = config.stream.clone();

        let source_storage = Arc::new(StorageProvider::for_path(&config.source.path).await?);
        let checkpoint_storage = Arc::new(StorageProvider::for_path(&config.checkpoints).await?);
        let table_storage = Arc::new(StorageProvider::for_path(&config.sink.table_uri).await?);

        let mut source_checkpoint: CheckpointManager<SourceCheckpoint> = CheckpointManager::new(
            checkpoint_storage.clone(),
            SOURCE_PARTITION,
            stream.clone(),
        );
        source_checkpoint.load().await?;

        let mut sink_checkpoint: CheckpointManager<SinkCheckpoint> =
            CheckpointManager::new(checkpoint_storage.clone(), SINK_PARTITION, stream.clone());
        sink_checkpoint.load().await?;

        let aggregator = match sink_checkpoint.state().aggregate.clone() {
            Some(state) => Aggregator::resume(&config.aggregate, state),
            None => Aggregator::new(&config.aggregate),
        };

        let reader = match Schema::load(&checkpoint_storage).await? {
            Some(schema) => Some(Self::reader_for(&config, schema)?),
            None => None,
        };

        let writer = TableWriter::new(
            table_storage,
            stream.clone(),
            config.sink.max_retries,
            Duration::from_millis(config.sink.retry_backoff_ms),
        );

        Ok(Self {
            stream,
            config,
            source_storage,
            source_checkpoint,
            sink_checkpoint,
            checkpoint_storage,
            reader,
            aggregator,
            writer,
            shutdown,
        })
    }

    fn reader_for(config: &Config, schema: Schema) -> Result<CsvReader, PipelineError> {
        for column in [
            config.aggregate.key_column.as_str(),
            config.aggregate.count_column.as_str(),
        ] {
            if !schema.contains(column) {
                return Err(PipelineError::MissingKeyColumn {
                    column: column.to_string(),
                });
            }
        }
        Ok(CsvReader::new(Arc::new(schema), config.stream.clone()))
    }

    /// List source files not yet marked consumed.
    pub async fn pending_files(&self) -> Result<Vec<String>, PipelineError> {
        let listed = list_csv_files(&self.source_storage, None).await?;
        let pending: Vec<String> = listed
            .into_iter()
            .map(|p| p.to_string())
            .filter(|p| !self.source_checkpoint.state().is_consumed(p))
            .collect();
        if !pending.is_empty() {
            emit(FilesDiscovered {
                count: pending.len() as u64,
                stream: self.stream.clone(),
            });
        }
        Ok(pending)
    }

    /// Ensure a pinned schema exists, inferring and persisting it on first
    /// contact with source data.
    async fn ensure_reader(&mut self) -> Result<(), PipelineError> {
        if self.reader.is_some() {
            return Ok(());
        }

        let schema = infer_schema_from_source(&self.source_storage, &self.stream).await?;
        schema.persist(&self.checkpoint_storage).await?;
        self.reader = Some(Self::reader_for(&self.config, schema)?);
        Ok(())
    }

    /// Process one batch of pending files end to end.
    pub async fn run_batch(&mut self, files: Vec<String>) -> Result<RunSummary, PipelineError> {
        self.ensure_reader().await?;
        let reader = self
            .reader
            .as_ref()
            .expect("reader is initialized by ensure_reader");

        let mut summary = RunSummary {
            files: files.len(),
            ..RunSummary::default()
        };

        let mut consumed: Vec<(String, u64, u64)> = Vec::with_capacity(files.len());
        for file in files {
            if self.shutdown.is_cancelled() {
                info!(target = %self.stream, "Shutdown requested, abandoning batch before commit");
                return Ok(summary);
            }

            let bytes = self.source_storage.get(file.clone()).await?;
            let result = reader.read(&bytes, &file);
            let records = result.records.len() as u64;
            let rescued = result.rescued_rows as u64;

            for record in &result.records {
                self.aggregator.observe(record);
            }

            debug!(
                target = %self.stream,
                file = %file,
                records,
                rescued,
                "Ingested file"
            );
            emit(RecordsIngested {
                count: records,
                stream: self.stream.clone(),
            });
            if rescued > 0 {
                emit(RowsRescued {
                    count: rescued,
                    stream: self.stream.clone(),
                });
            }

            summary.records += records;
            summary.rescued += rescued;
            consumed.push((file, records, rescued));
        }

        let snapshot = self.aggregator.snapshot();
        let manifest = self
            .writer
            .commit(
                &snapshot,
                &self.config.aggregate.key_column,
                &self.config.aggregate.output_column,
            )
            .await?;

        summary.groups = snapshot.len();
        summary.table_version = Some(manifest.version);

        {
            let state = self.sink_checkpoint.state_mut();
            state.table_version = Some(manifest.version);
            state.aggregate = Some(self.aggregator.state().clone());
            state.committed_at = Some(manifest.committed_at);
        }
        self.sink_checkpoint.save().await?;

        for (file, records, rescued) in consumed {
            self.source_checkpoint
                .state_mut()
                .mark_consumed(file, records, rescued);
        }
        self.source_checkpoint.save().await?;

        info!(
            target = %self.stream,
            files = summary.files,
            records = summary.records,
            rescued = summary.rescued,
            groups = summary.groups,
            version = manifest.version,
            "Batch committed"
        );
        Ok(summary)
    }
}

#[async_trait]
impl PollingProcessor for Processor {
    type State = Vec<String>;
    type Error = PipelineError;

    async fn prepare(&mut self) -> Result<Option<Self::State>, Self::Error> {
        let pending = self.pending_files().await?;
        if pending.is_empty() {
            return Ok(None);
        }

        info!(target = %self.stream, files = pending.len(), "Found files to process");
        Ok(Some(pending))
    }

    async fn process(&mut self, state: Self::State) -> Result<IterationResult, Self::Error> {
        let summary = self.run_batch(state).await?;
        Ok(match summary.table_version {
            Some(_) => IterationResult::ProcessedItems,
            // Shutdown abandoned the batch before commit
            None => IterationResult::Shutdown,
        })
    }
}
