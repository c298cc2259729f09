//! Run coordination: trigger handling, blocking semantics, cleanup.
//!
//! A [`Pipeline`] wires source reader, aggregator, and sink writer for one
//! stream. `run_once` processes exactly one batch of currently available
//! input and returns; `start` spawns continuous polling and hands back a
//! [`PipelineHandle`] for block-until-idle, stop, and wait.

mod processor;

pub use processor::{Processor, RunSummary};

use std::time::Duration;

use snafu::ResultExt;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::{Config, TriggerMode};
use crate::error::{PipelineError, TaskJoinSnafu};
use crate::polling::run_polling_loop;
use crate::storage::remove_tree;

/// A tally pipeline for one stream.
pub struct Pipeline {
    config: Config,
    shutdown: CancellationToken,
    idle: watch::Sender<bool>,
}

impl Pipeline {
    /// Create a pipeline from configuration.
    pub fn new(config: Config) -> Self {
        Self {
            config,
            shutdown: CancellationToken::new(),
            idle: watch::channel(false).0,
        }
    }

    /// The shutdown token; cancelling it stops a running pipeline.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Process exactly one batch of currently available input and return.
    ///
    /// Blocks until the batch is committed (or there was nothing to do);
    /// fatal errors from any stage surface to the caller.
    pub async fn run_once(&self) -> Result<RunSummary, PipelineError> {
        let mut processor = Processor::new(self.config.clone(), self.shutdown.clone()).await?;

        let pending = processor.pending_files().await?;
        if pending.is_empty() {
            info!(target = %self.config.stream, "No pending input for run-once trigger");
            return Ok(RunSummary::default());
        }
        processor.run_batch(pending).await
    }

    /// Run according to the configured trigger mode.
    ///
    /// Blocks until the run-once batch completes, or, in continuous mode,
    /// until the shutdown token is cancelled.
    pub async fn run(&self) -> Result<(), PipelineError> {
        match self.config.trigger.mode {
            TriggerMode::Once => {
                self.run_once().await?;
                self.idle.send_replace(true);
                Ok(())
            }
            TriggerMode::Continuous => {
                let mut processor =
                    Processor::new(self.config.clone(), self.shutdown.clone()).await?;
                info!(
                    target = %self.config.stream,
                    poll_interval_secs = self.config.trigger.poll_interval_secs,
                    "Starting continuous trigger"
                );
                run_polling_loop(
                    &mut processor,
                    Duration::from_secs(self.config.trigger.poll_interval_secs),
                    self.config.trigger.poll_jitter_secs,
                    self.shutdown.clone(),
                    &self.idle,
                    &self.config.stream,
                )
                .await
            }
        }
    }

    /// Spawn the pipeline on the runtime and return a control handle.
    pub fn start(self) -> PipelineHandle {
        let shutdown = self.shutdown.clone();
        let idle = self.idle.subscribe();
        let task = tokio::spawn(async move { self.run().await });
        PipelineHandle {
            shutdown,
            idle,
            task,
        }
    }

    /// Delete the target table, all checkpoints, and the inferred schema.
    ///
    /// Returns the system to its pre-first-run state; the next run
    /// re-infers schema from scratch. Source input files are untouched.
    pub async fn cleanup(config: &Config) -> Result<(), PipelineError> {
        remove_tree(&config.sink.table_uri).await?;
        remove_tree(&config.checkpoints).await?;
        info!(
            target = %config.stream,
            table = %config.sink.table_uri,
            checkpoints = %config.checkpoints,
            "Cleaned up table, checkpoints, and schema"
        );
        Ok(())
    }
}

/// Control handle for a spawned pipeline.
pub struct PipelineHandle {
    shutdown: CancellationToken,
    idle: watch::Receiver<bool>,
    task: tokio::task::JoinHandle<Result<(), PipelineError>>,
}

impl PipelineHandle {
    /// Wait until the pipeline reports no pending input.
    ///
    /// Resolves immediately if the pipeline has already stopped.
    pub async fn block_until_idle(&mut self) {
        // An Err means the pipeline ended and dropped the sender; that is
        // as idle as it gets
        let _ = self.idle.wait_for(|idle| *idle).await;
    }

    /// Signal the pipeline to stop.
    ///
    /// The in-flight batch either finishes its commit or is abandoned
    /// before any commit; there is no partial state to observe.
    pub fn stop(&self) {
        self.shutdown.cancel();
    }

    /// Wait for the pipeline task to finish, surfacing any fatal error.
    pub async fn wait(self) -> Result<(), PipelineError> {
        self.task.await.context(TaskJoinSnafu)?
    }

    /// Convenience: stop, then wait.
    pub async fn stop_and_wait(self) -> Result<(), PipelineError> {
        self.stop();
        self.wait().await
    }
}
