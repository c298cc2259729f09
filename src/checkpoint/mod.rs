//! Checkpoint persistence for pipeline state.
//!
//! The run coordinator owns the checkpoint store; the source and sink each
//! get a manager for their own partition (`source/`, `sink/`), so the two
//! never touch each other's bookkeeping. Saves use the atomic temp-file +
//! rename pattern so a checkpoint is never observed partially written.

pub mod state;

pub use state::{FileEntry, SinkCheckpoint, SourceCheckpoint};

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use crate::error::StorageError;
use crate::metrics::emit;
use crate::metrics::events::CheckpointSaved;
use crate::storage::StorageProviderRef;

/// Partition name for the source checkpoint.
pub const SOURCE_PARTITION: &str = "source";
/// Partition name for the sink checkpoint.
pub const SINK_PARTITION: &str = "sink";

/// Manages persistence of one checkpoint partition.
pub struct CheckpointManager<S> {
    /// Storage provider rooted at the checkpoint store.
    storage: StorageProviderRef,
    /// Partition this manager owns (`source` or `sink`).
    partition: &'static str,
    /// Stream identifier, used in logging and metrics.
    stream: String,
    /// Current checkpoint state.
    state: S,
}

impl<S> CheckpointManager<S>
where
    S: Serialize + DeserializeOwned + Default,
{
    /// Create a manager for the given partition, starting from default state.
    pub fn new(storage: StorageProviderRef, partition: &'static str, stream: String) -> Self {
        Self {
            storage,
            partition,
            stream,
            state: S::default(),
        }
    }

    fn checkpoint_path(&self) -> String {
        format!("{}/checkpoint.json", self.partition)
    }

    /// Load checkpoint state from storage.
    ///
    /// Returns `Ok(true)` if a checkpoint was loaded, `Ok(false)` if none
    /// exists (or it failed to parse and processing starts fresh). Errors
    /// only on unexpected storage failures.
    pub async fn load(&mut self) -> Result<bool, StorageError> {
        match self.storage.get(self.checkpoint_path()).await {
            Ok(bytes) => match serde_json::from_slice::<S>(&bytes) {
                Ok(state) => {
                    info!(
                        target = %self.stream,
                        partition = self.partition,
                        "Loaded checkpoint"
                    );
                    self.state = state;
                    Ok(true)
                }
                Err(e) => {
                    warn!(
                        target = %self.stream,
                        partition = self.partition,
                        error = %e,
                        "Failed to parse checkpoint JSON, starting fresh"
                    );
                    self.state = S::default();
                    Ok(false)
                }
            },
            Err(e) if e.is_not_found() => {
                debug!(
                    target = %self.stream,
                    partition = self.partition,
                    "No checkpoint found, starting fresh"
                );
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    /// Save checkpoint state to storage using an atomic write.
    pub async fn save(&self) -> Result<(), StorageError> {
        let json = serde_json::to_vec_pretty(&self.state)
            .expect("checkpoint state should always serialize");

        self.storage
            .atomic_write(self.checkpoint_path(), json)
            .await?;

        emit(CheckpointSaved {
            partition: self.partition,
            stream: self.stream.clone(),
        });
        debug!(
            target = %self.stream,
            partition = self.partition,
            "Saved checkpoint"
        );
        Ok(())
    }

    /// The current checkpoint state.
    pub fn state(&self) -> &S {
        &self.state
    }

    /// Mutable access for updating state between saves.
    pub fn state_mut(&mut self) -> &mut S {
        &mut self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::StorageProvider;
    use std::sync::Arc;
    use tempfile::TempDir;

    async fn checkpoint_storage(temp_dir: &TempDir) -> StorageProviderRef {
        Arc::new(StorageProvider::for_path(temp_dir.path()).await.unwrap())
    }

    #[tokio::test]
    async fn test_load_without_checkpoint_starts_fresh() {
        let temp_dir = TempDir::new().unwrap();
        let storage = checkpoint_storage(&temp_dir).await;

        let mut manager: CheckpointManager<SourceCheckpoint> =
            CheckpointManager::new(storage, SOURCE_PARTITION, "customers".to_string());

        assert!(!manager.load().await.unwrap());
        assert!(manager.state().files.is_empty());
    }

    #[tokio::test]
    async fn test_save_and_reload() {
        let temp_dir = TempDir::new().unwrap();
        let storage = checkpoint_storage(&temp_dir).await;

        let mut manager: CheckpointManager<SourceCheckpoint> =
            CheckpointManager::new(storage.clone(), SOURCE_PARTITION, "customers".to_string());
        manager
            .state_mut()
            .mark_consumed("a.csv".to_string(), 3, 0);
        manager.save().await.unwrap();

        let mut reloaded: CheckpointManager<SourceCheckpoint> =
            CheckpointManager::new(storage, SOURCE_PARTITION, "customers".to_string());
        assert!(reloaded.load().await.unwrap());
        assert!(reloaded.state().is_consumed("a.csv"));
    }

    #[tokio::test]
    async fn test_partitions_are_disjoint() {
        let temp_dir = TempDir::new().unwrap();
        let storage = checkpoint_storage(&temp_dir).await;

        let mut source: CheckpointManager<SourceCheckpoint> =
            CheckpointManager::new(storage.clone(), SOURCE_PARTITION, "s".to_string());
        source
            .state_mut()
            .mark_consumed("a.csv".to_string(), 1, 0);
        source.save().await.unwrap();

        let mut sink: CheckpointManager<SinkCheckpoint> =
            CheckpointManager::new(storage.clone(), SINK_PARTITION, "s".to_string());
        sink.state_mut().table_version = Some(0);
        sink.save().await.unwrap();

        // Each partition reloads only its own state
        let mut source2: CheckpointManager<SourceCheckpoint> =
            CheckpointManager::new(storage.clone(), SOURCE_PARTITION, "s".to_string());
        assert!(source2.load().await.unwrap());
        assert!(source2.state().is_consumed("a.csv"));

        let mut sink2: CheckpointManager<SinkCheckpoint> =
            CheckpointManager::new(storage, SINK_PARTITION, "s".to_string());
        assert!(sink2.load().await.unwrap());
        assert_eq!(sink2.state().table_version, Some(0));
    }

    #[tokio::test]
    async fn test_corrupt_checkpoint_starts_fresh() {
        let temp_dir = TempDir::new().unwrap();
        let storage = checkpoint_storage(&temp_dir).await;
        storage
            .put("source/checkpoint.json", b"not json".to_vec())
            .await
            .unwrap();

        let mut manager: CheckpointManager<SourceCheckpoint> =
            CheckpointManager::new(storage, SOURCE_PARTITION, "s".to_string());
        assert!(!manager.load().await.unwrap());
    }
}
