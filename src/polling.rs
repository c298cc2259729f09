//! Generic polling loop for continuous mode.
//!
//! The run coordinator drives a [`PollingProcessor`] through repeated
//! prepare/process iterations until the shutdown token fires. Idle state is
//! published through a watch channel so callers can block until the
//! pipeline has caught up with all available input.

use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Result of a single processing iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IterationResult {
    /// A batch was processed and committed.
    ProcessedItems,
    /// No pending input was found.
    NoItems,
    /// Shutdown was requested mid-iteration.
    Shutdown,
}

/// Trait for implementing a polling-based processor.
#[async_trait]
pub trait PollingProcessor {
    /// The state type prepared for each iteration.
    type State: Send;
    /// The error type for this processor.
    type Error: std::error::Error + Send;

    /// Prepare state for a processing iteration.
    ///
    /// Returns `None` if there is no work to do.
    async fn prepare(&mut self) -> Result<Option<Self::State>, Self::Error>;

    /// Process the prepared state.
    async fn process(&mut self, state: Self::State) -> Result<IterationResult, Self::Error>;
}

/// Random jitter between zero and `max_secs` seconds.
pub fn random_jitter(max_secs: u64) -> Duration {
    if max_secs == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::rng().random_range(0..=max_secs * 1000))
}

/// Run a polling loop with the given processor until shutdown.
///
/// Each iteration: `prepare()`, then `process()` if there is work, then
/// publish idle state and sleep for the poll interval (plus jitter) or
/// until shutdown. A started `process()` always runs to completion; the
/// processor observes the token itself to abandon work before any commit,
/// so a stop never tears an iteration mid-commit.
pub async fn run_polling_loop<P: PollingProcessor>(
    processor: &mut P,
    poll_interval: Duration,
    jitter_secs: u64,
    shutdown: CancellationToken,
    idle: &watch::Sender<bool>,
    name: &str,
) -> Result<(), P::Error> {
    loop {
        let state = tokio::select! {
            biased;

            _ = shutdown.cancelled() => {
                info!(target = %name, "Shutdown requested before iteration");
                return Ok(());
            }

            result = processor.prepare() => result?,
        };

        let result = match state {
            Some(state) => processor.process(state).await?,
            None => IterationResult::NoItems,
        };

        match result {
            IterationResult::Shutdown => return Ok(()),
            IterationResult::NoItems => {
                idle.send_replace(true);
                debug!(
                    target = %name,
                    "No pending input, waiting {}s before next poll",
                    poll_interval.as_secs()
                );
            }
            IterationResult::ProcessedItems => {
                idle.send_replace(false);
                debug!(
                    target = %name,
                    "Iteration complete, waiting {}s before next poll",
                    poll_interval.as_secs()
                );
            }
        }

        let sleep_duration = poll_interval + random_jitter(jitter_secs);
        if shutdown
            .run_until_cancelled(tokio::time::sleep(sleep_duration))
            .await
            .is_none()
        {
            info!(target = %name, "Shutdown requested during poll wait");
            return Ok(());
        }
    }
}
