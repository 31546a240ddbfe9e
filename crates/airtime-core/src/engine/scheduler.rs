//! Periodic refresh loop.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::Engine;
use crate::storage::Store;

/// Runs [`Engine::run_refresh_cycle`] every `period` until cancelled.
pub struct RefreshScheduler;

impl RefreshScheduler {
    /// Spawn the loop on the current tokio runtime.
    ///
    /// The first cycle runs immediately. A slow cycle delays the next tick
    /// instead of triggering a burst of catch-up cycles. The handle resolves to
    /// the number of cycles that completed.
    pub fn spawn<S>(
        engine: Arc<Engine<S>>,
        period: Duration,
        cancel_token: CancellationToken,
    ) -> JoinHandle<u64>
    where
        S: Store + 'static,
    {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(period_secs = period.as_secs(), "refresh loop started");

            let mut cycles = 0u64;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let engine = Arc::clone(&engine);
                        let cycle = tokio::task::spawn_blocking(move || engine.run_refresh_cycle());
                        match cycle.await {
                            Ok(Ok(report)) => {
                                cycles += 1;
                                debug!(
                                    cycle = cycles,
                                    operators = report.outcomes.len(),
                                    "refresh cycle done"
                                );
                            }
                            Ok(Err(e)) => warn!(error = %e, "refresh cycle failed"),
                            Err(e) => error!(error = %e, "refresh task panicked"),
                        }
                    }
                    _ = cancel_token.cancelled() => {
                        info!(cycles, "refresh loop shutting down");
                        break;
                    }
                }
            }
            cycles
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MemoryStore, ModelConfig};

    #[tokio::test(start_paused = true)]
    async fn stops_on_cancel() {
        let engine = Arc::new(Engine::new(MemoryStore::new(), &ModelConfig::default()).unwrap());
        let token = CancellationToken::new();
        let handle = RefreshScheduler::spawn(engine, Duration::from_secs(60), token.clone());

        tokio::time::sleep(Duration::from_secs(1)).await;
        token.cancel();
        let cycles = handle.await.unwrap();
        assert!(cycles <= 1);
    }
}
