use crate::event::ResumeOutcome;
use crate::handle::WorkerHandle;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Re-reads persisted state at startup and then periodically, so a session
/// that lost its in-memory worker (restart, crash) picks up where it left off.
/// A live session makes each pass a no-op.
pub struct ResyncService {
    worker: WorkerHandle,
    interval: Duration,
}

impl ResyncService {
    pub fn new(worker: WorkerHandle, interval: Duration) -> Self {
        Self { worker, interval }
    }

    async fn pass(&self) {
        match self.worker.resume().await {
            Ok(ResumeOutcome::Resumed { index, total }) => {
                info!(index, total, "Resumed persisted engagement session")
            }
            Ok(ResumeOutcome::Cleared { reason }) => {
                warn!(reason = %reason, "Discarded persisted engagement session")
            }
            Ok(outcome) => debug!(?outcome, "Resync pass"),
            Err(e) => warn!(error = %e, "Resync pass failed"),
        }
    }

    pub async fn run_loop(self, mut shutdown: broadcast::Receiver<()>) {
        info!(interval_secs = self.interval.as_secs(), "ResyncService started");

        // First tick fires immediately: that is the startup resume.
        let mut interval = tokio::time::interval(self.interval);

        loop {
            tokio::select! {
                _ = interval.tick() => self.pass().await,
                _ = shutdown.recv() => {
                    info!("ResyncService shutting down");
                    break;
                }
            }
        }
    }
}
