//! Likes and comments reported by the page agent, and the forwarding of
//! browser signals into the worker.

use outreach_browser::BrowserSignal;
use outreach_core::{ActivityKind, Credentials, Error, Result};
use outreach_ledger::LedgerClient;
use outreach_scheduler::WorkerHandle;
use outreach_storage::{EngagementStats, SessionStateStore, StatsStore};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

/// Counts likes/comments locally and mirrors them to the ledger.
#[derive(Clone)]
pub struct EngagementRecorder {
    stats: Arc<StatsStore>,
    ledger: Arc<LedgerClient>,
    sessions: SessionStateStore,
    today: fn() -> String,
}

impl EngagementRecorder {
    pub fn new(stats: Arc<StatsStore>, ledger: Arc<LedgerClient>, sessions: SessionStateStore) -> Self {
        Self {
            stats,
            ledger,
            sessions,
            today: outreach_storage::today,
        }
    }

    #[cfg(test)]
    fn with_today(mut self, today: fn() -> String) -> Self {
        self.today = today;
        self
    }

    /// The local counter is authoritative for the daily quota, so it is bumped
    /// even when the ledger call cannot be made or fails.
    pub async fn record(
        &self,
        kind: ActivityKind,
        candidate_id: Option<&str>,
        activity_id: Option<&str>,
    ) -> Result<EngagementStats> {
        let today = (self.today)();
        let stats = match kind {
            ActivityKind::Like => self.stats.record_like(&today).await?,
            ActivityKind::Comment => self.stats.record_comment(&today).await?,
            ActivityKind::Visit => {
                return Err(Error::Validation(
                    "visits are recorded by the worker".to_string(),
                ))
            }
        };

        let persisted = self.sessions.load().await.unwrap_or_default();
        let credentials = Credentials::new(
            persisted.token.as_deref().unwrap_or_default(),
            persisted.workspace_id.as_deref().unwrap_or_default(),
        );
        let parent = activity_id
            .map(str::to_string)
            .or(persisted.current_activity_id);

        match candidate_id {
            Some(candidate_id) if credentials.is_complete() => {
                if let Err(e) = self
                    .ledger
                    .record_activity(kind, candidate_id, parent.as_deref(), &credentials)
                    .await
                {
                    warn!(kind = %kind, candidate_id, error = %e, "Ledger did not take engagement");
                }
            }
            _ => {
                debug!(kind = %kind, "Engagement counted locally only");
            }
        }
        Ok(stats)
    }
}

/// Route browser signals to the worker until shutdown or until the browser
/// side drops its sender.
pub async fn forward_signals(
    mut signals: mpsc::Receiver<BrowserSignal>,
    worker: WorkerHandle,
    recorder: EngagementRecorder,
    mut shutdown: broadcast::Receiver<()>,
) {
    loop {
        let signal = tokio::select! {
            signal = signals.recv() => match signal {
                Some(signal) => signal,
                None => break,
            },
            _ = shutdown.recv() => break,
        };
        if let Err(e) = forward(&signal, &worker, &recorder).await {
            warn!(?signal, error = %e, "Failed to forward browser signal");
            if matches!(e, Error::WorkerGone(_)) {
                break;
            }
        }
    }
    info!("Signal forwarder stopped");
}

async fn forward(signal: &BrowserSignal, worker: &WorkerHandle, recorder: &EngagementRecorder) -> Result<()> {
    match signal {
        BrowserSignal::ContextClosed { handle } => worker.context_closed(handle.clone()).await,
        BrowserSignal::Page { handle, report } => {
            if let Some(completion) = report.completion(handle) {
                return worker.agent_completed(completion).await;
            }
            if let Some((kind, candidate_id, activity_id)) = report.engagement() {
                recorder.record(kind, candidate_id, activity_id).await?;
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use outreach_browser::{CdpNavigationDriver, CdpPageAgent, CdpPool, DevtoolsEndpoint, PageReport};
    use outreach_core::config::LedgerConfig;
    use outreach_core::ContextHandle;
    use outreach_scheduler::{Collaborators, EngagementWorker};
    use outreach_storage::MemoryStateStore;
    use std::time::Duration;

    fn today() -> String {
        "2026-10-15".to_string()
    }

    fn recorder() -> (EngagementRecorder, Arc<StatsStore>) {
        let store = Arc::new(MemoryStateStore::new());
        let stats = Arc::new(StatsStore::new(store.clone()));
        let ledger = Arc::new(LedgerClient::new(&LedgerConfig {
            api_base: "http://127.0.0.1:9".to_string(),
            request_timeout_secs: 1,
        }));
        let recorder = EngagementRecorder::new(stats.clone(), ledger, SessionStateStore::new(store))
            .with_today(today);
        (recorder, stats)
    }

    #[tokio::test]
    async fn test_counts_without_session() {
        let (recorder, stats) = recorder();
        recorder.record(ActivityKind::Like, Some("c1"), None).await.unwrap();
        recorder.record(ActivityKind::Comment, None, None).await.unwrap();
        let s = stats.load().await.unwrap();
        assert_eq!(s.effective_for("2026-10-15"), (1, 1));
    }

    #[tokio::test]
    async fn test_rejects_visit() {
        let (recorder, stats) = recorder();
        let err = recorder.record(ActivityKind::Visit, Some("c1"), None).await;
        assert!(matches!(err, Err(Error::Validation(_))));
        assert_eq!(stats.load().await.unwrap(), EngagementStats::default());
    }

    /// A worker built on real collaborators that are never reached.
    fn idle_worker(ledger: Arc<LedgerClient>, stats: Arc<StatsStore>) -> WorkerHandle {
        let config = outreach_core::Config::default();
        let pool = Arc::new(CdpPool::new(
            DevtoolsEndpoint::new("127.0.0.1", 9),
            Duration::from_secs(1),
        ));
        let (signals, _) = mpsc::channel(1);
        let collaborators = Collaborators {
            candidates: ledger.clone(),
            navigator: Arc::new(CdpNavigationDriver::new(pool.clone(), &config.browser)),
            recorder: ledger,
            agent: Arc::new(CdpPageAgent::new(pool, "__test", signals)),
            counters: stats,
        };
        EngagementWorker::new(
            collaborators,
            SessionStateStore::new(Arc::new(MemoryStateStore::new())),
            &config,
        )
        .handle()
    }

    #[tokio::test]
    async fn test_forwarder_counts_likes_and_stops_when_signals_close() {
        let (recorder, stats) = recorder();
        let ledger = Arc::new(LedgerClient::new(&LedgerConfig::default()));
        let worker = idle_worker(ledger, stats.clone());
        let (tx, rx) = mpsc::channel(4);
        let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);

        tx.send(BrowserSignal::Page {
            handle: ContextHandle::new("tab-1"),
            report: PageReport::Liked {
                candidate_id: None,
                activity_id: None,
            },
        })
        .await
        .unwrap();
        drop(tx);

        forward_signals(rx, worker, recorder, shutdown_rx).await;
        assert_eq!(stats.load().await.unwrap().effective_for("2026-10-15"), (1, 0));
    }
}
