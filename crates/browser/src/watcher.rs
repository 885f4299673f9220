use crate::agent::BrowserSignal;
use crate::cdp::CdpClient;
use crate::pool::CdpPool;
use outreach_core::{ContextHandle, Result};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

const RECONNECT_DELAY: Duration = Duration::from_secs(10);

/// Follows target lifecycle on the browser connection and reports closed tabs.
pub struct TargetWatcher {
    pool: Arc<CdpPool>,
    signals: mpsc::Sender<BrowserSignal>,
}

impl TargetWatcher {
    pub fn new(pool: Arc<CdpPool>, signals: mpsc::Sender<BrowserSignal>) -> Self {
        Self { pool, signals }
    }

    /// Watch one browser connection until it drops.
    async fn watch_once(&self) -> Result<()> {
        let ws_url = self.pool.endpoint().browser_ws_url().await?;
        let client = CdpClient::connect(&ws_url).await?;
        let mut destroyed = client.subscribe_event("Target.targetDestroyed").await;
        client
            .send_command("Target.setDiscoverTargets", json!({ "discover": true }))
            .await?;
        info!("Watching browser targets");

        while let Some(params) = destroyed.recv().await {
            let Some(id) = params.get("targetId").and_then(Value::as_str) else {
                continue;
            };
            let handle = ContextHandle::new(id);
            debug!(context = %handle, "Target destroyed");
            self.pool.forget(&handle).await;
            if self
                .signals
                .send(BrowserSignal::ContextClosed { handle })
                .await
                .is_err()
            {
                break;
            }
        }
        Ok(())
    }

    pub async fn run_loop(self, mut shutdown: broadcast::Receiver<()>) {
        loop {
            tokio::select! {
                result = self.watch_once() => {
                    if let Err(e) = result {
                        warn!(error = %e, "Target watcher lost the browser");
                    }
                }
                _ = shutdown.recv() => {
                    info!("TargetWatcher shutting down");
                    return;
                }
            }
            tokio::select! {
                _ = tokio::time::sleep(RECONNECT_DELAY) => {}
                _ = shutdown.recv() => return,
            }
        }
    }
}
