use crate::collaborators::PageAgent;
use outreach_core::ContextHandle;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Periodically pings the page agent in the active context so the browser
/// keeps the tab and its background work alive while the worker waits.
///
/// Runs for the life of an engagement session; the worker aborts it on stop.
pub struct KeepAliveService {
    agent: Arc<dyn PageAgent>,
    interval: Duration,
    context_rx: watch::Receiver<Option<ContextHandle>>,
}

impl KeepAliveService {
    pub fn new(
        agent: Arc<dyn PageAgent>,
        interval: Duration,
        context_rx: watch::Receiver<Option<ContextHandle>>,
    ) -> Self {
        Self {
            agent,
            interval,
            context_rx,
        }
    }

    async fn ping(&self) {
        let handle = self.context_rx.borrow().clone();
        let Some(handle) = handle else {
            debug!("Keep-alive: no active context");
            return;
        };
        match self.agent.ping(&handle).await {
            Ok(()) => debug!(context = %handle, "Keep-alive ping"),
            Err(e) => warn!(context = %handle, error = %e, "Keep-alive ping failed"),
        }
    }

    pub async fn run_loop(self) {
        info!(interval_secs = self.interval.as_secs(), "KeepAliveService started");

        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick completes immediately.
        interval.tick().await;

        loop {
            interval.tick().await;
            self.ping().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::AgentDirective;
    use async_trait::async_trait;
    use outreach_core::{Error, Result};
    use std::sync::Mutex;

    #[derive(Default)]
    struct CountingAgent {
        pings: Mutex<Vec<String>>,
        fail: bool,
    }

    #[async_trait]
    impl PageAgent for CountingAgent {
        async fn deliver(&self, _: &ContextHandle, _: &AgentDirective) -> Result<()> {
            Ok(())
        }

        async fn ping(&self, context: &ContextHandle) -> Result<()> {
            self.pings.lock().unwrap().push(context.to_string());
            if self.fail {
                return Err(Error::Agent("tab unresponsive".into()));
            }
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_pings_follow_the_active_context() {
        let agent = Arc::new(CountingAgent::default());
        let (tx, rx) = watch::channel(None);
        let service = KeepAliveService::new(agent.clone(), Duration::from_secs(25), rx);
        let task = tokio::spawn(service.run_loop());

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(agent.pings.lock().unwrap().is_empty());

        tx.send_replace(Some(ContextHandle::new("tab-1")));
        tokio::time::sleep(Duration::from_secs(25)).await;
        tx.send_replace(Some(ContextHandle::new("tab-2")));
        tokio::time::sleep(Duration::from_secs(25)).await;

        task.abort();
        assert_eq!(*agent.pings.lock().unwrap(), vec!["tab-1", "tab-2"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ping_failures_do_not_stop_the_loop() {
        let agent = Arc::new(CountingAgent {
            fail: true,
            ..Default::default()
        });
        let (_tx, rx) = watch::channel(Some(ContextHandle::new("tab-1")));
        let task = tokio::spawn(
            KeepAliveService::new(agent.clone(), Duration::from_secs(10), rx).run_loop(),
        );

        tokio::time::sleep(Duration::from_secs(35)).await;
        task.abort();
        assert_eq!(agent.pings.lock().unwrap().len(), 3);
    }
}
