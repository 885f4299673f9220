use crate::pool::CdpPool;
use crate::tabs::{choose_tab, TabChoice};
use async_trait::async_trait;
use outreach_core::config::BrowserConfig;
use outreach_core::{ContextHandle, Error, Result};
use outreach_scheduler::NavigationDriver;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Drives the dedicated tab of an already running browser.
pub struct CdpNavigationDriver {
    pool: Arc<CdpPool>,
    domain: String,
    navigation_timeout: Duration,
    /// Tabs this process has dedicated; preferred over arbitrary on-domain tabs.
    pinned: Mutex<HashSet<String>>,
}

impl CdpNavigationDriver {
    pub fn new(pool: Arc<CdpPool>, config: &BrowserConfig) -> Self {
        Self {
            pool,
            domain: config.domain.trim().to_string(),
            navigation_timeout: Duration::from_secs(config.navigation_timeout_secs.max(1)),
            pinned: Mutex::new(HashSet::new()),
        }
    }

    fn landing_url(&self) -> String {
        format!("https://www.{}/", self.domain.trim_start_matches("www."))
    }
}

#[async_trait]
impl NavigationDriver for CdpNavigationDriver {
    async fn acquire_context(&self, cached: Option<&ContextHandle>) -> Result<ContextHandle> {
        let targets = self.pool.endpoint().list_targets().await?;
        let mut pinned = self.pinned.lock().await;
        let choice = choose_tab(
            &targets,
            cached.map(ContextHandle::as_str),
            &pinned,
            &self.domain,
        );

        let id = match &choice {
            TabChoice::Create => {
                let created = self.pool.endpoint().new_target(&self.landing_url()).await?;
                info!(context = %created.id, "Opened dedicated tab");
                created.id
            }
            other => {
                let id = other.target_id().unwrap_or_default().to_string();
                debug!(context = %id, choice = ?other, "Reusing tab");
                id
            }
        };
        if id.is_empty() {
            return Err(Error::Browser("Tab resolution produced no target".into()));
        }
        pinned.insert(id.clone());
        Ok(ContextHandle::new(id))
    }

    async fn navigate(&self, context: &ContextHandle, address: &str) -> Result<String> {
        let client = self.pool.client(context).await?;

        // Subscribe first so the load of this navigation cannot be missed.
        let mut loaded = client.subscribe_event("Page.loadEventFired").await;
        client.navigate(address).await?;

        match tokio::time::timeout(self.navigation_timeout, loaded.recv()).await {
            Ok(Some(_)) => {}
            Ok(None) => {
                self.pool.forget(context).await;
                return Err(Error::Browser(format!(
                    "Tab {} closed during navigation",
                    context
                )));
            }
            Err(_) => {
                return Err(Error::Timeout(format!(
                    "{} did not finish loading within {}s",
                    address,
                    self.navigation_timeout.as_secs()
                )))
            }
        }

        match client.evaluate_js("window.location.href").await? {
            Value::String(href) => Ok(href),
            other => Err(Error::Browser(format!(
                "Unexpected location value: {}",
                other
            ))),
        }
    }
}
