//! Daily engagement counters kept by the engagement logger.
//!
//! The worker only reads these; likes and comments are counted by whoever
//! observes them (the page agent's reports via the gateway).

use crate::store::StateStore;
use chrono::Local;
use outreach_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

pub const STATS_NAMESPACE: &str = "stats";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngagementStats {
    #[serde(default)]
    pub posts_engaged_today: u32,
    #[serde(default)]
    pub comments_posted_today: u32,
    /// `YYYY-MM-DD` of the day the counters belong to.
    #[serde(default)]
    pub last_reset_date: Option<String>,
}

impl EngagementStats {
    /// Counters as they apply on `today`: zero if they belong to another day.
    pub fn effective_for(&self, today: &str) -> (u32, u32) {
        if self.last_reset_date.as_deref() == Some(today) {
            (self.posts_engaged_today, self.comments_posted_today)
        } else {
            (0, 0)
        }
    }

    fn roll_over(&mut self, today: &str) {
        if self.last_reset_date.as_deref() != Some(today) {
            self.posts_engaged_today = 0;
            self.comments_posted_today = 0;
            self.last_reset_date = Some(today.to_string());
        }
    }
}

/// Local calendar date in the format used by `last_reset_date`.
pub fn today() -> String {
    Local::now().format("%Y-%m-%d").to_string()
}

pub struct StatsStore {
    store: Arc<dyn StateStore>,
    update_lock: Mutex<()>,
}

impl StatsStore {
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self {
            store,
            update_lock: Mutex::new(()),
        }
    }

    pub async fn load(&self) -> Result<EngagementStats> {
        match self.store.load(STATS_NAMESPACE).await? {
            Some(entries) => Ok(serde_json::from_value(serde_json::Value::Object(entries))?),
            None => Ok(EngagementStats::default()),
        }
    }

    pub async fn record_like(&self, today: &str) -> Result<EngagementStats> {
        self.update(today, |s| s.posts_engaged_today += 1).await
    }

    pub async fn record_comment(&self, today: &str) -> Result<EngagementStats> {
        self.update(today, |s| s.comments_posted_today += 1).await
    }

    async fn update<F>(&self, today: &str, apply: F) -> Result<EngagementStats>
    where
        F: FnOnce(&mut EngagementStats),
    {
        let _guard = self.update_lock.lock().await;
        let mut stats = self.load().await?;
        stats.roll_over(today);
        apply(&mut stats);

        let entries = match serde_json::to_value(&stats)? {
            serde_json::Value::Object(map) => map,
            _ => return Err(Error::Storage("engagement stats must serialize to an object".into())),
        };
        self.store.save(STATS_NAMESPACE, entries).await?;
        debug!(
            posts = stats.posts_engaged_today,
            comments = stats.comments_posted_today,
            "Updated engagement counters"
        );
        Ok(stats)
    }
}
