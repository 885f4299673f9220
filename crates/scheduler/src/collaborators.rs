//! Seams between the engagement worker and the outside world.
//!
//! Every side effect the worker triggers goes through one of these traits so
//! the state machine can be driven with fakes.

use async_trait::async_trait;
use outreach_core::{Candidate, ContextHandle, Credentials, EngagementSettings, Result};
use outreach_storage::{EngagementStats, StatsStore};
use serde::Serialize;
use std::sync::Arc;

/// Supplies the candidate list for a list id.
#[async_trait]
pub trait CandidateSource: Send + Sync {
    async fn fetch_candidates(
        &self,
        list_id: &str,
        credentials: &Credentials,
    ) -> Result<Vec<Candidate>>;
}

/// Owns the dedicated browser context.
#[async_trait]
pub trait NavigationDriver: Send + Sync {
    /// Return a usable context, preferring `cached` when it still exists.
    async fn acquire_context(&self, cached: Option<&ContextHandle>) -> Result<ContextHandle>;

    /// Navigate `context` to `address` and wait for the load to complete.
    /// Returns the address actually reached, which may differ after redirects.
    async fn navigate(&self, context: &ContextHandle, address: &str) -> Result<String>;
}

/// Records activities against the remote ledger.
#[async_trait]
pub trait ActivityRecorder: Send + Sync {
    /// Record a visit and return the ledger-assigned activity id.
    async fn record_visit(&self, candidate_id: &str, credentials: &Credentials) -> Result<String>;
}

/// The in-page agent that performs the per-candidate work.
#[async_trait]
pub trait PageAgent: Send + Sync {
    /// Hand a directive to the agent running in `context`. Completion is
    /// reported later as a separate event.
    async fn deliver(&self, context: &ContextHandle, directive: &AgentDirective) -> Result<()>;

    /// Cheap liveness probe used by the keep-alive loop.
    async fn ping(&self, context: &ContextHandle) -> Result<()>;
}

/// Read-only access to today's engagement counters.
#[async_trait]
pub trait EngagementCounters: Send + Sync {
    async fn daily_counts(&self) -> Result<EngagementStats>;
}

#[async_trait]
impl EngagementCounters for StatsStore {
    async fn daily_counts(&self) -> Result<EngagementStats> {
        self.load().await
    }
}

/// Work order for the page agent.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentDirective {
    pub activity_id: String,
    pub candidate_id: String,
    pub profile_address: String,
    #[serde(flatten)]
    pub credentials: Credentials,
    pub settings: EngagementSettings,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
}

/// Everything the worker talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub candidates: Arc<dyn CandidateSource>,
    pub navigator: Arc<dyn NavigationDriver>,
    pub recorder: Arc<dyn ActivityRecorder>,
    pub agent: Arc<dyn PageAgent>,
    pub counters: Arc<dyn EngagementCounters>,
}
