//! Scriptable collaborators for driving the worker in tests.

use crate::collaborators::{
    ActivityRecorder, AgentDirective, CandidateSource, Collaborators, EngagementCounters,
    NavigationDriver, PageAgent,
};
use async_trait::async_trait;
use outreach_core::{Candidate, Config, ContextHandle, Credentials, Error, Result};
use outreach_storage::EngagementStats;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub const TODAY: &str = "2026-10-15";

pub fn today() -> String {
    TODAY.to_string()
}

pub fn address(i: usize) -> String {
    format!("https://www.linkedin.com/in/c{}/", i)
}

/// `c1..=cN`, all eligible.
pub fn candidates(n: usize) -> Vec<Candidate> {
    (1..=n)
        .map(|i| Candidate::new(&format!("c{}", i), &address(i)))
        .collect()
}

pub fn credentials() -> Credentials {
    Credentials::new("tok-123", "ws-1")
}

pub fn test_config() -> Config {
    let mut config = Config::default();
    config.engagement.min_delay_secs = 10;
    config.engagement.max_delay_secs = 20;
    config.engagement.daily_limit = 0;
    config
}

#[derive(Default)]
pub struct FakeSource {
    candidates: Mutex<Vec<Candidate>>,
    pub fail: AtomicBool,
    pub fetches: AtomicUsize,
}

impl FakeSource {
    pub fn set(&self, candidates: Vec<Candidate>) {
        *self.candidates.lock().unwrap() = candidates;
    }
}

#[async_trait]
impl CandidateSource for FakeSource {
    async fn fetch_candidates(&self, _: &str, _: &Credentials) -> Result<Vec<Candidate>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::Ledger("list unavailable".into()));
        }
        Ok(self.candidates.lock().unwrap().clone())
    }
}

#[derive(Default)]
pub struct FakeNavigator {
    redirects: Mutex<HashMap<String, String>>,
    visited: Mutex<Vec<String>>,
    pub fail_acquire: AtomicBool,
    /// Navigations never settle.
    pub hang: AtomicBool,
    tabs: AtomicUsize,
}

impl FakeNavigator {
    pub fn redirect(&self, from: &str, to: &str) {
        self.redirects
            .lock()
            .unwrap()
            .insert(from.to_string(), to.to_string());
    }

    pub fn visited(&self) -> Vec<String> {
        self.visited.lock().unwrap().clone()
    }
}

#[async_trait]
impl NavigationDriver for FakeNavigator {
    async fn acquire_context(&self, cached: Option<&ContextHandle>) -> Result<ContextHandle> {
        if self.fail_acquire.load(Ordering::SeqCst) {
            return Err(Error::Browser("no debuggable browser".into()));
        }
        match cached {
            Some(handle) => Ok(handle.clone()),
            None => {
                let n = self.tabs.fetch_add(1, Ordering::SeqCst) + 1;
                Ok(ContextHandle::new(format!("tab-{}", n)))
            }
        }
    }

    async fn navigate(&self, _: &ContextHandle, address: &str) -> Result<String> {
        self.visited.lock().unwrap().push(address.to_string());
        if self.hang.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        let reached = self.redirects.lock().unwrap().get(address).cloned();
        Ok(reached.unwrap_or_else(|| address.to_string()))
    }
}

#[derive(Default)]
pub struct FakeRecorder {
    visits: Mutex<Vec<String>>,
    failing: Mutex<HashSet<String>>,
}

impl FakeRecorder {
    pub fn fail_for(&self, candidate_id: &str) {
        self.failing.lock().unwrap().insert(candidate_id.to_string());
    }

    pub fn visits(&self) -> Vec<String> {
        self.visits.lock().unwrap().clone()
    }
}

#[async_trait]
impl ActivityRecorder for FakeRecorder {
    async fn record_visit(&self, candidate_id: &str, _: &Credentials) -> Result<String> {
        self.visits.lock().unwrap().push(candidate_id.to_string());
        if self.failing.lock().unwrap().contains(candidate_id) {
            return Err(Error::Ledger("502 Bad Gateway".into()));
        }
        Ok(format!("act-{}", candidate_id))
    }
}

#[derive(Default)]
pub struct FakeAgent {
    delivered: Mutex<Vec<AgentDirective>>,
    pub fail: AtomicBool,
    pub pings: AtomicUsize,
}

impl FakeAgent {
    pub fn delivered(&self) -> Vec<AgentDirective> {
        self.delivered.lock().unwrap().clone()
    }
}

#[async_trait]
impl PageAgent for FakeAgent {
    async fn deliver(&self, _: &ContextHandle, directive: &AgentDirective) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::Agent("content script not injected".into()));
        }
        self.delivered.lock().unwrap().push(directive.clone());
        Ok(())
    }

    async fn ping(&self, _: &ContextHandle) -> Result<()> {
        self.pings.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeCounters {
    stats: Mutex<EngagementStats>,
    pub reads: AtomicUsize,
}

impl FakeCounters {
    pub fn set(&self, posts: u32, comments: u32) {
        *self.stats.lock().unwrap() = EngagementStats {
            posts_engaged_today: posts,
            comments_posted_today: comments,
            last_reset_date: Some(TODAY.to_string()),
        };
    }
}

#[async_trait]
impl EngagementCounters for FakeCounters {
    async fn daily_counts(&self) -> Result<EngagementStats> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        Ok(self.stats.lock().unwrap().clone())
    }
}

pub struct Fakes {
    pub source: Arc<FakeSource>,
    pub navigator: Arc<FakeNavigator>,
    pub recorder: Arc<FakeRecorder>,
    pub agent: Arc<FakeAgent>,
    pub counters: Arc<FakeCounters>,
}

impl Fakes {
    pub fn new(candidates: Vec<Candidate>) -> Self {
        let source = Arc::new(FakeSource::default());
        source.set(candidates);
        Self {
            source,
            navigator: Arc::new(FakeNavigator::default()),
            recorder: Arc::new(FakeRecorder::default()),
            agent: Arc::new(FakeAgent::default()),
            counters: Arc::new(FakeCounters::default()),
        }
    }

    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            candidates: self.source.clone(),
            navigator: self.navigator.clone(),
            recorder: self.recorder.clone(),
            agent: self.agent.clone(),
            counters: self.counters.clone(),
        }
    }
}
