//! The engagement worker.
//!
//! A single task owns the [`Session`] and handles one [`Event`] at a time.
//! Anything that takes time (remote calls, navigation, timers) runs in a
//! spawned task that reports back through the same channel, stamped with the
//! generation and cursor it was started for. A result whose stamp no longer
//! matches is stale and dropped.
//!
//! Per candidate:
//!
//! ```text
//! Waiting -> Evaluating -> Navigating -> RecordingVisit -> DelegatingToAgent
//!    ^          |  quota                                      | completed / timeout
//!    |          v                                             v
//!    |        Paused (cool-down, same candidate)           advance
//!    +---------------------------------------------------------+
//! ```

use crate::collaborators::{AgentDirective, Collaborators};
use crate::event::{Event, ResumeOutcome};
use crate::handle::WorkerHandle;
use crate::keepalive::KeepAliveService;
use crate::policy::{self, Pacing, QUOTA_REASON};
use crate::session::{InFlight, Phase, Session, Stamp, TaskSlot};
use outreach_core::{
    eligible_candidates, AgentCompletion, Config, ContextHandle, Credentials, EngagementSettings,
    Error, Result, SettingsOverride, StartOutcome, StatusSnapshot, StopRecord,
};
use outreach_storage::{RestoreCheck, SessionStateStore};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::future::Future;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

const EVENT_BUFFER: usize = 64;

pub struct EngagementWorker {
    session: Session,
    collaborators: Collaborators,
    state: SessionStateStore,
    defaults: EngagementSettings,
    pacing: Pacing,
    events_tx: mpsc::Sender<Event>,
    events_rx: mpsc::Receiver<Event>,
    context_tx: watch::Sender<Option<ContextHandle>>,
    keepalive: TaskSlot,
    last_stop: Option<StopRecord>,
    rng: StdRng,
    today: fn() -> String,
}

impl EngagementWorker {
    pub fn new(collaborators: Collaborators, state: SessionStateStore, config: &Config) -> Self {
        let (events_tx, events_rx) = mpsc::channel(EVENT_BUFFER);
        let (context_tx, _) = watch::channel(None);
        Self {
            session: Session::default(),
            collaborators,
            state,
            defaults: config.engagement.clone(),
            pacing: Pacing::from(&config.timing),
            events_tx,
            events_rx,
            context_tx,
            keepalive: TaskSlot::default(),
            last_stop: None,
            rng: StdRng::from_entropy(),
            today: outreach_storage::today,
        }
    }

    /// Deterministic delays.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    /// Override the calendar date used for the daily quota.
    pub fn with_today(mut self, today: fn() -> String) -> Self {
        self.today = today;
        self
    }

    pub fn handle(&self) -> WorkerHandle {
        WorkerHandle::new(self.events_tx.clone())
    }

    /// Follow the active browser context.
    pub fn context_watch(&self) -> watch::Receiver<Option<ContextHandle>> {
        self.context_tx.subscribe()
    }

    pub fn spawn(self, shutdown: broadcast::Receiver<()>) -> (WorkerHandle, JoinHandle<()>) {
        let handle = self.handle();
        let task = tokio::spawn(self.run(shutdown));
        (handle, task)
    }

    /// Process events until shutdown. Persisted state is left in place so the
    /// session resumes on the next start of the process.
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        info!("EngagementWorker started");
        loop {
            tokio::select! {
                event = self.events_rx.recv() => match event {
                    Some(event) => self.handle_event(event).await,
                    None => break,
                },
                _ = shutdown.recv() => {
                    info!("EngagementWorker shutting down");
                    break;
                }
            }
        }
        self.session.cancel_timers();
        self.keepalive.cancel();
    }

    async fn handle_event(&mut self, event: Event) {
        debug!(event = event.name(), phase = self.session.phase.as_str(), "Handling event");
        match event {
            Event::Start {
                list_id,
                credentials,
                overrides,
                prompt,
                reply,
            } => {
                let result = self.start(list_id, credentials, overrides, prompt).await;
                let _ = reply.send(result);
            }
            Event::Stop { reason, reply } => {
                self.stop_and_clear(&reason).await;
                if let Some(reply) = reply {
                    let _ = reply.send(());
                }
            }
            Event::Status { reply } => {
                let _ = reply.send(self.snapshot());
            }
            Event::Resume { reply } => {
                let outcome = self.resume().await;
                if let Some(reply) = reply {
                    let _ = reply.send(outcome);
                }
            }
            Event::AgentCompleted { completion } => self.on_agent_completed(completion).await,
            Event::ContextClosed { handle } => self.on_context_closed(handle).await,
            Event::Evaluate { stamp } => self.on_evaluate(stamp).await,
            Event::ContextAcquired { stamp, result } => {
                self.on_context_acquired(stamp, result).await
            }
            Event::NavigationSettled {
                stamp,
                handle,
                result,
            } => self.on_navigation_settled(stamp, handle, result).await,
            Event::VisitRecorded { stamp, result } => self.on_visit_recorded(stamp, result).await,
            Event::AgentDelivered { stamp, result } => {
                self.on_agent_delivered(stamp, result).await
            }
            Event::AgentTimedOut { stamp } => self.on_agent_timed_out(stamp).await,
        }
    }

    fn snapshot(&self) -> StatusSnapshot {
        let mut snapshot = self.session.snapshot();
        snapshot.last_stop = self.last_stop.clone();
        snapshot
    }

    // ---- commands ----

    async fn start(
        &mut self,
        list_id: String,
        credentials: Credentials,
        overrides: Option<SettingsOverride>,
        prompt: Option<String>,
    ) -> Result<StartOutcome> {
        if self.session.is_engaging {
            return Err(Error::AlreadyRunning(
                self.session.list_id.clone().unwrap_or_default(),
            ));
        }
        let list_id = list_id.trim().to_string();
        if list_id.is_empty() {
            return Err(Error::Validation("list id is required".into()));
        }
        if !credentials.is_complete() {
            return Err(Error::Validation(
                "token and workspace id are required".into(),
            ));
        }
        let settings = self.defaults.merged(overrides.as_ref());
        let prompt = prompt.filter(|p| !p.trim().is_empty());

        info!(list_id = %list_id, "Starting engagement session");
        let source = self.collaborators.candidates.clone();
        let fetched = match source.fetch_candidates(&list_id, &credentials).await {
            Ok(fetched) => fetched,
            Err(e) => {
                warn!(list_id = %list_id, error = %e, "Candidate fetch failed");
                self.stop_and_clear("candidate fetch failed").await;
                return Err(e);
            }
        };
        let fetched_count = fetched.len();
        let customers = eligible_candidates(fetched);
        if customers.is_empty() {
            info!(
                list_id = %list_id,
                fetched = fetched_count,
                "No eligible candidates, nothing to do"
            );
            self.stop_and_clear("nothing to do").await;
            return Ok(StartOutcome::NothingToDo);
        }

        let total = customers.len();
        info!(
            list_id = %list_id,
            total,
            skipped = fetched_count - total,
            min_delay_secs = settings.min_delay_secs,
            max_delay_secs = settings.max_delay_secs,
            daily_limit = settings.daily_limit,
            "Engagement session started"
        );
        self.session
            .begin(list_id, credentials, customers, 0, settings, prompt);
        self.persist().await;
        self.start_keepalive();
        let stamp = self.session.stamp();
        self.on_evaluate(stamp).await;
        Ok(StartOutcome::Started { total })
    }

    /// Cancel everything, clear persisted state, reset. Idempotent.
    async fn stop_and_clear(&mut self, reason: &str) {
        let was_live = self.session.is_engaging;
        self.session.cancel_timers();
        self.keepalive.cancel();
        if let Err(e) = self.state.clear().await {
            error!(error = %e, "Failed to clear persisted engagement state");
        }
        if was_live {
            info!(
                list_id = ?self.session.list_id,
                final_index = self.session.current_index,
                total = self.session.total(),
                reason,
                "Engagement session stopped"
            );
            self.last_stop = Some(StopRecord {
                list_id: self.session.list_id.clone(),
                final_index: self.session.current_index,
                reason: reason.to_string(),
            });
        } else {
            debug!(reason, "Stop requested with no live session");
        }
        self.session.reset();
        self.set_context(None);
    }

    async fn resume(&mut self) -> ResumeOutcome {
        if self.session.is_engaging {
            return ResumeOutcome::AlreadyRunning;
        }
        let persisted = match self.state.load().await {
            Ok(persisted) => persisted,
            Err(e) => return self.discard(format!("unreadable persisted state: {}", e)).await,
        };
        let restorable = match persisted.check() {
            RestoreCheck::Idle => return ResumeOutcome::NothingPersisted,
            RestoreCheck::Corrupt(why) => {
                return self.discard(format!("corrupt persisted state: {}", why)).await
            }
            RestoreCheck::Ready(restorable) => restorable,
        };

        let source = self.collaborators.candidates.clone();
        let fetched = match source
            .fetch_candidates(&restorable.list_id, &restorable.credentials)
            .await
        {
            Ok(fetched) => fetched,
            Err(e) => return self.discard(format!("candidate fetch failed: {}", e)).await,
        };
        let customers = eligible_candidates(fetched);
        if customers.is_empty() {
            return self.discard("no eligible candidates".to_string()).await;
        }
        if restorable.current_index >= customers.len() {
            return self
                .discard(format!(
                    "cursor {} out of bounds for {} candidates",
                    restorable.current_index,
                    customers.len()
                ))
                .await;
        }

        let index = restorable.current_index;
        let total = customers.len();
        self.session.begin(
            restorable.list_id,
            restorable.credentials,
            customers,
            index,
            restorable
                .settings
                .unwrap_or_else(|| self.defaults.clone()),
            restorable.prompt_override,
        );
        self.session.current_activity_id = restorable.current_activity_id;
        self.set_context(restorable.active_context_handle);
        self.start_keepalive();
        info!(
            list_id = ?self.session.list_id,
            index,
            total,
            settle_secs = self.pacing.resume_settle.as_secs(),
            "Restored engagement session"
        );
        self.schedule_evaluation(self.pacing.resume_settle);
        ResumeOutcome::Resumed { index, total }
    }

    async fn discard(&mut self, reason: String) -> ResumeOutcome {
        warn!(reason = %reason, "Cannot resume engagement session");
        self.stop_and_clear(&reason).await;
        ResumeOutcome::Cleared { reason }
    }

    // ---- per-candidate steps ----

    async fn on_evaluate(&mut self, stamp: Stamp) {
        if !self.session.is_current(stamp)
            || !matches!(self.session.phase, Phase::Waiting | Phase::Paused)
        {
            debug!(?stamp, "Dropping stale evaluation");
            return;
        }
        self.session.next_candidate.disarm();

        let credentials_ok = self
            .session
            .credentials
            .as_ref()
            .map(Credentials::is_complete)
            .unwrap_or(false);
        if !credentials_ok {
            warn!("Engaging without credentials");
            self.stop_and_clear("invalid state").await;
            return;
        }

        self.session.phase = Phase::Evaluating;
        if !self.quota_allows().await {
            self.pause(QUOTA_REASON).await;
            return;
        }

        let index = self.session.current_index;
        let candidate = match self.session.customers.get(index) {
            Some(candidate) => candidate.clone(),
            None => {
                self.stop_and_clear("list complete").await;
                return;
            }
        };
        let address = match candidate.address() {
            Some(address) => address.to_string(),
            None => {
                warn!(candidate = %candidate.id, "Candidate has no profile address");
                self.advance("invalid data").await;
                return;
            }
        };

        info!(
            index,
            total = self.session.total(),
            candidate = %candidate.id,
            address = %address,
            "Engaging candidate"
        );
        self.session.in_flight = Some(InFlight {
            candidate_id: candidate.id,
            address,
        });
        self.session.phase = Phase::Navigating;

        let navigator = self.collaborators.navigator.clone();
        let cached = self.session.active_context_handle.clone();
        let task = self.spawn_event(async move {
            let result = navigator.acquire_context(cached.as_ref()).await;
            Event::ContextAcquired { stamp, result }
        });
        self.session.pending_call.arm(task);
    }

    async fn quota_allows(&mut self) -> bool {
        let limit = self.session.settings.daily_limit;
        if limit <= 0 {
            return true;
        }
        let counters = self.collaborators.counters.clone();
        match counters.daily_counts().await {
            Ok(stats) => policy::quota_allows(&stats, limit, &(self.today)()),
            Err(e) => {
                warn!(error = %e, "Could not read engagement counters, continuing");
                true
            }
        }
    }

    async fn on_context_acquired(&mut self, stamp: Stamp, result: Result<ContextHandle>) {
        if !self.session.is_current(stamp) || self.session.phase != Phase::Navigating {
            debug!(?stamp, "Dropping stale context acquisition");
            return;
        }
        self.session.pending_call.disarm();

        let handle = match result {
            Ok(handle) => handle,
            Err(e) => {
                warn!(error = %e, "No usable browser context");
                self.advance("navigation failed").await;
                return;
            }
        };
        if self.session.active_context_handle.as_ref() != Some(&handle) {
            info!(context = %handle, "Using browser context");
            self.set_context(Some(handle.clone()));
        }
        let address = match &self.session.in_flight {
            Some(in_flight) => in_flight.address.clone(),
            None => {
                self.advance("invalid state").await;
                return;
            }
        };

        let navigator = self.collaborators.navigator.clone();
        let task = self.spawn_event(async move {
            let result = navigator.navigate(&handle, &address).await;
            Event::NavigationSettled {
                stamp,
                handle,
                result,
            }
        });
        self.session.navigation.arm(task);
    }

    async fn on_navigation_settled(
        &mut self,
        stamp: Stamp,
        handle: ContextHandle,
        result: Result<String>,
    ) {
        if !self.session.is_current(stamp)
            || self.session.phase != Phase::Navigating
            || self.session.active_context_handle.as_ref() != Some(&handle)
        {
            debug!(?stamp, context = %handle, "Dropping stale navigation event");
            return;
        }
        self.session.navigation.disarm();

        let intended = self
            .session
            .in_flight
            .as_ref()
            .map(|f| f.address.clone())
            .unwrap_or_default();
        match result {
            Ok(reached) if policy::destination_matches(&reached, &intended) => {
                debug!(reached = %reached, "Navigation complete");
                self.begin_recording().await;
            }
            Ok(reached) => {
                warn!(intended = %intended, reached = %reached, "Landed on unexpected page");
                self.advance("unexpected destination").await;
            }
            Err(e) => {
                warn!(address = %intended, error = %e, "Navigation failed");
                self.advance("navigation failed").await;
            }
        }
    }

    async fn begin_recording(&mut self) {
        let (candidate_id, credentials) = match (&self.session.in_flight, &self.session.credentials)
        {
            (Some(in_flight), Some(credentials)) => {
                (in_flight.candidate_id.clone(), credentials.clone())
            }
            _ => {
                self.advance("invalid state").await;
                return;
            }
        };
        self.session.phase = Phase::RecordingVisit;

        let stamp = self.session.stamp();
        let recorder = self.collaborators.recorder.clone();
        let task = self.spawn_event(async move {
            let result = recorder.record_visit(&candidate_id, &credentials).await;
            Event::VisitRecorded { stamp, result }
        });
        self.session.pending_call.arm(task);
    }

    async fn on_visit_recorded(&mut self, stamp: Stamp, result: Result<String>) {
        if !self.session.is_current(stamp) || self.session.phase != Phase::RecordingVisit {
            debug!(?stamp, "Dropping stale visit record");
            return;
        }
        self.session.pending_call.disarm();

        match result {
            Ok(activity_id) => {
                debug!(activity_id = %activity_id, "Visit recorded");
                self.session.current_activity_id = Some(activity_id);
                self.persist().await;
                self.delegate().await;
            }
            Err(e) => {
                warn!(error = %e, "Recording visit failed");
                self.advance("record-visit failed").await;
            }
        }
    }

    async fn delegate(&mut self) {
        let context = self.session.active_context_handle.clone();
        let directive = self.directive();
        let (context, directive) = match (context, directive) {
            (Some(context), Some(directive)) => (context, directive),
            _ => {
                warn!("Nothing to delegate to the page agent");
                self.advance("delivery failed").await;
                return;
            }
        };
        self.session.phase = Phase::DelegatingToAgent;

        let stamp = self.session.stamp();
        let timeout = self.pacing.agent_timeout;
        let timer = self.spawn_event(async move {
            tokio::time::sleep(timeout).await;
            Event::AgentTimedOut { stamp }
        });
        self.session.agent_wait.arm(timer);

        let agent = self.collaborators.agent.clone();
        let task = self.spawn_event(async move {
            let result = agent.deliver(&context, &directive).await;
            Event::AgentDelivered { stamp, result }
        });
        self.session.pending_call.arm(task);
    }

    fn directive(&self) -> Option<AgentDirective> {
        let in_flight = self.session.in_flight.as_ref()?;
        Some(AgentDirective {
            activity_id: self.session.current_activity_id.clone()?,
            candidate_id: in_flight.candidate_id.clone(),
            profile_address: in_flight.address.clone(),
            credentials: self.session.credentials.clone()?,
            settings: self.session.settings.clone(),
            prompt: self.session.prompt_override.clone(),
        })
    }

    async fn on_agent_delivered(&mut self, stamp: Stamp, result: Result<()>) {
        if !self.session.is_current(stamp) || self.session.phase != Phase::DelegatingToAgent {
            debug!(?stamp, "Dropping stale delivery result");
            return;
        }
        self.session.pending_call.disarm();

        match result {
            Ok(()) => debug!(
                timeout_secs = self.pacing.agent_timeout.as_secs(),
                "Directive delivered, waiting for the page agent"
            ),
            Err(e) => {
                warn!(error = %e, "Could not deliver directive to the page agent");
                self.session.agent_wait.cancel();
                self.advance("delivery failed").await;
            }
        }
    }

    async fn on_agent_completed(&mut self, completion: AgentCompletion) {
        let AgentCompletion {
            reason,
            handle,
            activity_id,
        } = completion;
        if !self.session.is_engaging || self.session.phase != Phase::DelegatingToAgent {
            debug!(reason = %reason, "Ignoring agent completion outside delegation");
            return;
        }
        if let Some(handle) = &handle {
            if self.session.active_context_handle.as_ref() != Some(handle) {
                debug!(context = %handle, reason = %reason, "Ignoring completion from another context");
                return;
            }
        }
        if let Some(activity_id) = &activity_id {
            if self.session.current_activity_id.as_deref() != Some(activity_id.as_str()) {
                debug!(
                    activity_id = %activity_id,
                    current = ?self.session.current_activity_id,
                    reason = %reason,
                    "Ignoring completion for an earlier visit"
                );
                return;
            }
        }
        self.session.agent_wait.cancel();
        info!(
            index = self.session.current_index,
            reason = %reason,
            "Page agent finished"
        );
        self.advance(&reason).await;
    }

    async fn on_agent_timed_out(&mut self, stamp: Stamp) {
        if !self.session.is_current(stamp) || self.session.phase != Phase::DelegatingToAgent {
            debug!(?stamp, "Dropping stale agent timeout");
            return;
        }
        self.session.agent_wait.disarm();
        self.session.navigation.cancel();
        warn!(
            index = self.session.current_index,
            timeout_secs = self.pacing.agent_timeout.as_secs(),
            "Page agent did not report back in time"
        );
        self.advance("agent timeout").await;
    }

    async fn on_context_closed(&mut self, handle: ContextHandle) {
        if self.session.active_context_handle.as_ref() != Some(&handle) {
            debug!(context = %handle, "Closed context is not the active one");
            return;
        }
        info!(context = %handle, "Active browser context closed");
        self.set_context(None);
        if !self.session.is_engaging {
            return;
        }
        if self.session.phase == Phase::Navigating && self.session.navigation.is_armed() {
            self.advance("context closed").await;
        } else {
            self.persist().await;
        }
    }

    // ---- transitions ----

    /// Leave the current candidate. Quota reasons pause on the same candidate
    /// instead.
    async fn advance(&mut self, reason: &str) {
        if !self.session.is_engaging {
            return;
        }
        self.session.cancel_timers();
        if policy::is_quota_reason(reason) {
            self.pause(reason).await;
            return;
        }

        let finished = self.session.current_index;
        self.session.current_index = (finished + 1).min(self.session.total());
        self.session.current_activity_id = None;
        self.session.in_flight = None;
        self.session.last_reason = Some(reason.to_string());
        self.session.phase = Phase::Waiting;

        let delay = policy::next_delay(&self.session.settings, &mut self.rng);
        info!(
            finished,
            next = self.session.current_index,
            reason,
            delay_ms = delay.as_millis() as u64,
            "Advancing to next candidate"
        );
        self.persist().await;
        self.schedule_evaluation(delay);
    }

    async fn pause(&mut self, reason: &str) {
        self.session.cancel_timers();
        self.session.current_activity_id = None;
        self.session.in_flight = None;
        self.session.last_reason = Some(reason.to_string());
        self.session.phase = Phase::Paused;
        info!(
            index = self.session.current_index,
            cooldown_secs = self.pacing.quota_cooldown.as_secs(),
            reason,
            "Daily limit reached, pausing"
        );
        self.persist().await;
        self.schedule_evaluation(self.pacing.quota_cooldown);
    }

    fn schedule_evaluation(&mut self, delay: Duration) {
        let stamp = self.session.stamp();
        let task = self.spawn_event(async move {
            tokio::time::sleep(delay).await;
            Event::Evaluate { stamp }
        });
        self.session.next_candidate.arm(task);
    }

    // ---- plumbing ----

    fn spawn_event<F>(&self, produce: F) -> JoinHandle<()>
    where
        F: Future<Output = Event> + Send + 'static,
    {
        let tx = self.events_tx.clone();
        tokio::spawn(async move {
            let event = produce.await;
            let _ = tx.send(event).await;
        })
    }

    async fn persist(&mut self) {
        let snapshot = self.session.to_persisted();
        if let Err(e) = self.state.save(&snapshot).await {
            error!(error = %e, "Failed to persist engagement session");
        }
    }

    fn set_context(&mut self, handle: Option<ContextHandle>) {
        self.session.active_context_handle = handle.clone();
        self.context_tx.send_replace(handle);
    }

    fn start_keepalive(&mut self) {
        let service = KeepAliveService::new(
            self.collaborators.agent.clone(),
            self.pacing.keepalive_interval,
            self.context_tx.subscribe(),
        );
        self.keepalive.arm(tokio::spawn(service.run_loop()));
    }
}
