//! In-memory engagement session owned by the worker task.

use outreach_core::{Candidate, ContextHandle, Credentials, EngagementSettings, StatusSnapshot};
use outreach_storage::PersistedSession;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Evaluating,
    Navigating,
    RecordingVisit,
    DelegatingToAgent,
    Waiting,
    Paused,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Idle => "idle",
            Phase::Evaluating => "evaluating",
            Phase::Navigating => "navigating",
            Phase::RecordingVisit => "recording_visit",
            Phase::DelegatingToAgent => "delegating_to_agent",
            Phase::Waiting => "waiting",
            Phase::Paused => "paused",
        }
    }
}

/// Identity of the step an asynchronous result belongs to. Results whose
/// stamp no longer matches the session are discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stamp {
    pub generation: u64,
    pub index: usize,
}

/// At most one spawned task per slot. Arming replaces (and aborts) the
/// previous occupant; dropping the slot aborts it too.
#[derive(Debug, Default)]
pub struct TaskSlot {
    task: Option<JoinHandle<()>>,
}

impl TaskSlot {
    pub fn arm(&mut self, task: JoinHandle<()>) {
        if let Some(previous) = self.task.replace(task) {
            previous.abort();
        }
    }

    /// Abort the occupant, if any. Returns whether something was cancelled.
    pub fn cancel(&mut self) -> bool {
        match self.task.take() {
            Some(task) => {
                task.abort();
                true
            }
            None => false,
        }
    }

    /// Forget the occupant after it has delivered its event.
    pub fn disarm(&mut self) {
        self.task = None;
    }

    pub fn is_armed(&self) -> bool {
        self.task.is_some()
    }
}

impl Drop for TaskSlot {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Candidate currently being worked on.
#[derive(Debug, Clone, PartialEq)]
pub struct InFlight {
    pub candidate_id: String,
    pub address: String,
}

#[derive(Debug)]
pub struct Session {
    pub list_id: Option<String>,
    pub credentials: Option<Credentials>,
    pub customers: Vec<Candidate>,
    pub current_index: usize,
    pub is_engaging: bool,
    pub current_activity_id: Option<String>,
    pub active_context_handle: Option<ContextHandle>,
    pub settings: EngagementSettings,
    pub prompt_override: Option<String>,
    pub phase: Phase,
    pub generation: u64,
    pub in_flight: Option<InFlight>,
    pub last_reason: Option<String>,

    /// Bounded wait for the page agent.
    pub agent_wait: TaskSlot,
    /// Delay, cool-down or settle timer leading to the next evaluation.
    pub next_candidate: TaskSlot,
    /// Open navigation (load-complete subscription).
    pub navigation: TaskSlot,
    /// Context acquisition, visit recording or directive delivery.
    pub pending_call: TaskSlot,
}

impl Default for Session {
    fn default() -> Self {
        Self {
            list_id: None,
            credentials: None,
            customers: Vec::new(),
            current_index: 0,
            is_engaging: false,
            current_activity_id: None,
            active_context_handle: None,
            settings: EngagementSettings::default(),
            prompt_override: None,
            phase: Phase::Idle,
            generation: 0,
            in_flight: None,
            last_reason: None,
            agent_wait: TaskSlot::default(),
            next_candidate: TaskSlot::default(),
            navigation: TaskSlot::default(),
            pending_call: TaskSlot::default(),
        }
    }
}

impl Session {
    /// Enter the engaging state at `index`. Bumps the generation so results
    /// of any earlier run are recognised as stale.
    pub fn begin(
        &mut self,
        list_id: String,
        credentials: Credentials,
        customers: Vec<Candidate>,
        index: usize,
        settings: EngagementSettings,
        prompt_override: Option<String>,
    ) {
        self.cancel_timers();
        self.list_id = Some(list_id);
        self.credentials = Some(credentials);
        self.customers = customers;
        self.current_index = index;
        self.is_engaging = true;
        self.current_activity_id = None;
        self.settings = settings;
        self.prompt_override = prompt_override;
        self.phase = Phase::Waiting;
        self.in_flight = None;
        self.last_reason = None;
        self.generation += 1;
    }

    /// Back to empty. The generation keeps counting.
    pub fn reset(&mut self) {
        let generation = self.generation + 1;
        *self = Session {
            generation,
            ..Session::default()
        };
    }

    pub fn stamp(&self) -> Stamp {
        Stamp {
            generation: self.generation,
            index: self.current_index,
        }
    }

    pub fn is_current(&self, stamp: Stamp) -> bool {
        self.is_engaging && stamp == self.stamp()
    }

    pub fn total(&self) -> usize {
        self.customers.len()
    }

    pub fn cancel_timers(&mut self) {
        self.agent_wait.cancel();
        self.next_candidate.cancel();
        self.navigation.cancel();
        self.pending_call.cancel();
    }

    pub fn has_live_timers(&self) -> bool {
        self.agent_wait.is_armed() || self.next_candidate.is_armed()
    }

    pub fn to_persisted(&self) -> PersistedSession {
        if !self.is_engaging {
            return PersistedSession::default();
        }
        let (token, workspace_id) = match &self.credentials {
            Some(c) => (Some(c.token.clone()), Some(c.workspace_id.clone())),
            None => (None, None),
        };
        PersistedSession {
            started: true,
            list_id: self.list_id.clone(),
            current_index: Some(self.current_index),
            token,
            workspace_id,
            settings: Some(self.settings.clone()),
            current_activity_id: self.current_activity_id.clone(),
            active_context_handle: self.active_context_handle.clone(),
            prompt_override: self.prompt_override.clone(),
        }
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        StatusSnapshot {
            is_engaging: self.is_engaging,
            list_id: self.list_id.clone(),
            current_activity_id: self.current_activity_id.clone(),
            current_index: self.current_index,
            total: self.total(),
            phase: self.phase.as_str().to_string(),
            last_reason: self.last_reason.clone(),
            last_stop: None,
        }
    }
}
