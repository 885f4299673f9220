use crate::session::Stamp;
use outreach_core::{
    AgentCompletion, ContextHandle, Credentials, Result, SettingsOverride, StartOutcome,
    StatusSnapshot,
};
use tokio::sync::oneshot;

/// Outcome of a resume attempt from persisted state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResumeOutcome {
    /// No persisted session.
    NothingPersisted,
    /// A session is live in memory; persisted state was not consulted.
    AlreadyRunning,
    Resumed { index: usize, total: usize },
    /// Persisted state was unusable and has been cleared.
    Cleared { reason: String },
}

/// Everything the worker reacts to, in arrival order.
#[derive(Debug)]
pub enum Event {
    Start {
        list_id: String,
        credentials: Credentials,
        overrides: Option<SettingsOverride>,
        prompt: Option<String>,
        reply: oneshot::Sender<Result<StartOutcome>>,
    },
    Stop {
        reason: String,
        reply: Option<oneshot::Sender<()>>,
    },
    Status {
        reply: oneshot::Sender<StatusSnapshot>,
    },
    Resume {
        reply: Option<oneshot::Sender<ResumeOutcome>>,
    },
    AgentCompleted {
        completion: AgentCompletion,
    },
    ContextClosed {
        handle: ContextHandle,
    },

    // Results of tasks the worker spawned for itself.
    Evaluate {
        stamp: Stamp,
    },
    ContextAcquired {
        stamp: Stamp,
        result: Result<ContextHandle>,
    },
    NavigationSettled {
        stamp: Stamp,
        handle: ContextHandle,
        result: Result<String>,
    },
    VisitRecorded {
        stamp: Stamp,
        result: Result<String>,
    },
    AgentDelivered {
        stamp: Stamp,
        result: Result<()>,
    },
    AgentTimedOut {
        stamp: Stamp,
    },
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::Start { .. } => "start",
            Event::Stop { .. } => "stop",
            Event::Status { .. } => "status",
            Event::Resume { .. } => "resume",
            Event::AgentCompleted { .. } => "agent_completed",
            Event::ContextClosed { .. } => "context_closed",
            Event::Evaluate { .. } => "evaluate",
            Event::ContextAcquired { .. } => "context_acquired",
            Event::NavigationSettled { .. } => "navigation_settled",
            Event::VisitRecorded { .. } => "visit_recorded",
            Event::AgentDelivered { .. } => "agent_delivered",
            Event::AgentTimedOut { .. } => "agent_timed_out",
        }
    }
}
