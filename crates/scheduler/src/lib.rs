pub mod collaborators;
pub mod event;
pub mod handle;
pub mod keepalive;
pub mod policy;
pub mod resync;
pub mod session;
pub mod worker;

#[cfg(test)]
mod testing;

pub use collaborators::{
    ActivityRecorder, AgentDirective, CandidateSource, Collaborators, EngagementCounters,
    NavigationDriver, PageAgent,
};
pub use event::ResumeOutcome;
pub use handle::WorkerHandle;
pub use keepalive::KeepAliveService;
pub use policy::Pacing;
pub use resync::ResyncService;
pub use worker::EngagementWorker;
