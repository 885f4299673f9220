pub mod config;
pub mod error;
pub mod message;
pub mod paths;
pub mod types;

pub use config::Config;
pub use error::{Error, Result};
pub use message::{Directive, DirectiveReply, StartOutcome};
pub use paths::Paths;
pub use types::{
    eligible_candidates, ActivityKind, AgentCompletion, Candidate, ContextHandle, Credentials,
    EngagementSettings, SettingsOverride, StatusSnapshot, StopRecord,
};
