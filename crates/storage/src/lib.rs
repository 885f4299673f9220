pub mod session;
pub mod stats;
pub mod store;

pub use session::{
    PersistedSession, RestorableSession, RestoreCheck, SessionStateStore, ENGAGEMENT_NAMESPACE,
};
pub use stats::{today, EngagementStats, StatsStore, STATS_NAMESPACE};
pub use store::{Entries, FileStateStore, MemoryStateStore, StateStore};
