use outreach_core::Paths;
use outreach_storage::{FileStateStore, SessionStateStore, StateStore, STATS_NAMESPACE};
use std::sync::Arc;

/// Erase the persisted session. A running daemon keeps its in-memory session
/// and writes it back on its next transition; stop it first.
pub async fn run(stats: bool) -> anyhow::Result<()> {
    let paths = Paths::new();
    let store = Arc::new(FileStateStore::new(paths));

    SessionStateStore::new(store.clone()).clear().await?;
    println!("✓ Cleared persisted engagement session");

    if stats {
        store.clear(STATS_NAMESPACE).await?;
        println!("✓ Cleared daily engagement counters");
    }
    Ok(())
}
