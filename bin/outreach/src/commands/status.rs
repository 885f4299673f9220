use outreach_core::{Config, Paths};
use outreach_storage::{today, FileStateStore, SessionStateStore, StatsStore};
use std::sync::Arc;

pub async fn run() -> anyhow::Result<()> {
    let paths = Paths::new();

    println!("outreach status");
    println!("===============");
    println!();

    let config_path = paths.config_file();
    println!(
        "Config:    {} {}",
        config_path.display(),
        if config_path.exists() { "✓" } else { "(defaults)" }
    );
    let config = Config::load_or_default(&paths)?;
    println!("State:     {}", paths.state_dir().display());
    println!("Ledger:    {}", config.ledger.api_base);
    println!(
        "Browser:   {}:{} ({})",
        config.browser.debug_host, config.browser.debug_port, config.browser.domain
    );
    println!();

    let store = Arc::new(FileStateStore::new(paths.clone()));
    let session = SessionStateStore::new(store.clone()).load().await?;
    println!("Session:");
    if session.started {
        println!("  list:      {}", session.list_id.as_deref().unwrap_or("-"));
        println!(
            "  index:     {}",
            session
                .current_index
                .map(|i| i.to_string())
                .unwrap_or_else(|| "-".to_string())
        );
        println!(
            "  activity:  {}",
            session.current_activity_id.as_deref().unwrap_or("-")
        );
        println!(
            "  context:   {}",
            session
                .active_context_handle
                .as_ref()
                .map(|h| h.to_string())
                .unwrap_or_else(|| "-".to_string())
        );
        if let Some(settings) = &session.settings {
            println!(
                "  pacing:    {}-{}s, daily limit {}",
                settings.min_delay_secs,
                settings.max_delay_secs,
                if settings.quota_enabled() {
                    settings.daily_limit.to_string()
                } else {
                    "off".to_string()
                }
            );
        }
    } else {
        println!("  none persisted");
    }

    let stats = StatsStore::new(store).load().await?;
    let (posts, comments) = stats.effective_for(&today());
    println!();
    println!("Today:     {} posts engaged, {} comments", posts, comments);
    Ok(())
}
