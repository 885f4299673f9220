use super::engagement::{forward_signals, EngagementRecorder};
use super::gateway::{router, GatewayState};
use outreach_browser::{CdpNavigationDriver, CdpPageAgent, CdpPool, DevtoolsEndpoint, TargetWatcher};
use outreach_core::{Config, Paths};
use outreach_ledger::LedgerClient;
use outreach_scheduler::{Collaborators, EngagementWorker, ResyncService};
use outreach_storage::{FileStateStore, SessionStateStore, StateStore, StatsStore};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

const SIGNAL_BUFFER: usize = 64;
const CDP_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

pub async fn run(cli_host: Option<String>, cli_port: Option<u16>) -> anyhow::Result<()> {
    let paths = Paths::new();
    paths.ensure_dirs()?;
    let config = Config::load_or_default(&paths)?;
    config.validate()?;

    let store: Arc<dyn StateStore> = Arc::new(FileStateStore::new(paths.clone()));
    let sessions = SessionStateStore::new(store.clone());
    let stats = Arc::new(StatsStore::new(store));
    let ledger = Arc::new(LedgerClient::new(&config.ledger));

    let endpoint = DevtoolsEndpoint::new(&config.browser.debug_host, config.browser.debug_port);
    let pool = Arc::new(CdpPool::new(endpoint, CDP_COMMAND_TIMEOUT));
    let (signal_tx, signal_rx) = mpsc::channel(SIGNAL_BUFFER);
    let navigator = Arc::new(CdpNavigationDriver::new(pool.clone(), &config.browser));
    let agent = Arc::new(CdpPageAgent::new(
        pool.clone(),
        &config.browser.completion_binding,
        signal_tx.clone(),
    ));

    let collaborators = Collaborators {
        candidates: ledger.clone(),
        navigator,
        recorder: ledger.clone(),
        agent,
        counters: stats.clone(),
    };

    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    let worker = EngagementWorker::new(collaborators, sessions.clone(), &config);
    let (worker_handle, worker_task) = worker.spawn(shutdown_tx.subscribe());

    let resync = ResyncService::new(worker_handle.clone(), config.timing.resync_interval());
    let resync_rx = shutdown_tx.subscribe();
    let resync_task = tokio::spawn(async move {
        resync.run_loop(resync_rx).await;
    });

    let watcher = TargetWatcher::new(pool, signal_tx);
    let watcher_rx = shutdown_tx.subscribe();
    let watcher_task = tokio::spawn(async move {
        watcher.run_loop(watcher_rx).await;
    });

    let recorder = EngagementRecorder::new(stats, ledger, sessions);
    let forwarder_task = tokio::spawn(forward_signals(
        signal_rx,
        worker_handle.clone(),
        recorder.clone(),
        shutdown_tx.subscribe(),
    ));

    let state = GatewayState {
        worker: worker_handle,
        recorder,
        api_token: config.gateway_token(),
        started_at: Instant::now(),
    };
    let app = router(state);

    let host = cli_host.unwrap_or_else(|| config.gateway.host.clone());
    let port = cli_port.unwrap_or(config.gateway.port);
    let bind_addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    if config.gateway_token().is_none() && host != "127.0.0.1" && host != "localhost" {
        warn!(bind = %bind_addr, "Gateway exposed without an API token");
    }
    info!(
        bind = %bind_addr,
        devtools = %format!("{}:{}", config.browser.debug_host, config.browser.debug_port),
        ledger = %config.ledger.api_base,
        "outreach daemon listening"
    );

    let http_shutdown_rx = shutdown_tx.subscribe();
    let http_task = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let mut rx = http_shutdown_rx;
                let _ = rx.recv().await;
            })
            .await
            .ok();
    });

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received, draining tasks...");
    let _ = shutdown_tx.send(());

    let handles: Vec<(&str, tokio::task::JoinHandle<()>)> = vec![
        ("http_server", http_task),
        ("worker", worker_task),
        ("resync", resync_task),
        ("target_watcher", watcher_task),
        ("signal_forwarder", forwarder_task),
    ];

    let graceful_timeout = Duration::from_secs(10);
    let deadline = tokio::time::Instant::now() + graceful_timeout;
    while !handles.iter().all(|(_, h)| h.is_finished()) && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    let mut aborted = 0;
    for (name, handle) in &handles {
        if !handle.is_finished() {
            warn!(task = *name, "Task did not exit in graceful window, aborting");
            handle.abort();
            aborted += 1;
        }
    }

    let total = handles.len();
    let mut failed = 0;
    for (name, handle) in handles {
        match handle.await {
            Ok(()) => {}
            Err(e) if e.is_cancelled() => {
                debug!(task = name, "Task cancelled during shutdown");
            }
            Err(e) => {
                error!(task = name, error = %e, "Task panicked during shutdown");
                failed += 1;
            }
        }
    }

    if failed == 0 {
        info!(total, aborted, "outreach daemon stopped");
    } else {
        warn!(failed, total, aborted, "outreach daemon stopped with task failures");
    }
    Ok(())
}
