//! Process entry point: loads configuration, wires the correlator to its
//! collaborators, starts the background exchange monitor task (unless this
//! process is a non-leader worker, see SPEC_FULL.md section 9), and serves
//! the HTTP surface until shutdown.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Context;
use tracing::{error, info};

use ucm_call_monitor::correlator::Correlator;
use ucm_call_monitor::directory::NullDirectory;
use ucm_call_monitor::exchange::{DialClient, ExchangeClient};
use ucm_call_monitor::fanout::Fanout;
use ucm_call_monitor::history::HistoryWriter;
use ucm_call_monitor::http::{self, AppState};
use ucm_call_monitor::store::ActiveStateStore;
use ucm_call_monitor::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env().context("failed to load configuration")?;
    if let Err(e) = run(config).await {
        error!(error = %e, "ucm-call-monitor exited with an error");
        return Err(e);
    }
    Ok(())
}

async fn run(config: Config) -> anyhow::Result<()> {
    let store = Arc::new(ActiveStateStore::new());
    let fanout = Arc::new(Fanout::new());
    let history = HistoryWriter::connect(&config.database.path)
        .await
        .context("failed to open call-history database")?;

    let dial_client = Arc::new(
        DialClient::new(config.dial.clone(), config.dial_url()).context("failed to build click-to-dial client")?,
    );
    let directory = Arc::new(NullDirectory);
    let exchange_up = Arc::new(AtomicBool::new(false));

    let shutdown = Arc::new(tokio::sync::Notify::new());
    let monitor_task = if config.monitor_leader {
        Some(spawn_monitor(&config, store.clone(), fanout.clone(), history, exchange_up.clone(), shutdown.clone()))
    } else {
        info!("UCM_MONITOR_LEADER disabled, this process will not poll the exchange");
        None
    };

    let app_state = AppState::new(store, fanout, dial_client, directory, exchange_up);
    let router = http::router(app_state);
    let listener = tokio::net::TcpListener::bind(config.http.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.http.bind))?;
    info!(addr = %config.http.bind, "serving HTTP surface");

    let serve = axum::serve(listener, router).with_graceful_shutdown(wait_for_ctrl_c());
    if let Err(e) = serve.await {
        error!(error = %e, "HTTP server terminated unexpectedly");
    }

    shutdown.notify_waiters();
    if let Some(task) = monitor_task {
        let _ = task.await;
    }
    Ok(())
}

/// Spawns the single background task that owns the exchange RPC client and
/// the correlator for the lifetime of the process.
fn spawn_monitor(
    config: &Config,
    store: Arc<ActiveStateStore>,
    fanout: Arc<Fanout>,
    history: HistoryWriter,
    exchange_up: Arc<AtomicBool>,
    shutdown: Arc<tokio::sync::Notify>,
) -> tokio::task::JoinHandle<()> {
    let client = ExchangeClient::new(config.exchange.clone(), config.ws_url());
    tokio::spawn(async move {
        let mut correlator = Correlator::new(store, fanout, history);
        exchange_up.store(true, Ordering::Relaxed);
        client.run(&mut correlator, &shutdown).await;
        exchange_up.store(false, Ordering::Relaxed);
    })
}

async fn wait_for_ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to install Ctrl+C handler");
    }
    info!("shutdown signal received");
}
