//! Daemon entry point: configuration, wiring, and lifecycle.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use legator_core::{AccountService, FileStore, SettlementOrchestrator, SystemClock};
use legator_daemon::config::DaemonConfig;
use legator_daemon::http::{self, AppState};
use legator_daemon::monitor::MonitorLoop;
use legator_daemon::providers::{LogNotify, SimulatedSweep, StubPayout};

/// legator - inactivity-settlement daemon
#[derive(Parser, Debug)]
#[command(name = "legator-daemon")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file. Missing file falls back to defaults.
    #[arg(short, long, default_value = "legator.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Override the configured listen address
    #[arg(long)]
    listen_addr: Option<std::net::SocketAddr>,

    /// Override the configured account database path
    #[arg(long)]
    data_file: Option<PathBuf>,

    /// Override the configured monitor interval, in seconds
    #[arg(long)]
    poll_interval_secs: Option<u64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_new(&args.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut config = if args.config.exists() {
        DaemonConfig::from_file(&args.config)
            .with_context(|| format!("loading config from {}", args.config.display()))?
    } else {
        info!(path = %args.config.display(), "no config file, using defaults");
        DaemonConfig::default()
    };
    if let Some(listen_addr) = args.listen_addr {
        config.listen_addr = listen_addr;
    }
    if let Some(data_file) = args.data_file {
        config.data_file = data_file;
    }
    if let Some(secs) = args.poll_interval_secs {
        config.poll_interval_secs = secs;
    }

    let store = Arc::new(
        FileStore::open(&config.data_file)
            .with_context(|| format!("opening account store at {}", config.data_file.display()))?,
    );
    let payout = Arc::new(StubPayout::new());
    let orchestrator = Arc::new(SettlementOrchestrator::new(
        store.clone(),
        Arc::new(SimulatedSweep::new(config.providers.sweep_pool_minor)),
        payout.clone(),
        Arc::new(LogNotify::new(config.providers.notify_from.clone())),
        &config.currency,
    ));
    let service = Arc::new(AccountService::new(
        store,
        orchestrator,
        payout,
        Arc::new(SystemClock),
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let monitor = MonitorLoop::new(service.clone(), config.poll_interval());
    let monitor_task = tokio::spawn(monitor.run(shutdown_rx));

    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("binding {}", config.listen_addr))?;
    info!(
        listen_addr = %config.listen_addr,
        data_file = %config.data_file.display(),
        poll_interval_secs = config.poll_interval_secs,
        "legator daemon started"
    );

    let app = http::router(AppState { service });
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("http server failed")?;

    let _ = shutdown_tx.send(true);
    monitor_task.await.context("monitor task panicked")?;
    info!("legator daemon stopped");
    Ok(())
}

/// Resolves when the process receives SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        {
            Ok(sigterm) => sigterm,
            Err(e) => {
                tracing::error!(error = %e, "failed to register SIGTERM handler");
                let _ = ctrl_c.await;
                return;
            }
        };
        tokio::select! {
            _ = ctrl_c => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = ctrl_c.await;
    }
    info!("shutdown signal received");
}
