//! DevTools proxy daemon.
//!
//! Discovers the browser's ephemeral DevTools endpoint from the supervisor
//! log, then serves a stable listen address that relays WebSocket sessions
//! and rewrites the HTTP discovery documents to point back at itself.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context as _;
use axum::routing::get;
use axum::Router;
use clap::Parser;
use metrics_exporter_prometheus::PrometheusHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use spyglass_relay::{metrics::install_recorder, start, ProxyConfig, SessionConfig};
use spyglass_upstream::{EndpointRegistry, EndpointWatcher};

#[derive(Parser, Debug)]
#[command(name = "spyglass", version, about = "DevTools discovery and relay proxy")]
struct Args {
    /// Address the proxy listens on.
    #[arg(long, default_value = "0.0.0.0:9222")]
    listen: String,

    /// Supervisor log file where the browser announces its endpoint.
    #[arg(long, default_value = "/var/log/supervisord/chromium")]
    log_file: PathBuf,

    /// Seconds to wait for the first endpoint announcement before giving up.
    #[arg(long, default_value_t = 10)]
    startup_timeout: u64,

    /// Optional address for the health and metrics listener.
    #[arg(long)]
    status_listen: Option<SocketAddr>,

    /// Log method, id, and session of every relayed protocol message.
    #[arg(long)]
    log_messages: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    let metrics_handle = install_recorder();

    let registry = EndpointRegistry::new();
    let cancel = CancellationToken::new();

    let watcher = EndpointWatcher::new(&args.log_file, registry.clone());
    info!(log_file = %args.log_file.display(), "watching supervisor log for endpoint announcements");
    let watcher_task = tokio::spawn(watcher.run(cancel.clone()));

    // The browser must announce itself before we start accepting; a proxy
    // with nowhere to relay to is worse than a crashed one under a
    // supervisor that restarts us.
    let startup = Duration::from_secs(args.startup_timeout);
    let endpoint = registry
        .wait_for_initial(startup)
        .await
        .context("browser devtools endpoint never announced")?;
    info!(url = %endpoint, "initial devtools endpoint discovered");

    let session = SessionConfig {
        log_messages: args.log_messages,
        ..SessionConfig::default()
    };
    let proxy = start(
        ProxyConfig {
            bind_addr: args.listen.clone(),
            session,
        },
        registry.clone(),
        cancel.clone(),
    )
    .await
    .context("failed to bind proxy listener")?;

    if let Some(addr) = args.status_listen {
        spawn_status_server(addr, metrics_handle)
            .await
            .context("failed to bind status listener")?;
    }

    shutdown_signal().await;
    info!("shutdown signal received, draining");
    cancel.cancel();
    if tokio::time::timeout(Duration::from_secs(10), proxy.stopped())
        .await
        .is_err()
    {
        tracing::warn!("drain deadline reached; exiting with sessions still open");
    }
    let _ = watcher_task.await;
    Ok(())
}

/// Health and metrics endpoints on a separate listener, kept off the proxy
/// port so the catch-all relay route stays unambiguous.
async fn spawn_status_server(addr: SocketAddr, handle: PrometheusHandle) -> anyhow::Result<()> {
    let router = Router::new()
        .route("/healthz", get(|| async { "ok" }))
        .route(
            "/metrics",
            get(move || {
                let handle = handle.clone();
                async move { handle.render() }
            }),
        );
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "status listener bound");
    drop(tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router).await {
            tracing::error!(error = %e, "status server exited with error");
        }
    }));
    Ok(())
}

#[cfg(unix)]
async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};
    let mut interrupt = signal(SignalKind::interrupt()).expect("install SIGINT handler");
    let mut terminate = signal(SignalKind::terminate()).expect("install SIGTERM handler");
    tokio::select! {
        _ = interrupt.recv() => {}
        _ = terminate.recv() => {}
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
