mod collectors;
mod config;
mod http;
mod metrics;
mod payload;

use axum::serve;
use clap::Parser;
use collectors::aggregate::Aggregator;
use collectors::source::HostSource;
use config::{BuildInfo, Config};
use http::HttpAppState;
use metrics::Metrics;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "stackscope-agent")]
#[command(version)]
struct Cli {
    /// Listen address, `:9100` binds all interfaces.
    #[arg(long, default_value = "0.0.0.0:9100")]
    addr: String,
    /// Token required by the metrics endpoints. Empty disables auth.
    #[arg(long, env = "STACKSCOPE_TOKEN")]
    token: Option<String>,
    #[arg(long, env = "STACKSCOPE_PROCFS", default_value = "/proc")]
    procfs: PathBuf,
    #[arg(long, default_value = "30s", value_parser = humantime::parse_duration)]
    request_timeout: Duration,
}

#[tokio::main]
async fn main() {
    init_tracing();

    let cli = Cli::parse();
    let cfg = match Config::new(&cli.addr, cli.token, cli.procfs, cli.request_timeout) {
        Ok(cfg) => cfg,
        Err(err) => {
            error!(error = %err, "invalid configuration");
            std::process::exit(1);
        }
    };

    let build = BuildInfo::from_env();
    info!(
        listen = %cfg.listen,
        procfs = %cfg.procfs.display(),
        auth = cfg.token.is_some(),
        version = %build.version,
        git_sha = %build.git_sha,
        "starting stackscope agent"
    );

    let metrics = match Metrics::new(&build) {
        Ok(metrics) => metrics,
        Err(err) => {
            error!(error = %err, "failed to register metrics");
            std::process::exit(1);
        }
    };

    let listener = match TcpListener::bind(cfg.listen).await {
        Ok(l) => l,
        Err(err) => {
            error!(error = %err, listen = %cfg.listen, "failed to bind HTTP listener");
            std::process::exit(1);
        }
    };

    let source = Arc::new(HostSource::new(cfg.procfs.clone()));
    let app = http::build_router(HttpAppState {
        aggregator: Aggregator::new(source, build),
        metrics,
        token: cfg.token.clone(),
        request_timeout: cfg.request_timeout,
    });

    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    let http_task = tokio::spawn(async move {
        let server = serve(listener, app).with_graceful_shutdown(async move {
            let _ = shutdown_rx.changed().await;
        });
        if let Err(err) = server.await {
            error!(error = %err, "HTTP server error");
        }
    });

    wait_for_signal().await;
    info!("shutdown signal received, draining connections");

    let _ = shutdown_tx.send(true);
    let _ = http_task.await;
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(err) => {
            error!(error = %err, "failed to install SIGTERM handler");
            if let Err(err) = tokio::signal::ctrl_c().await {
                error!(error = %err, "failed to wait for Ctrl+C");
            }
            return;
        }
    };

    tokio::select! {
        res = tokio::signal::ctrl_c() => {
            if let Err(err) = res {
                error!(error = %err, "failed to wait for Ctrl+C");
            }
        }
        _ = sigterm.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "failed to wait for Ctrl+C");
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
