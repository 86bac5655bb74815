//! goblet: an HTTP server that restarts without closing its port.
//!
//! ```text
//!  operator                  parent (pid A)                  child (pid B)
//!  ────────                  ──────────────                  ─────────────
//!  kill -USR2 A  ─────────▶  dup listener fd
//!                            spawn self, fd 3, GOBLET=true ─▶ adopt fd 3
//!                            stop accepting                   accept ...
//!                            drain (≤ timeout)
//!                            exit 0
//!  kill -TERM B  ──────────────────────────────────────────▶ drain, exit 0
//! ```
//!
//! Start with `goblet --config goblet.toml` (or `--bind 127.0.0.1:8080`),
//! then `curl http://127.0.0.1:8080/index` to see which pid answers.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use axum::{routing::get, Json, Router};
use clap::Parser;
use serde_json::{json, Value};
use tower_http::trace::TraceLayer;

use goblet::config::{load_config, ServerConfig};
use goblet::observability::{logging, metrics};
use goblet::{GracefulServer, ListenerSource};

/// Slack on top of the drain timeout for a predecessor to exit and free the
/// metrics port.
const METRICS_BIND_GRACE: Duration = Duration::from_secs(2);

#[derive(Parser)]
#[command(name = "goblet")]
#[command(about = "HTTP server with zero-downtime reloads", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override `listener.bind_address` (`host:port` or `unix:/path`).
    #[arg(short, long)]
    bind: Option<String>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => match load_config(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("goblet: {}: {}", path.display(), e);
                return ExitCode::FAILURE;
            }
        },
        None => ServerConfig::default(),
    };
    if let Some(bind) = cli.bind {
        config.listener.bind_address = bind;
    }

    // Still single-threaded: the only safe point to edit the environment.
    let source = ListenerSource::take_from_env(&config.lifecycle.inherit_env);

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("goblet: failed to start runtime: {e}");
            return ExitCode::FAILURE;
        }
    };
    runtime.block_on(run(config, source))
}

async fn run(config: ServerConfig, source: ListenerSource) -> ExitCode {
    logging::init(&config.observability);

    tracing::info!(
        pid = std::process::id(),
        bind_address = %config.listener.bind_address,
        inherited = source != ListenerSource::Fresh,
        shutdown_timeout_ms = config.lifecycle.shutdown_timeout_ms,
        "goblet starting"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse::<SocketAddr>() {
            Ok(addr) => {
                // A predecessor keeps the port until its drain is over.
                let window = config.lifecycle.shutdown_timeout() + METRICS_BIND_GRACE;
                tokio::spawn(async move {
                    if let Err(e) = metrics::init_metrics_with_retry(addr, window).await {
                        tracing::error!(address = %addr, error = %e, "Metrics endpoint unavailable");
                    }
                });
            }
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let server = GracefulServer::new(config);
    match server.run(source, app()).await {
        Ok(()) => {
            tracing::info!(pid = std::process::id(), "Shutdown complete");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "Server terminated");
            ExitCode::FAILURE
        }
    }
}

fn app() -> Router {
    Router::new()
        .route("/index", get(index))
        .layer(TraceLayer::new_for_http())
}

async fn index() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "pid": std::process::id(),
    }))
}
