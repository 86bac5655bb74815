//! Shared utilities for lifecycle integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use axum::{extract::Path as UrlPath, routing::get, Router};
use goblet::{GracefulServer, ServerConfig, ServerError, ServerHandle};
use tokio::task::JoinHandle;

/// Config bound to an ephemeral port with a short drain deadline and a
/// marker name private to the calling test.
pub fn test_config(marker: &str) -> ServerConfig {
    let mut config = ServerConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    config.lifecycle.shutdown_timeout_ms = 1_000;
    config.lifecycle.inherit_env = marker.into();
    config
}

/// `/index` answers immediately, `/sleep/{ms}` after the given delay.
pub fn app() -> Router {
    Router::new()
        .route("/index", get(|| async { "index" }))
        .route(
            "/sleep/{ms}",
            get(|UrlPath(ms): UrlPath<u64>| async move {
                tokio::time::sleep(Duration::from_millis(ms)).await;
                format!("slept {ms}")
            }),
        )
}

/// Run a server in the background and wait for its TCP address.
pub async fn start(
    config: ServerConfig,
) -> (ServerHandle, SocketAddr, JoinHandle<Result<(), ServerError>>) {
    let server = GracefulServer::new(config);
    let handle = server.handle();
    let task = tokio::spawn(server.listen_and_serve(app()));

    let addr = tokio::time::timeout(Duration::from_secs(5), handle.local_addr())
        .await
        .expect("server bound in time")
        .expect("server bound")
        .as_tcp()
        .expect("tcp listener");
    (handle, addr, task)
}

/// Await the run result, failing the test if it hangs.
pub async fn finish(task: JoinHandle<Result<(), ServerError>>) -> Result<(), ServerError> {
    tokio::time::timeout(Duration::from_secs(10), task)
        .await
        .expect("server returned in time")
        .expect("server task did not panic")
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}

pub fn temp_path(name: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!("goblet-{}-{}", name, std::process::id()));
    let _ = std::fs::remove_file(&path);
    path
}

/// Poll `path` until it has contents.
pub async fn wait_for_file(path: &Path, timeout: Duration) -> Option<String> {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if let Ok(text) = std::fs::read_to_string(path) {
            if !text.is_empty() {
                return Some(text);
            }
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    None
}

/// Successor script: records the marker, its first extra argument and
/// whether fd 3 is a socket, then keeps the inherited socket open a while.
pub const SUCCESSOR_SCRIPT: &str = r#"
if [ -S /dev/fd/3 ]; then fd=socket; else fd=missing; fi
echo "$MARKER_VALUE|$2|$fd" > "$1"
sleep 3
"#;

/// `/bin/sh` successor arguments running [`SUCCESSOR_SCRIPT`] with the marker
/// variable `marker` expanded in place of `$MARKER_VALUE`.
pub fn successor_args(marker: &str, out: &Path, extra: &str) -> Vec<String> {
    vec![
        "-c".into(),
        SUCCESSOR_SCRIPT.replace("$MARKER_VALUE", &format!("${marker}")),
        "sh".into(),
        out.display().to_string(),
        extra.into(),
    ]
}
