//! SIGUSR2 with a successor that cannot be started. Signals are
//! process-wide, so the two configurations run one after the other in a
//! single test.

use std::path::PathBuf;
use std::time::Duration;

use goblet::{LifecycleState, ServerError};

mod common;

fn send_reload_signal() {
    unsafe {
        libc::kill(libc::getpid(), libc::SIGUSR2);
    }
}

#[tokio::test]
async fn failed_signal_reload() {
    // Opted out: log and keep serving.
    let mut config = common::test_config("GOBLET_IT_SIGUSR2_TOLERATED");
    config.reload.executable = Some(PathBuf::from("/nonexistent/goblet-successor"));
    config.lifecycle.exit_on_reload_failure = false;
    let (handle, addr, task) = common::start(config).await;

    send_reload_signal();
    tokio::time::sleep(Duration::from_millis(500)).await;

    assert_eq!(handle.state(), LifecycleState::Running);
    let body = common::client()
        .get(format!("http://{addr}/index"))
        .send()
        .await
        .expect("still serving")
        .text()
        .await
        .unwrap();
    assert_eq!(body, "index");
    handle.stop();
    common::finish(task).await.unwrap();

    // Default: the run ends with the spawn error, without draining.
    let mut config = common::test_config("GOBLET_IT_SIGUSR2_FATAL");
    config.reload.executable = Some(PathBuf::from("/nonexistent/goblet-successor"));
    let (handle, _addr, task) = common::start(config).await;

    send_reload_signal();

    let err = tokio::time::timeout(Duration::from_secs(2), task)
        .await
        .expect("run ends promptly")
        .unwrap()
        .unwrap_err();
    assert!(matches!(err, ServerError::ReloadSpawn(_)), "got {err:?}");
    assert_eq!(handle.state(), LifecycleState::Stopped);
}
