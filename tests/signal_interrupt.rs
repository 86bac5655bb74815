//! SIGINT handling. Signals are process-wide, so this binary holds a single
//! test.

use std::time::Duration;

use goblet::LifecycleState;

mod common;

#[tokio::test]
async fn interrupt_shuts_down_cleanly() {
    let (handle, addr, task) = common::start(common::test_config("GOBLET_IT_SIGINT")).await;

    let body = common::client()
        .get(format!("http://{addr}/index"))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert_eq!(body, "index");

    unsafe {
        libc::kill(libc::getpid(), libc::SIGINT);
    }

    common::finish(task).await.expect("interrupt is a clean exit");
    assert_eq!(handle.state(), LifecycleState::Stopped);
    assert!(tokio::time::timeout(Duration::from_secs(1), tokio::net::TcpStream::connect(addr))
        .await
        .map(|connected| connected.is_err())
        .unwrap_or(true));
}
