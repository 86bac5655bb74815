//! Binary upgrade with the real `goblet` executable: run it from a copy,
//! replace the copy on disk, send SIGUSR2 and check that the process started
//! from the new file serves the same port once the old one has exited.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;

mod common;

/// SIGKILLs whatever is still running when the test ends, pass or fail.
struct Cleanup {
    pids: Vec<libc::pid_t>,
    dir: PathBuf,
}

impl Drop for Cleanup {
    fn drop(&mut self) {
        for pid in &self.pids {
            unsafe {
                libc::kill(*pid, libc::SIGKILL);
            }
        }
        let _ = std::fs::remove_dir_all(&self.dir);
    }
}

fn install_binary(target: &Path) {
    let _ = std::fs::remove_file(target);
    std::fs::copy(env!("CARGO_BIN_EXE_goblet"), target).unwrap();
}

async fn index_pid(client: &reqwest::Client, addr: SocketAddr) -> Option<u32> {
    let response = client.get(format!("http://{addr}/index")).send().await.ok()?;
    let body: serde_json::Value = response.json().await.ok()?;
    body["pid"].as_u64().map(|pid| pid as u32)
}

async fn wait_for_pid(
    client: &reqwest::Client,
    addr: SocketAddr,
    accept: impl Fn(u32) -> bool,
) -> Option<u32> {
    for _ in 0..100 {
        if let Some(pid) = index_pid(client, addr).await.filter(|pid| accept(*pid)) {
            return Some(pid);
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    None
}

#[tokio::test]
async fn upgraded_binary_takes_over_listener() {
    let dir = std::env::temp_dir().join(format!("goblet-upgrade-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let binary = dir.join("goblet");
    install_binary(&binary);

    let addr = std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap();

    let mut parent = Command::new(&binary)
        .arg("--bind")
        .arg(addr.to_string())
        .env_remove("GOBLET")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .unwrap();
    let parent_pid = parent.id();
    let mut cleanup = Cleanup {
        pids: vec![parent_pid as libc::pid_t],
        dir: dir.clone(),
    };

    let client = common::client();
    let first = wait_for_pid(&client, addr, |_| true).await;
    assert_eq!(first, Some(parent_pid));

    // Deploy: the running binary's file is unlinked and a new one takes its path.
    install_binary(&binary);
    unsafe {
        libc::kill(parent_pid as libc::pid_t, libc::SIGUSR2);
    }

    let mut status = None;
    for _ in 0..100 {
        status = parent.try_wait().unwrap();
        if status.is_some() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    let status = status.expect("old process exited");
    assert!(status.success(), "old process exited with {status}");

    let successor = wait_for_pid(&client, addr, |pid| pid != parent_pid)
        .await
        .expect("successor answers on the same port");
    cleanup.pids.push(successor as libc::pid_t);

    #[cfg(target_os = "linux")]
    {
        let exe = std::fs::read_link(format!("/proc/{successor}/exe")).unwrap();
        let expected = std::fs::canonicalize(&binary).unwrap();
        assert_eq!(exe, expected, "successor runs the replaced file");
    }

    unsafe {
        libc::kill(successor as libc::pid_t, libc::SIGTERM);
    }
    let mut closed = false;
    for _ in 0..100 {
        if tokio::net::TcpStream::connect(addr).await.is_err() {
            closed = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    assert!(closed, "successor shut down on SIGTERM");
}
