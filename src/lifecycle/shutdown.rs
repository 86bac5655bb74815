//! Shutdown coordination and bounded draining.

use std::io;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::error::ServerError;

/// Coordinator for graceful shutdown.
///
/// Backed by a watch channel so subscribers created after the trigger still
/// observe it.
#[derive(Debug)]
pub struct Shutdown {
    tx: watch::Sender<bool>,
}

impl Shutdown {
    /// Create a new shutdown coordinator.
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx }
    }

    /// Subscribe to the shutdown signal.
    pub fn subscribe(&self) -> ShutdownSignal {
        ShutdownSignal {
            rx: self.tx.subscribe(),
        }
    }

    /// Trigger the shutdown signal. Returns `false` if it was already
    /// triggered.
    pub fn trigger(&self) -> bool {
        !self.tx.send_replace(true)
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiving side of [`Shutdown`].
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

impl ShutdownSignal {
    /// Resolve once shutdown is triggered or the coordinator is gone.
    pub async fn wait(&mut self) {
        let _ = self.rx.wait_for(|triggered| *triggered).await;
    }
}

/// Wait for the serve task to finish draining, at most `timeout`.
///
/// On expiry the task is aborted, which drops its connection set and
/// aborts every connection still in flight, and `ShutdownTimeout` is
/// returned.
pub async fn drain(
    mut task: JoinHandle<Result<(), ServerError>>,
    timeout: Duration,
) -> Result<(), ServerError> {
    match tokio::time::timeout(timeout, &mut task).await {
        Ok(Ok(result)) => result,
        Ok(Err(join_err)) => Err(ServerError::Serve(io::Error::other(join_err))),
        Err(_) => {
            task.abort();
            let _ = task.await;
            Err(ServerError::ShutdownTimeout(timeout))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn late_subscriber_sees_trigger() {
        let shutdown = Shutdown::new();
        assert!(shutdown.trigger());
        assert!(!shutdown.trigger());

        let mut signal = shutdown.subscribe();
        tokio::time::timeout(Duration::from_millis(100), signal.wait())
            .await
            .expect("triggered signal resolves immediately");
    }

    #[tokio::test]
    async fn wait_resolves_when_coordinator_dropped() {
        let shutdown = Shutdown::new();
        let mut signal = shutdown.subscribe();
        drop(shutdown);

        tokio::time::timeout(Duration::from_millis(100), signal.wait())
            .await
            .expect("dropped coordinator releases waiters");
    }

    #[tokio::test]
    async fn drain_returns_task_result() {
        let task = tokio::spawn(async { Ok(()) });
        assert!(drain(task, Duration::from_secs(1)).await.is_ok());

        let task = tokio::spawn(async { Err(ServerError::Serve(io::Error::other("boom"))) });
        assert!(matches!(
            drain(task, Duration::from_secs(1)).await,
            Err(ServerError::Serve(_))
        ));
    }

    #[tokio::test]
    async fn drain_aborts_after_timeout() {
        let finished = Arc::new(AtomicBool::new(false));
        let flag = finished.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(30)).await;
            flag.store(true, Ordering::SeqCst);
            Ok(())
        });

        let err = drain(task, Duration::from_millis(50)).await.unwrap_err();
        assert!(matches!(err, ServerError::ShutdownTimeout(t) if t == Duration::from_millis(50)));
        assert!(!finished.load(Ordering::SeqCst));
    }
}
