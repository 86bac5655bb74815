//! OS signal handling.
//!
//! # Responsibilities
//! - Register signal handlers (SIGINT, SIGTERM, SIGUSR2, SIGHUP, SIGUSR1)
//! - Translate signals to [`LifecycleSignal`] events
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - SIGINT/SIGTERM trigger graceful shutdown, SIGUSR2 triggers reload
//! - SIGHUP and SIGUSR1 are caught and ignored so a stray one cannot kill
//!   the process mid-drain
//! - Dropping the watcher stops delivery; the handlers stay installed, so
//!   repeated signals during shutdown are swallowed

use std::fmt;

use tokio::signal::unix::{signal, Signal, SignalKind};

use crate::error::ServerError;

/// A lifecycle-relevant OS signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleSignal {
    /// SIGINT: graceful shutdown.
    Interrupt,
    /// SIGTERM: graceful shutdown.
    Terminate,
    /// SIGUSR2: hand the listener to a successor, then shut down.
    Reload,
    /// Any other observed signal; ignored.
    Other(&'static str),
}

impl fmt::Display for LifecycleSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecycleSignal::Interrupt => f.write_str("SIGINT"),
            LifecycleSignal::Terminate => f.write_str("SIGTERM"),
            LifecycleSignal::Reload => f.write_str("SIGUSR2"),
            LifecycleSignal::Other(name) => f.write_str(name),
        }
    }
}

/// Signal streams feeding the control loop.
pub struct SignalWatcher {
    interrupt: Signal,
    terminate: Signal,
    reload: Signal,
    hangup: Signal,
    user1: Signal,
}

impl SignalWatcher {
    /// Install the handlers. Must be called from within a tokio runtime.
    pub fn register() -> Result<Self, ServerError> {
        let install = |kind: SignalKind| signal(kind).map_err(ServerError::Signal);

        Ok(Self {
            interrupt: install(SignalKind::interrupt())?,
            terminate: install(SignalKind::terminate())?,
            reload: install(SignalKind::user_defined2())?,
            hangup: install(SignalKind::hangup())?,
            user1: install(SignalKind::user_defined1())?,
        })
    }

    /// Wait for the next signal. `None` once the runtime stops delivering.
    pub async fn recv(&mut self) -> Option<LifecycleSignal> {
        tokio::select! {
            Some(()) = self.interrupt.recv() => Some(LifecycleSignal::Interrupt),
            Some(()) = self.terminate.recv() => Some(LifecycleSignal::Terminate),
            Some(()) = self.reload.recv() => Some(LifecycleSignal::Reload),
            Some(()) = self.hangup.recv() => Some(LifecycleSignal::Other("SIGHUP")),
            Some(()) = self.user1.recv() => Some(LifecycleSignal::Other("SIGUSR1")),
            else => None,
        }
    }
}

/// Next signal from an optional watcher; pends forever once delivery has
/// been disabled.
pub(crate) async fn next_signal(watcher: &mut Option<SignalWatcher>) -> Option<LifecycleSignal> {
    match watcher {
        Some(watcher) => watcher.recv().await,
        None => std::future::pending().await,
    }
}
