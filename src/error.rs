//! Error types for the graceful server.
//!
//! Acquisition and reload errors are returned to their caller directly.
//! Serve-loop failures and signal-driven termination are funneled into the
//! single result of [`GracefulServer::listen_and_serve`](crate::GracefulServer).

use std::io;
use std::os::unix::io::RawFd;
use std::time::Duration;

use crate::config::loader::ConfigError;

/// Everything that can end (or abort a step of) a server run.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Binding a fresh listener failed. Fatal, never retried.
    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: io::Error,
    },

    /// An inherited descriptor could not be adopted, or the live listener's
    /// descriptor could not be duplicated for a successor.
    #[error("file descriptor {fd}: {reason}")]
    FileDescriptor { fd: RawFd, reason: String },

    /// The socket behind a descriptor is not a TCP or Unix stream listener.
    #[error("unsupported listener: {0}")]
    UnsupportedListener(String),

    /// The successor process could not be started.
    #[error("failed to spawn successor process: {0}")]
    ReloadSpawn(#[source] io::Error),

    /// The serve loop stopped for a reason other than a deliberate shutdown.
    #[error("serve loop failed: {0}")]
    Serve(#[source] io::Error),

    /// In-flight connections were still open when the drain deadline hit.
    #[error("shutdown timed out after {0:?}, remaining connections were closed")]
    ShutdownTimeout(Duration),

    /// Installing an OS signal handler failed.
    #[error("failed to register signal handler: {0}")]
    Signal(#[source] io::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl ServerError {
    pub(crate) fn fd(fd: RawFd, reason: impl Into<String>) -> Self {
        ServerError::FileDescriptor {
            fd,
            reason: reason.into(),
        }
    }

    /// A copy for reporting to a second party. `io::Error` sources are
    /// flattened to their kind and message.
    pub(crate) fn detached(&self) -> Self {
        match self {
            ServerError::FileDescriptor { fd, reason } => ServerError::fd(*fd, reason.clone()),
            ServerError::UnsupportedListener(msg) => ServerError::UnsupportedListener(msg.clone()),
            ServerError::ReloadSpawn(err) => {
                ServerError::ReloadSpawn(io::Error::new(err.kind(), err.to_string()))
            }
            other => ServerError::ReloadSpawn(io::Error::other(other.to_string())),
        }
    }
}
