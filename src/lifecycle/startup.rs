//! Listener acquisition at process start.
//!
//! A process started by a reload finds the reload marker in its
//! environment and adopts the listener at the inherited descriptor slot;
//! any other process binds the configured address. No retries either way.

use std::os::unix::io::RawFd;

use crate::config::schema::ListenerConfig;
use crate::error::ServerError;
use crate::net::listener::{Listener, INHERITED_FD};

/// Where the listener comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerSource {
    /// Bind the configured address.
    Fresh,
    /// Adopt a descriptor handed over by the parent.
    Inherited { fd: RawFd },
}

impl ListenerSource {
    /// Inspect the environment for the reload marker named `marker`.
    /// The variable is left in place.
    pub fn from_env(marker: &str) -> Self {
        if std::env::var_os(marker).is_some() {
            ListenerSource::Inherited { fd: INHERITED_FD }
        } else {
            ListenerSource::Fresh
        }
    }

    /// Like [`from_env`](Self::from_env), then remove the marker so that
    /// processes spawned later do not mistake themselves for successors.
    ///
    /// Modifies the process environment: call it before any other thread
    /// exists, in particular before the tokio runtime is built.
    pub fn take_from_env(marker: &str) -> Self {
        let source = Self::from_env(marker);
        if source != ListenerSource::Fresh {
            std::env::remove_var(marker);
        }
        source
    }
}

/// Produce a ready-to-serve listener from `source`.
pub async fn acquire(
    source: ListenerSource,
    config: &ListenerConfig,
) -> Result<Listener, ServerError> {
    match source {
        ListenerSource::Fresh => Listener::bind(&config.bind_address).await,
        ListenerSource::Inherited { fd } => {
            tracing::info!(
                fd,
                configured_address = %config.bind_address,
                "Reload marker present, adopting inherited listener"
            );
            Listener::from_inherited(fd)
        }
    }
}
