//! The graceful server: listener acquisition, serve loop, signal-driven
//! lifecycle state machine, reload hand-off and bounded shutdown.
//!
//! ```text
//!            SIGINT / SIGTERM / stop()
//! Running ───────────────────────────────▶ ShuttingDown ──▶ Stopped
//!    │  ▲                                      ▲
//!    │  │ spawn failed (handle, or SIGUSR2     │ successor started
//!    ▼  │  with exit_on_reload_failure off)    │
//! Reloading ───────────────────────────────────┘
//!    │ spawn failed after SIGUSR2 (default)
//!    └──────────────────────────────────────────────────────▶ Stopped (error)
//!
//! any state ── serve loop error ──▶ Stopped (error)
//! ```

use std::fmt;
use std::io;
use std::sync::Arc;

use axum::Router;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::{JoinError, JoinHandle};

use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::http::server::serve;
use crate::lifecycle::reload::{spawn_successor, Successor, SuccessorCommand};
use crate::lifecycle::shutdown::{drain, Shutdown};
use crate::lifecycle::signals::{next_signal, LifecycleSignal, SignalWatcher};
use crate::lifecycle::startup::{acquire, ListenerSource};
use crate::net::connection::ConnectionTracker;
use crate::net::listener::{ListenAddr, Listener};
use crate::observability::metrics;

/// Where a server run is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// Listener not acquired yet.
    Starting,
    Running,
    Reloading,
    ShuttingDown,
    Stopped,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LifecycleState::Starting => "starting",
            LifecycleState::Running => "running",
            LifecycleState::Reloading => "reloading",
            LifecycleState::ShuttingDown => "shutting_down",
            LifecycleState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

enum Control {
    Stop,
    Reload(oneshot::Sender<Result<Successor, ServerError>>),
}

enum Event {
    Served(Result<Result<(), ServerError>, JoinError>),
    Signal(LifecycleSignal),
    Control(Control),
}

/// One managed server: a listener, a handler and the lifecycle around them.
///
/// Construct explicitly and pass around; several independent instances can
/// coexist in one process.
pub struct GracefulServer {
    config: ServerConfig,
    shutdown: Shutdown,
    control_tx: mpsc::UnboundedSender<Control>,
    control_rx: mpsc::UnboundedReceiver<Control>,
    state: watch::Sender<LifecycleState>,
    local_addr: watch::Sender<Option<ListenAddr>>,
}

/// Cloneable control surface for a [`GracefulServer`], usable from outside
/// the signal path.
#[derive(Clone)]
pub struct ServerHandle {
    control: mpsc::UnboundedSender<Control>,
    state: watch::Receiver<LifecycleState>,
    local_addr: watch::Receiver<Option<ListenAddr>>,
}

impl GracefulServer {
    pub fn new(config: ServerConfig) -> Self {
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let (state, _) = watch::channel(LifecycleState::Starting);
        let (local_addr, _) = watch::channel(None);
        Self {
            config,
            shutdown: Shutdown::new(),
            control_tx,
            control_rx,
            state,
            local_addr,
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// A handle for stopping or reloading this server once it runs.
    pub fn handle(&self) -> ServerHandle {
        ServerHandle {
            control: self.control_tx.clone(),
            state: self.state.subscribe(),
            local_addr: self.local_addr.subscribe(),
        }
    }

    /// Serve `router` on `address`, overriding the configured bind address.
    pub async fn serve(
        mut self,
        address: impl Into<String>,
        router: Router,
    ) -> Result<(), ServerError> {
        self.config.listener.bind_address = address.into();
        self.listen_and_serve(router).await
    }

    /// Acquire the listener, serve `router` on it and drive the lifecycle
    /// until shutdown completes or a fatal error occurs.
    ///
    /// The reload marker is only read here and stays in the environment.
    /// Binaries should call [`ListenerSource::take_from_env`] before
    /// starting their runtime and pass the result to [`run`](Self::run).
    pub async fn listen_and_serve(self, router: Router) -> Result<(), ServerError> {
        let source = ListenerSource::from_env(&self.config.lifecycle.inherit_env);
        self.run(source, router).await
    }

    /// Like [`listen_and_serve`](Self::listen_and_serve) with the listener
    /// source decided by the caller.
    ///
    /// Acquisition errors are returned before anything is spawned.
    pub async fn run(mut self, source: ListenerSource, router: Router) -> Result<(), ServerError> {
        let listener = acquire(source, &self.config.listener).await?;
        let listener = Arc::new(listener);
        let mut signals = Some(SignalWatcher::register()?);

        self.local_addr.send_replace(listener.local_addr().ok());
        let tracker = ConnectionTracker::new();
        let mut serve_task = tokio::spawn(serve(
            Arc::clone(&listener),
            router,
            self.shutdown.subscribe(),
            tracker.clone(),
        ));
        self.transition(LifecycleState::Running);

        loop {
            let event = tokio::select! {
                result = &mut serve_task => Event::Served(result),
                Some(signal) = next_signal(&mut signals) => Event::Signal(signal),
                Some(control) = self.control_rx.recv() => Event::Control(control),
            };

            match event {
                Event::Served(result) => {
                    self.transition(LifecycleState::Stopped);
                    return match result {
                        Ok(outcome) => outcome,
                        Err(join_err) => Err(ServerError::Serve(io::Error::other(join_err))),
                    };
                }
                Event::Signal(signal @ (LifecycleSignal::Interrupt | LifecycleSignal::Terminate)) => {
                    tracing::info!(signal = %signal, "Shutdown signal received");
                    drop(signals.take());
                    return self.graceful_shutdown(listener, serve_task, &tracker).await;
                }
                Event::Control(Control::Stop) => {
                    tracing::info!("Shutdown requested");
                    drop(signals.take());
                    return self.graceful_shutdown(listener, serve_task, &tracker).await;
                }
                Event::Signal(LifecycleSignal::Reload) => {
                    tracing::info!(signal = %LifecycleSignal::Reload, "Reload signal received");
                    match self.reload(&listener) {
                        Ok(_) => {
                            drop(signals.take());
                            return self.graceful_shutdown(listener, serve_task, &tracker).await;
                        }
                        Err(err) => {
                            let fatal = self.config.lifecycle.exit_on_reload_failure;
                            if let Some(err) = self.reload_failed(err, fatal, &serve_task) {
                                return Err(err);
                            }
                        }
                    }
                }
                Event::Control(Control::Reload(reply)) => {
                    tracing::info!("Reload requested");
                    match self.reload(&listener) {
                        Ok(successor) => {
                            let _ = reply.send(Ok(successor));
                            drop(signals.take());
                            return self.graceful_shutdown(listener, serve_task, &tracker).await;
                        }
                        Err(err) => {
                            let _ = reply.send(Err(err.detached()));
                            self.reload_failed(err, false, &serve_task);
                        }
                    }
                }
                Event::Signal(other @ LifecycleSignal::Other(_)) => {
                    tracing::debug!(signal = %other, "Ignoring signal");
                }
            }
        }
    }

    fn transition(&self, next: LifecycleState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            tracing::info!(from = %previous, to = %next, "Lifecycle transition");
        }
    }

    /// Hand the listener to a successor. The listener itself stays open.
    fn reload(&self, listener: &Listener) -> Result<Successor, ServerError> {
        self.transition(LifecycleState::Reloading);

        let result = SuccessorCommand::from_config(
            &self.config.reload,
            &self.config.lifecycle.inherit_env,
        )
        .and_then(|command| spawn_successor(listener, &command));

        match &result {
            Ok(_) => metrics::reload("spawned"),
            Err(_) => metrics::reload("failed"),
        }
        result
    }

    /// Returns the error to end the run with, or `None` to keep serving.
    ///
    /// A fatal failure skips the drain: the serve task is aborted and the
    /// run ends at once.
    fn reload_failed(
        &self,
        err: ServerError,
        fatal: bool,
        serve_task: &JoinHandle<Result<(), ServerError>>,
    ) -> Option<ServerError> {
        if fatal {
            tracing::error!(error = %err, "Reload failed, exiting without handing off");
            serve_task.abort();
            self.transition(LifecycleState::Stopped);
            return Some(err);
        }

        tracing::error!(error = %err, "Reload failed, continuing to serve");
        self.transition(LifecycleState::Running);
        None
    }

    /// Stop accepting, release the listener and drain within the timeout.
    async fn graceful_shutdown(
        &self,
        listener: Arc<Listener>,
        serve_task: JoinHandle<Result<(), ServerError>>,
        tracker: &ConnectionTracker,
    ) -> Result<(), ServerError> {
        self.transition(LifecycleState::ShuttingDown);
        self.shutdown.trigger();
        drop(listener);

        let timeout = self.config.lifecycle.shutdown_timeout();
        let result = match drain(serve_task, timeout).await {
            Ok(()) => {
                metrics::shutdown("drained");
                tracing::info!("All connections drained");
                Ok(())
            }
            Err(ServerError::ShutdownTimeout(timeout)) => {
                metrics::shutdown("timeout");
                tracing::warn!(
                    timeout = ?timeout,
                    remaining = tracker.active_count(),
                    "Shutdown timed out, remaining connections closed"
                );
                Ok(())
            }
            Err(err) => {
                metrics::shutdown("error");
                Err(err)
            }
        };

        self.transition(LifecycleState::Stopped);
        result
    }
}

impl ServerHandle {
    /// Trigger a graceful shutdown. No-op once the server has stopped.
    pub fn stop(&self) {
        let _ = self.control.send(Control::Stop);
    }

    /// Hand the listener to a successor process, then shut this server
    /// down. A spawn failure is returned here and the server keeps
    /// serving, whatever `exit_on_reload_failure` says.
    pub async fn reload(&self) -> Result<Successor, ServerError> {
        let (tx, rx) = oneshot::channel();
        let not_running =
            || ServerError::ReloadSpawn(io::Error::new(io::ErrorKind::NotConnected, "server is not running"));

        self.control
            .send(Control::Reload(tx))
            .map_err(|_| not_running())?;
        rx.await.map_err(|_| not_running())?
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.borrow()
    }

    /// Wait until `state` is reached. Returns `false` if the server was
    /// dropped first.
    pub async fn wait_for_state(&self, state: LifecycleState) -> bool {
        let mut rx = self.state.clone();
        let reached = rx.wait_for(|current| *current == state).await.is_ok();
        reached
    }

    /// The bound address, once the listener has been acquired. `None` if
    /// the server stopped before acquiring one.
    pub async fn local_addr(&self) -> Option<ListenAddr> {
        let mut rx = self.local_addr.clone();
        let addr = match rx.wait_for(Option::is_some).await {
            Ok(addr) => addr.clone(),
            Err(_) => None,
        };
        addr
    }
}
