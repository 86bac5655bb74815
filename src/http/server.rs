//! HTTP serve loop.
//!
//! # Responsibilities
//! - Own the accept cycle of the listener (sole caller of `accept`)
//! - Serve each connection with HTTP/1.1 and HTTP/2 (auto-detected) on its
//!   own task, running the wrapped `axum::Router`
//! - On shutdown: stop accepting, release the listener, ask every
//!   connection to finish, wait for all of them
//!
//! Bounding that wait is the controller's job: it aborts this task at the
//! drain deadline, which drops the connection set and aborts whatever is
//! still running.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder;
use hyper_util::service::TowerToHyperService;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::task::JoinSet;

use crate::error::ServerError;
use crate::lifecycle::shutdown::ShutdownSignal;
use crate::net::connection::{ConnectionGuard, ConnectionId, ConnectionTracker};
use crate::net::listener::{Listener, Stream};

/// Back-off after the process ran out of descriptors.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Accept and serve connections until `shutdown` fires or accept fails
/// fatally.
///
/// Returns `Ok(())` after a deliberate shutdown once every connection has
/// finished.
pub async fn serve(
    listener: Arc<Listener>,
    router: Router,
    mut shutdown: ShutdownSignal,
    tracker: ConnectionTracker,
) -> Result<(), ServerError> {
    let mut connections = JoinSet::new();
    let connection_shutdown = shutdown.clone();

    if let Ok(addr) = listener.local_addr() {
        tracing::info!(address = %addr, "HTTP server accepting connections");
    }

    loop {
        tokio::select! {
            _ = shutdown.wait() => break,
            accepted = listener.accept() => match accepted {
                Ok(stream) => {
                    let guard = tracker.track();
                    tracing::debug!(
                        connection_id = %guard.id(),
                        peer = %stream.peer(),
                        in_flight = tracker.active_count(),
                        "Connection accepted"
                    );
                    connections.spawn(serve_connection(
                        stream,
                        router.clone(),
                        connection_shutdown.clone(),
                        guard,
                    ));
                }
                Err(err) if is_fd_exhaustion(&err) => {
                    tracing::warn!(error = %err, "Out of file descriptors, backing off");
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
                Err(err) if is_transient(&err) => {
                    tracing::debug!(error = %err, "Transient accept error");
                }
                Err(err) => {
                    tracing::error!(error = %err, "Accept failed");
                    return Err(ServerError::Serve(err));
                }
            },
            Some(_) = connections.join_next(), if !connections.is_empty() => {}
        }
    }

    // Last reference held by the serve loop; the controller released its own
    // before triggering shutdown, so the socket closes here.
    drop(listener);
    tracing::info!(
        in_flight = tracker.active_count(),
        "Stopped accepting, draining connections"
    );

    while connections.join_next().await.is_some() {}

    tracing::info!("HTTP server stopped");
    Ok(())
}

async fn serve_connection(
    stream: Stream,
    router: Router,
    shutdown: ShutdownSignal,
    guard: ConnectionGuard,
) {
    match stream {
        Stream::Tcp(stream, _) => drive(stream, router, shutdown, guard.id()).await,
        Stream::Unix(stream) => drive(stream, router, shutdown, guard.id()).await,
    }
    drop(guard);
}

async fn drive<I>(io: I, router: Router, mut shutdown: ShutdownSignal, id: ConnectionId)
where
    I: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let builder = Builder::new(TokioExecutor::new());
    let service = TowerToHyperService::new(router);
    let conn = builder.serve_connection_with_upgrades(TokioIo::new(io), service);
    tokio::pin!(conn);

    let mut draining = false;
    loop {
        tokio::select! {
            result = conn.as_mut() => {
                if let Err(err) = result {
                    match err.downcast_ref::<hyper::Error>() {
                        // Client went away mid-request.
                        Some(e) if e.is_incomplete_message() || e.is_canceled() => {
                            tracing::trace!(connection_id = %id, error = %err, "Connection closed early");
                        }
                        _ => tracing::debug!(connection_id = %id, error = %err, "Connection error"),
                    }
                }
                break;
            }
            _ = shutdown.wait(), if !draining => {
                draining = true;
                tracing::trace!(connection_id = %id, "Draining connection");
                conn.as_mut().graceful_shutdown();
            }
        }
    }
}

fn is_transient(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionRefused
            | io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
    )
}

fn is_fd_exhaustion(err: &io::Error) -> bool {
    matches!(
        err.raw_os_error(),
        Some(libc::EMFILE) | Some(libc::ENFILE) | Some(libc::ENOBUFS) | Some(libc::ENOMEM)
    )
}
