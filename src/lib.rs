//! Zero-downtime restarts for a process that owns one listening socket.
//!
//! A [`GracefulServer`] binds (or inherits) a listener, serves an
//! `axum::Router` on it and watches for lifecycle signals:
//!
//! - `SIGINT` / `SIGTERM`: stop accepting, drain in-flight connections
//!   within the shutdown timeout, return.
//! - `SIGUSR2`: start a copy of the current executable with the listener
//!   inherited at descriptor 3 and the reload marker (`GOBLET=true`) in its
//!   environment, then drain and return.
//!
//! The successor sees the marker and adopts descriptor 3 instead of binding,
//! so the port never closes across an upgrade.

#[cfg(not(unix))]
compile_error!("goblet requires a Unix platform (Linux or macOS)");

pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;

pub use config::ServerConfig;
pub use error::ServerError;
pub use lifecycle::{
    GracefulServer, LifecycleSignal, LifecycleState, ListenerSource, ServerHandle, Successor,
};
pub use net::ListenAddr;
