//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! Listener (TCP or Unix)
//!     → server.rs (accept loop, hyper auto HTTP/1.1 + HTTP/2)
//!     → wrapped axum::Router (application handlers)
//!     → Send to client
//! ```

pub mod server;

pub use server::serve;
