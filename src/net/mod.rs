//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Fresh start:   bind address      ─┐
//!                                   ├→ listener.rs (Listener) → accept
//! Reload child:  inherited fd 3    ─┘
//!                                        → connection.rs (id, tracking)
//!                                        → Hand off to HTTP layer
//!
//! Reload parent: listener.rs duplicate_fd → lifecycle::reload
//! ```
//!
//! # Design Decisions
//! - One listener per process; ownership moves to the successor on reload
//! - Inherited descriptors are validated before being adopted
//! - Each connection tracked for graceful shutdown

pub mod connection;
pub mod listener;

pub use listener::{ListenAddr, Listener, Stream, INHERITED_FD};
