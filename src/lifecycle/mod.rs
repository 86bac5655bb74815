//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     reload marker? → adopt fd 3 : bind configured address
//!     (the binary reads and clears the marker before the runtime starts)
//!
//! Control loop (controller.rs):
//!     serve task result ┐
//!     signals.rs        ├→ select! → state transition
//!     ServerHandle      ┘
//!
//! Reload (reload.rs):
//!     dup listener fd → spawn successor (fd at slot 3, marker env)
//!     → graceful shutdown of this process
//!
//! Shutdown (shutdown.rs):
//!     trigger → stop accepting → drain connections → abort at deadline
//! ```
//!
//! # Design Decisions
//! - Fail fast: acquisition errors are fatal and returned before serving
//! - The listener is released only inside graceful shutdown, after any
//!   descriptor duplication for a successor has completed
//! - Shutdown has timeout: connections still open at the deadline are cut

pub mod controller;
pub mod reload;
pub mod shutdown;
pub mod signals;
pub mod startup;

pub use controller::{GracefulServer, LifecycleState, ServerHandle};
pub use reload::Successor;
pub use shutdown::Shutdown;
pub use signals::LifecycleSignal;
pub use startup::ListenerSource;
