//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured tracing events)
//!     → metrics.rs (connection, reload and shutdown counters)
//!
//! Consumers:
//!     → stdout/stderr (inherited by reload successors)
//!     → Metrics endpoint (Prometheus scrape, optional)
//! ```
//!
//! # Design Decisions
//! - Structured fields on every lifecycle event (state, pid, fd, address)
//! - JSON format for production, human format for development
//! - Metrics are cheap (atomic increments) and no-ops without a recorder

pub mod logging;
pub mod metrics;
