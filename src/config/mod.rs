//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! goblet.toml
//!     → loader.rs (read & deserialize)
//!     → validation.rs (semantic checks)
//!     → ServerConfig (validated, immutable)
//!     → moved into GracefulServer
//!
//! On reload:
//!     the successor process re-reads the same file from scratch
//!     (config changes ride along with the binary upgrade)
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require a reload
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{LifecycleConfig, ListenerConfig, ObservabilityConfig, ReloadConfig, ServerConfig};
