//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, addresses present)
//! - Reject environment variable names the OS would refuse
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ServerConfig → Result<(), Vec<ValidationError>>

use crate::config::schema::ServerConfig;
use crate::net::listener::UNIX_PREFIX;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("listener.bind_address must not be empty")]
    EmptyBindAddress,

    #[error("listener.bind_address `{0}` has an empty unix socket path")]
    EmptyUnixPath(String),

    #[error("lifecycle.shutdown_timeout_ms must be greater than zero")]
    ZeroShutdownTimeout,

    #[error("lifecycle.inherit_env `{0}` is not a valid environment variable name")]
    InvalidInheritEnv(String),

    #[error("reload.executable must not be empty")]
    EmptyExecutable,

    #[error("observability.metrics_address `{0}` is not a socket address")]
    InvalidMetricsAddress(String),
}

/// Check a parsed configuration for values serde cannot reject on its own.
pub fn validate_config(config: &ServerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let address = config.listener.bind_address.trim();
    if address.is_empty() {
        errors.push(ValidationError::EmptyBindAddress);
    } else if address.strip_prefix(UNIX_PREFIX).is_some_and(str::is_empty) {
        errors.push(ValidationError::EmptyUnixPath(address.to_string()));
    }

    if config.lifecycle.shutdown_timeout_ms == 0 {
        errors.push(ValidationError::ZeroShutdownTimeout);
    }

    let env = &config.lifecycle.inherit_env;
    if env.is_empty() || env.contains('=') || env.contains('\0') {
        errors.push(ValidationError::InvalidInheritEnv(env.clone()));
    }

    if config
        .reload
        .executable
        .as_ref()
        .is_some_and(|path| path.as_os_str().is_empty())
    {
        errors.push(ValidationError::EmptyExecutable);
    }

    if config.observability.metrics_enabled
        && config
            .observability
            .metrics_address
            .parse::<std::net::SocketAddr>()
            .is_err()
    {
        errors.push(ValidationError::InvalidMetricsAddress(
            config.observability.metrics_address.clone(),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
