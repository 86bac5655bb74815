//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from `goblet.toml`.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Environment variable marking a process as a reload successor.
pub const DEFAULT_INHERIT_ENV: &str = "GOBLET";

/// Root configuration for the graceful server.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ServerConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Shutdown and reload behavior.
    pub lifecycle: LifecycleConfig,

    /// How the successor process is launched.
    pub reload: ReloadConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address: `host:port` for TCP or `unix:/path/to.sock`.
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:8080".to_string(),
        }
    }
}

/// Lifecycle configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LifecycleConfig {
    /// Upper bound on draining in-flight connections, in milliseconds.
    pub shutdown_timeout_ms: u64,

    /// Name of the environment variable that marks a reload successor.
    pub inherit_env: String,

    /// End the run with the spawn error when a `SIGUSR2` reload fails.
    /// When off, the process logs the failure and keeps serving.
    /// `ServerHandle::reload` failures are never fatal.
    pub exit_on_reload_failure: bool,
}

impl LifecycleConfig {
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            shutdown_timeout_ms: 5_000,
            inherit_env: DEFAULT_INHERIT_ENV.to_string(),
            exit_on_reload_failure: true,
        }
    }
}

/// Successor process launch settings.
///
/// Every field is optional; unset fields re-use what the current process
/// was started with.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ReloadConfig {
    /// Executable to launch (default: the current executable).
    pub executable: Option<PathBuf>,

    /// Arguments, excluding the program name (default: current arguments).
    pub args: Option<Vec<String>>,

    /// Working directory of the successor (default: inherited).
    pub working_dir: Option<PathBuf>,
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Full,
    Compact,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error). `RUST_LOG` wins if set.
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable the Prometheus metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Full,
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let config: ServerConfig = toml::from_str("").unwrap();
        assert_eq!(config.listener.bind_address, "127.0.0.1:8080");
        assert_eq!(config.lifecycle.shutdown_timeout(), Duration::from_secs(5));
        assert_eq!(config.lifecycle.inherit_env, "GOBLET");
        assert!(config.lifecycle.exit_on_reload_failure);
        assert!(config.reload.executable.is_none());
    }

    #[test]
    fn partial_sections_merge_with_defaults() {
        let config: ServerConfig = toml::from_str(
            r#"
            [lifecycle]
            shutdown_timeout_ms = 250

            [reload]
            args = ["--config", "goblet.toml"]

            [observability]
            log_format = "json"
            "#,
        )
        .unwrap();

        assert_eq!(config.lifecycle.shutdown_timeout_ms, 250);
        assert_eq!(config.lifecycle.inherit_env, "GOBLET");
        assert_eq!(
            config.reload.args.as_deref(),
            Some(&["--config".to_string(), "goblet.toml".to_string()][..])
        );
        assert_eq!(config.observability.log_format, LogFormat::Json);
        assert_eq!(config.observability.log_level, "info");
    }
}
