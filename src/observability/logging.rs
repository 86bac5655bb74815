//! Structured logging.
//!
//! `RUST_LOG` takes precedence over `observability.log_level`, so an
//! operator can raise verbosity for one run without editing the config file
//! the successor will also read.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::schema::{LogFormat, ObservabilityConfig};

/// Build the filter: `RUST_LOG` if set, otherwise the configured level for
/// this crate and the HTTP tracing middleware.
pub fn env_filter(config: &ObservabilityConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter(&config.log_level))
}

fn default_filter(level: &str) -> EnvFilter {
    EnvFilter::new(format!("goblet={level},tower_http={level}"))
}

/// Install the global tracing subscriber.
pub fn init(config: &ObservabilityConfig) {
    let registry = tracing_subscriber::registry().with(env_filter(config));

    match config.log_format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Compact => registry
            .with(tracing_subscriber::fmt::layer().compact())
            .init(),
        LogFormat::Full => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_filter_scopes_level_to_crate() {
        let filter = default_filter("debug").to_string();
        assert!(filter.contains("goblet=debug"));
        assert!(filter.contains("tower_http=debug"));
    }
}
