//! Metrics collection and exposition.
//!
//! # Metrics
//! - `goblet_connections_total` (counter): accepted connections
//! - `goblet_active_connections` (gauge): in-flight connections
//! - `goblet_reloads_total` (counter): reload attempts by `outcome`
//! - `goblet_shutdowns_total` (counter): completed shutdowns by `outcome`
//!
//! Without an installed recorder every call here is a no-op.
//!
//! A reload successor starts while its parent still owns the scrape port,
//! so [`init_metrics_with_retry`] keeps trying until the parent has exited.

use std::net::SocketAddr;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder and its scrape endpoint.
///
/// Must be called from within a tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;

    describe_counter!("goblet_connections_total", "Accepted client connections");
    describe_gauge!("goblet_active_connections", "In-flight client connections");
    describe_counter!("goblet_reloads_total", "Reload attempts by outcome");
    describe_counter!("goblet_shutdowns_total", "Completed shutdowns by outcome");

    tracing::info!(address = %addr, "Metrics endpoint started");
    Ok(())
}

const RETRY_INITIAL: Duration = Duration::from_millis(50);
const RETRY_MAX: Duration = Duration::from_secs(1);

/// [`init_metrics`], retried with back-off for up to `window` while the
/// address is taken.
pub async fn init_metrics_with_retry(addr: SocketAddr, window: Duration) -> Result<(), BuildError> {
    let deadline = tokio::time::Instant::now() + window;
    let mut delay = RETRY_INITIAL;
    loop {
        match init_metrics(addr) {
            Err(BuildError::FailedToCreateHTTPListener(reason))
                if tokio::time::Instant::now() + delay < deadline =>
            {
                tracing::debug!(address = %addr, %reason, "Metrics address busy, retrying");
                tokio::time::sleep(delay).await;
                delay = (delay * 2).min(RETRY_MAX);
            }
            result => return result,
        }
    }
}

pub(crate) fn connection_opened(active: u64) {
    counter!("goblet_connections_total").increment(1);
    gauge!("goblet_active_connections").set(active as f64);
}

pub(crate) fn connection_closed(active: u64) {
    gauge!("goblet_active_connections").set(active as f64);
}

pub(crate) fn reload(outcome: &'static str) {
    counter!("goblet_reloads_total", "outcome" => outcome).increment(1);
}

pub(crate) fn shutdown(outcome: &'static str) {
    counter!("goblet_shutdowns_total", "outcome" => outcome).increment(1);
}
