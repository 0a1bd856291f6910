//! Metrics collection and exposition.
//!
//! # Metrics
//! - `hc_vservers` (gauge): vservers with wanted checks
//! - `hc_configs` (gauge): published probe configurations
//! - `hc_marks_allocated` (gauge): marks bound to DSR/TUN backends
//! - `hc_build_errors_total` (counter): probe specs rejected by the builder
//! - `hc_notifications_total` (counter): deliveries by state
//! - `hc_notifications_dropped_total` (counter): dropped notifications by reason

use std::net::SocketAddr;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus exporter, serving `/metrics` on `addr`.
///
/// Must be called from within a tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

pub fn record_vservers(count: usize) {
    metrics::gauge!("hc_vservers").set(count as f64);
}

pub fn record_configs(count: usize) {
    metrics::gauge!("hc_configs").set(count as f64);
}

pub fn record_marks(count: usize) {
    metrics::gauge!("hc_marks_allocated").set(count as f64);
}

pub fn record_build_error() {
    metrics::counter!("hc_build_errors_total").increment(1);
}

pub fn record_notifications(state: crate::healthcheck::State, delivered: usize) {
    metrics::counter!("hc_notifications_total", "state" => state.as_str()).increment(delivered as u64);
}

pub fn record_dropped_notification(reason: &'static str) {
    metrics::counter!("hc_notifications_dropped_total", "reason" => reason).increment(1);
}
