//! Metrics collection and exposition.
//!
//! # Metrics
//! - `worker_facilities_active` (gauge): facilities currently registered
//! - `worker_facility_starts_total` (counter): successful starts by facility
//! - `worker_facility_failures_total` (counter): failed load/start/stop by facility and op
//! - `worker_facility_start_seconds` (histogram): time spent in each `start`
//! - `worker_lifecycle_state` (gauge): 1 for the current state, 0 otherwise
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade and is a no-op until a
//!   recorder is installed
//! - The Prometheus exporter is opt-in through `runtime.metrics_address`

use std::net::SocketAddr;
use std::time::Duration;

use metrics_exporter_prometheus::PrometheusBuilder;

use crate::facility::FacilityKey;
use crate::lifecycle::LifecycleState;

const STATES: [LifecycleState; 6] = [
    LifecycleState::Created,
    LifecycleState::Starting,
    LifecycleState::Running,
    LifecycleState::Failed,
    LifecycleState::Stopping,
    LifecycleState::Stopped,
];

/// Install the Prometheus exporter on `addr`. Must run inside a tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_facility_started(key: &FacilityKey, elapsed: Duration) {
    metrics::counter!("worker_facility_starts_total", "facility" => key.to_string()).increment(1);
    metrics::histogram!("worker_facility_start_seconds", "facility" => key.to_string())
        .record(elapsed.as_secs_f64());
}

pub fn record_facility_failure(facility: &str, op: &'static str) {
    metrics::counter!(
        "worker_facility_failures_total",
        "facility" => facility.to_string(),
        "op" => op
    )
    .increment(1);
}

pub fn record_active_facilities(count: usize) {
    metrics::gauge!("worker_facilities_active").set(count as f64);
}

pub fn record_lifecycle_state(current: LifecycleState) {
    for state in STATES {
        let value = if state == current { 1.0 } else { 0.0 };
        metrics::gauge!("worker_lifecycle_state", "state" => state.as_str()).set(value);
    }
}
