//! Prometheus metrics recorder and metric name constants.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the Prometheus metrics recorder (global).
///
/// Returns the handle used to render the `/metrics` endpoint. Must be called
/// once at startup before any metrics are recorded.
pub fn install_recorder() -> PrometheusHandle {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install metrics recorder");
    info!("prometheus metrics recorder installed");
    handle
}

// Metric name constants to avoid typos across modules.

/// Relay sessions accepted total (counter).
pub const RELAY_SESSIONS_TOTAL: &str = "relay_sessions_total";
/// Active relay sessions (gauge).
pub const RELAY_SESSIONS_ACTIVE: &str = "relay_sessions_active";
/// Sessions torn down because the client never answered a probe (counter).
pub const RELAY_HEARTBEAT_TIMEOUTS_TOTAL: &str = "relay_heartbeat_timeouts_total";
/// Upstream dial failures (counter).
pub const RELAY_DIAL_FAILURES_TOTAL: &str = "relay_dial_failures_total";
/// Discovery HTTP requests total (counter, labels: endpoint).
pub const DISCOVERY_REQUESTS_TOTAL: &str = "discovery_requests_total";
/// Discovery upstream fetch failures (counter).
pub const DISCOVERY_UPSTREAM_FAILURES_TOTAL: &str = "discovery_upstream_failures_total";
