//! Metrics collection and exposition.
//!
//! # Metrics
//! - `proxy_upstream_requests_total` (counter): attempts by upstream
//! - `proxy_upstream_errors_total` (counter): failures by upstream, kind
//! - `proxy_failover_switches_total` (counter): transitions by target, reason
//! - `proxy_request_duration_seconds` (histogram): by serving upstream, status
//! - `proxy_active_upstream` (gauge): 0=primary, 1=backup

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::upstream::Upstream;

/// Install the Prometheus exporter listening on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_attempt(upstream: Upstream) {
    counter!("proxy_upstream_requests_total", "upstream" => upstream.as_str()).increment(1);
}

pub fn record_upstream_error(upstream: Upstream, kind: &'static str) {
    counter!(
        "proxy_upstream_errors_total",
        "upstream" => upstream.as_str(),
        "kind" => kind
    )
    .increment(1);
}

pub fn record_switch(to: Upstream, reason: &'static str) {
    counter!(
        "proxy_failover_switches_total",
        "to" => to.as_str(),
        "reason" => reason
    )
    .increment(1);
}

pub fn set_active_upstream(upstream: Upstream) {
    let value = match upstream {
        Upstream::Primary => 0.0,
        Upstream::Backup => 1.0,
    };
    gauge!("proxy_active_upstream").set(value);
}

pub fn record_request(upstream: Upstream, status: u16, start: Instant) {
    histogram!(
        "proxy_request_duration_seconds",
        "upstream" => upstream.as_str(),
        "status" => status.to_string()
    )
    .record(start.elapsed().as_secs_f64());
}
