//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_requests_total` (counter): inbound requests by method, status
//! - `gateway_request_duration_seconds` (histogram): inbound latency
//! - `gateway_dispatch_total` (counter): logical calls by service, outcome
//! - `gateway_dispatch_duration_seconds` (histogram): logical call latency
//! - `gateway_dispatch_attempts_total` (counter): attempts by service, outcome
//! - `gateway_breaker_state` (gauge): 0=closed, 1=half-open, 2=open
//! - `gateway_instances` (gauge): endpoints per service
//! - `gateway_auth_rejections_total` (counter): rejections by reason
//!
//! # Design Decisions
//! - Recording is a no-op until a recorder is installed, so library code
//!   and tests never need setup

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

use crate::resilience::CircuitState;

/// Install the Prometheus recorder and its scrape listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(method: &str, status: u16, start: Instant) {
    let labels = [
        ("method", method.to_string()),
        ("status", status.to_string()),
    ];
    metrics::counter!("gateway_requests_total", &labels).increment(1);
    metrics::histogram!("gateway_request_duration_seconds", &labels)
        .record(start.elapsed().as_secs_f64());
}

pub fn record_dispatch(service: &str, outcome: &'static str, start: tokio::time::Instant) {
    let labels = [("service", service.to_string()), ("outcome", outcome.to_string())];
    metrics::counter!("gateway_dispatch_total", &labels).increment(1);
    metrics::histogram!("gateway_dispatch_duration_seconds", &labels)
        .record(start.elapsed().as_secs_f64());
}

pub fn record_attempt(service: &str, outcome: &'static str) {
    metrics::counter!(
        "gateway_dispatch_attempts_total",
        "service" => service.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

pub fn record_breaker_state(instance: &str, state: CircuitState) {
    let value = match state {
        CircuitState::Closed => 0.0,
        CircuitState::HalfOpen => 1.0,
        CircuitState::Open => 2.0,
    };
    metrics::gauge!("gateway_breaker_state", "instance" => instance.to_string()).set(value);
}

pub fn record_instances(service: &str, count: usize) {
    metrics::gauge!("gateway_instances", "service" => service.to_string()).set(count as f64);
}

pub fn record_auth_rejection(reason: &'static str) {
    metrics::counter!("gateway_auth_rejections_total", "reason" => reason).increment(1);
}
