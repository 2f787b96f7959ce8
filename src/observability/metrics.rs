//! Metrics collection and exposition.
//!
//! # Metrics
//! - `psystrike_client_cache_size` (gauge): cached upstream clients
//! - `psystrike_client_cache_evictions_total` (counter): idle clients removed
//! - `psystrike_client_created_total` (counter): clients constructed, by server
//! - `psystrike_upstream_requests_total` (counter): upstream calls by server, outcome
//! - `psystrike_upstream_request_duration_seconds` (histogram): time to response headers
//! - `psystrike_circuit_breaker_state` (gauge): 0=closed, 1=half-open, 2=open
//! - `psystrike_circuit_breaker_transitions_total` (counter): by breaker, target state
//! - `psystrike_circuit_breaker_requests_total` (counter): by breaker, result
//! - `psystrike_build_info` (gauge): constant 1 labeled by version and commit
//!
//! Breaker metrics are only emitted for named breakers. Pod breakers stay
//! unlabeled so pod churn cannot blow up series cardinality.

use std::time::Duration;

use metrics_exporter_prometheus::{BuildError, Matcher, PrometheusBuilder, PrometheusHandle};

pub const CLIENT_CACHE_SIZE: &str = "psystrike_client_cache_size";
pub const CLIENT_CACHE_EVICTIONS: &str = "psystrike_client_cache_evictions_total";
pub const CLIENT_CREATED: &str = "psystrike_client_created_total";
pub const UPSTREAM_REQUESTS: &str = "psystrike_upstream_requests_total";
pub const UPSTREAM_DURATION: &str = "psystrike_upstream_request_duration_seconds";
pub const BREAKER_STATE: &str = "psystrike_circuit_breaker_state";
pub const BREAKER_TRANSITIONS: &str = "psystrike_circuit_breaker_transitions_total";
pub const BREAKER_REQUESTS: &str = "psystrike_circuit_breaker_requests_total";
pub const BUILD_INFO: &str = "psystrike_build_info";

const LATENCY_BUCKETS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0,
];

/// Install the Prometheus recorder and return a handle for rendering.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new()
        .set_buckets_for_metric(Matcher::Full(UPSTREAM_DURATION.to_string()), LATENCY_BUCKETS)?
        .install_recorder()?;
    describe_metrics();
    Ok(handle)
}

fn describe_metrics() {
    metrics::describe_gauge!(CLIENT_CACHE_SIZE, "Number of cached upstream clients.");
    metrics::describe_counter!(
        CLIENT_CACHE_EVICTIONS,
        "Total number of idle upstream clients evicted."
    );
    metrics::describe_counter!(CLIENT_CREATED, "Total number of upstream clients constructed.");
    metrics::describe_counter!(UPSTREAM_REQUESTS, "Total number of upstream calls by outcome.");
    metrics::describe_histogram!(
        UPSTREAM_DURATION,
        metrics::Unit::Seconds,
        "Time until upstream response headers arrive."
    );
    metrics::describe_gauge!(
        BREAKER_STATE,
        "Circuit breaker state (0=closed, 1=half-open, 2=open)."
    );
    metrics::describe_counter!(BREAKER_TRANSITIONS, "Total circuit breaker state transitions.");
    metrics::describe_counter!(BREAKER_REQUESTS, "Total calls seen by circuit breakers.");
    metrics::describe_gauge!(
        BUILD_INFO,
        "A metric with a constant '1' value labeled by version and commit hash."
    );
}

/// Record the outcome and latency of one upstream call.
pub fn record_upstream_call(server: &str, outcome: &'static str, elapsed: Duration) {
    metrics::counter!(UPSTREAM_REQUESTS, "server" => server.to_string(), "outcome" => outcome)
        .increment(1);
    metrics::histogram!(UPSTREAM_DURATION, "server" => server.to_string())
        .record(elapsed.as_secs_f64());
}

/// A call the breaker refused; no latency to record.
pub fn record_upstream_rejected(server: &str) {
    metrics::counter!(UPSTREAM_REQUESTS, "server" => server.to_string(), "outcome" => "rejected")
        .increment(1);
}

/// Outcome label for a response status.
pub fn status_outcome(status: u16) -> &'static str {
    match status {
        100..=199 => "1xx",
        200..=299 => "2xx",
        300..=399 => "3xx",
        400..=499 => "4xx",
        _ => "5xx",
    }
}

pub fn record_client_created(server: &str) {
    metrics::counter!(CLIENT_CREATED, "server" => server.to_string()).increment(1);
}

pub fn record_cache_size(size: usize) {
    metrics::gauge!(CLIENT_CACHE_SIZE).set(size as f64);
}

pub fn record_cache_evictions(count: usize) {
    metrics::counter!(CLIENT_CACHE_EVICTIONS).increment(count as u64);
}

pub fn record_breaker_state(name: &str, state: &'static str, value: f64) {
    metrics::gauge!(BREAKER_STATE, "name" => name.to_string()).set(value);
    metrics::counter!(BREAKER_TRANSITIONS, "name" => name.to_string(), "state" => state)
        .increment(1);
}

pub fn record_breaker_request(name: &str, result: &'static str) {
    metrics::counter!(BREAKER_REQUESTS, "name" => name.to_string(), "result" => result)
        .increment(1);
}

pub fn record_build_info(version: &str, commit: &str) {
    metrics::gauge!(BUILD_INFO, "version" => version.to_string(), "commit" => commit.to_string())
        .set(1.0);
}
