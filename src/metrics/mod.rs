use std::time::Duration;

use once_cell::sync::Lazy;
use prometheus::{
    register_histogram_vec, register_int_counter, register_int_counter_vec, HistogramOpts,
    HistogramVec, IntCounter, IntCounterVec,
};

const DEFAULT_BUCKETS: &[f64] = &[
    1.0, 2.0, 5.0, 10.0, 20.0, 50.0, 100.0, 200.0, 500.0, 1000.0, 2000.0, 5000.0, 10000.0, 30000.0,
    60000.0,
];

// Total number of requests
static REQUESTS: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "statsgate_requests_total",
        "The total number of client requests since statsgate started"
    )
    .unwrap()
});

// Counter for HTTP status codes, labelled by route pattern to keep cardinality bounded
static STATUS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "statsgate_http_status",
        "HTTP status codes per route in statsgate",
        &["code", "route"]
    )
    .unwrap()
});

// Histogram for upstream latency
static UPSTREAM_LATENCY: Lazy<HistogramVec> = Lazy::new(|| {
    let opts = HistogramOpts::new(
        "statsgate_upstream_latency",
        "Upstream call latency in milliseconds per route in statsgate",
    )
    .buckets(DEFAULT_BUCKETS.to_vec());
    register_histogram_vec!(opts, &["route"]).unwrap()
});

/// Route label used for requests that matched no route.
pub const UNMATCHED_ROUTE: &str = "unmatched";

/// Counts one finished downstream request.
pub fn record_request(route: &str, status: http::StatusCode) {
    REQUESTS.inc();
    STATUS
        .with_label_values(&[status.as_str(), route])
        .inc();
}

/// Records how long a forwarded upstream call took, successful or not.
pub fn observe_upstream_latency(route: &str, elapsed: Duration) {
    UPSTREAM_LATENCY
        .with_label_values(&[route])
        .observe(elapsed.as_millis() as f64);
}
