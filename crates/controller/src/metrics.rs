//! Prometheus metrics for the controller.
//!
//! Covers transaction outcomes, lock scope latency and backup shipping sessions.
//! The `/metrics` endpoint is unauthenticated; restrict it at the network level.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::core::Collector;
use prometheus::{
    self, Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts,
    Registry, TextEncoder,
};
use std::sync::{LazyLock, Once};

/// Global Prometheus registry for all metrics.
pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

// Transactions
pub static TRANSACTIONS_COMMITTED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "ferrostor_transactions_committed_total",
        "Total number of committed transactions",
    )
    .expect("metric creation failed")
});

pub static TRANSACTIONS_ROLLED_BACK: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "ferrostor_transactions_rolled_back_total",
        "Total number of rolled back transactions",
    )
    .expect("metric creation failed")
});

pub static SCOPE_DURATION: LazyLock<HistogramVec> = LazyLock::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "ferrostor_scope_duration_seconds",
            "Time spent inside a lock scope, including lock acquisition and commit",
        )
        .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
        &["scope"],
    )
    .expect("metric creation failed")
});

// Backup shipping
pub static SHIPPING_SESSIONS_STARTED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "ferrostor_shipping_sessions_started_total",
        "Total number of inbound shipping requests received",
    )
    .expect("metric creation failed")
});

pub static SHIPPING_SESSIONS_SUCCEEDED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "ferrostor_shipping_sessions_succeeded_total",
        "Total number of inbound shipping requests answered with a port",
    )
    .expect("metric creation failed")
});

pub static SHIPPING_SESSIONS_FAILED: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "ferrostor_shipping_sessions_failed_total",
            "Total inbound shipping requests that failed, by return code",
        ),
        &["reason"],
    )
    .expect("metric creation failed")
});

pub static SHIPPING_SESSIONS_FINISHED: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "ferrostor_shipping_sessions_finished_total",
            "Total shipping sessions finished, by remote type and outcome",
        ),
        &["remote_type", "outcome"],
    )
    .expect("metric creation failed")
});

pub static SHIPPING_PORTS_ALLOCATED: LazyLock<IntGauge> = LazyLock::new(|| {
    IntGauge::new(
        "ferrostor_shipping_ports_allocated",
        "Number of shipping TCP ports currently held",
    )
    .expect("metric creation failed")
});

static REGISTER_ONCE: Once = Once::new();

/// Register all metrics with the global registry. Later calls are no-ops.
pub fn register_metrics() {
    REGISTER_ONCE.call_once(|| {
        let collectors: [Box<dyn Collector>; 8] = [
            Box::new(TRANSACTIONS_COMMITTED.clone()),
            Box::new(TRANSACTIONS_ROLLED_BACK.clone()),
            Box::new(SCOPE_DURATION.clone()),
            Box::new(SHIPPING_SESSIONS_STARTED.clone()),
            Box::new(SHIPPING_SESSIONS_SUCCEEDED.clone()),
            Box::new(SHIPPING_SESSIONS_FAILED.clone()),
            Box::new(SHIPPING_SESSIONS_FINISHED.clone()),
            Box::new(SHIPPING_PORTS_ALLOCATED.clone()),
        ];
        for collector in collectors {
            REGISTRY
                .register(collector)
                .expect("metric registration failed");
        }
    });
}

/// Handler for `GET /metrics`.
pub async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();

    let mut buffer = Vec::new();
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            buffer,
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain; charset=utf-8")],
            format!("Failed to encode metrics: {e}").into_bytes(),
        ),
    }
}

pub fn record_shipping_failed(reason: &str) {
    SHIPPING_SESSIONS_FAILED.with_label_values(&[reason]).inc();
}

pub fn record_shipping_finished(remote_type: &str, success: bool) {
    let outcome = if success { "success" } else { "aborted" };
    SHIPPING_SESSIONS_FINISHED
        .with_label_values(&[remote_type, outcome])
        .inc();
}
