//! Prometheus metrics endpoint.

use axum::extract::State;
use axum::http::StatusCode;
use axum::http::header::CONTENT_TYPE;
use axum::response::IntoResponse;
use metrics::{Unit, describe_counter, describe_histogram};
use metrics_exporter_prometheus::PrometheusHandle;

const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Registers help text for the checkout metrics with the installed recorder.
pub fn describe() {
    describe_counter!("checkout_submitted_total", "Carts submitted with stock reserved");
    describe_counter!(
        "checkout_conflicts_total",
        "Checkout transitions rejected by a conflict"
    );
    describe_counter!("checkout_finished_total", "Carts settled after payment capture");
    describe_counter!("checkout_cancelled_total", "Carts cancelled");
    describe_histogram!(
        "checkout_duration_seconds",
        Unit::Seconds,
        "Time spent in a checkout transition"
    );
}

/// GET /metrics: returns Prometheus-formatted metrics.
pub async fn get(State(handle): State<PrometheusHandle>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(CONTENT_TYPE, PROMETHEUS_CONTENT_TYPE)],
        handle.render(),
    )
}
