use std::sync::Arc;

use axum::{routing::get, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::trace::TraceLayer;

pub mod health;
pub mod metrics;

/// Health, metadata and Prometheus scrape routes.
pub fn router(prometheus: Arc<PrometheusHandle>) -> Router {
    Router::new()
        .route("/", get(health::service_info))
        .route("/health", get(health::health_check))
        .route(
            "/metrics",
            get(metrics::prometheus_metrics).with_state(prometheus),
        )
        .layer(TraceLayer::new_for_http())
}
