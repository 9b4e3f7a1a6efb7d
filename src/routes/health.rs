use axum::Json;
use serde::Serialize;

pub const SERVICE_NAME: &str = "lighthouse-worker";

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
}

#[derive(Debug, Serialize)]
pub struct ServiceInfo {
    pub service: &'static str,
    pub version: &'static str,
    pub status: &'static str,
}

/// GET /health — liveness probe.
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "UP",
        service: SERVICE_NAME,
    })
}

/// GET / — service metadata.
pub async fn service_info() -> Json<ServiceInfo> {
    Json(ServiceInfo {
        service: "Lighthouse Worker Service",
        version: env!("CARGO_PKG_VERSION"),
        status: "running",
    })
}
