//! HTTP API for health checks and Prometheus metrics

use axum::{
    extract::State,
    http::{header::CONTENT_TYPE, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use canary_lib::{
    health::{ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse},
    observability::PollMetrics,
};
use prometheus::{Encoder, TextEncoder};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub health_registry: HealthRegistry,
    pub metrics: PollMetrics,
}

impl AppState {
    pub fn new(health_registry: HealthRegistry, metrics: PollMetrics) -> Self {
        Self {
            health_registry,
            metrics,
        }
    }
}

/// Map the worst query health to an HTTP status
///
/// Only deployment and pod failures stop pods from being reported, so
/// degraded usage or custom metric queries still answer 200.
fn liveness_code(status: ComponentStatus) -> StatusCode {
    match status {
        ComponentStatus::Healthy | ComponentStatus::Degraded => StatusCode::OK,
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    }
}

async fn healthz(State(state): State<Arc<AppState>>) -> (StatusCode, Json<HealthResponse>) {
    let health = state.health_registry.health().await;
    (liveness_code(health.status), Json(health))
}

/// Ready once a poll pass has printed its report
async fn readyz(State(state): State<Arc<AppState>>) -> (StatusCode, Json<ReadinessResponse>) {
    let readiness = state.health_registry.readiness().await;
    if readiness.ready {
        (StatusCode::OK, Json(readiness))
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, Json(readiness))
    }
}

/// Prometheus text exposition of the poll metrics
async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    // Registers the poll metrics if no pass has run yet
    let _ = state.metrics.passes_completed();

    let mut body = Vec::new();
    let code = match TextEncoder::new().encode(&prometheus::gather(), &mut body) {
        Ok(()) => StatusCode::OK,
        Err(e) => {
            error!(error = %e, "Failed to encode metrics");
            body = e.to_string().into_bytes();
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };

    (code, [(CONTENT_TYPE, "text/plain; version=0.0.4")], body)
}

/// Routes served next to the poll loop
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .with_state(state)
}

/// Serve the routes on every interface until the listener fails
pub async fn serve(port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %addr, "Serving health and metrics");

    axum::serve(listener, create_router(state)).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use canary_lib::QueryKind;
    use tower::ServiceExt;

    async fn state() -> Arc<AppState> {
        let registry = HealthRegistry::new();
        registry.register_queries(&QueryKind::ALL).await;
        Arc::new(AppState::new(registry, PollMetrics::new()))
    }

    async fn get_status(state: Arc<AppState>, uri: &str) -> StatusCode {
        create_router(state)
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
            .status()
    }

    #[tokio::test]
    async fn test_not_ready_before_first_pass() {
        let state = state().await;
        assert_eq!(
            get_status(state, "/readyz").await,
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[tokio::test]
    async fn test_ready_after_pass() {
        let state = state().await;
        state.health_registry.set_ready(true).await;
        assert_eq!(get_status(state, "/readyz").await, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_custom_metric_failure_stays_healthy() {
        let state = state().await;
        state
            .health_registry
            .query_failed(QueryKind::CustomMetrics, "metric not found")
            .await;
        assert_eq!(get_status(state, "/healthz").await, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_deployment_failure_is_unhealthy() {
        let state = state().await;
        state
            .health_registry
            .query_failed(QueryKind::Deployments, "forbidden")
            .await;
        assert_eq!(
            get_status(state, "/healthz").await,
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn test_degraded_queries_stay_live() {
        assert_eq!(liveness_code(ComponentStatus::Healthy), StatusCode::OK);
        assert_eq!(liveness_code(ComponentStatus::Degraded), StatusCode::OK);
        assert_eq!(
            liveness_code(ComponentStatus::Unhealthy),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        let state = state().await;
        let response = create_router(state)
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("canaryjudge_passes_total"));
    }
}
