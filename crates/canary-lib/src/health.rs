//! Health tracking for the poll loop
//!
//! Each query capability is a component. A successful call marks it
//! healthy; a failed call marks it degraded or unhealthy depending on how
//! much of the report it costs. Readiness flips once the first pass has
//! completed.

use crate::source::QueryKind;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Health status of a component
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    /// Last query succeeded
    Healthy,
    /// Last query failed; the report is missing per-pod details
    Degraded,
    /// Last query failed; the report is missing whole deployments
    Unhealthy,
}

impl ComponentStatus {
    /// Status a failed query of this kind leaves its component in
    pub fn on_failure(kind: QueryKind) -> Self {
        match kind {
            QueryKind::Deployments | QueryKind::Pods => ComponentStatus::Unhealthy,
            QueryKind::PodMetrics | QueryKind::CustomMetrics => ComponentStatus::Degraded,
        }
    }
}

/// Information about a component's health
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: ComponentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub last_check_timestamp: i64,
}

impl ComponentHealth {
    pub fn healthy() -> Self {
        Self {
            status: ComponentStatus::Healthy,
            message: None,
            last_check_timestamp: chrono::Utc::now().timestamp(),
        }
    }

    pub fn failed(status: ComponentStatus, message: impl Into<String>) -> Self {
        Self {
            status,
            message: Some(message.into()),
            last_check_timestamp: chrono::Utc::now().timestamp(),
        }
    }
}

/// Overall health response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: ComponentStatus,
    pub components: HashMap<String, ComponentHealth>,
}

impl HealthResponse {
    /// Compute overall status from component statuses
    pub fn compute_status(components: &HashMap<String, ComponentHealth>) -> ComponentStatus {
        let mut has_degraded = false;

        for health in components.values() {
            match health.status {
                ComponentStatus::Unhealthy => return ComponentStatus::Unhealthy,
                ComponentStatus::Degraded => has_degraded = true,
                ComponentStatus::Healthy => {}
            }
        }

        if has_degraded {
            ComponentStatus::Degraded
        } else {
            ComponentStatus::Healthy
        }
    }
}

/// Readiness response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Health registry shared between the poll loop and the HTTP server
#[derive(Debug, Clone)]
pub struct HealthRegistry {
    components: Arc<RwLock<HashMap<String, ComponentHealth>>>,
    ready: Arc<RwLock<bool>>,
}

impl Default for HealthRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthRegistry {
    pub fn new() -> Self {
        Self {
            components: Arc::new(RwLock::new(HashMap::new())),
            ready: Arc::new(RwLock::new(false)),
        }
    }

    /// Register a component with initial healthy status
    pub async fn register(&self, name: &str) {
        let mut components = self.components.write().await;
        components.insert(name.to_string(), ComponentHealth::healthy());
    }

    /// Register one component per query capability
    pub async fn register_queries(&self, kinds: &[QueryKind]) {
        for kind in kinds {
            self.register(kind.as_str()).await;
        }
    }

    /// Update component health status
    pub async fn update(&self, name: &str, health: ComponentHealth) {
        let mut components = self.components.write().await;
        components.insert(name.to_string(), health);
    }

    /// Record a successful query
    pub async fn query_succeeded(&self, kind: QueryKind) {
        self.update(kind.as_str(), ComponentHealth::healthy()).await;
    }

    /// Record a failed query
    pub async fn query_failed(&self, kind: QueryKind, message: impl Into<String>) {
        let health = ComponentHealth::failed(ComponentStatus::on_failure(kind), message);
        self.update(kind.as_str(), health).await;
    }

    /// Set readiness status
    pub async fn set_ready(&self, ready: bool) {
        let mut r = self.ready.write().await;
        *r = ready;
    }

    /// Get health response
    pub async fn health(&self) -> HealthResponse {
        let components = self.components.read().await.clone();
        let status = HealthResponse::compute_status(&components);
        HealthResponse { status, components }
    }

    /// Get readiness response
    pub async fn readiness(&self) -> ReadinessResponse {
        let ready = *self.ready.read().await;
        let health = self.health().await;

        if !ready {
            ReadinessResponse {
                ready: false,
                reason: Some("No poll pass completed yet".to_string()),
            }
        } else if health.status == ComponentStatus::Unhealthy {
            ReadinessResponse {
                ready: false,
                reason: Some("Cluster queries failing".to_string()),
            }
        } else {
            ReadinessResponse {
                ready: true,
                reason: None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_health_registry_initial_state() {
        let registry = HealthRegistry::new();
        let health = registry.health().await;

        assert_eq!(health.status, ComponentStatus::Healthy);
        assert!(health.components.is_empty());
    }

    #[tokio::test]
    async fn test_register_queries() {
        let registry = HealthRegistry::new();
        registry.register_queries(&QueryKind::ALL).await;

        let health = registry.health().await;
        assert_eq!(health.components.len(), 4);
        assert_eq!(
            health.components["pod_metrics"].status,
            ComponentStatus::Healthy
        );
    }

    #[tokio::test]
    async fn test_usage_failure_degrades() {
        let registry = HealthRegistry::new();
        registry.register_queries(&QueryKind::ALL).await;

        registry
            .query_failed(QueryKind::PodMetrics, "metrics server unavailable")
            .await;

        let health = registry.health().await;
        assert_eq!(health.status, ComponentStatus::Degraded);
        assert_eq!(
            health.components["pod_metrics"].message.as_deref(),
            Some("metrics server unavailable")
        );
    }

    #[tokio::test]
    async fn test_deployment_failure_is_unhealthy_until_next_success() {
        let registry = HealthRegistry::new();
        registry.register_queries(&QueryKind::ALL).await;
        registry.set_ready(true).await;

        registry
            .query_failed(QueryKind::Deployments, "forbidden")
            .await;
        assert_eq!(registry.health().await.status, ComponentStatus::Unhealthy);
        assert!(!registry.readiness().await.ready);

        registry.query_succeeded(QueryKind::Deployments).await;
        assert_eq!(registry.health().await.status, ComponentStatus::Healthy);
        assert!(registry.readiness().await.ready);
    }

    #[tokio::test]
    async fn test_readiness_not_ready_initially() {
        let registry = HealthRegistry::new();
        let readiness = registry.readiness().await;

        assert!(!readiness.ready);
        assert!(readiness.reason.is_some());
    }
}
