//! Read-only query capabilities consumed by the poll loop
//!
//! The loop only ever asks three questions of the cluster (which deployments
//! exist, which pods match a selector, how much each pod's containers use)
//! plus an optional fourth (the value of a custom metric for a pod). Each is
//! a trait method returning `Result` so failures can be logged and counted
//! before the loop treats them as empty.

mod kubernetes;
mod resources;

pub use kubernetes::KubeSource;
pub use resources::{MetricValue, MetricValueList, PodMetrics, PodMetricsContainer};

use crate::models::{ContainerUsage, DeploymentInfo, PodInfo};
use crate::quantity::QuantityError;
use crate::selector::LabelSelector;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

pub use async_trait::async_trait;

/// Which query a failure came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryKind {
    Deployments,
    Pods,
    PodMetrics,
    CustomMetrics,
}

impl QueryKind {
    pub const ALL: [QueryKind; 4] = [
        QueryKind::Deployments,
        QueryKind::Pods,
        QueryKind::PodMetrics,
        QueryKind::CustomMetrics,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            QueryKind::Deployments => "deployments",
            QueryKind::Pods => "pods",
            QueryKind::PodMetrics => "pod_metrics",
            QueryKind::CustomMetrics => "custom_metrics",
        }
    }
}

impl fmt::Display for QueryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed query
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("{kind} query failed: {source}")]
    Api {
        kind: QueryKind,
        #[source]
        source: kube::Error,
    },

    #[error("{kind} query returned no value")]
    Empty { kind: QueryKind },

    #[error("{kind} query returned an unusable quantity: {source}")]
    Quantity {
        kind: QueryKind,
        #[source]
        source: QuantityError,
    },

    #[error("{kind} query could not be built: {message}")]
    Request { kind: QueryKind, message: String },
}

impl QueryError {
    pub fn kind(&self) -> QueryKind {
        match self {
            QueryError::Api { kind, .. }
            | QueryError::Empty { kind }
            | QueryError::Quantity { kind, .. }
            | QueryError::Request { kind, .. } => *kind,
        }
    }
}

/// Deployment, pod and usage lookups
#[async_trait]
pub trait WorkloadSource: Send + Sync {
    /// List every deployment in the namespace
    async fn list_deployments(&self, namespace: &str) -> Result<Vec<DeploymentInfo>, QueryError>;

    /// List pods in the namespace matching the selector
    async fn list_pods(
        &self,
        namespace: &str,
        selector: &LabelSelector,
    ) -> Result<Vec<PodInfo>, QueryError>;

    /// Current per-container usage of a pod
    async fn pod_usage(&self, namespace: &str, pod: &str) -> Result<Vec<ContainerUsage>, QueryError>;
}

/// Per-pod custom metric lookup
#[async_trait]
pub trait CustomMetricSource: Send + Sync {
    /// Current value of `metric` for the pod, in milli-units
    async fn pod_metric_milli(
        &self,
        namespace: &str,
        pod: &str,
        metric: &str,
    ) -> Result<i64, QueryError>;
}
