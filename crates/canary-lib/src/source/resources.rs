//! Wire types for the metrics APIs
//!
//! `k8s-openapi` has no types for `metrics.k8s.io` or
//! `custom.metrics.k8s.io`, so the parts we read are declared here.

use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::{Deserialize, Serialize};

/// `kubectl get --raw /apis/metrics.k8s.io/v1beta1/namespaces/<ns>/pods/<pod>`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PodMetrics {
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub timestamp: String,
    #[serde(default)]
    pub window: String,
    #[serde(default)]
    pub containers: Vec<PodMetricsContainer>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PodMetricsContainer {
    pub name: String,
    pub usage: PodMetricsUsage,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PodMetricsUsage {
    pub cpu: Quantity,
    pub memory: Quantity,
}

impl k8s_openapi::Resource for PodMetrics {
    const API_VERSION: &'static str = "metrics.k8s.io/v1beta1";
    const GROUP: &'static str = "metrics.k8s.io";
    const KIND: &'static str = "PodMetrics";
    const VERSION: &'static str = "v1beta1";
    const URL_PATH_SEGMENT: &'static str = "pods";
    type Scope = k8s_openapi::NamespaceResourceScope;
}

impl k8s_openapi::Metadata for PodMetrics {
    type Ty = ObjectMeta;

    fn metadata(&self) -> &Self::Ty {
        &self.metadata
    }

    fn metadata_mut(&mut self) -> &mut Self::Ty {
        &mut self.metadata
    }
}

/// Response of a custom metrics lookup for a single object
///
/// Covers both `v1beta1` (`metricName`) and `v1beta2` (`metric.name`);
/// only `value` is read.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricValueList {
    #[serde(default)]
    pub items: Vec<MetricValue>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricValue {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metric_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metric: Option<MetricIdentifier>,
    pub value: Quantity,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricIdentifier {
    pub name: String,
}

/// Discovery document for an API group, as served at `/apis/<group>`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ApiGroupDiscovery {
    #[serde(default)]
    pub preferred_version: Option<GroupVersion>,
    #[serde(default)]
    pub versions: Vec<GroupVersion>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct GroupVersion {
    pub version: String,
}

impl ApiGroupDiscovery {
    /// Preferred version, else the first one listed
    pub fn preferred(&self) -> Option<&str> {
        self.preferred_version
            .as_ref()
            .or_else(|| self.versions.first())
            .map(|v| v.version.as_str())
    }
}
