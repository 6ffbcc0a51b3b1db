//! Core data models for canaryjudge
//!
//! Everything here is transient: it is read from the cluster during one
//! poll pass and dropped at the end of it.

use chrono::{DateTime, Utc};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A deployment reduced to what the poll loop needs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentInfo {
    pub name: String,
    /// Labels of the deployment's pod template
    pub template_labels: BTreeMap<String, String>,
}

/// A pod matched by a deployment's label selector
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PodInfo {
    pub name: String,
    pub labels: BTreeMap<String, String>,
}

/// Raw usage of one container as reported by the resource metrics API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerUsage {
    pub name: String,
    pub cpu: Quantity,
    pub memory: Quantity,
}

/// Everything observed during one poll pass
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PassReport {
    pub namespace: String,
    pub timestamp: DateTime<Utc>,
    pub deployments: Vec<DeploymentReport>,
}

impl PassReport {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            timestamp: Utc::now(),
            deployments: Vec::new(),
        }
    }

    /// Number of pods reported across all deployments
    pub fn pod_count(&self) -> usize {
        self.deployments.iter().map(|d| d.pods.len()).sum()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentReport {
    pub name: String,
    pub selector: String,
    pub pods: Vec<PodReport>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PodReport {
    pub name: String,
    pub containers: Vec<ContainerReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_metric: Option<CustomMetricReport>,
}

/// Container usage converted to display units
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerReport {
    pub name: String,
    /// Whole cores, truncated toward zero
    pub cpu_cores: i64,
    /// Mebibytes, rounded up
    pub memory_mib: i64,
    pub cpu_raw: String,
    pub memory_raw: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomMetricReport {
    pub name: String,
    pub milli_value: i64,
}
