//! Query capabilities backed by the Kubernetes API
//!
//! Deployments and pods come from the core APIs, container usage from the
//! resource metrics API (`metrics.k8s.io`) and per-pod custom metrics from
//! the custom metrics API (`custom.metrics.k8s.io`).

use super::resources::{ApiGroupDiscovery, MetricValueList, PodMetrics};
use super::{async_trait, CustomMetricSource, QueryError, QueryKind, WorkloadSource};
use crate::models::{ContainerUsage, DeploymentInfo, PodInfo};
use crate::quantity::ParsedQuantity;
use crate::selector::LabelSelector;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Pod;
use kube::api::{Api, ListParams};
use kube::Client;
use serde::de::DeserializeOwned;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

const CUSTOM_METRICS_GROUP: &str = "custom.metrics.k8s.io";

/// Version used when the custom metrics group cannot be discovered
const FALLBACK_CUSTOM_METRICS_VERSION: &str = "v1beta1";

/// Kubernetes implementation of the query capabilities
pub struct KubeSource {
    client: Client,
    /// Preferred custom metrics API version, discovered on first use
    custom_metrics_version: OnceCell<String>,
}

impl KubeSource {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            custom_metrics_version: OnceCell::new(),
        }
    }

    /// Custom metrics API version to query, falling back when discovery fails
    async fn custom_metrics_version(&self) -> String {
        let discovered = self
            .custom_metrics_version
            .get_or_try_init(|| self.discover_custom_metrics_version())
            .await;

        match discovered {
            Ok(version) => version.clone(),
            Err(e) => {
                warn!(
                    error = %e,
                    fallback = FALLBACK_CUSTOM_METRICS_VERSION,
                    "Custom metrics API discovery failed"
                );
                FALLBACK_CUSTOM_METRICS_VERSION.to_string()
            }
        }
    }

    async fn discover_custom_metrics_version(&self) -> Result<String, QueryError> {
        let group: ApiGroupDiscovery = self
            .get_raw(QueryKind::CustomMetrics, format!("/apis/{CUSTOM_METRICS_GROUP}"))
            .await?;

        let version = group
            .preferred()
            .ok_or(QueryError::Empty {
                kind: QueryKind::CustomMetrics,
            })?
            .to_string();

        debug!(version = %version, "Discovered custom metrics API version");
        Ok(version)
    }

    async fn get_raw<T: DeserializeOwned>(&self, kind: QueryKind, path: String) -> Result<T, QueryError> {
        let request = http::Request::get(path)
            .body(Vec::new())
            .map_err(|e| QueryError::Request {
                kind,
                message: e.to_string(),
            })?;

        self.client
            .request(request)
            .await
            .map_err(|source| QueryError::Api { kind, source })
    }
}

fn deployment_info(deployment: Deployment) -> DeploymentInfo {
    let template_labels = deployment
        .spec
        .and_then(|spec| spec.template.metadata)
        .and_then(|meta| meta.labels)
        .unwrap_or_default();

    DeploymentInfo {
        name: deployment.metadata.name.unwrap_or_default(),
        template_labels,
    }
}

fn pod_info(pod: Pod) -> PodInfo {
    PodInfo {
        name: pod.metadata.name.unwrap_or_default(),
        labels: pod.metadata.labels.unwrap_or_default(),
    }
}

#[async_trait]
impl WorkloadSource for KubeSource {
    async fn list_deployments(&self, namespace: &str) -> Result<Vec<DeploymentInfo>, QueryError> {
        let api: Api<Deployment> = Api::namespaced(self.client.clone(), namespace);
        let list = api
            .list(&ListParams::default())
            .await
            .map_err(|source| QueryError::Api {
                kind: QueryKind::Deployments,
                source,
            })?;

        Ok(list.items.into_iter().map(deployment_info).collect())
    }

    async fn list_pods(
        &self,
        namespace: &str,
        selector: &LabelSelector,
    ) -> Result<Vec<PodInfo>, QueryError> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);

        let mut params = ListParams::default();
        if !selector.is_empty() {
            params = params.labels(&selector.to_string());
        }

        let list = api.list(&params).await.map_err(|source| QueryError::Api {
            kind: QueryKind::Pods,
            source,
        })?;

        Ok(list.items.into_iter().map(pod_info).collect())
    }

    async fn pod_usage(&self, namespace: &str, pod: &str) -> Result<Vec<ContainerUsage>, QueryError> {
        let api: Api<PodMetrics> = Api::namespaced(self.client.clone(), namespace);
        let metrics = api.get(pod).await.map_err(|source| QueryError::Api {
            kind: QueryKind::PodMetrics,
            source,
        })?;

        Ok(metrics
            .containers
            .into_iter()
            .map(|c| ContainerUsage {
                name: c.name,
                cpu: c.usage.cpu,
                memory: c.usage.memory,
            })
            .collect())
    }
}

#[async_trait]
impl CustomMetricSource for KubeSource {
    async fn pod_metric_milli(
        &self,
        namespace: &str,
        pod: &str,
        metric: &str,
    ) -> Result<i64, QueryError> {
        let kind = QueryKind::CustomMetrics;
        let version = self.custom_metrics_version().await;
        let path = format!(
            "/apis/{CUSTOM_METRICS_GROUP}/{version}/namespaces/{namespace}/pods/{pod}/{metric}"
        );

        let list: MetricValueList = self.get_raw(kind, path).await?;
        let value = list.items.first().ok_or(QueryError::Empty { kind })?;
        let parsed = ParsedQuantity::try_from(&value.value)
            .map_err(|source| QueryError::Quantity { kind, source })?;

        Ok(parsed.milli_value())
    }
}
