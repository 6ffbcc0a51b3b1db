//! Poll loop
//!
//! Runs one pass, writes its report, waits the interval and repeats until
//! the shutdown channel fires. A failed query is logged and treated as an
//! empty result; nothing inside a pass can stop the loop.

use super::{DEFAULT_CUSTOM_METRIC, DEFAULT_DEPLOYMENT, DEFAULT_NAMESPACE};
use crate::health::HealthRegistry;
use crate::models::{
    ContainerReport, ContainerUsage, CustomMetricReport, DeploymentInfo, DeploymentReport,
    PassReport, PodInfo, PodReport,
};
use crate::observability::{PollMetrics, StructuredLogger};
use crate::quantity::{bytes_to_mebibytes_ceil, ParsedQuantity};
use crate::report::{write_report, OutputFormat};
use crate::selector::LabelSelector;
use crate::source::{CustomMetricSource, QueryError, QueryKind, WorkloadSource};
use anyhow::Result;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use std::collections::HashSet;
use std::future::Future;
use std::io::{self, Write};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::{debug, info};

/// Configuration for the poll loop
#[derive(Debug, Clone)]
pub struct PollConfig {
    /// Namespace holding the target deployments
    pub namespace: String,
    /// Deployments to report on, in report order
    pub deployments: Vec<String>,
    /// Delay between the end of one pass and the start of the next (default: 2 seconds)
    pub interval: Duration,
    /// Custom metric read per pod when a custom metric source is set
    pub custom_metric: String,
    pub format: OutputFormat,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            deployments: vec![DEFAULT_DEPLOYMENT.to_string()],
            interval: Duration::from_secs(2),
            custom_metric: DEFAULT_CUSTOM_METRIC.to_string(),
            format: OutputFormat::Text,
        }
    }
}

/// Failures seen during one pass
#[derive(Debug, Default)]
struct PassStats {
    failures: usize,
}

/// Fixed-interval poll loop over one namespace
pub struct PollLoop {
    source: Arc<dyn WorkloadSource>,
    /// Absent when the custom metric block is disabled
    custom_metrics: Option<Arc<dyn CustomMetricSource>>,
    config: PollConfig,
    health: HealthRegistry,
    metrics: PollMetrics,
    logger: StructuredLogger,
}

impl PollLoop {
    /// Create a new poll loop
    pub fn new(
        source: Arc<dyn WorkloadSource>,
        custom_metrics: Option<Arc<dyn CustomMetricSource>>,
        config: PollConfig,
        health: HealthRegistry,
    ) -> Self {
        let logger = StructuredLogger::new(&config.namespace);

        Self {
            source,
            custom_metrics,
            config,
            health,
            metrics: PollMetrics::new(),
            logger,
        }
    }

    pub fn config(&self) -> &PollConfig {
        &self.config
    }

    /// Run passes until `shutdown` fires, writing each report to `out`
    ///
    /// Only a failure to write the report ends the loop with an error.
    pub async fn run<W: Write + Send>(
        self,
        mut out: W,
        mut shutdown: broadcast::Receiver<()>,
    ) -> io::Result<()> {
        info!(
            namespace = %self.config.namespace,
            deployments = ?self.config.deployments,
            interval_ms = self.config.interval.as_millis() as u64,
            custom_metric = self.custom_metrics.is_some(),
            "Starting poll loop"
        );

        loop {
            let report = tokio::select! {
                report = self.run_once() => report,
                _ = shutdown.recv() => {
                    info!("Shutting down poll loop mid-pass");
                    break;
                }
            };

            write_report(&mut out, &report, self.config.format)?;

            tokio::select! {
                _ = tokio::time::sleep(self.config.interval) => {}
                _ = shutdown.recv() => {
                    info!("Shutting down poll loop");
                    break;
                }
            }
        }

        Ok(())
    }

    /// Run a single pass and return what it observed
    pub async fn run_once(&self) -> PassReport {
        let start = Instant::now();
        let mut stats = PassStats::default();
        let namespace = &self.config.namespace;
        let mut report = PassReport::new(namespace.as_str());

        let deployments = self
            .observe(
                &mut stats,
                QueryKind::Deployments,
                self.source.list_deployments(namespace),
            )
            .await
            .unwrap_or_default();

        for target in &self.config.deployments {
            for deployment in deployments.iter().filter(|d| &d.name == target) {
                let deployment_report = self.report_deployment(&mut stats, deployment).await;
                report.deployments.push(deployment_report);
            }
        }

        let elapsed = start.elapsed();
        self.metrics.observe_pass(elapsed, report.pod_count());
        self.health.set_ready(true).await;
        self.logger.log_pass(
            report.deployments.len(),
            report.pod_count(),
            stats.failures,
            elapsed,
        );

        report
    }

    async fn report_deployment(
        &self,
        stats: &mut PassStats,
        deployment: &DeploymentInfo,
    ) -> DeploymentReport {
        let selector = LabelSelector::from_labels(&deployment.template_labels);
        debug!(
            deployment = %deployment.name,
            selector = %selector,
            "Resolved pod selector"
        );

        let pods = self
            .observe(
                stats,
                QueryKind::Pods,
                self.source.list_pods(&self.config.namespace, &selector),
            )
            .await
            .unwrap_or_default();

        let mut pod_reports = Vec::with_capacity(pods.len());
        for pod in &pods {
            pod_reports.push(self.report_pod(stats, pod).await);
        }

        DeploymentReport {
            name: deployment.name.clone(),
            selector: selector.to_string(),
            pods: pod_reports,
        }
    }

    async fn report_pod(&self, stats: &mut PassStats, pod: &PodInfo) -> PodReport {
        let namespace = &self.config.namespace;

        let usage = self
            .observe(
                stats,
                QueryKind::PodMetrics,
                self.source.pod_usage(namespace, &pod.name),
            )
            .await
            .unwrap_or_default();

        let containers = usage
            .iter()
            .map(|u| self.convert_usage(&pod.name, u))
            .collect();

        let custom_metric = match &self.custom_metrics {
            Some(source) => {
                let metric = &self.config.custom_metric;
                let milli_value = self
                    .observe(
                        stats,
                        QueryKind::CustomMetrics,
                        source.pod_metric_milli(namespace, &pod.name, metric),
                    )
                    .await
                    .unwrap_or(0);

                Some(CustomMetricReport {
                    name: metric.clone(),
                    milli_value,
                })
            }
            None => None,
        };

        PodReport {
            name: pod.name.clone(),
            containers,
            custom_metric,
        }
    }

    fn convert_usage(&self, pod: &str, usage: &ContainerUsage) -> ContainerReport {
        let cpu = self.read_quantity(pod, &usage.name, "cpu", &usage.cpu);
        let memory = self.read_quantity(pod, &usage.name, "memory", &usage.memory);

        ContainerReport {
            name: usage.name.clone(),
            cpu_cores: cpu.truncated(),
            memory_mib: bytes_to_mebibytes_ceil(memory.ceil()),
            cpu_raw: usage.cpu.0.clone(),
            memory_raw: usage.memory.0.clone(),
        }
    }

    fn read_quantity(
        &self,
        pod: &str,
        container: &str,
        resource: &str,
        quantity: &Quantity,
    ) -> ParsedQuantity {
        ParsedQuantity::try_from(quantity).unwrap_or_else(|e| {
            self.logger
                .log_unreadable_quantity(pod, container, resource, &e.to_string());
            ParsedQuantity::ZERO
        })
    }

    /// Await a query, recording its outcome; a failure becomes `None`
    async fn observe<T>(
        &self,
        stats: &mut PassStats,
        kind: QueryKind,
        query: impl Future<Output = Result<T, QueryError>>,
    ) -> Option<T> {
        match query.await {
            Ok(value) => {
                self.health.query_succeeded(kind).await;
                Some(value)
            }
            Err(e) => {
                stats.failures += 1;
                self.metrics.inc_query_failures(kind);
                self.logger.log_query_failure(&e);
                self.health.query_failed(kind, e.to_string()).await;
                None
            }
        }
    }
}

/// Builder for the poll loop
pub struct PollLoopBuilder {
    source: Option<Arc<dyn WorkloadSource>>,
    custom_metrics: Option<Arc<dyn CustomMetricSource>>,
    deployments: Option<Vec<String>>,
    health: Option<HealthRegistry>,
    config: PollConfig,
}

impl PollLoopBuilder {
    /// Create a new builder with default configuration
    pub fn new() -> Self {
        Self {
            source: None,
            custom_metrics: None,
            deployments: None,
            health: None,
            config: PollConfig::default(),
        }
    }

    /// Set the deployment, pod and usage source
    pub fn source(mut self, source: Arc<dyn WorkloadSource>) -> Self {
        self.source = Some(source);
        self
    }

    /// Enable the custom metric block with this source
    pub fn custom_metrics(mut self, source: Arc<dyn CustomMetricSource>) -> Self {
        self.custom_metrics = Some(source);
        self
    }

    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.config.namespace = namespace.into();
        self
    }

    /// Add a target deployment; the first call replaces the default target
    pub fn deployment(mut self, name: impl Into<String>) -> Self {
        self.deployments
            .get_or_insert_with(Vec::new)
            .push(name.into());
        self
    }

    /// Replace the target deployments
    pub fn deployments<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.deployments = Some(names.into_iter().map(Into::into).collect());
        self
    }

    /// Set the delay between passes
    pub fn interval(mut self, interval: Duration) -> Self {
        self.config.interval = interval;
        self
    }

    /// Set the custom metric read per pod
    pub fn custom_metric_name(mut self, name: impl Into<String>) -> Self {
        self.config.custom_metric = name.into();
        self
    }

    pub fn format(mut self, format: OutputFormat) -> Self {
        self.config.format = format;
        self
    }

    /// Share a health registry with the caller
    pub fn health(mut self, health: HealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    /// Build the poll loop
    pub fn build(mut self) -> Result<PollLoop> {
        let source = self
            .source
            .ok_or_else(|| anyhow::anyhow!("Workload source is required"))?;

        if let Some(deployments) = self.deployments {
            self.config.deployments = deployments;
        }

        // A repeated target would print its pods twice per pass
        let mut seen = HashSet::new();
        self.config
            .deployments
            .retain(|name| seen.insert(name.clone()));

        anyhow::ensure!(
            !self.config.namespace.is_empty(),
            "Namespace must not be empty"
        );
        anyhow::ensure!(
            !self.config.deployments.is_empty(),
            "At least one deployment is required"
        );
        anyhow::ensure!(
            self.config.deployments.iter().all(|d| !d.is_empty()),
            "Deployment names must not be empty"
        );
        anyhow::ensure!(
            !self.config.interval.is_zero(),
            "Poll interval must be greater than zero"
        );
        anyhow::ensure!(
            self.custom_metrics.is_none() || !self.config.custom_metric.is_empty(),
            "Custom metric name must not be empty"
        );

        Ok(PollLoop::new(
            source,
            self.custom_metrics,
            self.config,
            self.health.unwrap_or_default(),
        ))
    }
}

impl Default for PollLoopBuilder {
    fn default() -> Self {
        Self::new()
    }
}
