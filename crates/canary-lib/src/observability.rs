//! Observability infrastructure for canaryjudge
//!
//! Provides:
//! - Prometheus metrics (passes, query failures, pods reported, pass latency)
//! - Structured logging of lifecycle events with tracing
//!
//! Logs never go to stdout; the report owns it.

use crate::source::{QueryError, QueryKind};
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, Histogram, IntCounter,
    IntCounterVec,
};
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Histogram buckets for pass duration (in seconds)
const PASS_DURATION_BUCKETS: &[f64] = &[0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<PollMetricsInner> = OnceLock::new();

struct PollMetricsInner {
    passes_completed: IntCounter,
    query_failures: IntCounterVec,
    pods_reported: IntCounter,
    pass_duration_seconds: Histogram,
}

impl PollMetricsInner {
    fn new() -> Self {
        Self {
            passes_completed: register_int_counter!(
                "canaryjudge_passes_total",
                "Number of completed poll passes"
            )
            .expect("Failed to register passes_total"),

            query_failures: register_int_counter_vec!(
                "canaryjudge_query_failures_total",
                "Number of failed cluster queries by query kind",
                &["query"]
            )
            .expect("Failed to register query_failures_total"),

            pods_reported: register_int_counter!(
                "canaryjudge_pods_reported_total",
                "Number of pod reports printed"
            )
            .expect("Failed to register pods_reported_total"),

            pass_duration_seconds: register_histogram!(
                "canaryjudge_pass_duration_seconds",
                "Time spent querying the cluster during one poll pass",
                PASS_DURATION_BUCKETS.to_vec()
            )
            .expect("Failed to register pass_duration_seconds"),
        }
    }
}

/// Handle to the process-wide poll metrics
///
/// Clones share the same underlying metrics.
#[derive(Clone)]
pub struct PollMetrics {
    _private: (),
}

impl Default for PollMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl PollMetrics {
    /// Create a new metrics handle (registers the metrics on first call)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(PollMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &PollMetricsInner {
        GLOBAL_METRICS.get_or_init(PollMetricsInner::new)
    }

    /// Record a completed pass
    pub fn observe_pass(&self, duration: Duration, pods: usize) {
        let inner = self.inner();
        inner.passes_completed.inc();
        inner.pods_reported.inc_by(pods as u64);
        inner.pass_duration_seconds.observe(duration.as_secs_f64());
    }

    pub fn inc_query_failures(&self, kind: QueryKind) {
        self.inner()
            .query_failures
            .with_label_values(&[kind.as_str()])
            .inc();
    }

    pub fn passes_completed(&self) -> u64 {
        self.inner().passes_completed.get()
    }

    pub fn query_failures(&self, kind: QueryKind) -> u64 {
        self.inner()
            .query_failures
            .with_label_values(&[kind.as_str()])
            .get()
    }
}

/// Structured logger for poll loop events
///
/// Every event carries an `event` field and the namespace being watched.
#[derive(Clone)]
pub struct StructuredLogger {
    namespace: String,
}

impl StructuredLogger {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }

    /// Log process startup
    pub fn log_startup(&self, version: &str, deployments: &[String], interval: Duration) {
        info!(
            event = "judge_started",
            namespace = %self.namespace,
            version = %version,
            deployments = ?deployments,
            interval_ms = interval.as_millis() as u64,
            "canaryjudge started"
        );
    }

    /// Log process shutdown
    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "judge_shutdown",
            namespace = %self.namespace,
            reason = %reason,
            "canaryjudge shutting down"
        );
    }

    /// Log a query whose result is being treated as empty
    pub fn log_query_failure(&self, error: &QueryError) {
        warn!(
            event = "query_failed",
            namespace = %self.namespace,
            query = %error.kind(),
            error = %error,
            "Cluster query failed, treating result as empty"
        );
    }

    /// Log a container value that could not be converted
    pub fn log_unreadable_quantity(&self, pod: &str, container: &str, resource: &str, error: &str) {
        warn!(
            event = "quantity_unreadable",
            namespace = %self.namespace,
            pod = %pod,
            container = %container,
            resource = %resource,
            error = %error,
            "Unreadable resource quantity, reporting zero"
        );
    }

    /// Log the outcome of one pass
    pub fn log_pass(&self, deployments: usize, pods: usize, failures: usize, elapsed: Duration) {
        debug!(
            event = "pass_completed",
            namespace = %self.namespace,
            deployments = deployments,
            pods = pods,
            failures = failures,
            elapsed_ms = elapsed.as_millis() as u64,
            "Poll pass complete"
        );
    }
}
