//! Library for canaryjudge
//!
//! This crate provides the core functionality for:
//! - Locating the pods behind a deployment via its pod-template labels
//! - Reading per-container usage from the resource metrics API
//! - Reading a per-pod custom metric from the custom metrics API
//! - The fixed-interval poll loop and its console report
//! - Health checks and observability

pub mod health;
pub mod models;
pub mod observability;
pub mod poller;
pub mod quantity;
pub mod report;
pub mod selector;
pub mod source;

pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{PollMetrics, StructuredLogger};
pub use poller::{PollConfig, PollLoop, PollLoopBuilder};
pub use quantity::{ParsedQuantity, QuantityError};
pub use report::OutputFormat;
pub use selector::LabelSelector;
pub use source::{CustomMetricSource, KubeSource, QueryError, QueryKind, WorkloadSource};
