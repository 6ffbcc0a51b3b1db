//! Deployment polling
//!
//! Once per interval the poll loop lists the deployments of a namespace,
//! follows each target deployment's pod-template labels to its pods, reads
//! their usage and prints one report per pass.

mod r#loop;


pub use r#loop::{PollConfig, PollLoop, PollLoopBuilder};

/// Namespace watched when none is configured
pub const DEFAULT_NAMESPACE: &str = "applications";

/// Deployment watched when none is configured
pub const DEFAULT_DEPLOYMENT: &str = "resume";

/// Custom metric reported for each pod when enabled
pub const DEFAULT_CUSTOM_METRIC: &str = "nginx_http_requests_per_second";
