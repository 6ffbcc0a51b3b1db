//! Console report rendering
//!
//! The text format is scraped by existing tooling and must not change:
//!
//! ```text
//! Pod name: <name>
//! 	Container name: <name>
//! 		CPU: <int>
//! 		Memory: <int>
//! 	Custom prometheus metric:
//! 		<metric>: <int>m
//! ---
//!
//! ```

use crate::models::{PassReport, PodReport};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::io::{self, Write};
use std::str::FromStr;

/// Separator printed after every pass in text mode
pub const PASS_SEPARATOR: &str = "---\n\n";

/// Output format for pass reports
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Indented text (default)
    #[default]
    Text,
    /// One JSON document per pass
    Json,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            other => Err(format!("unknown output format {other:?} (expected text or json)")),
        }
    }
}

/// Render a pass in the text format, separator included
pub fn render_text(report: &PassReport) -> String {
    let mut out = String::new();
    for deployment in &report.deployments {
        for pod in &deployment.pods {
            render_pod(&mut out, pod);
        }
    }
    out.push_str(PASS_SEPARATOR);
    out
}

fn render_pod(out: &mut String, pod: &PodReport) {
    // Writing to a String cannot fail
    let _ = writeln!(out, "Pod name: {}", pod.name);
    for container in &pod.containers {
        let _ = writeln!(out, "\tContainer name: {}", container.name);
        let _ = writeln!(out, "\t\tCPU: {}", container.cpu_cores);
        let _ = writeln!(out, "\t\tMemory: {}", container.memory_mib);
    }
    if let Some(metric) = &pod.custom_metric {
        out.push_str("\tCustom prometheus metric:\n");
        let _ = writeln!(out, "\t\t{}: {}m", metric.name, metric.milli_value);
    }
}

/// Write a pass to `out` in the given format and flush
pub fn write_report<W: Write>(out: &mut W, report: &PassReport, format: OutputFormat) -> io::Result<()> {
    match format {
        OutputFormat::Text => out.write_all(render_text(report).as_bytes())?,
        OutputFormat::Json => {
            serde_json::to_writer(&mut *out, report)?;
            out.write_all(b"\n")?;
        }
    }
    out.flush()
}
