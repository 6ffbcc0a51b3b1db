//! canaryjudge - canary resource comparison
//!
//! Polls a namespace on a fixed interval, follows each watched deployment to
//! its pods and prints their CPU, memory and request-rate figures so a canary
//! can be compared against the stable release.

use anyhow::{Context, Result};
use canary_lib::{
    CustomMetricSource, HealthRegistry, KubeSource, OutputFormat, PollLoopBuilder, PollMetrics,
    QueryKind, StructuredLogger,
};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod api;
mod config;

const JUDGE_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser, Debug)]
#[command(name = "canaryjudge")]
#[command(author, version, about = "Compare canary and stable pods by resource usage", long_about = None)]
pub struct Cli {
    /// Path to kubeconfig file (defaults to ~/.kube/config)
    #[arg(long, env = "KUBECONFIG")]
    pub kubeconfig: Option<PathBuf>,

    /// Configuration file (TOML, YAML or JSON)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Namespace holding the deployments
    #[arg(short, long)]
    pub namespace: Option<String>,

    /// Deployment to report on (repeatable)
    #[arg(short, long = "deployment")]
    pub deployments: Vec<String>,

    /// Seconds to wait between passes
    #[arg(long)]
    pub interval_secs: Option<u64>,

    /// Custom metric read for each pod
    #[arg(long)]
    pub custom_metric: Option<String>,

    /// Skip the custom metric query and its output block
    #[arg(long)]
    pub no_custom_metric: bool,

    /// Report format (text or json)
    #[arg(short, long)]
    pub format: Option<OutputFormat>,

    /// Serve /healthz, /readyz and /metrics on this port
    #[arg(long)]
    pub api_port: Option<u16>,

    /// Run a single pass and exit
    #[arg(long)]
    pub once: bool,

    /// Log format written to stderr
    #[arg(long, value_enum, default_value = "json")]
    pub log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LogFormat {
    Json,
    Text,
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    // stdout carries the report
    match format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init(),
        LogFormat::Text => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr))
            .init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    let mut config = config::JudgeConfig::load(cli.config.as_deref())?;
    config.apply_cli(&cli);
    config.validate()?;

    let logger = StructuredLogger::new(&config.namespace);
    logger.log_startup(JUDGE_VERSION, &config.deployments, config.interval());

    let kubeconfig = config::kubeconfig_path(config.kubeconfig.as_deref())?;
    let client = config::build_client(&kubeconfig).await?;
    let source = Arc::new(KubeSource::new(client));

    let health_registry = HealthRegistry::new();
    health_registry.register_queries(&QueryKind::ALL).await;

    if let Some(port) = config.api_port {
        let app_state = Arc::new(api::AppState::new(
            health_registry.clone(),
            PollMetrics::new(),
        ));
        tokio::spawn(async move {
            if let Err(e) = api::serve(port, app_state).await {
                error!(error = %e, "API server stopped");
            }
        });
    }

    let mut builder = PollLoopBuilder::new()
        .source(source.clone())
        .namespace(config.namespace.clone())
        .deployments(config.deployments.clone())
        .interval(config.interval())
        .custom_metric_name(config.custom_metric.clone())
        .format(config.format)
        .health(health_registry);

    if config.custom_metric_enabled {
        builder = builder.custom_metrics(source as Arc<dyn CustomMetricSource>);
    }

    let poll_loop = builder.build()?;

    if cli.once {
        let report = poll_loop.run_once().await;
        let mut stdout = std::io::stdout().lock();
        canary_lib::report::write_report(&mut stdout, &report, config.format)
            .context("Failed to write report")?;
        return Ok(());
    }

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let mut handle = tokio::spawn(poll_loop.run(std::io::stdout(), shutdown_rx));

    tokio::select! {
        result = &mut handle => {
            result
                .context("Poll loop panicked")?
                .context("Failed to write report")?;
        }
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for shutdown signal")?;
            logger.log_shutdown("SIGINT received");
            let _ = shutdown_tx.send(());
            handle
                .await
                .context("Poll loop panicked")?
                .context("Failed to write report")?;
        }
    }

    info!("Shutting down");
    Ok(())
}
