//! Configuration for canaryjudge
//!
//! Layered lowest to highest: built-in defaults, an optional config file,
//! `CANARYJUDGE_*` environment variables, then command-line flags.

use anyhow::{Context, Result};
use canary_lib::poller::{DEFAULT_CUSTOM_METRIC, DEFAULT_DEPLOYMENT, DEFAULT_NAMESPACE};
use canary_lib::OutputFormat;
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::Client;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

use crate::Cli;

const ENV_PREFIX: &str = "CANARYJUDGE";

/// Resolved configuration
#[derive(Debug, Clone, Deserialize)]
pub struct JudgeConfig {
    /// Namespace holding the watched deployments
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Deployments to report on
    #[serde(default = "default_deployments")]
    pub deployments: Vec<String>,

    /// Seconds between poll passes
    #[serde(default = "default_interval")]
    pub interval_secs: u64,

    /// Custom metric read per pod
    #[serde(default = "default_custom_metric")]
    pub custom_metric: String,

    /// Whether to query and print the custom metric
    #[serde(default = "default_custom_metric_enabled")]
    pub custom_metric_enabled: bool,

    #[serde(default)]
    pub format: OutputFormat,

    /// Port for /healthz, /readyz and /metrics; disabled when unset
    #[serde(default)]
    pub api_port: Option<u16>,

    /// Path to the kubeconfig file
    #[serde(default)]
    pub kubeconfig: Option<PathBuf>,
}

fn default_namespace() -> String {
    DEFAULT_NAMESPACE.to_string()
}

fn default_deployments() -> Vec<String> {
    vec![DEFAULT_DEPLOYMENT.to_string()]
}

fn default_interval() -> u64 {
    2
}

fn default_custom_metric() -> String {
    DEFAULT_CUSTOM_METRIC.to_string()
}

fn default_custom_metric_enabled() -> bool {
    true
}

impl JudgeConfig {
    /// Load configuration from an optional file and the environment
    pub fn load(file: Option<&Path>) -> Result<Self> {
        Self::from_sources(
            file,
            config::Environment::with_prefix(ENV_PREFIX)
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("deployments"),
        )
    }

    fn from_sources(file: Option<&Path>, env: config::Environment) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = file {
            builder = builder.add_source(config::File::from(path));
        }

        let config = builder
            .add_source(env)
            .build()
            .context("Failed to read configuration")?;

        config
            .try_deserialize()
            .context("Failed to parse configuration")
    }

    /// Apply command-line flags on top of file and environment settings
    pub fn apply_cli(&mut self, cli: &Cli) {
        if let Some(namespace) = &cli.namespace {
            self.namespace = namespace.clone();
        }
        if !cli.deployments.is_empty() {
            self.deployments = cli.deployments.clone();
        }
        if let Some(interval) = cli.interval_secs {
            self.interval_secs = interval;
        }
        if let Some(metric) = &cli.custom_metric {
            self.custom_metric = metric.clone();
        }
        if cli.no_custom_metric {
            self.custom_metric_enabled = false;
        }
        if let Some(format) = cli.format {
            self.format = format;
        }
        if let Some(port) = cli.api_port {
            self.api_port = Some(port);
        }
        if let Some(path) = &cli.kubeconfig {
            self.kubeconfig = Some(path.clone());
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    /// Reject settings the poll loop cannot run with
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(!self.namespace.is_empty(), "namespace must not be empty");
        anyhow::ensure!(
            !self.deployments.is_empty(),
            "at least one deployment is required"
        );
        anyhow::ensure!(self.interval_secs > 0, "interval must be at least 1 second");
        anyhow::ensure!(
            !self.custom_metric_enabled || !self.custom_metric.is_empty(),
            "custom metric name must not be empty"
        );
        Ok(())
    }
}

/// Where the kubeconfig path came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KubeconfigPath {
    /// Named by the operator (flag, config file or `KUBECONFIG`); must exist
    Explicit(PathBuf),
    /// `~/.kube/config`; may be absent when running inside a cluster
    Default(PathBuf),
}

impl KubeconfigPath {
    pub fn path(&self) -> &Path {
        match self {
            KubeconfigPath::Explicit(path) | KubeconfigPath::Default(path) => path,
        }
    }
}

/// Get kubeconfig path
pub fn kubeconfig_path(override_path: Option<&Path>) -> Result<KubeconfigPath> {
    resolve_kubeconfig(
        override_path,
        std::env::var_os("KUBECONFIG").map(PathBuf::from),
        dirs_next::home_dir(),
    )
}

fn resolve_kubeconfig(
    override_path: Option<&Path>,
    env_path: Option<PathBuf>,
    home: Option<PathBuf>,
) -> Result<KubeconfigPath> {
    if let Some(path) = override_path {
        return Ok(KubeconfigPath::Explicit(path.to_path_buf()));
    }

    if let Some(path) = env_path.filter(|p| !p.as_os_str().is_empty()) {
        return Ok(KubeconfigPath::Explicit(path));
    }

    let home = home.context("Could not determine home directory")?;
    Ok(KubeconfigPath::Default(home.join(".kube").join("config")))
}

/// Build a Kubernetes client from the resolved kubeconfig
pub async fn build_client(kubeconfig: &KubeconfigPath) -> Result<Client> {
    let config = load_kube_config(kubeconfig, || {
        kube::Config::incluster().context("Failed to load in-cluster configuration")
    })
    .await?;

    Client::try_from(config).context("Failed to create Kubernetes client")
}

/// Read the kubeconfig file, or call `in_cluster` when the default file is absent
///
/// An explicitly named file that does not exist is an error.
async fn load_kube_config<F>(kubeconfig: &KubeconfigPath, in_cluster: F) -> Result<kube::Config>
where
    F: FnOnce() -> Result<kube::Config>,
{
    let path = kubeconfig.path();
    if !path.exists() {
        return match kubeconfig {
            KubeconfigPath::Explicit(_) => {
                anyhow::bail!("Kubeconfig {} does not exist", path.display())
            }
            KubeconfigPath::Default(_) => {
                warn!(
                    kubeconfig = %path.display(),
                    "Kubeconfig not found, using in-cluster service account"
                );
                in_cluster()
            }
        };
    }

    info!(kubeconfig = %path.display(), "Loading kubeconfig");
    let file = Kubeconfig::read_from(path)
        .with_context(|| format!("Failed to read kubeconfig {}", path.display()))?;
    kube::Config::from_custom_kubeconfig(file, &KubeConfigOptions::default())
        .await
        .context("Failed to load kubeconfig context")
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::collections::HashMap;
    use std::io::Write;

    fn env(vars: &[(&str, &str)]) -> config::Environment {
        let source: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();

        config::Environment::with_prefix(ENV_PREFIX)
            .try_parsing(true)
            .list_separator(",")
            .with_list_parse_key("deployments")
            .source(Some(source))
    }

    #[test]
    fn test_defaults() {
        let config = JudgeConfig::from_sources(None, env(&[])).unwrap();

        assert_eq!(config.namespace, "applications");
        assert_eq!(config.deployments, vec!["resume".to_string()]);
        assert_eq!(config.interval(), Duration::from_secs(2));
        assert_eq!(config.custom_metric, "nginx_http_requests_per_second");
        assert!(config.custom_metric_enabled);
        assert_eq!(config.format, OutputFormat::Text);
        assert!(config.api_port.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_environment_overrides() {
        let config = JudgeConfig::from_sources(
            None,
            env(&[
                ("CANARYJUDGE_NAMESPACE", "staging"),
                ("CANARYJUDGE_DEPLOYMENTS", "blog,blog-canary"),
                ("CANARYJUDGE_INTERVAL_SECS", "5"),
                ("CANARYJUDGE_CUSTOM_METRIC_ENABLED", "false"),
            ]),
        )
        .unwrap();

        assert_eq!(config.namespace, "staging");
        assert_eq!(
            config.deployments,
            vec!["blog".to_string(), "blog-canary".to_string()]
        );
        assert_eq!(config.interval_secs, 5);
        assert!(!config.custom_metric_enabled);
    }

    #[test]
    fn test_file_then_environment() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "namespace = \"web\"\ndeployments = [\"blog\"]\nformat = \"json\"\napi_port = 9100"
        )
        .unwrap();

        let config = JudgeConfig::from_sources(
            Some(file.path()),
            env(&[("CANARYJUDGE_NAMESPACE", "web-canary")]),
        )
        .unwrap();

        assert_eq!(config.namespace, "web-canary");
        assert_eq!(config.deployments, vec!["blog".to_string()]);
        assert_eq!(config.format, OutputFormat::Json);
        assert_eq!(config.api_port, Some(9100));
    }

    #[test]
    fn test_cli_overrides_everything() {
        let mut config = JudgeConfig::from_sources(
            None,
            env(&[("CANARYJUDGE_NAMESPACE", "staging")]),
        )
        .unwrap();

        let cli = Cli::parse_from([
            "canaryjudge",
            "--namespace",
            "applications",
            "--deployment",
            "resume",
            "--deployment",
            "resume-canary",
            "--interval-secs",
            "10",
            "--no-custom-metric",
            "--format",
            "json",
            "--kubeconfig",
            "/tmp/kubeconfig",
        ]);
        config.apply_cli(&cli);

        assert_eq!(config.namespace, "applications");
        assert_eq!(
            config.deployments,
            vec!["resume".to_string(), "resume-canary".to_string()]
        );
        assert_eq!(config.interval_secs, 10);
        assert!(!config.custom_metric_enabled);
        assert_eq!(config.format, OutputFormat::Json);
        assert_eq!(config.kubeconfig, Some(PathBuf::from("/tmp/kubeconfig")));
    }

    #[test]
    fn test_validate_rejects_zero_interval() {
        let mut config = JudgeConfig::from_sources(None, env(&[])).unwrap();
        config.interval_secs = 0;
        assert!(config.validate().is_err());
    }

    const KUBECONFIG_YAML: &str = r#"apiVersion: v1
kind: Config
clusters:
- name: staging
  cluster:
    server: https://127.0.0.1:6443
contexts:
- name: staging
  context:
    cluster: staging
    user: judge
    namespace: canary-ns
current-context: staging
users:
- name: judge
  user:
    token: not-a-real-token
"#;

    fn in_cluster_marker() -> Result<kube::Config> {
        let mut config = kube::Config::new("https://10.0.0.1:443".parse().unwrap());
        config.default_namespace = "in-cluster-ns".to_string();
        Ok(config)
    }

    #[test]
    fn test_kubeconfig_path_flag_wins() {
        let path = resolve_kubeconfig(
            Some(Path::new("/etc/kube/admin.conf")),
            Some(PathBuf::from("/env/kubeconfig")),
            Some(PathBuf::from("/home/judge")),
        )
        .unwrap();
        assert_eq!(
            path,
            KubeconfigPath::Explicit(PathBuf::from("/etc/kube/admin.conf"))
        );
    }

    #[test]
    fn test_kubeconfig_path_from_environment() {
        let path = resolve_kubeconfig(
            None,
            Some(PathBuf::from("/env/kubeconfig")),
            Some(PathBuf::from("/home/judge")),
        )
        .unwrap();
        assert_eq!(path, KubeconfigPath::Explicit(PathBuf::from("/env/kubeconfig")));
    }

    #[test]
    fn test_kubeconfig_path_defaults_to_home() {
        let path = resolve_kubeconfig(None, None, Some(PathBuf::from("/home/judge"))).unwrap();
        assert_eq!(
            path,
            KubeconfigPath::Default(PathBuf::from("/home/judge/.kube/config"))
        );

        let empty_env = resolve_kubeconfig(None, Some(PathBuf::new()), Some(PathBuf::from("/home/judge")))
            .unwrap();
        assert_eq!(empty_env, path);
    }

    #[test]
    fn test_kubeconfig_path_without_home() {
        assert!(resolve_kubeconfig(None, None, None).is_err());
    }

    #[tokio::test]
    async fn test_missing_explicit_kubeconfig_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let missing = KubeconfigPath::Explicit(dir.path().join("prod-kubeconfig"));

        let result = load_kube_config(&missing, || {
            panic!("explicit kubeconfig must not fall back")
        })
        .await;

        let message = format!("{:#}", result.unwrap_err());
        assert!(message.contains("does not exist"), "{message}");
    }

    #[tokio::test]
    async fn test_missing_default_kubeconfig_uses_in_cluster() {
        let dir = tempfile::tempdir().unwrap();
        let missing = KubeconfigPath::Default(dir.path().join(".kube").join("config"));

        let config = load_kube_config(&missing, in_cluster_marker).await.unwrap();
        assert_eq!(config.default_namespace, "in-cluster-ns");
    }

    #[tokio::test]
    async fn test_existing_kubeconfig_is_loaded() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(KUBECONFIG_YAML.as_bytes()).unwrap();

        for path in [
            KubeconfigPath::Explicit(file.path().to_path_buf()),
            KubeconfigPath::Default(file.path().to_path_buf()),
        ] {
            let config = load_kube_config(&path, || {
                panic!("existing kubeconfig must not fall back")
            })
            .await
            .unwrap();
            assert_eq!(config.default_namespace, "canary-ns");
        }
    }
}
