//! Configuration loading for slackernetes.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::cluster::kubeconfig::Kubeconfig;
use crate::error::{Error, Result};

/// Service account mount used when running inside the cluster.
pub const SERVICE_ACCOUNT_DIR: &str = "/var/run/secrets/kubernetes.io/serviceaccount";

/// Get the slackernetes home directory (~/.slackernetes).
pub fn get_home_dir() -> Result<PathBuf> {
    let home = directories::UserDirs::new()
        .ok_or_else(|| Error::Config("Could not determine home directory".to_string()))?;

    Ok(home.home_dir().join(".slackernetes"))
}

/// Get the settings file path.
pub fn get_settings_path() -> Result<PathBuf> {
    Ok(get_home_dir()?.join("settings.json"))
}

/// Load settings from ~/.slackernetes/settings.json, then apply env overrides.
///
/// A missing file is not an error: the bot can be configured purely from
/// the environment, which is how it usually runs in a pod.
pub fn load_settings() -> Result<Settings> {
    let path = get_settings_path()?;
    let mut settings = if path.exists() {
        load_settings_from(&path)?
    } else {
        tracing::debug!("No settings file at {}, using defaults", path.display());
        Settings::default()
    };
    settings.apply_env(|key| std::env::var(key).ok());
    Ok(settings)
}

/// Load settings from an explicit file, without env overrides.
pub fn load_settings_from(path: &Path) -> Result<Settings> {
    let content = std::fs::read_to_string(path)?;
    let settings: Settings = serde_json::from_str(&content)?;
    tracing::debug!("Loaded settings from {}", path.display());
    Ok(settings)
}

/// Slack configuration.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct SlackConfig {
    pub bot_token: Option<String>,
    /// Channel IDs the bot listens on.
    #[serde(default)]
    pub channels: Vec<String>,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_poll_interval_ms() -> u64 {
    2000
}

impl Default for SlackConfig {
    fn default() -> Self {
        Self {
            bot_token: None,
            channels: Vec::new(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

/// Kubernetes API server connection.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct ClusterConfig {
    /// e.g. `https://10.0.0.1:6443`
    pub api_server: Option<String>,
    pub token: Option<String>,
    pub token_file: Option<PathBuf>,
    /// PEM bundle used to verify the API server.
    pub ca_cert: Option<PathBuf>,
    #[serde(default)]
    pub insecure_skip_tls_verify: bool,
    /// kubeconfig to use when no `api_server` is set. Defaults to
    /// `$KUBECONFIG`, then `~/.kube/config` if it exists.
    pub kubeconfig: Option<PathBuf>,
    /// Force the in-cluster service account even when `api_server` is set.
    #[serde(default)]
    pub in_cluster: bool,
}

/// Fully resolved connection details for the API server.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClusterEndpoint {
    pub api_server: String,
    pub token: Option<String>,
    /// PEM roots trusted for the API server certificate.
    pub ca_pem: Option<Vec<u8>>,
    /// Client certificate followed by its private key, PEM encoded.
    pub identity_pem: Option<Vec<u8>>,
    pub insecure_skip_tls_verify: bool,
}

impl ClusterConfig {
    /// Resolve the endpoint.
    ///
    /// Order: explicit `api_server`, then a kubeconfig, then the in-cluster
    /// service account.
    pub fn endpoint(&self) -> Result<ClusterEndpoint> {
        let default_kubeconfig = directories::UserDirs::new()
            .map(|dirs| dirs.home_dir().join(".kube").join("config"));
        self.endpoint_with(
            |key| std::env::var(key).ok(),
            default_kubeconfig.as_deref(),
            Path::new(SERVICE_ACCOUNT_DIR),
        )
    }

    fn endpoint_with(
        &self,
        env: impl Fn(&str) -> Option<String>,
        default_kubeconfig: Option<&Path>,
        service_account_dir: &Path,
    ) -> Result<ClusterEndpoint> {
        if !self.in_cluster {
            if let Some(api_server) = &self.api_server {
                let token = match (&self.token, &self.token_file) {
                    (Some(token), _) => Some(token.clone()),
                    (None, Some(file)) => Some(read_token(file)?),
                    (None, None) => None,
                };
                let ca_pem = match &self.ca_cert {
                    Some(path) => Some(read_pem(path)?),
                    None => None,
                };
                return Ok(ClusterEndpoint {
                    api_server: api_server.trim_end_matches('/').to_string(),
                    token,
                    ca_pem,
                    identity_pem: None,
                    insecure_skip_tls_verify: self.insecure_skip_tls_verify,
                });
            }

            if let Some(path) = self.kubeconfig_path(&env, default_kubeconfig) {
                tracing::debug!("Using kubeconfig {}", path.display());
                let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
                let mut endpoint = Kubeconfig::load(&path)?.endpoint(base_dir)?;
                if let Some(token) = &self.token {
                    endpoint.token = Some(token.clone());
                }
                endpoint.insecure_skip_tls_verify |= self.insecure_skip_tls_verify;
                return Ok(endpoint);
            }
        }

        let host = env("KUBERNETES_SERVICE_HOST").ok_or_else(|| {
            Error::Config(
                "No cluster.api_server or kubeconfig configured and not running inside a cluster"
                    .to_string(),
            )
        })?;
        let port = env("KUBERNETES_SERVICE_PORT").unwrap_or_else(|| "443".to_string());
        let host = if host.contains(':') {
            format!("[{}]", host)
        } else {
            host
        };

        let ca = service_account_dir.join("ca.crt");
        let ca_pem = if ca.exists() {
            Some(read_pem(&ca)?)
        } else {
            None
        };
        Ok(ClusterEndpoint {
            api_server: format!("https://{}:{}", host, port),
            token: Some(read_token(&service_account_dir.join("token"))?),
            ca_pem,
            identity_pem: None,
            insecure_skip_tls_verify: self.insecure_skip_tls_verify,
        })
    }

    /// Explicit setting, then the first `$KUBECONFIG` entry, then the default
    /// location when present.
    fn kubeconfig_path(
        &self,
        env: &impl Fn(&str) -> Option<String>,
        default_kubeconfig: Option<&Path>,
    ) -> Option<PathBuf> {
        if let Some(path) = &self.kubeconfig {
            return Some(path.clone());
        }
        if let Some(first) = env("KUBECONFIG")
            .as_deref()
            .and_then(|paths| paths.split(':').find(|p| !p.is_empty()))
        {
            return Some(PathBuf::from(first));
        }
        default_kubeconfig
            .filter(|path| path.exists())
            .map(Path::to_path_buf)
    }
}

fn read_pem(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).map_err(|e| {
        Error::Config(format!("Could not read certificate {}: {}", path.display(), e))
    })
}

fn read_token(path: &Path) -> Result<String> {
    let token = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Could not read token file {}: {}", path.display(), e))
    })?;
    Ok(token.trim().to_string())
}

/// Which namespaces are leasable and which label records the holder.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct LeaseConfig {
    #[serde(default = "default_selector_key")]
    pub selector_key: String,
    #[serde(default = "default_selector_value")]
    pub selector_value: String,
    #[serde(default = "default_holder_label")]
    pub holder_label: String,
}

fn default_selector_key() -> String {
    "env".to_string()
}

fn default_selector_value() -> String {
    "dev".to_string()
}

fn default_holder_label() -> String {
    "developer".to_string()
}

impl LeaseConfig {
    /// Label selector in API server syntax, e.g. `env=dev`.
    pub fn label_selector(&self) -> String {
        format!("{}={}", self.selector_key, self.selector_value)
    }
}

impl Default for LeaseConfig {
    fn default() -> Self {
        Self {
            selector_key: default_selector_key(),
            selector_value: default_selector_value(),
            holder_label: default_holder_label(),
        }
    }
}

/// slackernetes settings.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct Settings {
    #[serde(default)]
    pub slack: SlackConfig,

    #[serde(default)]
    pub cluster: ClusterConfig,

    #[serde(default)]
    pub lease: LeaseConfig,
}

impl Settings {
    /// Override file values with environment variables.
    pub fn apply_env(&mut self, env: impl Fn(&str) -> Option<String>) {
        if let Some(token) = env("SLACK_API_TOKEN") {
            self.slack.bot_token = Some(token);
        }
        if let Some(channels) = env("SLACKERNETES_CHANNELS") {
            self.slack.channels = channels
                .split(',')
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(server) = env("KUBERNETES_API_SERVER") {
            self.cluster.api_server = Some(server);
        }
        if let Some(token) = env("KUBERNETES_TOKEN") {
            self.cluster.token = Some(token);
        }
    }

    /// Check that everything the Slack loop needs is present.
    pub fn validate_for_bot(&self) -> Result<()> {
        match self.slack.bot_token.as_deref() {
            Some(token) if !token.trim().is_empty() => {}
            _ => {
                return Err(Error::Config(
                    "No Slack bot token configured (slack.bot_token or SLACK_API_TOKEN)"
                        .to_string(),
                ))
            }
        }
        if self.slack.channels.is_empty() {
            return Err(Error::Config(
                "No Slack channels configured (slack.channels or SLACKERNETES_CHANNELS)"
                    .to_string(),
            ));
        }
        Ok(())
    }
}
