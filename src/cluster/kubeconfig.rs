//! kubeconfig files, as written by kubectl.
//!
//! Only static credentials are understood: bearer tokens and client
//! certificates. Exec plugins and auth providers are ignored.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::config::ClusterEndpoint;
use crate::error::{Error, Result};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Kubeconfig {
    #[serde(default)]
    clusters: Vec<NamedCluster>,
    #[serde(default)]
    users: Vec<NamedUser>,
    #[serde(default)]
    contexts: Vec<NamedContext>,
    current_context: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NamedCluster {
    name: String,
    cluster: ClusterEntry,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct ClusterEntry {
    server: String,
    certificate_authority: Option<PathBuf>,
    certificate_authority_data: Option<String>,
    #[serde(default)]
    insecure_skip_tls_verify: bool,
}

#[derive(Debug, Deserialize)]
struct NamedUser {
    name: String,
    #[serde(default)]
    user: UserEntry,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct UserEntry {
    token: Option<String>,
    #[serde(rename = "tokenFile")]
    token_file: Option<PathBuf>,
    client_certificate: Option<PathBuf>,
    client_certificate_data: Option<String>,
    client_key: Option<PathBuf>,
    client_key_data: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NamedContext {
    name: String,
    context: ContextEntry,
}

#[derive(Debug, Deserialize)]
struct ContextEntry {
    cluster: String,
    #[serde(default)]
    user: String,
}

impl Kubeconfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Could not read kubeconfig {}: {}", path.display(), e))
        })?;
        Ok(serde_yaml::from_str(&content)?)
    }

    /// Connection details of the current context.
    ///
    /// Relative file references resolve against `base_dir`, the directory
    /// holding the kubeconfig.
    pub fn endpoint(&self, base_dir: &Path) -> Result<ClusterEndpoint> {
        let context_name = self
            .current_context
            .as_deref()
            .filter(|name| !name.is_empty())
            .ok_or_else(|| Error::Config("kubeconfig has no current-context".to_string()))?;
        let context = &self
            .contexts
            .iter()
            .find(|c| c.name == context_name)
            .ok_or_else(|| {
                Error::Config(format!("kubeconfig context '{}' not found", context_name))
            })?
            .context;
        let cluster = &self
            .clusters
            .iter()
            .find(|c| c.name == context.cluster)
            .ok_or_else(|| {
                Error::Config(format!("kubeconfig cluster '{}' not found", context.cluster))
            })?
            .cluster;
        let default_user = UserEntry::default();
        let user = self
            .users
            .iter()
            .find(|u| u.name == context.user)
            .map_or(&default_user, |u| &u.user);

        let token = match (&user.token, &user.token_file) {
            (Some(token), _) => Some(token.clone()),
            (None, Some(file)) => Some(read_file(&base_dir.join(file))?.trim().to_string()),
            (None, None) => None,
        };
        let ca_pem = pem(
            cluster.certificate_authority_data.as_deref(),
            cluster.certificate_authority.as_deref(),
            base_dir,
        )?;
        let cert = pem(
            user.client_certificate_data.as_deref(),
            user.client_certificate.as_deref(),
            base_dir,
        )?;
        let key = pem(
            user.client_key_data.as_deref(),
            user.client_key.as_deref(),
            base_dir,
        )?;
        let identity_pem = match (cert, key) {
            (Some(mut cert), Some(key)) => {
                cert.push(b'\n');
                cert.extend_from_slice(&key);
                Some(cert)
            }
            _ => None,
        };
        if token.is_none() && identity_pem.is_none() {
            tracing::debug!(
                "kubeconfig user '{}' has no token or client certificate",
                context.user
            );
        }

        Ok(ClusterEndpoint {
            api_server: cluster.server.trim_end_matches('/').to_string(),
            token,
            ca_pem,
            identity_pem,
            insecure_skip_tls_verify: cluster.insecure_skip_tls_verify,
        })
    }
}

/// Inline base64 data wins over a file reference.
fn pem(data: Option<&str>, file: Option<&Path>, base_dir: &Path) -> Result<Option<Vec<u8>>> {
    match (data, file) {
        (Some(data), _) => STANDARD
            .decode(data.trim())
            .map(Some)
            .map_err(|e| Error::Config(format!("Invalid base64 in kubeconfig: {}", e))),
        (None, Some(file)) => Ok(Some(read_file(&base_dir.join(file))?.into_bytes())),
        (None, None) => Ok(None),
    }
}

fn read_file(path: &Path) -> Result<String> {
    std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Could not read {}: {}", path.display(), e)))
}
