//! Cluster gateway: the slice of the Kubernetes API the bot needs.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::Result;

pub mod kube;
pub mod kubeconfig;
#[cfg(test)]
pub mod memory;

pub use kube::KubeClient;

/// A namespace as observed on the API server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Namespace {
    pub name: String,
    pub labels: BTreeMap<String, String>,
    pub resource_version: Option<String>,
}

impl Namespace {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            labels: BTreeMap::new(),
            resource_version: None,
        }
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// Label value, treating an empty string as absent.
    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pod {
    pub name: String,
    pub namespace: String,
    pub images: Vec<String>,
}

/// Label patch: `None` removes the key.
pub type LabelPatch = BTreeMap<String, Option<String>>;

/// Read and patch operations against namespaces and pods.
#[async_trait]
pub trait ClusterGateway: Send + Sync {
    async fn list_namespaces(&self, label_selector: Option<&str>) -> Result<Vec<Namespace>>;

    async fn patch_namespace_labels(&self, name: &str, labels: LabelPatch) -> Result<Namespace>;

    /// Pods in one namespace, or in all namespaces when `namespace` is `None`.
    async fn list_pods(&self, namespace: Option<&str>) -> Result<Vec<Pod>>;

    async fn read_pod_log(&self, pod: &str, namespace: &str, previous: bool) -> Result<String>;

    async fn read_pod_description(&self, pod: &str, namespace: &str) -> Result<String>;
}

/// First pod in listing order whose name contains `fragment`.
pub async fn find_pod(gateway: &dyn ClusterGateway, fragment: &str) -> Result<Option<Pod>> {
    let pods = gateway.list_pods(None).await?;
    let pod = pods.into_iter().find(|p| p.name.contains(fragment));
    tracing::debug!("found this pod for '{}': {:?}", fragment, pod);
    Ok(pod)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_label_reads_as_absent() {
        let ns = Namespace::new("dev-1")
            .with_label("env", "dev")
            .with_label("developer", "");
        assert_eq!(ns.label("env"), Some("dev"));
        assert_eq!(ns.label("developer"), None);
        assert_eq!(ns.label("missing"), None);
    }

    #[tokio::test]
    async fn test_find_pod_by_fragment() {
        let cluster = memory::MemoryCluster::new().with_pods(vec![
            Pod {
                name: "api-7d9f".to_string(),
                namespace: "dev-1".to_string(),
                images: vec![],
            },
            Pod {
                name: "worker-1abc".to_string(),
                namespace: "dev-2".to_string(),
                images: vec![],
            },
        ]);

        let pod = find_pod(&cluster, "worker").await.unwrap().unwrap();
        assert_eq!(pod.namespace, "dev-2");
        assert!(find_pod(&cluster, "nope").await.unwrap().is_none());
    }
}
