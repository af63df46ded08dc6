//! Kubernetes REST client for the cluster gateway.

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, RequestBuilder, Response, Url};
use serde::Deserialize;
use std::collections::BTreeMap;

use super::{ClusterGateway, LabelPatch, Namespace, Pod};
use crate::config::ClusterEndpoint;
use crate::error::{Error, Result};

const MERGE_PATCH: &str = "application/merge-patch+json";

pub struct KubeClient {
    client: Client,
    base_url: Url,
    token: Option<String>,
}

#[derive(Deserialize)]
struct ObjectList<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ObjectMeta {
    name: String,
    namespace: Option<String>,
    labels: Option<BTreeMap<String, String>>,
    resource_version: Option<String>,
}

#[derive(Deserialize)]
struct NamespaceObject {
    metadata: ObjectMeta,
}

#[derive(Deserialize)]
struct PodObject {
    metadata: ObjectMeta,
    spec: Option<PodSpec>,
}

#[derive(Deserialize)]
struct PodSpec {
    #[serde(default)]
    containers: Vec<Container>,
}

#[derive(Deserialize)]
struct Container {
    image: Option<String>,
}

/// `kind: Status` body returned on API errors.
#[derive(Deserialize)]
struct StatusBody {
    message: Option<String>,
}

impl From<NamespaceObject> for Namespace {
    fn from(obj: NamespaceObject) -> Self {
        Namespace {
            name: obj.metadata.name,
            labels: obj.metadata.labels.unwrap_or_default(),
            resource_version: obj.metadata.resource_version,
        }
    }
}

impl From<PodObject> for Pod {
    fn from(obj: PodObject) -> Self {
        Pod {
            name: obj.metadata.name,
            namespace: obj.metadata.namespace.unwrap_or_default(),
            images: obj
                .spec
                .map(|s| s.containers.into_iter().filter_map(|c| c.image).collect())
                .unwrap_or_default(),
        }
    }
}

fn status_message(body: &str) -> String {
    serde_json::from_str::<StatusBody>(body)
        .ok()
        .and_then(|s| s.message)
        .unwrap_or_else(|| body.trim().to_string())
}

/// `base` with `segments` appended, each percent-encoded as one path segment.
///
/// Names come from chat input, so `/`, `?` and `#` are escaped rather than
/// allowed to reshape the request, and dot segments are refused.
fn api_url(base: &Url, segments: &[&str]) -> Result<Url> {
    if let Some(bad) = segments
        .iter()
        .find(|s| s.is_empty() || **s == "." || **s == "..")
    {
        return Err(Error::InvalidName(bad.to_string()));
    }
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| Error::Config(format!("API server URL cannot be a base: {}", base)))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

fn merge_patch_body(labels: &LabelPatch) -> serde_json::Value {
    serde_json::json!({ "metadata": { "labels": labels } })
}

impl KubeClient {
    pub fn new(endpoint: &ClusterEndpoint) -> Result<Self> {
        let mut builder = Client::builder();

        if let Some(pem) = &endpoint.ca_pem {
            for cert in reqwest::Certificate::from_pem_bundle(pem)? {
                builder = builder.add_root_certificate(cert);
            }
        }
        if let Some(pem) = &endpoint.identity_pem {
            builder = builder.identity(reqwest::Identity::from_pem(pem)?);
        }
        if endpoint.insecure_skip_tls_verify {
            tracing::warn!("TLS verification of the API server is disabled");
            builder = builder.danger_accept_invalid_certs(true);
        }

        Ok(Self {
            client: builder.build()?,
            base_url: Url::parse(&endpoint.api_server).map_err(|e| {
                Error::Config(format!("Invalid API server URL '{}': {}", endpoint.api_server, e))
            })?,
            token: endpoint.token.clone(),
        })
    }

    fn get(&self, segments: &[&str]) -> Result<RequestBuilder> {
        let url = api_url(&self.base_url, segments)?;
        Ok(self.authorize(self.client.get(url)))
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Send a request and turn non-success statuses into gateway errors.
    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(Error::gateway(status.as_u16(), status_message(&body)))
    }
}

#[async_trait]
impl ClusterGateway for KubeClient {
    async fn list_namespaces(&self, label_selector: Option<&str>) -> Result<Vec<Namespace>> {
        let mut request = self.get(&["api", "v1", "namespaces"])?;
        if let Some(selector) = label_selector {
            request = request.query(&[("labelSelector", selector)]);
        }
        let list: ObjectList<NamespaceObject> = self.send(request).await?.json().await?;
        Ok(list.items.into_iter().map(Namespace::from).collect())
    }

    async fn patch_namespace_labels(&self, name: &str, labels: LabelPatch) -> Result<Namespace> {
        let body = merge_patch_body(&labels);
        let url = api_url(&self.base_url, &["api", "v1", "namespaces", name])?;
        let request = self
            .authorize(self.client.patch(url))
            .header(CONTENT_TYPE, MERGE_PATCH)
            .body(serde_json::to_vec(&body)?);

        let obj: NamespaceObject = self.send(request).await?.json().await?;
        tracing::debug!("patched labels on namespace {}: {}", name, body);
        Ok(obj.into())
    }

    async fn list_pods(&self, namespace: Option<&str>) -> Result<Vec<Pod>> {
        let request = match namespace {
            Some(ns) => self.get(&["api", "v1", "namespaces", ns, "pods"])?,
            None => self.get(&["api", "v1", "pods"])?,
        };
        let list: ObjectList<PodObject> = self.send(request).await?.json().await?;
        Ok(list.items.into_iter().map(Pod::from).collect())
    }

    async fn read_pod_log(&self, pod: &str, namespace: &str, previous: bool) -> Result<String> {
        let mut request = self.get(&["api", "v1", "namespaces", namespace, "pods", pod, "log"])?;
        if previous {
            request = request.query(&[("previous", "true")]);
        }
        Ok(self.send(request).await?.text().await?)
    }

    async fn read_pod_description(&self, pod: &str, namespace: &str) -> Result<String> {
        let request = self.get(&["api", "v1", "namespaces", namespace, "pods", pod])?;
        let value: serde_json::Value = self.send(request).await?.json().await?;
        Ok(serde_json::to_string_pretty(&value)?)
    }
}
