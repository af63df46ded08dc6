//! In-memory cluster used by tests.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use super::{ClusterGateway, LabelPatch, Namespace, Pod};
use crate::error::{Error, Result};

#[derive(Default)]
pub struct MemoryCluster {
    namespaces: Mutex<Vec<Namespace>>,
    pods: Vec<Pod>,
    logs: HashMap<(String, bool), String>,
    patches: AtomicUsize,
    fail: AtomicBool,
    fail_patches: AtomicBool,
}

impl MemoryCluster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_namespaces(self, namespaces: Vec<Namespace>) -> Self {
        *self.namespaces.lock().unwrap() = namespaces;
        self
    }

    pub fn with_pods(mut self, pods: Vec<Pod>) -> Self {
        self.pods = pods;
        self
    }

    pub fn with_log(mut self, pod: &str, previous: bool, log: &str) -> Self {
        self.logs.insert((pod.to_string(), previous), log.to_string());
        self
    }

    /// Make every subsequent call fail like a forbidden API request.
    pub fn fail_calls(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }

    /// Make label patches fail while reads keep working.
    pub fn fail_patches(&self) {
        self.fail_patches.store(true, Ordering::SeqCst);
    }

    pub fn patch_count(&self) -> usize {
        self.patches.load(Ordering::SeqCst)
    }

    pub fn namespace(&self, name: &str) -> Option<Namespace> {
        self.namespaces
            .lock()
            .unwrap()
            .iter()
            .find(|ns| ns.name == name)
            .cloned()
    }

    fn check(&self) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::gateway(403, "forbidden"));
        }
        Ok(())
    }
}

fn matches_selector(ns: &Namespace, selector: Option<&str>) -> bool {
    let Some(selector) = selector else {
        return true;
    };
    selector.split(',').all(|term| match term.split_once('=') {
        Some((key, value)) => ns.labels.get(key).map(String::as_str) == Some(value),
        None => ns.labels.contains_key(term),
    })
}

#[async_trait]
impl ClusterGateway for MemoryCluster {
    async fn list_namespaces(&self, label_selector: Option<&str>) -> Result<Vec<Namespace>> {
        self.check()?;
        Ok(self
            .namespaces
            .lock()
            .unwrap()
            .iter()
            .filter(|ns| matches_selector(ns, label_selector))
            .cloned()
            .collect())
    }

    async fn patch_namespace_labels(&self, name: &str, labels: LabelPatch) -> Result<Namespace> {
        self.check()?;
        if self.fail_patches.load(Ordering::SeqCst) {
            return Err(Error::gateway(409, "the object has been modified"));
        }
        let mut namespaces = self.namespaces.lock().unwrap();
        let ns = namespaces
            .iter_mut()
            .find(|ns| ns.name == name)
            .ok_or_else(|| Error::gateway(404, format!("namespaces \"{}\" not found", name)))?;
        for (key, value) in labels {
            match value {
                Some(value) => ns.labels.insert(key, value),
                None => ns.labels.remove(&key),
            };
        }
        self.patches.fetch_add(1, Ordering::SeqCst);
        Ok(ns.clone())
    }

    async fn list_pods(&self, namespace: Option<&str>) -> Result<Vec<Pod>> {
        self.check()?;
        Ok(self
            .pods
            .iter()
            .filter(|p| namespace.map_or(true, |ns| p.namespace == ns))
            .cloned()
            .collect())
    }

    async fn read_pod_log(&self, pod: &str, _namespace: &str, previous: bool) -> Result<String> {
        self.check()?;
        self.logs
            .get(&(pod.to_string(), previous))
            .cloned()
            .ok_or_else(|| Error::gateway(404, format!("pods \"{}\" not found", pod)))
    }

    async fn read_pod_description(&self, pod: &str, namespace: &str) -> Result<String> {
        self.check()?;
        let pod = self
            .pods
            .iter()
            .find(|p| p.name == pod && p.namespace == namespace)
            .ok_or_else(|| Error::gateway(404, format!("pods \"{}\" not found", pod)))?;
        Ok(serde_json::to_string_pretty(pod)?)
    }
}
