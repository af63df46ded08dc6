//! Namespace leases.
//!
//! A leasable namespace is free while its holder label is absent or empty,
//! and held by whoever the label names otherwise. Every operation reads the
//! live namespace list; nothing is cached.
//!
//! Transitions are read-then-write with no guard: two bot instances picking
//! the same free namespace at once both succeed and the last patch wins.
//! `LeaseRepository::compare_and_set` is the seam where a resourceVersion
//! guarded patch would go.

use async_trait::async_trait;
use std::sync::Arc;

use crate::cluster::{ClusterGateway, LabelPatch};
use crate::config::LeaseConfig;
use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lease {
    Free,
    HeldBy(String),
}

/// Lease state of one namespace at the time it was read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaseRecord {
    pub namespace: String,
    pub holder: Option<String>,
    pub resource_version: Option<String>,
}

impl LeaseRecord {
    pub fn lease(&self) -> Lease {
        match &self.holder {
            Some(holder) => Lease::HeldBy(holder.clone()),
            None => Lease::Free,
        }
    }
}

#[async_trait]
pub trait LeaseRepository: Send + Sync {
    /// All leasable namespaces, in listing order.
    async fn list(&self) -> Result<Vec<LeaseRecord>>;

    /// First leasable namespace whose name contains `fragment`.
    async fn find(&self, fragment: &str) -> Result<Option<LeaseRecord>> {
        let record = self
            .list()
            .await?
            .into_iter()
            .find(|r| r.namespace.contains(fragment));
        tracing::debug!("found this namespace for '{}': {:?}", fragment, record);
        Ok(record)
    }

    /// Move `current` to `holder` (`None` frees it).
    async fn compare_and_set(&self, current: &LeaseRecord, holder: Option<&str>) -> Result<()>;
}

/// Leases stored in namespace labels.
pub struct LabelLeaseRepository {
    gateway: Arc<dyn ClusterGateway>,
    selector: String,
    holder_label: String,
}

impl LabelLeaseRepository {
    pub fn new(gateway: Arc<dyn ClusterGateway>, config: &LeaseConfig) -> Self {
        Self {
            gateway,
            selector: config.label_selector(),
            holder_label: config.holder_label.clone(),
        }
    }
}

#[async_trait]
impl LeaseRepository for LabelLeaseRepository {
    async fn list(&self) -> Result<Vec<LeaseRecord>> {
        let namespaces = self.gateway.list_namespaces(Some(&self.selector)).await?;
        Ok(namespaces
            .into_iter()
            .map(|ns| LeaseRecord {
                holder: ns.label(&self.holder_label).map(str::to_string),
                namespace: ns.name,
                resource_version: ns.resource_version,
            })
            .collect())
    }

    // Unconditional merge patch: `current.resource_version` is not checked.
    async fn compare_and_set(&self, current: &LeaseRecord, holder: Option<&str>) -> Result<()> {
        let mut labels = LabelPatch::new();
        labels.insert(self.holder_label.clone(), holder.map(str::to_string));
        self.gateway
            .patch_namespace_labels(&current.namespace, labels)
            .await?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeaseStatus {
    NotFound,
    Free { namespace: String },
    HeldBy { namespace: String, holder: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PickResult {
    NotFound,
    /// Held by someone, possibly the requester.
    AlreadyHeld { namespace: String, holder: String },
    Assigned { namespace: String, holder: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReleaseResult {
    NotFound,
    AlreadyFree { namespace: String },
    HeldByOther { namespace: String, holder: String },
    Released { namespace: String },
}

/// Whether `requester` may release a lease held by `holder`.
///
/// Loose on purpose: `U1` owns a lease held by `U12`.
pub fn holder_matches(holder: &str, requester: &str) -> bool {
    holder.contains(requester)
}

pub struct LeaseManager {
    repo: Box<dyn LeaseRepository>,
}

impl LeaseManager {
    pub fn new(repo: impl LeaseRepository + 'static) -> Self {
        Self {
            repo: Box::new(repo),
        }
    }

    pub async fn list(&self) -> Result<Vec<(String, Lease)>> {
        Ok(self
            .repo
            .list()
            .await?
            .into_iter()
            .map(|r| {
                let lease = r.lease();
                (r.namespace, lease)
            })
            .collect())
    }

    pub async fn status(&self, fragment: &str) -> Result<LeaseStatus> {
        Ok(match self.repo.find(fragment).await? {
            None => LeaseStatus::NotFound,
            Some(LeaseRecord {
                namespace,
                holder: None,
                ..
            }) => LeaseStatus::Free { namespace },
            Some(LeaseRecord {
                namespace,
                holder: Some(holder),
                ..
            }) => LeaseStatus::HeldBy { namespace, holder },
        })
    }

    pub async fn pick(&self, fragment: &str, requester: &str) -> Result<PickResult> {
        let Some(record) = self.repo.find(fragment).await? else {
            return Ok(PickResult::NotFound);
        };

        if let Some(holder) = &record.holder {
            return Ok(PickResult::AlreadyHeld {
                namespace: record.namespace.clone(),
                holder: holder.clone(),
            });
        }

        self.repo.compare_and_set(&record, Some(requester)).await?;
        tracing::info!("namespace {} assigned to {}", record.namespace, requester);
        Ok(PickResult::Assigned {
            namespace: record.namespace,
            holder: requester.to_string(),
        })
    }

    pub async fn release(&self, fragment: &str, requester: &str) -> Result<ReleaseResult> {
        let Some(record) = self.repo.find(fragment).await? else {
            return Ok(ReleaseResult::NotFound);
        };

        match &record.holder {
            None => Ok(ReleaseResult::AlreadyFree {
                namespace: record.namespace,
            }),
            Some(holder) if !holder_matches(holder, requester) => Ok(ReleaseResult::HeldByOther {
                namespace: record.namespace.clone(),
                holder: holder.clone(),
            }),
            Some(_) => {
                self.repo.compare_and_set(&record, None).await?;
                tracing::info!("namespace {} released by {}", record.namespace, requester);
                Ok(ReleaseResult::Released {
                    namespace: record.namespace,
                })
            }
        }
    }
}
