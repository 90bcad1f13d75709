//! Core data models for recommender input signals

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// Identity of a pod within the cluster
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PodId {
    pub namespace: String,
    pub pod_name: String,
}

impl PodId {
    pub fn new(namespace: impl Into<String>, pod_name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            pod_name: pod_name.into(),
        }
    }
}

/// Identity of a single container: (namespace, pod name, container name)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContainerId {
    pub pod_id: PodId,
    pub container_name: String,
}

impl ContainerId {
    pub fn new(
        namespace: impl Into<String>,
        pod_name: impl Into<String>,
        container_name: impl Into<String>,
    ) -> Self {
        Self {
            pod_id: PodId::new(namespace, pod_name),
            container_name: container_name.into(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.pod_id.namespace
    }

    pub fn pod_name(&self) -> &str {
        &self.pod_id.pod_name
    }
}

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}",
            self.pod_id.namespace, self.pod_id.pod_name, self.container_name
        )
    }
}

/// Resource tracked by the recommender
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Cpu,
    Memory,
    Rss,
    JvmHeapCommitted,
}

impl ResourceKind {
    /// Resources surfaced by the default metrics path
    pub const BASE: [ResourceKind; 3] = [ResourceKind::Cpu, ResourceKind::Memory, ResourceKind::Rss];

    /// Name used in resource lists and metric labels
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Cpu => "cpu",
            ResourceKind::Memory => "memory",
            ResourceKind::Rss => "rss",
            ResourceKind::JvmHeapCommitted => "jvm_heap_committed",
        }
    }

    pub fn is_base(&self) -> bool {
        Self::BASE.contains(self)
    }

    /// Map a kubelet `starved_resource` annotation entry to a resource.
    /// Only memory starvation is turned into an OOM signal.
    pub fn from_starved_resource(name: &str) -> Option<Self> {
        match name {
            "memory" => Some(ResourceKind::Memory),
            _ => None,
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Non-negative resource quantity: bytes, or millicores for CPU
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ResourceAmount(pub u64);

impl ResourceAmount {
    pub const ZERO: ResourceAmount = ResourceAmount(0);

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl From<u64> for ResourceAmount {
    fn from(value: u64) -> Self {
        ResourceAmount(value)
    }
}

impl fmt::Display for ResourceAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A single out-of-memory observation for a container
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OomInfo {
    pub timestamp: DateTime<Utc>,
    pub memory: ResourceAmount,
    pub resource: ResourceKind,
    pub container_id: ContainerId,
}

/// Point-in-time usage of one container
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerMetricsSnapshot {
    pub id: ContainerId,
    /// End of the sampling window
    pub snapshot_time: DateTime<Utc>,
    /// Length of the sampling window
    pub snapshot_window: Duration,
    pub usage: BTreeMap<ResourceKind, ResourceAmount>,
}
