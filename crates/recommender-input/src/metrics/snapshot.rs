//! Container usage snapshots
//!
//! Turns pod-level resource metrics (as served by `metrics.k8s.io`) into one
//! [`ContainerMetricsSnapshot`] per container, restricted to the base
//! resources. Custom-query results are folded in afterwards with
//! [`merge_custom_usage`].

use super::query::NsQuery;
use crate::models::{ContainerId, ContainerMetricsSnapshot, ResourceAmount, ResourceKind};
use crate::observability::{InputMetrics, StructuredLogger};
use crate::quantity::{quantity_bytes, quantity_millis};
use anyhow::Result;
use async_trait::async_trait;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, Time};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Usage of one container within a [`PodMetrics`] sample
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PodMetricsContainer {
    pub name: String,
    #[serde(default)]
    pub usage: BTreeMap<String, Quantity>,
}

/// Resource usage of one pod over a sampling window
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PodMetrics {
    pub metadata: ObjectMeta,
    /// End of the sampling window
    pub timestamp: Time,
    /// Window length as a duration string, e.g. `30s` or `1m0s`
    #[serde(default)]
    pub window: String,
    #[serde(default)]
    pub containers: Vec<PodMetricsContainer>,
}

/// Source of pod metrics (metrics API client, test double, ...)
#[async_trait]
pub trait PodMetricsSource: Send + Sync {
    /// List metrics for every pod the source knows about
    async fn list_pod_metrics(&self) -> Result<Vec<PodMetrics>>;
}

/// One label set and value from a custom query result
#[derive(Debug, Clone, PartialEq)]
pub struct UsageSample {
    pub labels: HashMap<String, String>,
    pub value: f64,
}

impl UsageSample {
    pub fn new(labels: HashMap<String, String>, value: f64) -> Self {
        Self { labels, value }
    }
}

/// Assembles container snapshots from a [`PodMetricsSource`]
pub struct MetricsSnapshotAssembler {
    source: Arc<dyn PodMetricsSource>,
    metrics: InputMetrics,
    logger: StructuredLogger,
}

impl MetricsSnapshotAssembler {
    pub fn new(source: Arc<dyn PodMetricsSource>) -> Self {
        Self {
            source,
            metrics: InputMetrics::new(),
            logger: StructuredLogger::new("metrics_snapshot"),
        }
    }

    /// Fetch current pod metrics and split them into container snapshots.
    ///
    /// Source errors are returned unchanged. Each snapshot's usage holds
    /// exactly CPU (millicores), memory and RSS (bytes).
    pub async fn get_containers_metrics(&self) -> Result<Vec<ContainerMetricsSnapshot>> {
        let pods = match self.source.list_pod_metrics().await {
            Ok(pods) => pods,
            Err(e) => {
                self.metrics.inc_metrics_fetch_errors();
                self.logger.log_metrics_fetch_failed(&e);
                return Err(e);
            }
        };

        let snapshots = assemble_snapshots(&pods);
        self.metrics.set_snapshots_assembled(snapshots.len());
        debug!(
            pods = pods.len(),
            snapshots = snapshots.len(),
            "Assembled container snapshots"
        );

        Ok(snapshots)
    }
}

/// Build one snapshot per container of every pod, in input order
pub fn assemble_snapshots(pods: &[PodMetrics]) -> Vec<ContainerMetricsSnapshot> {
    pods.iter().flat_map(pod_snapshots).collect()
}

fn pod_snapshots(pod: &PodMetrics) -> Vec<ContainerMetricsSnapshot> {
    let namespace = pod.metadata.namespace.as_deref().unwrap_or_default();
    let pod_name = pod.metadata.name.as_deref().unwrap_or_default();

    let snapshot_window = parse_window(&pod.window).unwrap_or_else(|| {
        debug!(
            namespace = %namespace,
            pod_name = %pod_name,
            window = %pod.window,
            "Unparseable metrics window"
        );
        Duration::ZERO
    });

    pod.containers
        .iter()
        .map(|container| {
            let id = ContainerId::new(namespace, pod_name, container.name.as_str());
            let usage = ResourceKind::BASE
                .iter()
                .map(|&kind| (kind, base_usage(&id, &container.usage, kind)))
                .collect();

            ContainerMetricsSnapshot {
                id,
                snapshot_time: pod.timestamp.0,
                snapshot_window,
                usage,
            }
        })
        .collect()
}

fn base_usage(
    id: &ContainerId,
    usage: &BTreeMap<String, Quantity>,
    kind: ResourceKind,
) -> ResourceAmount {
    let Some(quantity) = usage.get(kind.as_str()) else {
        debug!(container = %id, resource = %kind, "No usage reported");
        return ResourceAmount::ZERO;
    };

    let parsed = match kind {
        ResourceKind::Cpu => quantity_millis(quantity),
        _ => quantity_bytes(quantity),
    };
    parsed.unwrap_or_else(|e| {
        debug!(container = %id, resource = %kind, error = %e, "Unparseable usage");
        ResourceAmount::ZERO
    })
}

/// Parse a Go-style duration string (`30s`, `1m0s`, `1.5s`, `250ms`)
pub fn parse_window(window: &str) -> Option<Duration> {
    if window == "0" {
        return Some(Duration::ZERO);
    }
    if window.is_empty() {
        return None;
    }

    let mut rest = window;
    let mut total_nanos = 0f64;
    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        if number_len == 0 {
            return None;
        }
        let value: f64 = rest[..number_len].parse().ok()?;
        rest = &rest[number_len..];

        let unit_len = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let nanos_per_unit = match &rest[..unit_len] {
            "h" => 3.6e12,
            "m" => 6e10,
            "s" => 1e9,
            "ms" => 1e6,
            "us" | "µs" => 1e3,
            "ns" => 1.0,
            _ => return None,
        };
        rest = &rest[unit_len..];

        total_nanos += value * nanos_per_unit;
    }

    if total_nanos > u64::MAX as f64 {
        return None;
    }
    Some(Duration::from_nanos(total_nanos.round() as u64))
}

/// Fold custom-query samples into the matching snapshots under the query's
/// resource. Samples that map to no known container, or whose value is not
/// a finite non-negative number, are ignored. Returns how many were merged.
pub fn merge_custom_usage(
    snapshots: &mut [ContainerMetricsSnapshot],
    query: &NsQuery,
    samples: &[UsageSample],
) -> usize {
    let mut merged = 0;
    for sample in samples {
        let Some(id) = query.container_id(&sample.labels) else {
            continue;
        };
        if !sample.value.is_finite() || sample.value < 0.0 {
            debug!(container = %id, value = sample.value, "Ignoring invalid sample value");
            continue;
        }
        let Some(snapshot) = snapshots.iter_mut().find(|snapshot| snapshot.id == id) else {
            debug!(container = %id, resource = %query.resource(), "Sample for container without snapshot");
            continue;
        };

        snapshot
            .usage
            .insert(query.resource(), ResourceAmount(sample.value.ceil() as u64));
        merged += 1;
    }
    merged
}
