//! OOM observer
//!
//! Diffs successive pod snapshots from the watch layer and turns container
//! restarts caused by memory exhaustion into [`OomInfo`] batches delivered
//! over a bounded channel to the recommender.

use super::eviction::{try_parse_eviction_event, EVICTED_REASON};
use super::heap_override::find_container_override_jvm_heap_size_env;
use crate::config::{InputConfig, OverflowPolicy};
use crate::models::{ContainerId, OomInfo, ResourceAmount, ResourceKind};
use crate::observability::{InputMetrics, OomSource, StructuredLogger};
use crate::quantity::quantity_bytes;
use k8s_openapi::api::core::v1::{Container, ContainerStatus, Event, Pod};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use std::collections::BTreeMap;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};

/// Termination reason set by the runtime on cgroup OOM kills
pub const OOM_KILLED_REASON: &str = "OOMKilled";

/// Generic termination reason used when the JVM exits on its own
pub const ERROR_REASON: &str = "Error";

/// Marker the JVM wrapper writes to the termination message on heap exhaustion
pub const JVM_HEAP_OOM_MARKER: &str = "JVM Heap OOM";

const MEMORY_RESOURCE: &str = "memory";

/// Consumer end of the OOM channel
pub type OomReceiver = mpsc::Receiver<Vec<OomInfo>>;

/// Watches pod transitions and eviction events for OOMs
///
/// All methods take `&self`; the observer can be shared between watch
/// handlers (or cloned) without extra locking.
#[derive(Clone)]
pub struct OomObserver {
    sender: mpsc::Sender<Vec<OomInfo>>,
    policy: OverflowPolicy,
    metrics: InputMetrics,
    logger: StructuredLogger,
}

impl OomObserver {
    /// Create an observer sized and configured from `config`
    pub fn new(config: &InputConfig) -> (Self, OomReceiver) {
        Self::with_capacity(config.oom_channel_capacity, config.overflow_policy)
    }

    /// Create an observer with an explicit channel capacity (in batches)
    pub fn with_capacity(capacity: usize, policy: OverflowPolicy) -> (Self, OomReceiver) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));

        let observer = Self {
            sender,
            policy,
            metrics: InputMetrics::new(),
            logger: StructuredLogger::new("oom_observer"),
        };

        (observer, receiver)
    }

    /// Handle a pod update from the watch layer
    pub async fn on_update(&self, old_pod: &Pod, new_pod: &Pod) {
        let batch = observe_transition(old_pod, new_pod);
        self.deliver(batch, OomSource::ContainerStatus).await;
    }

    /// Pod additions carry no before/after pair to diff
    pub fn on_add(&self, _pod: &Pod) {}

    /// Pod deletions carry no termination state change
    pub fn on_delete(&self, _pod: &Pod) {}

    /// Handle a cluster event; only kubelet evictions are considered
    pub async fn on_event(&self, event: &Event) {
        if event.reason.as_deref() != Some(EVICTED_REASON) {
            return;
        }

        match try_parse_eviction_event(event) {
            Ok(batch) => self.deliver(batch, OomSource::Eviction).await,
            Err(discard) => {
                self.metrics.inc_eviction_events_discarded();
                self.logger.log_eviction_discarded(
                    event.involved_object.namespace.as_deref().unwrap_or_default(),
                    event.involved_object.name.as_deref().unwrap_or_default(),
                    &discard.to_string(),
                );
            }
        }
    }

    /// Send one batch as a single channel item so batches never interleave
    async fn deliver(&self, batch: Vec<OomInfo>, source: OomSource) {
        if batch.is_empty() {
            return;
        }

        for oom in &batch {
            self.logger.log_oom_observed(oom, source);
        }
        let kinds: Vec<ResourceKind> = batch.iter().map(|oom| oom.resource).collect();

        let sent = match self.policy {
            OverflowPolicy::Block => match self.sender.send(batch).await {
                Ok(()) => true,
                Err(e) => {
                    self.logger.log_oom_batch_dropped(e.0.len(), "receiver closed");
                    false
                }
            },
            OverflowPolicy::DropNewest => match self.sender.try_send(batch) {
                Ok(()) => true,
                Err(TrySendError::Full(batch)) => {
                    self.logger.log_oom_batch_dropped(batch.len(), "channel full");
                    false
                }
                Err(TrySendError::Closed(batch)) => {
                    self.logger.log_oom_batch_dropped(batch.len(), "receiver closed");
                    false
                }
            },
        };

        if sent {
            for kind in kinds {
                self.metrics.inc_oom_facts(kind, source);
            }
        } else {
            self.metrics.inc_oom_batches_dropped();
        }
    }
}

fn container_statuses(pod: &Pod) -> &[ContainerStatus] {
    pod.status
        .as_ref()
        .and_then(|status| status.container_statuses.as_deref())
        .unwrap_or_default()
}

fn container_spec<'a>(pod: &'a Pod, name: &str) -> Option<&'a Container> {
    pod.spec
        .as_ref()?
        .containers
        .iter()
        .find(|container| container.name == name)
}

/// Memory amount from a request or limit list; absent or unparseable is zero
fn memory_amount(
    container_id: &ContainerId,
    resources: Option<&BTreeMap<String, Quantity>>,
    kind: &str,
) -> ResourceAmount {
    let Some(quantity) = resources.and_then(|list| list.get(MEMORY_RESOURCE)) else {
        debug!(container = %container_id, kind = kind, "No memory quantity declared");
        return ResourceAmount::ZERO;
    };

    quantity_bytes(quantity).unwrap_or_else(|e| {
        debug!(container = %container_id, kind = kind, error = %e, "Unparseable memory quantity");
        ResourceAmount::ZERO
    })
}

/// Extract the OOM facts implied by a pod moving from `old_pod` to `new_pod`.
///
/// For each container whose restart count went up:
/// - `OOMKilled`: memory request as [`ResourceKind::Memory`], then memory
///   limit as [`ResourceKind::Rss`];
/// - `Error` with the JVM heap marker and a valid heap override: the override
///   as [`ResourceKind::JvmHeapCommitted`], then memory limit as RSS.
///
/// Requests, limits and the heap override are read from `old_pod`'s spec;
/// a container absent from it is skipped. Facts for one container are
/// adjacent and in that order.
pub fn observe_transition(old_pod: &Pod, new_pod: &Pod) -> Vec<OomInfo> {
    let old_statuses = container_statuses(old_pod);
    let namespace = new_pod.metadata.namespace.as_deref().unwrap_or_default();
    let pod_name = new_pod.metadata.name.as_deref().unwrap_or_default();

    let mut infos = Vec::new();
    for status in container_statuses(new_pod) {
        let Some(old_status) = old_statuses.iter().find(|old| old.name == status.name) else {
            continue;
        };
        if status.restart_count <= old_status.restart_count {
            continue;
        }

        let container_id = ContainerId::new(namespace, pod_name, status.name.as_str());

        let Some(terminated) = status
            .last_state
            .as_ref()
            .and_then(|state| state.terminated.as_ref())
        else {
            debug!(container = %container_id, "Restart without last termination state");
            continue;
        };
        let Some(timestamp) = terminated.finished_at.as_ref().map(|time| time.0) else {
            warn!(
                container = %container_id,
                reason = terminated.reason.as_deref().unwrap_or_default(),
                "Dropping container termination without finish time"
            );
            continue;
        };

        // Resources and env come from the spec the container was running with
        let Some(spec) = container_spec(old_pod, &status.name) else {
            debug!(container = %container_id, "Container missing from previous pod spec");
            continue;
        };
        let resources = spec.resources.as_ref();
        let limits = resources.and_then(|r| r.limits.as_ref());

        match terminated.reason.as_deref() {
            Some(OOM_KILLED_REASON) => {
                let requests = resources.and_then(|r| r.requests.as_ref());
                infos.push(OomInfo {
                    timestamp,
                    memory: memory_amount(&container_id, requests, "request"),
                    resource: ResourceKind::Memory,
                    container_id: container_id.clone(),
                });
                infos.push(OomInfo {
                    timestamp,
                    memory: memory_amount(&container_id, limits, "limit"),
                    resource: ResourceKind::Rss,
                    container_id,
                });
            }
            Some(ERROR_REASON)
                if terminated
                    .message
                    .as_deref()
                    .is_some_and(|message| message.contains(JVM_HEAP_OOM_MARKER)) =>
            {
                let Some(heap) = spec
                    .env
                    .as_deref()
                    .and_then(find_container_override_jvm_heap_size_env)
                else {
                    debug!(container = %container_id, "JVM heap OOM without a usable heap override");
                    continue;
                };
                infos.push(OomInfo {
                    timestamp,
                    memory: heap,
                    resource: ResourceKind::JvmHeapCommitted,
                    container_id: container_id.clone(),
                });
                infos.push(OomInfo {
                    timestamp,
                    memory: memory_amount(&container_id, limits, "limit"),
                    resource: ResourceKind::Rss,
                    container_id,
                });
            }
            _ => {}
        }
    }

    infos
}
