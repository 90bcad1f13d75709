//! Observability for the input layer
//!
//! Provides:
//! - Prometheus metrics (OOM facts, dropped batches, discarded evictions, queries built)
//! - Structured logging of input events with tracing

use crate::models::{OomInfo, ResourceKind};
use prometheus::{
    register_int_counter, register_int_counter_vec, register_int_gauge, IntCounter, IntCounterVec,
    IntGauge,
};
use std::fmt;
use std::sync::OnceLock;
use tracing::{info, warn};

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<InputMetricsInner> = OnceLock::new();

/// Where an OOM fact came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OomSource {
    /// Container last-termination state
    ContainerStatus,
    /// Kubelet eviction event
    Eviction,
}

impl OomSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            OomSource::ContainerStatus => "container_status",
            OomSource::Eviction => "eviction",
        }
    }
}

impl fmt::Display for OomSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

struct InputMetricsInner {
    oom_facts: IntCounterVec,
    oom_batches_dropped: IntCounter,
    eviction_events_discarded: IntCounter,
    queries_built: IntCounterVec,
    snapshots_assembled: IntGauge,
    metrics_fetch_errors: IntCounter,
}

impl InputMetricsInner {
    fn new() -> Self {
        Self {
            oom_facts: register_int_counter_vec!(
                "recommender_input_oom_facts_total",
                "OOM facts emitted to the recommender",
                &["resource", "source"]
            )
            .expect("Failed to register oom_facts"),

            oom_batches_dropped: register_int_counter!(
                "recommender_input_oom_batches_dropped_total",
                "OOM batches dropped because the output channel was full or closed"
            )
            .expect("Failed to register oom_batches_dropped"),

            eviction_events_discarded: register_int_counter!(
                "recommender_input_eviction_events_discarded_total",
                "Eviction events discarded as malformed"
            )
            .expect("Failed to register eviction_events_discarded"),

            queries_built: register_int_counter_vec!(
                "recommender_input_queries_built_total",
                "Namespace queries built for custom resources",
                &["resource"]
            )
            .expect("Failed to register queries_built"),

            snapshots_assembled: register_int_gauge!(
                "recommender_input_snapshots_assembled",
                "Container snapshots produced by the last metrics fetch"
            )
            .expect("Failed to register snapshots_assembled"),

            metrics_fetch_errors: register_int_counter!(
                "recommender_input_metrics_fetch_errors_total",
                "Failed container metrics fetches"
            )
            .expect("Failed to register metrics_fetch_errors"),
        }
    }
}

/// Handle to the input layer's Prometheus metrics
///
/// Clones share the same underlying metrics.
#[derive(Clone)]
pub struct InputMetrics {
    _private: (),
}

impl Default for InputMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl InputMetrics {
    /// Create a new metrics handle (initializes global metrics if needed)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(InputMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &InputMetricsInner {
        GLOBAL_METRICS.get_or_init(InputMetricsInner::new)
    }

    pub fn inc_oom_facts(&self, resource: ResourceKind, source: OomSource) {
        self.inner()
            .oom_facts
            .with_label_values(&[resource.as_str(), source.as_str()])
            .inc();
    }

    pub fn inc_oom_batches_dropped(&self) {
        self.inner().oom_batches_dropped.inc();
    }

    pub fn inc_eviction_events_discarded(&self) {
        self.inner().eviction_events_discarded.inc();
    }

    pub fn inc_queries_built(&self, resource: ResourceKind, count: usize) {
        self.inner()
            .queries_built
            .with_label_values(&[resource.as_str()])
            .inc_by(count as u64);
    }

    pub fn set_snapshots_assembled(&self, count: usize) {
        self.inner().snapshots_assembled.set(count as i64);
    }

    pub fn inc_metrics_fetch_errors(&self) {
        self.inner().metrics_fetch_errors.inc();
    }

    pub fn oom_facts(&self, resource: ResourceKind, source: OomSource) -> u64 {
        self.inner()
            .oom_facts
            .with_label_values(&[resource.as_str(), source.as_str()])
            .get()
    }

    pub fn oom_batches_dropped(&self) -> u64 {
        self.inner().oom_batches_dropped.get()
    }
}

/// Structured logger for input events
#[derive(Clone)]
pub struct StructuredLogger {
    component: String,
}

impl StructuredLogger {
    pub fn new(component: impl Into<String>) -> Self {
        Self {
            component: component.into(),
        }
    }

    /// Log an OOM fact handed to the recommender
    pub fn log_oom_observed(&self, oom: &OomInfo, source: OomSource) {
        info!(
            event = "oom_observed",
            component = %self.component,
            namespace = %oom.container_id.namespace(),
            pod_name = %oom.container_id.pod_name(),
            container = %oom.container_id.container_name,
            resource = %oom.resource,
            memory_bytes = oom.memory.value(),
            source = %source,
            timestamp = %oom.timestamp.to_rfc3339(),
            "OOM observed"
        );
    }

    /// Log an eviction event rejected as a whole
    pub fn log_eviction_discarded(&self, namespace: &str, pod_name: &str, reason: &str) {
        warn!(
            event = "eviction_event_discarded",
            component = %self.component,
            namespace = %namespace,
            pod_name = %pod_name,
            reason = %reason,
            "Eviction event discarded"
        );
    }

    /// Log a batch of OOM facts that never reached the recommender
    pub fn log_oom_batch_dropped(&self, batch_len: usize, reason: &str) {
        warn!(
            event = "oom_batch_dropped",
            component = %self.component,
            batch_len = batch_len,
            reason = %reason,
            "OOM batch dropped"
        );
    }

    /// Log a failed container metrics fetch
    pub fn log_metrics_fetch_failed(&self, error: &dyn fmt::Display) {
        warn!(
            event = "metrics_fetch_failed",
            component = %self.component,
            error = %error,
            "Failed to fetch container metrics"
        );
    }
}
