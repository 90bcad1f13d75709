//! Usage metrics for the recommender
//!
//! Custom PromQL queries for resources the metrics server does not report,
//! and assembly of per-container usage snapshots.

mod query;
mod snapshot;

pub use query::{
    batch_pod_names, build_namespace_queries, regex_or, NsQuery, QueryBuilder, QueryLabels,
    MAX_PODS_PER_QUERY,
};
pub use snapshot::{
    assemble_snapshots, merge_custom_usage, parse_window, MetricsSnapshotAssembler, PodMetrics,
    PodMetricsContainer, PodMetricsSource, UsageSample,
};

pub use async_trait::async_trait;
