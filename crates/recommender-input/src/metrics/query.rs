//! Custom resource queries
//!
//! Builds namespace-scoped PromQL queries for resources the metrics server
//! does not report (RSS and JVM heap committed). Pod names are matched with
//! a regex alternation; large pod lists are split into batches so the query
//! engine never compiles a pathologically large regex.

use crate::config::InputConfig;
use crate::models::{ContainerId, ResourceKind};
use crate::observability::InputMetrics;
use std::collections::{BTreeMap, HashMap};

/// Maximum pod names OR'd into a single query's regex
pub const MAX_PODS_PER_QUERY: usize = 500;

/// Label names identifying containers and pods on a metric series
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryLabels {
    pub container_name_label: String,
    pub pod_name_label: String,
}

impl QueryLabels {
    pub fn new(container_name_label: impl Into<String>, pod_name_label: impl Into<String>) -> Self {
        Self {
            container_name_label: container_name_label.into(),
            pod_name_label: pod_name_label.into(),
        }
    }
}

/// A query for one namespace and one batch of pods
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NsQuery {
    query: String,
    resource: ResourceKind,
    pods: Vec<String>,
    namespace: String,
    container_name_label: String,
    pod_name_label: String,
}

impl NsQuery {
    /// PromQL text to execute
    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn resource(&self) -> ResourceKind {
        self.resource
    }

    /// Pod names covered by this query, in input order
    pub fn pods(&self) -> &[String] {
        &self.pods
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn container_name_label(&self) -> &str {
        &self.container_name_label
    }

    pub fn pod_name_label(&self) -> &str {
        &self.pod_name_label
    }

    /// Map a result sample's labels back to the container it describes.
    ///
    /// Returns `None` if either label is missing or empty, or if the pod is
    /// not part of this query's batch.
    pub fn container_id(&self, labels: &HashMap<String, String>) -> Option<ContainerId> {
        let container = labels
            .get(&self.container_name_label)
            .filter(|name| !name.is_empty())?;
        let pod = labels.get(&self.pod_name_label)?;
        if !self.pods.contains(pod) {
            return None;
        }
        Some(ContainerId::new(
            self.namespace.as_str(),
            pod.as_str(),
            container.as_str(),
        ))
    }
}

/// Query builder for one custom resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryBuilder {
    /// `container_memory_rss` from cAdvisor
    Rss(QueryLabels),
    /// `jmx_Memory_HeapMemoryUsage_committed` from the JMX exporter
    JvmHeapCommitted(QueryLabels),
}

impl QueryBuilder {
    /// Builder for a resource, if that resource has a custom query
    pub fn for_resource(resource: ResourceKind, labels: QueryLabels) -> Option<Self> {
        match resource {
            ResourceKind::Rss => Some(QueryBuilder::Rss(labels)),
            ResourceKind::JvmHeapCommitted => Some(QueryBuilder::JvmHeapCommitted(labels)),
            ResourceKind::Cpu | ResourceKind::Memory => None,
        }
    }

    /// Builder for a resource using the label names from `config`
    pub fn from_config(resource: ResourceKind, config: &InputConfig) -> Option<Self> {
        let labels = match resource {
            ResourceKind::Rss => QueryLabels::new(
                config.rss_container_name_label.as_str(),
                config.rss_pod_name_label.as_str(),
            ),
            ResourceKind::JvmHeapCommitted => QueryLabels::new(
                config.jvm_container_name_label.as_str(),
                config.jvm_pod_name_label.as_str(),
            ),
            ResourceKind::Cpu | ResourceKind::Memory => return None,
        };
        Self::for_resource(resource, labels)
    }

    pub fn resource(&self) -> ResourceKind {
        match self {
            QueryBuilder::Rss(_) => ResourceKind::Rss,
            QueryBuilder::JvmHeapCommitted(_) => ResourceKind::JvmHeapCommitted,
        }
    }

    pub fn labels(&self) -> &QueryLabels {
        match self {
            QueryBuilder::Rss(labels) | QueryBuilder::JvmHeapCommitted(labels) => labels,
        }
    }

    /// Build a single query covering every pod name, however many
    pub fn build_raw<S: AsRef<str>>(&self, pod_names: &[S], namespace: &str) -> NsQuery {
        let labels = self.labels();
        let pods = regex_or(pod_names);
        let query = match self {
            QueryBuilder::Rss(_) => format!(
                "max_over_time(container_memory_rss{{{}!='', {}=~'{}', namespace='{}'}}[5m])",
                labels.container_name_label, labels.pod_name_label, pods, namespace
            ),
            QueryBuilder::JvmHeapCommitted(_) => format!(
                "max_over_time(jmx_Memory_HeapMemoryUsage_committed{{{}!='', {}=~'{}', kubernetes_namespace='{}'}}[5m])",
                labels.container_name_label, labels.pod_name_label, pods, namespace
            ),
        };

        NsQuery {
            query,
            resource: self.resource(),
            pods: pod_names.iter().map(|name| name.as_ref().to_string()).collect(),
            namespace: namespace.to_string(),
            container_name_label: labels.container_name_label.clone(),
            pod_name_label: labels.pod_name_label.clone(),
        }
    }

    /// Build one query per batch of at most [`MAX_PODS_PER_QUERY`] pods
    pub fn build_batch<S: AsRef<str>>(&self, pod_names: &[S], namespace: &str) -> Vec<NsQuery> {
        let queries: Vec<NsQuery> = batch_pod_names(pod_names)
            .into_iter()
            .map(|batch| self.build_raw(batch, namespace))
            .collect();

        InputMetrics::new().inc_queries_built(self.resource(), queries.len());
        queries
    }
}

/// Join values into a regex alternation, in order
pub fn regex_or<S: AsRef<str>>(values: &[S]) -> String {
    values
        .iter()
        .map(|value| value.as_ref())
        .collect::<Vec<&str>>()
        .join("|")
}

/// Split pod names into consecutive batches of at most [`MAX_PODS_PER_QUERY`]
pub fn batch_pod_names<S>(pod_names: &[S]) -> Vec<&[S]> {
    pod_names.chunks(MAX_PODS_PER_QUERY).collect()
}

/// Build queries for every namespace, ordered by namespace then batch
pub fn build_namespace_queries(
    builder: &QueryBuilder,
    pods_by_namespace: &BTreeMap<String, Vec<String>>,
) -> Vec<NsQuery> {
    pods_by_namespace
        .iter()
        .flat_map(|(namespace, pods)| builder.build_batch(pods.as_slice(), namespace))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rss() -> QueryBuilder {
        QueryBuilder::Rss(QueryLabels::new("container", "pod"))
    }

    fn jvm() -> QueryBuilder {
        QueryBuilder::JvmHeapCommitted(QueryLabels::new("container_name", "pod_name"))
    }

    fn pod_names(count: usize) -> Vec<String> {
        (0..count).map(|i| format!("pod-{i}")).collect()
    }

    #[test]
    fn test_rss_query_text() {
        let query = rss().build_raw(&["pod1", "pod2"], "default");
        assert_eq!(
            query.query(),
            "max_over_time(container_memory_rss{container!='', pod=~'pod1|pod2', namespace='default'}[5m])"
        );
        assert_eq!(query.resource(), ResourceKind::Rss);
        assert_eq!(query.pods(), ["pod1".to_string(), "pod2".to_string()]);
        assert_eq!(query.namespace(), "default");
        assert_eq!(query.container_name_label(), "container");
        assert_eq!(query.pod_name_label(), "pod");
    }

    #[test]
    fn test_jvm_heap_query_text() {
        let query = jvm().build_raw(&["api-0"], "payments");
        assert_eq!(
            query.query(),
            "max_over_time(jmx_Memory_HeapMemoryUsage_committed{container_name!='', pod_name=~'api-0', kubernetes_namespace='payments'}[5m])"
        );
        assert_eq!(query.resource(), ResourceKind::JvmHeapCommitted);
    }

    #[test]
    fn test_build_raw_ignores_batch_limit() {
        let names = pod_names(MAX_PODS_PER_QUERY + 10);
        let query = rss().build_raw(names.as_slice(), "default");
        assert_eq!(query.pods().len(), MAX_PODS_PER_QUERY + 10);
    }

    #[test]
    fn test_batch_counts() {
        for (count, expected) in [(0, 0), (1, 1), (499, 1), (500, 1), (501, 2), (1000, 2), (1001, 3)] {
            let names = pod_names(count);
            let queries = rss().build_batch(names.as_slice(), "default");
            assert_eq!(queries.len(), expected, "{count} pods");
            assert!(queries.iter().all(|q| q.pods().len() <= MAX_PODS_PER_QUERY));
        }
    }

    #[test]
    fn test_batches_cover_input_in_order() {
        let names = pod_names(1234);
        let queries = jvm().build_batch(names.as_slice(), "default");

        let covered: Vec<String> = queries.iter().flat_map(|q| q.pods().to_vec()).collect();
        assert_eq!(covered, names);
        assert_eq!(queries[0].pods().len(), 500);
        assert_eq!(queries[1].pods().len(), 500);
        assert_eq!(queries[2].pods().len(), 234);
        assert!(queries[2].query().contains("pod-1000|pod-1001"));
    }

    #[test]
    fn test_regex_or() {
        assert_eq!(regex_or(&["a", "b", "c"]), "a|b|c");
        assert_eq!(regex_or::<&str>(&[]), "");
    }

    #[test]
    fn test_for_resource() {
        let labels = QueryLabels::new("container", "pod");
        assert_eq!(
            QueryBuilder::for_resource(ResourceKind::Rss, labels.clone()),
            Some(QueryBuilder::Rss(labels.clone()))
        );
        assert!(QueryBuilder::for_resource(ResourceKind::Cpu, labels.clone()).is_none());
        assert!(QueryBuilder::for_resource(ResourceKind::Memory, labels).is_none());
    }

    #[test]
    fn test_from_config_uses_resource_labels() {
        let config = InputConfig {
            jvm_pod_name_label: "kubernetes_pod_name".to_string(),
            ..Default::default()
        };
        let builder = QueryBuilder::from_config(ResourceKind::JvmHeapCommitted, &config).unwrap();
        assert_eq!(builder.labels().pod_name_label, "kubernetes_pod_name");

        let builder = QueryBuilder::from_config(ResourceKind::Rss, &config).unwrap();
        assert_eq!(builder.labels().pod_name_label, "pod");
    }

    #[test]
    fn test_container_id_from_sample_labels() {
        let query = rss().build_raw(&["pod1", "pod2"], "default");

        let labels = HashMap::from([
            ("container".to_string(), "app".to_string()),
            ("pod".to_string(), "pod2".to_string()),
        ]);
        assert_eq!(
            query.container_id(&labels),
            Some(ContainerId::new("default", "pod2", "app"))
        );

        let unknown_pod = HashMap::from([
            ("container".to_string(), "app".to_string()),
            ("pod".to_string(), "pod3".to_string()),
        ]);
        assert_eq!(query.container_id(&unknown_pod), None);

        let pod_level = HashMap::from([
            ("container".to_string(), String::new()),
            ("pod".to_string(), "pod1".to_string()),
        ]);
        assert_eq!(query.container_id(&pod_level), None);
    }

    #[test]
    fn test_build_namespace_queries() {
        let pods_by_namespace = BTreeMap::from([
            ("b".to_string(), pod_names(600)),
            ("a".to_string(), pod_names(3)),
            ("c".to_string(), Vec::new()),
        ]);

        let queries = build_namespace_queries(&rss(), &pods_by_namespace);

        let namespaces: Vec<&str> = queries.iter().map(|q| q.namespace()).collect();
        assert_eq!(namespaces, vec!["a", "b", "b"]);
    }
}
