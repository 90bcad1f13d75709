//! Kubelet eviction event parsing
//!
//! When the kubelet evicts a pod under node pressure it records which
//! containers were using the starved resource in three parallel,
//! comma-separated annotations on the `Evicted` event.

use crate::models::{ContainerId, OomInfo, ResourceKind};
use crate::quantity::parse_bytes;
use k8s_openapi::api::core::v1::Event;
use std::fmt;
use tracing::{debug, warn};

pub const OFFENDING_CONTAINERS_ANNOTATION: &str = "offending_containers";
pub const OFFENDING_CONTAINERS_USAGE_ANNOTATION: &str = "offending_containers_usage";
pub const STARVED_RESOURCE_ANNOTATION: &str = "starved_resource";

/// Event reason set by the kubelet on evictions
pub const EVICTED_REASON: &str = "Evicted";

/// Why a whole eviction event was thrown away
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EvictionDiscard {
    MissingTimestamp,
    LengthMismatch {
        containers: usize,
        usages: usize,
        resources: usize,
    },
}

impl fmt::Display for EvictionDiscard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EvictionDiscard::MissingTimestamp => write!(f, "missing creation timestamp"),
            EvictionDiscard::LengthMismatch {
                containers,
                usages,
                resources,
            } => write!(
                f,
                "annotation lengths differ: {containers} containers, {usages} usages, {resources} resources"
            ),
        }
    }
}

fn annotation<'a>(event: &'a Event, key: &str) -> &'a str {
    event
        .metadata
        .annotations
        .as_ref()
        .and_then(|annotations| annotations.get(key))
        .map(String::as_str)
        .unwrap_or_default()
}

pub(crate) fn try_parse_eviction_event(event: &Event) -> Result<Vec<OomInfo>, EvictionDiscard> {
    let containers: Vec<&str> = annotation(event, OFFENDING_CONTAINERS_ANNOTATION)
        .split(',')
        .collect();
    let usages: Vec<&str> = annotation(event, OFFENDING_CONTAINERS_USAGE_ANNOTATION)
        .split(',')
        .collect();
    let resources: Vec<&str> = annotation(event, STARVED_RESOURCE_ANNOTATION)
        .split(',')
        .collect();

    if containers.len() != usages.len() || containers.len() != resources.len() {
        return Err(EvictionDiscard::LengthMismatch {
            containers: containers.len(),
            usages: usages.len(),
            resources: resources.len(),
        });
    }

    let timestamp = event
        .metadata
        .creation_timestamp
        .as_ref()
        .map(|time| time.0)
        .ok_or(EvictionDiscard::MissingTimestamp)?;

    let namespace = event.involved_object.namespace.as_deref().unwrap_or_default();
    let pod_name = event.involved_object.name.as_deref().unwrap_or_default();

    let mut infos = Vec::with_capacity(containers.len());
    for ((container, usage), resource) in containers.into_iter().zip(usages).zip(resources) {
        let Some(resource) = ResourceKind::from_starved_resource(resource) else {
            debug!(
                namespace = %namespace,
                pod_name = %pod_name,
                container = %container,
                starved_resource = %resource,
                "Skipping unrecognized starved resource"
            );
            continue;
        };

        let memory = match parse_bytes(usage) {
            Ok(memory) => memory,
            Err(e) => {
                warn!(
                    namespace = %namespace,
                    pod_name = %pod_name,
                    container = %container,
                    usage = %usage,
                    error = %e,
                    "Skipping unparseable container usage in eviction event"
                );
                continue;
            }
        };

        infos.push(OomInfo {
            timestamp,
            memory,
            resource,
            container_id: ContainerId::new(namespace, pod_name, container),
        });
    }

    Ok(infos)
}

/// Extract OOM facts from an eviction event.
///
/// Never fails: an event whose annotation lists have different lengths is
/// discarded entirely, while a single unrecognized resource only drops its
/// own entry. Output order follows the annotation order.
pub fn parse_eviction_event(event: &Event) -> Vec<OomInfo> {
    try_parse_eviction_event(event).unwrap_or_else(|discard| {
        debug!(
            namespace = ?event.involved_object.namespace,
            pod_name = ?event.involved_object.name,
            reason = %discard,
            "Discarding eviction event"
        );
        Vec::new()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};
    use k8s_openapi::api::core::v1::ObjectReference;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, Time};
    use std::collections::BTreeMap;

    fn timestamp() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2018-02-23T13:38:48Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn eviction_event(containers: &str, usages: &str, resources: &str) -> Event {
        let annotations = BTreeMap::from([
            (OFFENDING_CONTAINERS_ANNOTATION.to_string(), containers.to_string()),
            (OFFENDING_CONTAINERS_USAGE_ANNOTATION.to_string(), usages.to_string()),
            (STARVED_RESOURCE_ANNOTATION.to_string(), resources.to_string()),
        ]);
        Event {
            metadata: ObjectMeta {
                annotations: Some(annotations),
                creation_timestamp: Some(Time(timestamp())),
                ..Default::default()
            },
            involved_object: ObjectReference {
                api_version: Some("v1".to_string()),
                kind: Some("Pod".to_string()),
                name: Some("pod1".to_string()),
                namespace: Some("test-namespace".to_string()),
                ..Default::default()
            },
            reason: Some(EVICTED_REASON.to_string()),
            ..Default::default()
        }
    }

    fn oom(container: &str, usage: &str) -> OomInfo {
        OomInfo {
            timestamp: timestamp(),
            memory: parse_bytes(usage).unwrap(),
            resource: ResourceKind::Memory,
            container_id: ContainerId::new("test-namespace", "pod1", container),
        }
    }

    #[test]
    fn test_single_container() {
        let event = eviction_event("test-container", "1024Ki", "memory");
        assert_eq!(
            parse_eviction_event(&event),
            vec![oom("test-container", "1024Ki")]
        );
    }

    #[test]
    fn test_multiple_containers_preserve_order() {
        let event = eviction_event(
            "test-container,other-container",
            "1024Ki,2048Ki",
            "memory,memory",
        );
        let infos = parse_eviction_event(&event);
        assert_eq!(
            infos,
            vec![
                oom("test-container", "1024Ki"),
                oom("other-container", "2048Ki")
            ]
        );
        assert_eq!(infos[1].memory.value(), 2048 * 1024);
    }

    #[test]
    fn test_unrecognized_resource_is_skipped() {
        let event = eviction_event(
            "test-container,other-container",
            "1024Ki,2048Ki",
            "memory,evictable",
        );
        assert_eq!(
            parse_eviction_event(&event),
            vec![oom("test-container", "1024Ki")]
        );
    }

    #[test]
    fn test_length_mismatch_discards_event() {
        let event = eviction_event("test-container,other-container", "1024Ki,2048Ki", "memory");
        assert!(parse_eviction_event(&event).is_empty());
        assert_eq!(
            try_parse_eviction_event(&event),
            Err(EvictionDiscard::LengthMismatch {
                containers: 2,
                usages: 2,
                resources: 1
            })
        );
    }

    #[test]
    fn test_unparseable_usage_is_skipped() {
        let event = eviction_event(
            "test-container,other-container",
            "lots,2048Ki",
            "memory,memory",
        );
        assert_eq!(
            parse_eviction_event(&event),
            vec![oom("other-container", "2048Ki")]
        );
    }

    #[test]
    fn test_event_without_annotations() {
        let mut event = eviction_event("", "", "");
        event.metadata.annotations = None;
        assert!(parse_eviction_event(&event).is_empty());
    }

    #[test]
    fn test_event_without_timestamp() {
        let mut event = eviction_event("test-container", "1024Ki", "memory");
        event.metadata.creation_timestamp = None;
        assert!(parse_eviction_event(&event).is_empty());
        assert_eq!(
            try_parse_eviction_event(&event),
            Err(EvictionDiscard::MissingTimestamp)
        );
    }
}
