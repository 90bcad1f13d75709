//! OOM and eviction signals
//!
//! This module turns Kubernetes watch data into OOM facts for the
//! recommender:
//! - container restarts terminated by `OOMKilled` or a JVM heap OOM
//! - kubelet eviction events naming the containers that starved the node
//! - the `OVERRIDE_JVM_HEAP_SIZE` heap size override

mod eviction;
mod heap_override;
mod observer;


pub use eviction::{
    parse_eviction_event, EVICTED_REASON, OFFENDING_CONTAINERS_ANNOTATION,
    OFFENDING_CONTAINERS_USAGE_ANNOTATION, STARVED_RESOURCE_ANNOTATION,
};
pub use heap_override::{
    find_container_override_jvm_heap_size_env, parse_jvm_heap_size, OVERRIDE_JVM_HEAP_SIZE_ENV,
};
pub use observer::{
    observe_transition, OomObserver, OomReceiver, ERROR_REASON, JVM_HEAP_OOM_MARKER,
    OOM_KILLED_REASON,
};
