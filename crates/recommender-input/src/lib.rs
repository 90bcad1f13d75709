//! Input layer for the vertical resource recommender
//!
//! This crate provides the signals the recommender consumes:
//! - OOM facts from container restarts and kubelet evictions
//! - PromQL queries for RSS and JVM heap usage
//! - Per-container usage snapshots from pod metrics
//! - Configuration and observability

pub mod config;
pub mod error;
pub mod metrics;
pub mod models;
pub mod observability;
pub mod oom;
pub mod quantity;

pub use crate::config::{InputConfig, OverflowPolicy};
pub use error::{InputError, QuantityError, Result};
pub use models::*;
pub use observability::{InputMetrics, StructuredLogger};
