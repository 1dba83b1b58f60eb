//! Workload watching
//!
//! This module provides:
//! - The pod event source over the Kubernetes watch API
//! - The watch controller with its fixed-delay reconnect loop
//! - Restart diff tracking per container
//! - Periodic resource-usage polling from metrics-server

mod controller;
mod source;
mod tracker;
mod usage;

pub use controller::{WatchConfig, WatchController, WatchState, WatchStatus, WatchStatusHandle};
pub use source::{snapshot_from_pod, ClientProvider, KubeEventSource};
pub use tracker::{PhaseChange, RestartTracker};
pub use usage::{
    parse_cpu_millicores, parse_memory_mib, MetricsServerUsage, UsageCache, UsagePoller,
};

use crate::error::SourceError;
use crate::models::{PodUsage, WorkloadEvent};
use async_trait::async_trait;
use std::collections::HashMap;
use std::pin::Pin;
use tokio_stream::Stream;

/// Ordered, at-least-once stream of workload events
pub type EventStream = Pin<Box<dyn Stream<Item = Result<WorkloadEvent, SourceError>> + Send>>;

/// Trait for workload event subscriptions
#[async_trait]
pub trait WorkloadEventSource: Send + Sync {
    /// Open a new subscription to workload lifecycle events
    async fn watch(&self) -> Result<EventStream, SourceError>;
}

/// Trait for per-pod resource usage snapshots
#[async_trait]
pub trait UsageSource: Send + Sync {
    /// Fetch current usage keyed by `namespace/name`
    async fn fetch(&self) -> Result<HashMap<String, PodUsage>, SourceError>;
}
