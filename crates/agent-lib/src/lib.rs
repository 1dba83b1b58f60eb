//! Incident controller library
//!
//! This crate provides the core functionality for:
//! - Watching pod lifecycle events with fixed-delay reconnect
//! - Restart diffing and phase-change detection
//! - Incident classification and root-cause enrichment
//! - Bounded incident and alert stores with MTTR aggregation
//! - Live broadcast, outbound notification and observability

pub mod dispatch;
pub mod error;
pub mod health;
pub mod incident;
pub mod models;
pub mod observability;
pub mod watch;

pub use error::{DeliveryError, GenerationError, QueryError, SourceError};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{ControllerMetrics, StructuredLogger};
