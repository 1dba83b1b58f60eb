//! Incident handling
//!
//! This module provides:
//! - Severity and category classification over same-pod history
//! - Root-cause enrichment with template fallback
//! - Bounded incident and alert stores
//! - The pipeline tying detection, storage and fan-out together

mod classifier;
mod enricher;
mod pipeline;
mod store;
mod templates;

pub use classifier::{
    category_for_phase, category_for_reason, Classifier, Trigger, CPU_THRESHOLD_PERCENT,
    MEMORY_THRESHOLD_MIB,
};
pub use enricher::{
    AnalysisSource, EnrichmentContext, HttpTextGenerator, RootCauseAnalysis, RootCauseEnricher,
    TextGenerator,
};
pub use pipeline::{IncidentPipeline, IncidentPipelineBuilder, PipelineSettings, ProcessOutcome};
pub use store::{
    AlertStats, AlertStore, BoundedStore, IncidentStats, IncidentStore, PodCount, Record,
    DEFAULT_ALERT_CAPACITY, DEFAULT_INCIDENT_CAPACITY,
};
