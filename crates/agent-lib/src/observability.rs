//! Observability infrastructure for the incident controller
//!
//! Provides:
//! - Prometheus metrics (incident and alert lifecycle, MTTR, watch connectivity)
//! - Structured JSON logging of domain events with tracing

use crate::models::{AlertRecord, Incident, Severity};
use prometheus::{
    HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
};
use std::sync::{Arc, OnceLock};
use tracing::{info, warn};

/// Histogram buckets for time to recovery (in seconds)
const MTTR_BUCKETS: &[f64] = &[
    30.0, 60.0, 120.0, 300.0, 600.0, 900.0, 1800.0, 3600.0, 7200.0, 21600.0, 86400.0,
];

/// Global metrics instance (registered once in the default registry)
static GLOBAL_METRICS: OnceLock<Arc<ControllerMetricsInner>> = OnceLock::new();

struct ControllerMetricsInner {
    incidents_created: IntCounterVec,
    incidents_resolved: IntCounterVec,
    mttr_seconds: HistogramVec,
    alerts_created: IntCounterVec,
    alerts_resolved: IntCounter,
    watch_connected: IntGauge,
    watch_reconnects: IntCounter,
    watch_events: IntCounterVec,
    enrichments: IntCounterVec,
    notifications: IntCounterVec,
    tracked_containers: IntGauge,
}

impl ControllerMetricsInner {
    fn register(registry: &Registry) -> Result<Self, prometheus::Error> {
        let inner = Self {
            incidents_created: IntCounterVec::new(
                Opts::new(
                    "incident_controller_incidents_created_total",
                    "Incidents created from container restarts",
                ),
                &["severity", "namespace", "category"],
            )?,
            incidents_resolved: IntCounterVec::new(
                Opts::new(
                    "incident_controller_incidents_resolved_total",
                    "Incidents marked healed",
                ),
                &["severity"],
            )?,
            mttr_seconds: HistogramVec::new(
                HistogramOpts::new(
                    "incident_controller_mttr_seconds",
                    "Time from detection to healing of an incident",
                )
                .buckets(MTTR_BUCKETS.to_vec()),
                &["severity"],
            )?,
            alerts_created: IntCounterVec::new(
                Opts::new(
                    "incident_controller_alerts_created_total",
                    "Alerts raised from pod phase transitions",
                ),
                &["severity", "namespace", "category"],
            )?,
            alerts_resolved: IntCounter::new(
                "incident_controller_alerts_resolved_total",
                "Alerts resolved after the pod recovered",
            )?,
            watch_connected: IntGauge::new(
                "incident_controller_watch_connected",
                "Whether the workload watch is currently established (1) or not (0)",
            )?,
            watch_reconnects: IntCounter::new(
                "incident_controller_watch_reconnects_total",
                "Watch reconnect attempts after a transport error",
            )?,
            watch_events: IntCounterVec::new(
                Opts::new(
                    "incident_controller_watch_events_total",
                    "Workload events delivered by the watch",
                ),
                &["type"],
            )?,
            enrichments: IntCounterVec::new(
                Opts::new(
                    "incident_controller_enrichments_total",
                    "Root-cause analyses produced, by source",
                ),
                &["source"],
            )?,
            notifications: IntCounterVec::new(
                Opts::new(
                    "incident_controller_notifications_total",
                    "Notification deliveries, by outcome",
                ),
                &["outcome"],
            )?,
            tracked_containers: IntGauge::new(
                "incident_controller_tracked_containers",
                "Containers with a recorded restart baseline",
            )?,
        };

        registry.register(Box::new(inner.incidents_created.clone()))?;
        registry.register(Box::new(inner.incidents_resolved.clone()))?;
        registry.register(Box::new(inner.mttr_seconds.clone()))?;
        registry.register(Box::new(inner.alerts_created.clone()))?;
        registry.register(Box::new(inner.alerts_resolved.clone()))?;
        registry.register(Box::new(inner.watch_connected.clone()))?;
        registry.register(Box::new(inner.watch_reconnects.clone()))?;
        registry.register(Box::new(inner.watch_events.clone()))?;
        registry.register(Box::new(inner.enrichments.clone()))?;
        registry.register(Box::new(inner.notifications.clone()))?;
        registry.register(Box::new(inner.tracked_containers.clone()))?;

        Ok(inner)
    }
}

/// Controller metrics for Prometheus exposition
///
/// Handles created with [`ControllerMetrics::new`] share one instance
/// registered in the default registry. Purely additive: nothing here
/// reads the stores.
#[derive(Clone)]
pub struct ControllerMetrics {
    inner: Arc<ControllerMetricsInner>,
}

impl Default for ControllerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl ControllerMetrics {
    /// Handle to the process-global metrics (registered on first call)
    pub fn new() -> Self {
        let inner = GLOBAL_METRICS.get_or_init(|| {
            Arc::new(
                ControllerMetricsInner::register(prometheus::default_registry())
                    .expect("Failed to register controller metrics"),
            )
        });
        Self {
            inner: Arc::clone(inner),
        }
    }

    /// Metrics registered in a caller-owned registry
    pub fn with_registry(registry: &Registry) -> Result<Self, prometheus::Error> {
        Ok(Self {
            inner: Arc::new(ControllerMetricsInner::register(registry)?),
        })
    }

    pub fn incident_created(&self, incident: &Incident) {
        self.inner
            .incidents_created
            .with_label_values(&[
                incident.severity.as_str(),
                incident.pod.namespace.as_str(),
                incident.category.as_str(),
            ])
            .inc();
    }

    /// Record a resolution and its time-to-recovery observation
    pub fn incident_resolved(&self, severity: Severity, time_to_recovery_secs: f64) {
        self.inner
            .incidents_resolved
            .with_label_values(&[severity.as_str()])
            .inc();
        self.inner
            .mttr_seconds
            .with_label_values(&[severity.as_str()])
            .observe(time_to_recovery_secs.max(0.0));
    }

    /// Observation count and sum of the MTTR histogram for a severity
    pub fn mttr_summary(&self, severity: Severity) -> (u64, f64) {
        let histogram = self
            .inner
            .mttr_seconds
            .with_label_values(&[severity.as_str()]);
        (histogram.get_sample_count(), histogram.get_sample_sum())
    }

    pub fn alert_created(&self, alert: &AlertRecord) {
        self.inner
            .alerts_created
            .with_label_values(&[
                alert.severity.as_str(),
                alert.pod.namespace.as_str(),
                alert.category.as_str(),
            ])
            .inc();
    }

    pub fn alert_resolved(&self) {
        self.inner.alerts_resolved.inc();
    }

    pub fn set_watch_connected(&self, connected: bool) {
        self.inner.watch_connected.set(i64::from(connected));
    }

    pub fn inc_watch_reconnects(&self) {
        self.inner.watch_reconnects.inc();
    }

    pub fn inc_watch_event(&self, kind: &str) {
        self.inner.watch_events.with_label_values(&[kind]).inc();
    }

    pub fn inc_enrichment(&self, source: &str) {
        self.inner.enrichments.with_label_values(&[source]).inc();
    }

    pub fn inc_notification(&self, outcome: &str) {
        self.inner.notifications.with_label_values(&[outcome]).inc();
    }

    pub fn set_tracked_containers(&self, count: usize) {
        self.inner.tracked_containers.set(count as i64);
    }

    #[cfg(test)]
    fn created_count(&self, severity: &str, namespace: &str, category: &str) -> u64 {
        self.inner
            .incidents_created
            .with_label_values(&[severity, namespace, category])
            .get()
    }
}

/// Structured logger for controller events
///
/// Every line carries a stable `event` field so log pipelines can
/// filter on it without parsing messages.
#[derive(Clone)]
pub struct StructuredLogger {
    cluster: String,
}

impl Default for StructuredLogger {
    fn default() -> Self {
        Self::new("local")
    }
}

impl StructuredLogger {
    pub fn new(cluster: impl Into<String>) -> Self {
        Self {
            cluster: cluster.into(),
        }
    }

    pub fn log_startup(&self, version: &str, api_port: u16) {
        info!(
            event = "controller_started",
            cluster = %self.cluster,
            controller_version = %version,
            api_port = api_port,
            "Incident controller started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "controller_shutdown",
            cluster = %self.cluster,
            reason = %reason,
            "Incident controller shutting down"
        );
    }

    /// Log a watch state transition; transitions carrying an error are warnings
    pub fn log_watch_state(&self, state: &str, reconnect_attempts: u32, error: Option<&str>) {
        match error {
            Some(error) => warn!(
                event = "watch_state_changed",
                cluster = %self.cluster,
                state = %state,
                reconnect_attempts = reconnect_attempts,
                error = %error,
                "Workload watch interrupted"
            ),
            None => info!(
                event = "watch_state_changed",
                cluster = %self.cluster,
                state = %state,
                reconnect_attempts = reconnect_attempts,
                "Workload watch state changed"
            ),
        }
    }

    pub fn log_incident_created(&self, incident: &Incident) {
        let container = incident.container_name.as_deref().unwrap_or("-");
        match incident.severity {
            Severity::Critical | Severity::High => warn!(
                event = "incident_created",
                cluster = %self.cluster,
                incident_id = %incident.id,
                pod = %incident.pod,
                container = %container,
                restart_count = incident.restart_count,
                reason = %incident.reason,
                category = %incident.category,
                severity = %incident.severity,
                "Incident detected"
            ),
            _ => info!(
                event = "incident_created",
                cluster = %self.cluster,
                incident_id = %incident.id,
                pod = %incident.pod,
                container = %container,
                restart_count = incident.restart_count,
                reason = %incident.reason,
                category = %incident.category,
                severity = %incident.severity,
                "Incident detected"
            ),
        }
    }

    pub fn log_incident_resolved(&self, incident: &Incident) {
        info!(
            event = "incident_resolved",
            cluster = %self.cluster,
            incident_id = %incident.id,
            pod = %incident.pod,
            severity = %incident.severity,
            time_to_recovery_secs = ?incident.time_to_recovery_secs(),
            "Incident healed"
        );
    }

    pub fn log_alert_created(&self, alert: &AlertRecord) {
        warn!(
            event = "alert_created",
            cluster = %self.cluster,
            alert_id = %alert.id,
            pod = %alert.pod,
            phase = %alert.phase,
            category = %alert.category,
            severity = %alert.severity,
            "Pod phase alert firing"
        );
    }

    pub fn log_alert_resolved(&self, alert: &AlertRecord) {
        info!(
            event = "alert_resolved",
            cluster = %self.cluster,
            alert_id = %alert.id,
            pod = %alert.pod,
            "Pod phase alert resolved"
        );
    }

    pub fn log_enrichment_fallback(&self, record_id: &str, category: &str, reason: &str) {
        warn!(
            event = "enrichment_fallback",
            cluster = %self.cluster,
            record_id = %record_id,
            category = %category,
            reason = %reason,
            "Using template root-cause analysis"
        );
    }

    pub fn log_notification_failed(&self, record_id: &str, recipient: &str, error: &str) {
        warn!(
            event = "notification_failed",
            cluster = %self.cluster,
            record_id = %record_id,
            recipient = %recipient,
            error = %error,
            "Notification delivery failed"
        );
    }
}
