//! Event-to-incident pipeline
//!
//! Runs on the single watch consumption path: restart diffing,
//! classification and store insertion happen synchronously per event,
//! then enrichment and notification are spawned as independent tasks.
//! A record is stored and broadcast in `detected` state before any
//! enrichment work starts.

use super::classifier::{Classifier, Trigger};
use super::enricher::{AnalysisSource, EnrichmentContext, RootCauseEnricher};
use super::store::{AlertStore, IncidentStore};
use crate::dispatch::{Broadcaster, LiveUpdate, Notifier};
use crate::error::QueryError;
use crate::health::{components, HealthRegistry};
use crate::models::{
    AlertRecord, Classification, Incident, RestartEvent, WorkloadEvent, WorkloadPhase,
    WorkloadSnapshot,
};
use crate::observability::{ControllerMetrics, StructuredLogger};
use crate::watch::{RestartTracker, UsageCache};
use anyhow::Result;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Behaviour switches of the pipeline
#[derive(Debug, Clone, Copy)]
pub struct PipelineSettings {
    /// Heal incidents once their analysis has been attached
    pub auto_heal: bool,
    /// Forget a pod's tracked restart counts when it is deleted
    pub evict_on_delete: bool,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            auto_heal: true,
            evict_on_delete: false,
        }
    }
}

/// What a single workload event produced
#[derive(Debug, Default)]
pub struct ProcessOutcome {
    pub restart_events: Vec<RestartEvent>,
    pub incident_ids: Vec<String>,
    pub alert_id: Option<String>,
    /// Spawned enrichment and notification work
    pub tasks: Vec<JoinHandle<()>>,
}

impl ProcessOutcome {
    /// Wait for every spawned task of this outcome
    pub async fn wait(self) {
        for task in self.tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "Enrichment task failed");
            }
        }
    }
}

/// Turns workload events into stored, broadcast and notified records
#[derive(Clone)]
pub struct IncidentPipeline {
    tracker: Arc<RestartTracker>,
    classifier: Arc<Classifier>,
    enricher: Arc<RootCauseEnricher>,
    notifier: Arc<Notifier>,
    incidents: IncidentStore,
    alerts: AlertStore,
    usage: UsageCache,
    broadcaster: Broadcaster,
    health: HealthRegistry,
    metrics: ControllerMetrics,
    logger: StructuredLogger,
    settings: PipelineSettings,
}

impl IncidentPipeline {
    pub fn builder() -> IncidentPipelineBuilder {
        IncidentPipelineBuilder::new()
    }

    pub fn tracker(&self) -> &Arc<RestartTracker> {
        &self.tracker
    }

    pub fn incidents(&self) -> &IncidentStore {
        &self.incidents
    }

    pub fn alerts(&self) -> &AlertStore {
        &self.alerts
    }

    pub fn broadcaster(&self) -> &Broadcaster {
        &self.broadcaster
    }

    pub fn health(&self) -> &HealthRegistry {
        &self.health
    }

    pub fn metrics(&self) -> &ControllerMetrics {
        &self.metrics
    }

    pub fn logger(&self) -> &StructuredLogger {
        &self.logger
    }

    pub async fn handle(&self, event: WorkloadEvent) -> ProcessOutcome {
        self.handle_at(event, Utc::now()).await
    }

    /// Process one workload event observed at `now`
    pub async fn handle_at(&self, event: WorkloadEvent, now: DateTime<Utc>) -> ProcessOutcome {
        self.metrics.inc_watch_event(event.kind());
        let mut outcome = ProcessOutcome::default();

        let snapshot = match event {
            WorkloadEvent::Deleted(snapshot) if self.settings.evict_on_delete => {
                self.tracker.forget_pod(&snapshot.pod);
                self.metrics
                    .set_tracked_containers(self.tracker.tracked_containers());
                return outcome;
            }
            WorkloadEvent::Added(snapshot)
            | WorkloadEvent::Modified(snapshot)
            | WorkloadEvent::Deleted(snapshot) => snapshot,
        };

        for container in &snapshot.containers {
            let Some(restart) = self.tracker.observe(&snapshot.pod, container, now) else {
                continue;
            };
            let (incident_id, task) = self.open_incident(&restart, now).await;
            outcome.restart_events.push(restart);
            outcome.incident_ids.push(incident_id);
            outcome.tasks.push(task);
        }

        if let Some(change) = self.tracker.observe_phase(&snapshot.pod, snapshot.phase) {
            match change.current {
                WorkloadPhase::Failed | WorkloadPhase::Unknown => {
                    let (alert_id, task) = self.raise_alert(&snapshot, now).await;
                    outcome.alert_id = Some(alert_id);
                    outcome.tasks.push(task);
                }
                WorkloadPhase::Pending if snapshot.unschedulable => {
                    let (alert_id, task) = self.raise_alert(&snapshot, now).await;
                    outcome.alert_id = Some(alert_id);
                    outcome.tasks.push(task);
                }
                WorkloadPhase::Running | WorkloadPhase::Succeeded => {
                    self.resolve_alerts(&snapshot).await;
                }
                WorkloadPhase::Pending => {}
            }
        }

        self.metrics
            .set_tracked_containers(self.tracker.tracked_containers());
        outcome
    }

    async fn open_incident(
        &self,
        restart: &RestartEvent,
        now: DateTime<Utc>,
    ) -> (String, JoinHandle<()>) {
        let history = self
            .incidents
            .history_for(&restart.pod, self.classifier.window_start(now))
            .await;
        let classification = self
            .classifier
            .classify(&Trigger::Restart(restart), &history, now);

        let incident = Incident::from_restart(restart, classification);
        let id = incident.id.clone();
        self.incidents.insert(incident.clone()).await;

        self.metrics.incident_created(&incident);
        self.logger.log_incident_created(&incident);
        self.broadcaster
            .publish(LiveUpdate::IncidentCreated(incident.clone()));

        let pipeline = self.clone();
        let task = tokio::spawn(async move { pipeline.enrich_incident(incident).await });
        (id, task)
    }

    async fn enrich_incident(self, incident: Incident) {
        if let Some(updated) = self.incidents.mark_enriching(&incident.id).await {
            self.broadcaster.publish(LiveUpdate::IncidentUpdated(updated));
        }

        let classification = Classification {
            severity: incident.severity,
            category: incident.category,
        };
        let context = EnrichmentContext::from_incident(&incident);
        let analysis = self.enricher.enrich(&context, classification).await;
        self.record_analysis_source(
            &incident.id,
            incident.category.as_str(),
            analysis.source,
            analysis.fallback_reason.as_deref(),
        )
        .await;

        let Some(mut latest) = self
            .incidents
            .complete_enrichment(&incident.id, analysis.summary())
            .await
        else {
            debug!(incident_id = %incident.id, "Incident evicted before enrichment completed");
            return;
        };

        if self.settings.auto_heal {
            if let Ok(healed) = self.resolve_incident(&incident.id).await {
                latest = healed;
            }
        }
        self.broadcaster
            .publish(LiveUpdate::IncidentUpdated(latest.clone()));

        if self.notifier.notify_incident(&latest).await {
            self.health.set_healthy(components::NOTIFIER).await;
            if let Some(notified) = self.incidents.mark_notified(&incident.id).await {
                self.broadcaster.publish(LiveUpdate::IncidentUpdated(notified));
            }
        } else if self.notifier.is_enabled() {
            self.health
                .set_degraded(components::NOTIFIER, "notification delivery failed")
                .await;
        }
    }

    async fn raise_alert(
        &self,
        snapshot: &WorkloadSnapshot,
        now: DateTime<Utc>,
    ) -> (String, JoinHandle<()>) {
        let usage = self.usage.get(&snapshot.pod.key()).await;
        let history = self
            .incidents
            .history_for(&snapshot.pod, self.classifier.window_start(now))
            .await;
        let classification =
            self.classifier
                .classify(&Trigger::Phase { snapshot, usage }, &history, now);

        let alert = AlertRecord::from_phase(snapshot, classification, now);
        let id = alert.id.clone();
        self.alerts.insert(alert.clone()).await;

        self.metrics.alert_created(&alert);
        self.logger.log_alert_created(&alert);
        self.broadcaster.publish(LiveUpdate::AlertCreated(alert.clone()));

        let context = EnrichmentContext::from_alert(
            &alert,
            snapshot.phase_reason.as_deref(),
            snapshot.max_restart_count(),
        );
        let pipeline = self.clone();
        let task = tokio::spawn(async move { pipeline.enrich_alert(alert, context).await });
        (id, task)
    }

    async fn enrich_alert(self, alert: AlertRecord, context: EnrichmentContext) {
        let classification = Classification {
            severity: alert.severity,
            category: alert.category,
        };
        let analysis = self.enricher.enrich(&context, classification).await;
        self.record_analysis_source(
            &alert.id,
            alert.category.as_str(),
            analysis.source,
            analysis.fallback_reason.as_deref(),
        )
        .await;

        let Some(latest) = self.alerts.set_summary(&alert.id, analysis.summary()).await else {
            debug!(alert_id = %alert.id, "Alert evicted before enrichment completed");
            return;
        };
        self.broadcaster.publish(LiveUpdate::AlertUpdated(latest.clone()));

        if self.notifier.notify_alert(&latest).await {
            self.health.set_healthy(components::NOTIFIER).await;
        } else if self.notifier.is_enabled() {
            self.health
                .set_degraded(components::NOTIFIER, "notification delivery failed")
                .await;
        }
    }

    async fn record_analysis_source(
        &self,
        record_id: &str,
        category: &str,
        source: AnalysisSource,
        fallback_reason: Option<&str>,
    ) {
        self.metrics.inc_enrichment(source.as_str());
        match (source, fallback_reason) {
            (AnalysisSource::Generated, _) => {
                self.health.set_healthy(components::ENRICHER).await;
            }
            (AnalysisSource::Fallback, reason) => {
                let reason = reason.unwrap_or("unknown");
                self.logger
                    .log_enrichment_fallback(record_id, category, reason);
                if self.enricher.is_configured() {
                    self.health
                        .set_degraded(components::ENRICHER, reason.to_string())
                        .await;
                }
            }
        }
    }

    async fn resolve_alerts(&self, snapshot: &WorkloadSnapshot) {
        for alert in self.alerts.resolve_for_pod(&snapshot.pod).await {
            self.metrics.alert_resolved();
            self.logger.log_alert_resolved(&alert);
            self.broadcaster.publish(LiveUpdate::AlertUpdated(alert));
        }
    }

    /// Heal an incident now
    pub async fn resolve_incident(&self, id: &str) -> Result<Incident, QueryError> {
        self.resolve_incident_at(id, Utc::now()).await
    }

    /// Heal an incident at `now`; the only path that marks incidents healed.
    ///
    /// Resolution metrics are recorded exactly once per incident.
    pub async fn resolve_incident_at(
        &self,
        id: &str,
        now: DateTime<Utc>,
    ) -> Result<Incident, QueryError> {
        let incident = self
            .incidents
            .resolve_at(id, now)
            .await
            .ok_or_else(|| QueryError::not_found("incident", id))?;

        if let Some(secs) = incident.time_to_recovery_secs() {
            self.metrics.incident_resolved(incident.severity, secs);
        }
        self.logger.log_incident_resolved(&incident);
        self.broadcaster
            .publish(LiveUpdate::IncidentUpdated(incident.clone()));
        Ok(incident)
    }

    pub async fn acknowledge_alert(&self, id: &str) -> Result<AlertRecord, QueryError> {
        let alert = self
            .alerts
            .acknowledge(id)
            .await
            .ok_or_else(|| QueryError::not_found("alert", id))?;
        self.broadcaster.publish(LiveUpdate::AlertUpdated(alert.clone()));
        Ok(alert)
    }
}

/// Builder for [`IncidentPipeline`]
pub struct IncidentPipelineBuilder {
    tracker: Option<Arc<RestartTracker>>,
    classifier: Option<Classifier>,
    enricher: Option<RootCauseEnricher>,
    notifier: Option<Notifier>,
    incidents: Option<IncidentStore>,
    alerts: Option<AlertStore>,
    usage: Option<UsageCache>,
    broadcaster: Option<Broadcaster>,
    health: Option<HealthRegistry>,
    metrics: Option<ControllerMetrics>,
    logger: Option<StructuredLogger>,
    settings: PipelineSettings,
}

impl IncidentPipelineBuilder {
    pub fn new() -> Self {
        Self {
            tracker: None,
            classifier: None,
            enricher: None,
            notifier: None,
            incidents: None,
            alerts: None,
            usage: None,
            broadcaster: None,
            health: None,
            metrics: None,
            logger: None,
            settings: PipelineSettings::default(),
        }
    }

    pub fn tracker(mut self, tracker: Arc<RestartTracker>) -> Self {
        self.tracker = Some(tracker);
        self
    }

    pub fn classifier(mut self, classifier: Classifier) -> Self {
        self.classifier = Some(classifier);
        self
    }

    pub fn enricher(mut self, enricher: RootCauseEnricher) -> Self {
        self.enricher = Some(enricher);
        self
    }

    pub fn notifier(mut self, notifier: Notifier) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn incidents(mut self, store: IncidentStore) -> Self {
        self.incidents = Some(store);
        self
    }

    pub fn alerts(mut self, store: AlertStore) -> Self {
        self.alerts = Some(store);
        self
    }

    pub fn usage(mut self, cache: UsageCache) -> Self {
        self.usage = Some(cache);
        self
    }

    pub fn broadcaster(mut self, broadcaster: Broadcaster) -> Self {
        self.broadcaster = Some(broadcaster);
        self
    }

    pub fn health(mut self, health: HealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    pub fn metrics(mut self, metrics: ControllerMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn settings(mut self, settings: PipelineSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Build the pipeline; the stores are required, everything else has defaults
    pub fn build(self) -> Result<IncidentPipeline> {
        let incidents = self
            .incidents
            .ok_or_else(|| anyhow::anyhow!("Incident store is required"))?;
        let alerts = self
            .alerts
            .ok_or_else(|| anyhow::anyhow!("Alert store is required"))?;

        Ok(IncidentPipeline {
            tracker: self.tracker.unwrap_or_default(),
            classifier: Arc::new(self.classifier.unwrap_or_default()),
            enricher: Arc::new(self.enricher.unwrap_or_default()),
            notifier: Arc::new(self.notifier.unwrap_or_else(Notifier::disabled)),
            incidents,
            alerts,
            usage: self.usage.unwrap_or_default(),
            broadcaster: self.broadcaster.unwrap_or_default(),
            health: self.health.unwrap_or_default(),
            metrics: self.metrics.unwrap_or_default(),
            logger: self.logger.unwrap_or_default(),
            settings: self.settings,
        })
    }
}

impl Default for IncidentPipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        AlertStatus, Category, ContainerSnapshot, ContainerTermination, IncidentStatus,
        PodIdentity, PodUsage, Severity,
    };
    use chrono::{Duration, TimeZone};
    use prometheus::Registry;

    fn snapshot(phase: WorkloadPhase, restart_count: u32) -> WorkloadSnapshot {
        WorkloadSnapshot {
            pod: PodIdentity::new("orders", "checkout-7f8"),
            uid: Some("uid-1".to_string()),
            phase,
            phase_reason: None,
            unschedulable: false,
            node_name: Some("node-a".to_string()),
            containers: vec![ContainerSnapshot {
                name: "api".to_string(),
                restart_count,
                last_state: Some(ContainerTermination {
                    reason: Some("OOMKilled".to_string()),
                    message: None,
                    exit_code: Some(137),
                }),
            }],
        }
    }

    fn pipeline(settings: PipelineSettings) -> (IncidentPipeline, ControllerMetrics) {
        let metrics = ControllerMetrics::with_registry(&Registry::new()).unwrap();
        let pipeline = IncidentPipeline::builder()
            .incidents(IncidentStore::new(50))
            .alerts(AlertStore::new(50))
            .metrics(metrics.clone())
            .settings(settings)
            .build()
            .unwrap();
        (pipeline, metrics)
    }

    fn manual() -> PipelineSettings {
        PipelineSettings {
            auto_heal: false,
            evict_on_delete: false,
        }
    }

    #[tokio::test]
    async fn test_restart_sequence_creates_two_incidents() {
        let (pipeline, _) = pipeline(manual());
        let mut incident_ids = Vec::new();
        let mut restarts = 0;

        for count in [0, 1, 1, 3] {
            let outcome = pipeline
                .handle(WorkloadEvent::Modified(snapshot(WorkloadPhase::Running, count)))
                .await;
            restarts += outcome.restart_events.len();
            incident_ids.extend(outcome.incident_ids.iter().cloned());
            outcome.wait().await;
        }

        assert_eq!(restarts, 2);
        assert_eq!(incident_ids.len(), 2);
        assert_eq!(pipeline.incidents().len().await, 2);

        let second = pipeline.incidents().get(&incident_ids[1]).await.unwrap();
        assert_eq!(second.restart_count, 3);
        assert_eq!(second.category, Category::OutOfMemory);
        assert_eq!(second.container_name.as_deref(), Some("api"));
    }

    #[tokio::test]
    async fn test_incident_broadcast_before_enrichment() {
        let (pipeline, _) = pipeline(PipelineSettings::default());
        let mut rx = pipeline.broadcaster().subscribe();

        pipeline
            .handle(WorkloadEvent::Added(snapshot(WorkloadPhase::Running, 0)))
            .await
            .wait()
            .await;
        let outcome = pipeline
            .handle(WorkloadEvent::Modified(snapshot(WorkloadPhase::Running, 1)))
            .await;
        outcome.wait().await;

        match rx.recv().await.unwrap() {
            LiveUpdate::IncidentCreated(incident) => {
                assert_eq!(incident.status, IncidentStatus::Detected);
                assert!(incident.root_cause_summary.is_none());
            }
            other => panic!("unexpected update: {:?}", other),
        }
        match rx.recv().await.unwrap() {
            LiveUpdate::IncidentUpdated(incident) => {
                assert_eq!(incident.status, IncidentStatus::Enriching)
            }
            other => panic!("unexpected update: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_auto_heal_attaches_template_and_heals() {
        let (pipeline, metrics) = pipeline(PipelineSettings::default());

        pipeline
            .handle(WorkloadEvent::Added(snapshot(WorkloadPhase::Running, 0)))
            .await;
        let outcome = pipeline
            .handle(WorkloadEvent::Modified(snapshot(WorkloadPhase::Running, 2)))
            .await;
        let id = outcome.incident_ids[0].clone();
        outcome.wait().await;

        let incident = pipeline.incidents().get(&id).await.unwrap();
        assert_eq!(incident.status, IncidentStatus::Healed);
        assert!(incident.healed_at.is_some());
        assert!(incident
            .root_cause_summary
            .unwrap()
            .contains("OOMKilled"));
        assert!(!incident.notification_sent);
        assert_eq!(metrics.mttr_summary(incident.severity).0, 1);

        let again = pipeline.resolve_incident(&id).await;
        assert_eq!(again, Err(QueryError::not_found("incident", &id)));
    }

    #[tokio::test]
    async fn test_mttr_recorded_once_at_resolution() {
        let (pipeline, metrics) = pipeline(manual());
        let detected = Utc.with_ymd_and_hms(2024, 7, 1, 9, 0, 0).unwrap();

        pipeline
            .handle_at(WorkloadEvent::Added(snapshot(WorkloadPhase::Running, 0)), detected)
            .await;
        let outcome = pipeline
            .handle_at(
                WorkloadEvent::Modified(snapshot(WorkloadPhase::Running, 1)),
                detected,
            )
            .await;
        let id = outcome.incident_ids[0].clone();
        outcome.wait().await;

        let incident = pipeline
            .resolve_incident_at(&id, detected + Duration::seconds(600))
            .await
            .unwrap();
        assert!(pipeline
            .resolve_incident_at(&id, detected + Duration::seconds(900))
            .await
            .is_err());

        assert_eq!(metrics.mttr_summary(incident.severity), (1, 600.0));
    }

    #[tokio::test]
    async fn test_phase_failure_raises_and_recovery_resolves_alert() {
        let (pipeline, _) = pipeline(manual());

        pipeline
            .handle(WorkloadEvent::Added(snapshot(WorkloadPhase::Running, 0)))
            .await;
        let outcome = pipeline
            .handle(WorkloadEvent::Modified(snapshot(WorkloadPhase::Failed, 0)))
            .await;
        let alert_id = outcome.alert_id.clone().unwrap();
        outcome.wait().await;

        let alert = pipeline.alerts().get(&alert_id).await.unwrap();
        assert_eq!(alert.status, AlertStatus::Firing);
        assert_eq!(alert.category, Category::PodFailure);
        assert!(alert.summary.is_some());

        let repeat = pipeline
            .handle(WorkloadEvent::Modified(snapshot(WorkloadPhase::Failed, 0)))
            .await;
        assert!(repeat.alert_id.is_none());

        pipeline
            .handle(WorkloadEvent::Modified(snapshot(WorkloadPhase::Running, 0)))
            .await;
        let alert = pipeline.alerts().get(&alert_id).await.unwrap();
        assert_eq!(alert.status, AlertStatus::Resolved);

        let acked = pipeline.acknowledge_alert(&alert_id).await.unwrap();
        assert!(acked.acknowledged);
        assert!(pipeline.acknowledge_alert(&alert_id).await.is_err());
    }

    #[tokio::test]
    async fn test_pending_alerts_only_when_unschedulable() {
        let (pipeline, _) = pipeline(manual());

        let outcome = pipeline
            .handle(WorkloadEvent::Added(snapshot(WorkloadPhase::Pending, 0)))
            .await;
        assert!(outcome.alert_id.is_none());

        let mut other = snapshot(WorkloadPhase::Pending, 0);
        other.pod = PodIdentity::new("orders", "checkout-9a1");
        other.unschedulable = true;
        let outcome = pipeline.handle(WorkloadEvent::Added(other)).await;
        let alert_id = outcome.alert_id.clone().unwrap();
        outcome.wait().await;

        let alert = pipeline.alerts().get(&alert_id).await.unwrap();
        assert_eq!(alert.category, Category::SchedulingIssue);
    }

    #[tokio::test]
    async fn test_usage_drives_phase_category() {
        let usage = UsageCache::default();
        usage
            .replace(
                [(
                    "orders/checkout-7f8".to_string(),
                    PodUsage {
                        cpu_millicores: 100,
                        memory_mib: 1024,
                    },
                )]
                .into_iter()
                .collect(),
            )
            .await;

        let pipeline = IncidentPipeline::builder()
            .incidents(IncidentStore::new(10))
            .alerts(AlertStore::new(10))
            .usage(usage)
            .metrics(ControllerMetrics::with_registry(&Registry::new()).unwrap())
            .settings(manual())
            .build()
            .unwrap();

        let outcome = pipeline
            .handle(WorkloadEvent::Added(snapshot(WorkloadPhase::Failed, 0)))
            .await;
        let alert = pipeline
            .alerts()
            .get(outcome.alert_id.as_deref().unwrap())
            .await
            .unwrap();
        assert_eq!(alert.category, Category::OutOfMemory);
    }

    #[tokio::test]
    async fn test_history_escalates_severity() {
        let (pipeline, _) = pipeline(manual());
        let now = Utc::now();

        pipeline
            .handle_at(WorkloadEvent::Added(snapshot(WorkloadPhase::Running, 0)), now)
            .await;
        let mut last = None;
        for count in 1..=6u32 {
            let outcome = pipeline
                .handle_at(
                    WorkloadEvent::Modified(snapshot(WorkloadPhase::Running, count)),
                    now + Duration::seconds(i64::from(count)),
                )
                .await;
            last = outcome.incident_ids.last().cloned();
            outcome.wait().await;
        }

        let sixth = pipeline.incidents().get(&last.unwrap()).await.unwrap();
        assert_eq!(sixth.severity, Severity::Critical);
    }

    #[tokio::test]
    async fn test_deleted_pod_forgotten_only_when_enabled() {
        let (keep, _) = pipeline(manual());
        keep.handle(WorkloadEvent::Added(snapshot(WorkloadPhase::Running, 2)))
            .await;
        keep.handle(WorkloadEvent::Deleted(snapshot(WorkloadPhase::Running, 2)))
            .await;
        assert_eq!(keep.tracker().tracked_containers(), 1);

        let (evict, _) = pipeline(PipelineSettings {
            auto_heal: false,
            evict_on_delete: true,
        });
        evict
            .handle(WorkloadEvent::Added(snapshot(WorkloadPhase::Running, 2)))
            .await;
        evict
            .handle(WorkloadEvent::Deleted(snapshot(WorkloadPhase::Running, 2)))
            .await;
        assert_eq!(evict.tracker().tracked_containers(), 0);
    }

    #[test]
    fn test_builder_requires_stores() {
        assert!(IncidentPipeline::builder().build().is_err());
        assert!(IncidentPipeline::builder()
            .incidents(IncidentStore::new(1))
            .build()
            .is_err());
    }

    #[tokio::test]
    async fn test_wait_survives_failed_task() {
        let finished = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let outcome = ProcessOutcome {
            tasks: vec![
                tokio::spawn(async { panic!("delivery channel exploded") }),
                {
                    let finished = Arc::clone(&finished);
                    tokio::spawn(async move {
                        finished.store(true, std::sync::atomic::Ordering::SeqCst);
                    })
                },
            ],
            ..Default::default()
        };

        tokio::spawn(outcome.wait()).await.unwrap();
        assert!(finished.load(std::sync::atomic::Ordering::SeqCst));
    }
}
