//! Bounded in-memory record stores
//!
//! Records are kept newest-first and capped; inserting beyond the cap
//! drops the single oldest record. Every mutation runs inside one
//! write-lock critical section so concurrent readers never observe a
//! half-applied change, and two callers resolving the same record are
//! serialized (only the first one wins).

use crate::models::{AlertRecord, AlertStatus, Incident, IncidentStatus, PodIdentity};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// Default capacity of the incident store
pub const DEFAULT_INCIDENT_CAPACITY: usize = 500;

/// Default capacity of the alert store
pub const DEFAULT_ALERT_CAPACITY: usize = 200;

/// A record that can live in a [`BoundedStore`]
pub trait Record {
    fn id(&self) -> &str;

    /// Timestamp used for age-based eviction
    fn created_at(&self) -> DateTime<Utc>;
}

impl Record for Incident {
    fn id(&self) -> &str {
        &self.id
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.detected_at
    }
}

impl Record for AlertRecord {
    fn id(&self) -> &str {
        &self.id
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// Newest-first ring of records with a fixed capacity
#[derive(Debug)]
pub struct BoundedStore<T> {
    records: VecDeque<T>,
    capacity: usize,
}

impl<T: Record> BoundedStore<T> {
    /// Create a store; a zero capacity is raised to one
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            records: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
        }
    }

    /// Insert at the front, returning the evicted oldest record if the cap was hit
    pub fn insert(&mut self, record: T) -> Option<T> {
        self.records.push_front(record);
        if self.records.len() > self.capacity {
            self.records.pop_back()
        } else {
            None
        }
    }

    pub fn get(&self, id: &str) -> Option<&T> {
        self.records.iter().find(|r| r.id() == id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut T> {
        self.records.iter_mut().find(|r| r.id() == id)
    }

    /// Newest-first iteration
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.records.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.records.iter_mut()
    }

    /// Remove records created before `cutoff`, returning how many were removed
    pub fn evict_before(&mut self, cutoff: DateTime<Utc>) -> usize {
        let before = self.records.len();
        self.records.retain(|r| r.created_at() >= cutoff);
        before - self.records.len()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Occurrence count of one pod
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PodCount {
    pub pod: String,
    pub count: usize,
}

/// Aggregates over the stored incidents
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IncidentStats {
    pub total: usize,
    pub by_namespace: BTreeMap<String, usize>,
    pub by_status: BTreeMap<String, usize>,
    pub by_severity: BTreeMap<String, usize>,
    pub by_category: BTreeMap<String, usize>,
    /// Pods with the most incidents, most frequent first
    pub top_pods: Vec<PodCount>,
    /// Mean time to recovery over healed incidents
    pub mttr_seconds: Option<f64>,
}

/// Aggregates over the stored alerts
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertStats {
    pub total: usize,
    pub firing: usize,
    pub resolved: usize,
    pub acknowledged: usize,
    pub by_namespace: BTreeMap<String, usize>,
    pub by_severity: BTreeMap<String, usize>,
}

fn take_limit<'a, T: Clone + 'a>(iter: impl Iterator<Item = &'a T>, limit: Option<usize>) -> Vec<T> {
    match limit {
        Some(limit) => iter.take(limit).cloned().collect(),
        None => iter.cloned().collect(),
    }
}

/// Shared store of restart-driven incidents
#[derive(Clone)]
pub struct IncidentStore {
    inner: Arc<RwLock<BoundedStore<Incident>>>,
}

impl Default for IncidentStore {
    fn default() -> Self {
        Self::new(DEFAULT_INCIDENT_CAPACITY)
    }
}

impl IncidentStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(RwLock::new(BoundedStore::new(capacity))),
        }
    }

    /// Insert a new incident, returning the evicted oldest one
    pub async fn insert(&self, incident: Incident) -> Option<Incident> {
        let evicted = self.inner.write().await.insert(incident);
        if let Some(old) = &evicted {
            debug!(incident_id = %old.id, "Evicted oldest incident");
        }
        evicted
    }

    pub async fn get(&self, id: &str) -> Option<Incident> {
        self.inner.read().await.get(id).cloned()
    }

    /// Newest-first list, optionally truncated
    pub async fn list(&self, limit: Option<usize>) -> Vec<Incident> {
        let store = self.inner.read().await;
        take_limit(store.iter(), limit)
    }

    /// Mark an incident healed now
    pub async fn resolve(&self, id: &str) -> Option<Incident> {
        self.resolve_at(id, Utc::now()).await
    }

    /// Mark an incident healed at `now`.
    ///
    /// Returns `None` when the incident is absent or already healed;
    /// `healed_at` is written at most once.
    pub async fn resolve_at(&self, id: &str, now: DateTime<Utc>) -> Option<Incident> {
        let mut store = self.inner.write().await;
        let incident = store.get_mut(id)?;
        if incident.healed_at.is_some() {
            return None;
        }
        incident.healed_at = Some(now.max(incident.detected_at));
        incident.status = IncidentStatus::Healed;
        Some(incident.clone())
    }

    /// Move a detected incident to enriching
    pub async fn mark_enriching(&self, id: &str) -> Option<Incident> {
        let mut store = self.inner.write().await;
        let incident = store.get_mut(id)?;
        if incident.status != IncidentStatus::Detected {
            return None;
        }
        incident.status = IncidentStatus::Enriching;
        Some(incident.clone())
    }

    /// Attach the root-cause summary
    pub async fn complete_enrichment(&self, id: &str, summary: String) -> Option<Incident> {
        let mut store = self.inner.write().await;
        let incident = store.get_mut(id)?;
        incident.root_cause_summary = Some(summary);
        Some(incident.clone())
    }

    pub async fn mark_notified(&self, id: &str) -> Option<Incident> {
        let mut store = self.inner.write().await;
        let incident = store.get_mut(id)?;
        incident.notification_sent = true;
        Some(incident.clone())
    }

    /// Detection times of a pod's incidents at or after `since`
    pub async fn history_for(&self, pod: &PodIdentity, since: DateTime<Utc>) -> Vec<DateTime<Utc>> {
        self.inner
            .read()
            .await
            .iter()
            .filter(|i| &i.pod == pod && i.detected_at >= since)
            .map(|i| i.detected_at)
            .collect()
    }

    pub async fn evict_older_than(&self, age: Duration) -> usize {
        self.evict_older_than_at(age, Utc::now()).await
    }

    /// Remove incidents detected more than `age` before `now`
    pub async fn evict_older_than_at(&self, age: Duration, now: DateTime<Utc>) -> usize {
        // A cutoff before the earliest representable time matches nothing
        let Some(cutoff) = now.checked_sub_signed(age) else {
            return 0;
        };
        let removed = self.inner.write().await.evict_before(cutoff);
        if removed > 0 {
            debug!(removed = removed, "Evicted aged incidents");
        }
        removed
    }

    pub async fn stats(&self, top_n: usize) -> IncidentStats {
        let store = self.inner.read().await;

        let mut by_namespace = BTreeMap::new();
        let mut by_status = BTreeMap::new();
        let mut by_severity = BTreeMap::new();
        let mut by_category = BTreeMap::new();
        let mut per_pod: HashMap<String, usize> = HashMap::new();
        let mut recovery_total = 0.0;
        let mut healed = 0usize;

        for incident in store.iter() {
            *by_namespace.entry(incident.pod.namespace.clone()).or_insert(0) += 1;
            *by_status.entry(incident.status.to_string()).or_insert(0) += 1;
            *by_severity.entry(incident.severity.to_string()).or_insert(0) += 1;
            *by_category.entry(incident.category.to_string()).or_insert(0) += 1;
            *per_pod.entry(incident.pod.key()).or_insert(0) += 1;

            if let Some(secs) = incident.time_to_recovery_secs() {
                recovery_total += secs;
                healed += 1;
            }
        }

        let mut top_pods: Vec<PodCount> = per_pod
            .into_iter()
            .map(|(pod, count)| PodCount { pod, count })
            .collect();
        top_pods.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.pod.cmp(&b.pod)));
        top_pods.truncate(top_n);

        IncidentStats {
            total: store.len(),
            by_namespace,
            by_status,
            by_severity,
            by_category,
            top_pods,
            mttr_seconds: (healed > 0).then(|| recovery_total / healed as f64),
        }
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn capacity(&self) -> usize {
        self.inner.read().await.capacity()
    }
}

/// Shared store of phase-driven alerts
#[derive(Clone)]
pub struct AlertStore {
    inner: Arc<RwLock<BoundedStore<AlertRecord>>>,
}

impl Default for AlertStore {
    fn default() -> Self {
        Self::new(DEFAULT_ALERT_CAPACITY)
    }
}

impl AlertStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(RwLock::new(BoundedStore::new(capacity))),
        }
    }

    pub async fn insert(&self, alert: AlertRecord) -> Option<AlertRecord> {
        let evicted = self.inner.write().await.insert(alert);
        if let Some(old) = &evicted {
            debug!(alert_id = %old.id, "Evicted oldest alert");
        }
        evicted
    }

    pub async fn get(&self, id: &str) -> Option<AlertRecord> {
        self.inner.read().await.get(id).cloned()
    }

    pub async fn list(&self, limit: Option<usize>) -> Vec<AlertRecord> {
        let store = self.inner.read().await;
        take_limit(store.iter(), limit)
    }

    /// Acknowledge an alert; `None` if absent or already acknowledged
    pub async fn acknowledge(&self, id: &str) -> Option<AlertRecord> {
        let mut store = self.inner.write().await;
        let alert = store.get_mut(id)?;
        if alert.acknowledged {
            return None;
        }
        alert.acknowledged = true;
        Some(alert.clone())
    }

    /// Resolve every firing alert of a pod, returning the resolved records
    pub async fn resolve_for_pod(&self, pod: &PodIdentity) -> Vec<AlertRecord> {
        let mut store = self.inner.write().await;
        store
            .iter_mut()
            .filter(|a| &a.pod == pod && a.status == AlertStatus::Firing)
            .map(|alert| {
                alert.status = AlertStatus::Resolved;
                alert.clone()
            })
            .collect()
    }

    pub async fn set_summary(&self, id: &str, summary: String) -> Option<AlertRecord> {
        let mut store = self.inner.write().await;
        let alert = store.get_mut(id)?;
        alert.summary = Some(summary);
        Some(alert.clone())
    }

    pub async fn evict_older_than(&self, age: Duration) -> usize {
        self.evict_older_than_at(age, Utc::now()).await
    }

    pub async fn evict_older_than_at(&self, age: Duration, now: DateTime<Utc>) -> usize {
        match now.checked_sub_signed(age) {
            Some(cutoff) => self.inner.write().await.evict_before(cutoff),
            None => 0,
        }
    }

    pub async fn stats(&self) -> AlertStats {
        let store = self.inner.read().await;
        let mut stats = AlertStats {
            total: store.len(),
            firing: 0,
            resolved: 0,
            acknowledged: 0,
            by_namespace: BTreeMap::new(),
            by_severity: BTreeMap::new(),
        };

        for alert in store.iter() {
            match alert.status {
                AlertStatus::Firing => stats.firing += 1,
                AlertStatus::Resolved => stats.resolved += 1,
            }
            if alert.acknowledged {
                stats.acknowledged += 1;
            }
            *stats
                .by_namespace
                .entry(alert.pod.namespace.clone())
                .or_insert(0) += 1;
            *stats
                .by_severity
                .entry(alert.severity.to_string())
                .or_insert(0) += 1;
        }
        stats
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn capacity(&self) -> usize {
        self.inner.read().await.capacity()
    }
}
