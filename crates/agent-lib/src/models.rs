//! Core data models for the incident controller

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Process-wide sequence mixed into record ids
static RECORD_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Identity of a pod within the cluster
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PodIdentity {
    pub namespace: String,
    pub name: String,
}

impl PodIdentity {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Stable key in `namespace/name` form
    pub fn key(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }

    /// Key of a single container of this pod
    pub fn container_key(&self, container: &str) -> String {
        format!("{}/{}/{}", self.namespace, self.name, container)
    }
}

impl std::fmt::Display for PodIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Lifecycle phase reported for a pod
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WorkloadPhase {
    Pending,
    Running,
    Succeeded,
    Failed,
    Unknown,
}

impl WorkloadPhase {
    /// Parse the phase string reported by the API server
    pub fn parse(phase: &str) -> Self {
        match phase {
            "Pending" => WorkloadPhase::Pending,
            "Running" => WorkloadPhase::Running,
            "Succeeded" => WorkloadPhase::Succeeded,
            "Failed" => WorkloadPhase::Failed,
            _ => WorkloadPhase::Unknown,
        }
    }

    /// Phases a pod reaches when it is working as intended
    pub fn is_healthy(&self) -> bool {
        matches!(self, WorkloadPhase::Running | WorkloadPhase::Succeeded)
    }
}

impl std::fmt::Display for WorkloadPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkloadPhase::Pending => write!(f, "Pending"),
            WorkloadPhase::Running => write!(f, "Running"),
            WorkloadPhase::Succeeded => write!(f, "Succeeded"),
            WorkloadPhase::Failed => write!(f, "Failed"),
            WorkloadPhase::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Last terminal or waiting state of a container
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerTermination {
    pub reason: Option<String>,
    pub message: Option<String>,
    pub exit_code: Option<i32>,
}

/// Per-container status carried by a watch delivery
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerSnapshot {
    pub name: String,
    pub restart_count: u32,
    pub last_state: Option<ContainerTermination>,
}

/// Observed state of a pod at delivery time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadSnapshot {
    pub pod: PodIdentity,
    pub uid: Option<String>,
    pub phase: WorkloadPhase,
    pub phase_reason: Option<String>,
    /// Scheduler reported the pod as unschedulable
    pub unschedulable: bool,
    pub node_name: Option<String>,
    pub containers: Vec<ContainerSnapshot>,
}

impl WorkloadSnapshot {
    /// Highest restart count among the pod's containers
    pub fn max_restart_count(&self) -> u32 {
        self.containers
            .iter()
            .map(|c| c.restart_count)
            .max()
            .unwrap_or(0)
    }
}

/// Watch delivery for a single pod
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkloadEvent {
    Added(WorkloadSnapshot),
    Modified(WorkloadSnapshot),
    Deleted(WorkloadSnapshot),
}

impl WorkloadEvent {
    pub fn snapshot(&self) -> &WorkloadSnapshot {
        match self {
            WorkloadEvent::Added(s) | WorkloadEvent::Modified(s) | WorkloadEvent::Deleted(s) => s,
        }
    }

    /// Label used for logging and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            WorkloadEvent::Added(_) => "added",
            WorkloadEvent::Modified(_) => "modified",
            WorkloadEvent::Deleted(_) => "deleted",
        }
    }
}

/// A container restart detected by the tracker (never stored)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestartEvent {
    pub pod: PodIdentity,
    pub container_name: String,
    /// Absolute restart count as reported, not a delta
    pub restart_count: u32,
    pub reason: String,
    pub message: String,
    pub exit_code: Option<i32>,
    pub observed_at: DateTime<Utc>,
}

/// Point-in-time resource usage of a pod
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PodUsage {
    pub cpu_millicores: u64,
    pub memory_mib: u64,
}

impl PodUsage {
    /// CPU usage as a percentage of one core
    pub fn cpu_percent(&self) -> f64 {
        self.cpu_millicores as f64 / 10.0
    }
}

/// Cluster-wide usage published after every successful poll
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageSnapshot {
    pub collected_at: DateTime<Utc>,
    /// Usage keyed by `namespace/name`
    pub pods: BTreeMap<String, PodUsage>,
}

/// Escalation tier of a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Closed incident taxonomy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Category {
    CrashLoopBackOff,
    OutOfMemory,
    #[serde(rename = "HighCPUUsage")]
    HighCpuUsage,
    PodFailure,
    NodeIssue,
    SchedulingIssue,
    Unknown,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::CrashLoopBackOff => "CrashLoopBackOff",
            Category::OutOfMemory => "OutOfMemory",
            Category::HighCpuUsage => "HighCPUUsage",
            Category::PodFailure => "PodFailure",
            Category::NodeIssue => "NodeIssue",
            Category::SchedulingIssue => "SchedulingIssue",
            Category::Unknown => "Unknown",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of classifying an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub severity: Severity,
    pub category: Category,
}

/// Incident lifecycle; transitions only move forward
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IncidentStatus {
    Detected,
    Enriching,
    Healed,
}

impl std::fmt::Display for IncidentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IncidentStatus::Detected => write!(f, "detected"),
            IncidentStatus::Enriching => write!(f, "enriching"),
            IncidentStatus::Healed => write!(f, "healed"),
        }
    }
}

/// Restart-driven health record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Incident {
    pub id: String,
    pub pod: PodIdentity,
    pub container_name: Option<String>,
    pub restart_count: u32,
    pub reason: String,
    pub category: Category,
    pub severity: Severity,
    pub message: String,
    pub exit_code: Option<i32>,
    pub detected_at: DateTime<Utc>,
    pub healed_at: Option<DateTime<Utc>>,
    pub root_cause_summary: Option<String>,
    pub notification_sent: bool,
    pub status: IncidentStatus,
}

impl Incident {
    /// Build a freshly detected incident from a restart
    pub fn from_restart(event: &RestartEvent, classification: Classification) -> Self {
        Self {
            id: next_record_id("inc", &event.pod, event.observed_at),
            pod: event.pod.clone(),
            container_name: Some(event.container_name.clone()),
            restart_count: event.restart_count,
            reason: event.reason.clone(),
            category: classification.category,
            severity: classification.severity,
            message: event.message.clone(),
            exit_code: event.exit_code,
            detected_at: event.observed_at,
            healed_at: None,
            root_cause_summary: None,
            notification_sent: false,
            status: IncidentStatus::Detected,
        }
    }

    pub fn is_healed(&self) -> bool {
        self.healed_at.is_some()
    }

    /// Time from detection to healing in seconds
    pub fn time_to_recovery_secs(&self) -> Option<f64> {
        self.healed_at
            .map(|healed| (healed - self.detected_at).num_milliseconds() as f64 / 1000.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertStatus {
    Firing,
    Resolved,
}

impl std::fmt::Display for AlertStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlertStatus::Firing => write!(f, "firing"),
            AlertStatus::Resolved => write!(f, "resolved"),
        }
    }
}

/// Phase-driven health record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertRecord {
    pub id: String,
    pub pod: PodIdentity,
    pub status: AlertStatus,
    pub severity: Severity,
    pub category: Category,
    pub phase: WorkloadPhase,
    pub timestamp: DateTime<Utc>,
    pub summary: Option<String>,
    pub acknowledged: bool,
}

impl AlertRecord {
    pub fn from_phase(
        snapshot: &WorkloadSnapshot,
        classification: Classification,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: next_record_id("alr", &snapshot.pod, timestamp),
            pod: snapshot.pod.clone(),
            status: AlertStatus::Firing,
            severity: classification.severity,
            category: classification.category,
            phase: snapshot.phase,
            timestamp,
            summary: None,
            acknowledged: false,
        }
    }
}

/// Build an opaque record id that is unique within the process
fn next_record_id(prefix: &str, pod: &PodIdentity, at: DateTime<Utc>) -> String {
    let seq = RECORD_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    format!(
        "{}-{}-{}-{:x}{:04x}",
        prefix,
        pod.namespace,
        pod.name,
        at.timestamp_millis(),
        seq
    )
}
