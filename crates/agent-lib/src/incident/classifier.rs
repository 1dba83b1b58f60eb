//! Incident classification
//!
//! Maps a restart or a phase transition, together with the recent
//! incident history of the same pod, to a severity and category. The
//! result depends only on its inputs.

use crate::models::{
    Category, Classification, PodIdentity, PodUsage, RestartEvent, Severity, WorkloadPhase,
    WorkloadSnapshot,
};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashSet;

/// Memory above this many MiB classifies a failing pod as out of memory
pub const MEMORY_THRESHOLD_MIB: u64 = 900;

/// CPU above this percentage of one core classifies a failing pod as CPU bound
pub const CPU_THRESHOLD_PERCENT: f64 = 95.0;

const CRITICAL_HISTORY: usize = 5;
const HIGH_HISTORY: usize = 3;
const MEDIUM_HISTORY: usize = 1;
const HIGH_RESTARTS: u32 = 10;
const MEDIUM_RESTARTS: u32 = 5;

/// The event being classified
#[derive(Debug, Clone, Copy)]
pub enum Trigger<'a> {
    Restart(&'a RestartEvent),
    Phase {
        snapshot: &'a WorkloadSnapshot,
        usage: Option<PodUsage>,
    },
}

impl Trigger<'_> {
    fn pod(&self) -> &PodIdentity {
        match self {
            Trigger::Restart(event) => &event.pod,
            Trigger::Phase { snapshot, .. } => &snapshot.pod,
        }
    }

    fn restart_count(&self) -> u32 {
        match self {
            Trigger::Restart(event) => event.restart_count,
            Trigger::Phase { snapshot, .. } => snapshot.max_restart_count(),
        }
    }
}

/// Severity and category rules
#[derive(Debug, Clone)]
pub struct Classifier {
    critical_namespaces: HashSet<String>,
    window: Duration,
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new(["production", "kube-system"], Duration::hours(1))
    }
}

impl Classifier {
    pub fn new<I, S>(critical_namespaces: I, window: Duration) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            critical_namespaces: critical_namespaces.into_iter().map(Into::into).collect(),
            window,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Start of the history window ending at `now`
    pub fn window_start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - self.window
    }

    /// Classify a trigger given the detection times of prior incidents of the same pod
    pub fn classify(
        &self,
        trigger: &Trigger<'_>,
        history: &[DateTime<Utc>],
        now: DateTime<Utc>,
    ) -> Classification {
        let category = match trigger {
            Trigger::Restart(event) => category_for_reason(&event.reason),
            Trigger::Phase { snapshot, usage } => category_for_phase(snapshot.phase, *usage),
        };

        Classification {
            severity: self.severity(trigger.pod(), trigger.restart_count(), history, now),
            category,
        }
    }

    /// First matching rule wins, most severe first
    fn severity(
        &self,
        pod: &PodIdentity,
        restart_count: u32,
        history: &[DateTime<Utc>],
        now: DateTime<Utc>,
    ) -> Severity {
        let start = self.window_start(now);
        let recent = history
            .iter()
            .filter(|t| **t >= start && **t <= now)
            .count();

        if recent >= CRITICAL_HISTORY || self.critical_namespaces.contains(&pod.namespace) {
            Severity::Critical
        } else if recent >= HIGH_HISTORY || restart_count >= HIGH_RESTARTS {
            Severity::High
        } else if recent >= MEDIUM_HISTORY || restart_count >= MEDIUM_RESTARTS {
            Severity::Medium
        } else {
            Severity::Low
        }
    }
}

/// Category of a restart from the container's termination reason
pub fn category_for_reason(reason: &str) -> Category {
    match reason {
        "OOMKilled" => Category::OutOfMemory,
        "Error" | "CrashLoopBackOff" => Category::CrashLoopBackOff,
        "ContainerCannotRun" | "DeadlineExceeded" => Category::PodFailure,
        "Evicted" => Category::NodeIssue,
        _ => Category::Unknown,
    }
}

/// Category of a phase transition, resource pressure first
pub fn category_for_phase(phase: WorkloadPhase, usage: Option<PodUsage>) -> Category {
    if let Some(usage) = usage {
        if usage.memory_mib > MEMORY_THRESHOLD_MIB {
            return Category::OutOfMemory;
        }
        if usage.cpu_percent() > CPU_THRESHOLD_PERCENT {
            return Category::HighCpuUsage;
        }
    }

    match phase {
        WorkloadPhase::Failed => Category::PodFailure,
        WorkloadPhase::Unknown => Category::NodeIssue,
        WorkloadPhase::Pending => Category::SchedulingIssue,
        WorkloadPhase::Running | WorkloadPhase::Succeeded => Category::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn restart(namespace: &str, restart_count: u32, reason: &str) -> RestartEvent {
        RestartEvent {
            pod: PodIdentity::new(namespace, "checkout-7f8"),
            container_name: "api".to_string(),
            restart_count,
            reason: reason.to_string(),
            message: String::new(),
            exit_code: None,
            observed_at: now(),
        }
    }

    fn minutes_ago(minutes: &[i64]) -> Vec<DateTime<Utc>> {
        minutes.iter().map(|m| now() - Duration::minutes(*m)).collect()
    }

    fn classify(event: &RestartEvent, history: &[DateTime<Utc>]) -> Classification {
        Classifier::default().classify(&Trigger::Restart(event), history, now())
    }

    #[test]
    fn test_five_recent_incidents_is_critical_despite_low_restart_count() {
        let event = restart("orders", 1, "Error");
        let history = minutes_ago(&[1, 5, 10, 30, 59]);

        assert_eq!(classify(&event, &history).severity, Severity::Critical);
    }

    #[test]
    fn test_critical_namespace() {
        let event = restart("production", 1, "Error");
        assert_eq!(classify(&event, &[]).severity, Severity::Critical);
    }

    #[test]
    fn test_severity_order() {
        let three = minutes_ago(&[1, 2, 3]);
        assert_eq!(classify(&restart("orders", 1, "Error"), &three).severity, Severity::High);
        assert_eq!(classify(&restart("orders", 10, "Error"), &[]).severity, Severity::High);

        let one = minutes_ago(&[20]);
        assert_eq!(classify(&restart("orders", 1, "Error"), &one).severity, Severity::Medium);
        assert_eq!(classify(&restart("orders", 5, "Error"), &[]).severity, Severity::Medium);

        assert_eq!(classify(&restart("orders", 4, "Error"), &[]).severity, Severity::Low);
    }

    #[test]
    fn test_window_boundary_is_inclusive() {
        let event = restart("orders", 1, "Error");

        let at_edge = vec![now() - Duration::hours(1)];
        assert_eq!(classify(&event, &at_edge).severity, Severity::Medium);

        let outside = vec![now() - Duration::hours(1) - Duration::seconds(1)];
        assert_eq!(classify(&event, &outside).severity, Severity::Low);

        let future = vec![now() + Duration::seconds(1)];
        assert_eq!(classify(&event, &future).severity, Severity::Low);
    }

    #[test]
    fn test_configurable_window_and_namespaces() {
        let classifier = Classifier::new(["payments"], Duration::minutes(10));
        let event = restart("orders", 1, "Error");
        let history = minutes_ago(&[1, 2, 3, 4, 20]);

        let result = classifier.classify(&Trigger::Restart(&event), &history, now());
        assert_eq!(result.severity, Severity::High);

        let critical = restart("payments", 1, "Error");
        let result = classifier.classify(&Trigger::Restart(&critical), &[], now());
        assert_eq!(result.severity, Severity::Critical);
    }

    #[test]
    fn test_restart_reason_categories() {
        assert_eq!(category_for_reason("OOMKilled"), Category::OutOfMemory);
        assert_eq!(category_for_reason("Error"), Category::CrashLoopBackOff);
        assert_eq!(category_for_reason("CrashLoopBackOff"), Category::CrashLoopBackOff);
        assert_eq!(category_for_reason("ContainerCannotRun"), Category::PodFailure);
        assert_eq!(category_for_reason("DeadlineExceeded"), Category::PodFailure);
        assert_eq!(category_for_reason("Evicted"), Category::NodeIssue);
        assert_eq!(category_for_reason("Completed"), Category::Unknown);
    }

    #[test]
    fn test_phase_categories() {
        let hot_memory = PodUsage {
            cpu_millicores: 990,
            memory_mib: 901,
        };
        let hot_cpu = PodUsage {
            cpu_millicores: 960,
            memory_mib: 900,
        };
        let calm = PodUsage {
            cpu_millicores: 950,
            memory_mib: 100,
        };

        assert_eq!(
            category_for_phase(WorkloadPhase::Failed, Some(hot_memory)),
            Category::OutOfMemory
        );
        assert_eq!(
            category_for_phase(WorkloadPhase::Failed, Some(hot_cpu)),
            Category::HighCpuUsage
        );
        assert_eq!(
            category_for_phase(WorkloadPhase::Failed, Some(calm)),
            Category::PodFailure
        );
        assert_eq!(category_for_phase(WorkloadPhase::Unknown, None), Category::NodeIssue);
        assert_eq!(
            category_for_phase(WorkloadPhase::Pending, None),
            Category::SchedulingIssue
        );
    }

    #[test]
    fn test_phase_trigger_uses_max_restart_count() {
        let snapshot = WorkloadSnapshot {
            pod: PodIdentity::new("orders", "checkout-7f8"),
            uid: None,
            phase: WorkloadPhase::Failed,
            phase_reason: None,
            unschedulable: false,
            node_name: None,
            containers: vec![
                crate::models::ContainerSnapshot {
                    name: "api".to_string(),
                    restart_count: 2,
                    last_state: None,
                },
                crate::models::ContainerSnapshot {
                    name: "sidecar".to_string(),
                    restart_count: 11,
                    last_state: None,
                },
            ],
        };

        let result = Classifier::default().classify(
            &Trigger::Phase {
                snapshot: &snapshot,
                usage: None,
            },
            &[],
            now(),
        );
        assert_eq!(result.severity, Severity::High);
        assert_eq!(result.category, Category::PodFailure);
    }

    #[test]
    fn test_deterministic() {
        let event = restart("orders", 3, "OOMKilled");
        let history = minutes_ago(&[3, 40]);
        assert_eq!(classify(&event, &history), classify(&event, &history));
    }
}
