//! Restart diff tracking
//!
//! Keeps the last observed restart count per container and the last
//! observed phase per pod, turning repeated watch deliveries into
//! discrete restart events and phase changes.

use crate::models::{ContainerSnapshot, PodIdentity, RestartEvent, WorkloadPhase};
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::debug;

/// Reason recorded when the container reported no last state
const UNKNOWN_REASON: &str = "Unknown";

/// A pod moved to a different phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseChange {
    /// `None` when the pod was not seen before
    pub previous: Option<WorkloadPhase>,
    pub current: WorkloadPhase,
}

/// Monotonic restart-count memory keyed by `namespace/name/container`
pub struct RestartTracker {
    restarts: DashMap<String, u32>,
    phases: DashMap<String, WorkloadPhase>,
}

impl Default for RestartTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl RestartTracker {
    pub fn new() -> Self {
        Self {
            restarts: DashMap::new(),
            phases: DashMap::new(),
        }
    }

    /// Record an observed restart count.
    ///
    /// The first observation of a container only establishes the baseline.
    /// Later observations yield an event when the count strictly increases;
    /// replays and out-of-order deliveries never lower the stored count.
    pub fn observe(
        &self,
        pod: &PodIdentity,
        container: &ContainerSnapshot,
        observed_at: DateTime<Utc>,
    ) -> Option<RestartEvent> {
        let key = pod.container_key(&container.name);

        match self.restarts.entry(key) {
            Entry::Vacant(entry) => {
                debug!(
                    container = %entry.key(),
                    restart_count = container.restart_count,
                    "Restart baseline recorded"
                );
                entry.insert(container.restart_count);
                None
            }
            Entry::Occupied(mut entry) => {
                let prior = *entry.get();
                if container.restart_count <= prior {
                    return None;
                }
                entry.insert(container.restart_count);

                let last_state = container.last_state.clone().unwrap_or_default();
                Some(RestartEvent {
                    pod: pod.clone(),
                    container_name: container.name.clone(),
                    restart_count: container.restart_count,
                    reason: last_state
                        .reason
                        .unwrap_or_else(|| UNKNOWN_REASON.to_string()),
                    message: last_state.message.unwrap_or_default(),
                    exit_code: last_state.exit_code,
                    observed_at,
                })
            }
        }
    }

    /// Record the phase of a pod, returning the change if it differs from the last one
    pub fn observe_phase(&self, pod: &PodIdentity, phase: WorkloadPhase) -> Option<PhaseChange> {
        let previous = self.phases.insert(pod.key(), phase);
        if previous == Some(phase) {
            None
        } else {
            Some(PhaseChange {
                previous,
                current: phase,
            })
        }
    }

    /// Last restart count recorded for a container
    pub fn restart_count(&self, pod: &PodIdentity, container: &str) -> Option<u32> {
        self.restarts
            .get(&pod.container_key(container))
            .map(|r| *r.value())
    }

    /// Drop every entry belonging to a pod
    pub fn forget_pod(&self, pod: &PodIdentity) {
        let prefix = format!("{}/", pod.key());
        self.restarts.retain(|key, _| !key.starts_with(&prefix));
        self.phases.remove(&pod.key());
        debug!(pod = %pod, "Forgot tracked containers");
    }

    /// Number of containers with a recorded restart count
    pub fn tracked_containers(&self) -> usize {
        self.restarts.len()
    }

    /// Number of pods with a recorded phase
    pub fn tracked_pods(&self) -> usize {
        self.phases.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ContainerTermination;

    fn container(name: &str, restart_count: u32) -> ContainerSnapshot {
        ContainerSnapshot {
            name: name.to_string(),
            restart_count,
            last_state: Some(ContainerTermination {
                reason: Some("Error".to_string()),
                message: Some("exit status 1".to_string()),
                exit_code: Some(1),
            }),
        }
    }

    #[test]
    fn test_first_observation_is_baseline() {
        let tracker = RestartTracker::new();
        let pod = PodIdentity::new("default", "web");

        assert!(tracker.observe(&pod, &container("app", 7), Utc::now()).is_none());
        assert_eq!(tracker.restart_count(&pod, "app"), Some(7));
    }

    #[test]
    fn test_emits_only_on_strict_increase() {
        let tracker = RestartTracker::new();
        let pod = PodIdentity::new("orders", "checkout-7f8");
        let now = Utc::now();

        let counts = [0, 1, 1, 3];
        let events: Vec<RestartEvent> = counts
            .iter()
            .filter_map(|c| tracker.observe(&pod, &container("api", *c), now))
            .collect();

        assert_eq!(events.len(), 2);
        assert_eq!(events[0].restart_count, 1);
        assert_eq!(events[1].restart_count, 3);
        assert_eq!(events[1].reason, "Error");
        assert_eq!(events[1].exit_code, Some(1));
    }

    #[test]
    fn test_out_of_order_delivery_never_lowers_count() {
        let tracker = RestartTracker::new();
        let pod = PodIdentity::new("default", "web");
        let now = Utc::now();

        tracker.observe(&pod, &container("app", 2), now);
        assert!(tracker.observe(&pod, &container("app", 5), now).is_some());
        assert!(tracker.observe(&pod, &container("app", 3), now).is_none());
        assert_eq!(tracker.restart_count(&pod, "app"), Some(5));
        assert!(tracker.observe(&pod, &container("app", 5), now).is_none());
    }

    #[test]
    fn test_containers_tracked_independently() {
        let tracker = RestartTracker::new();
        let pod = PodIdentity::new("default", "web");
        let now = Utc::now();

        tracker.observe(&pod, &container("app", 0), now);
        tracker.observe(&pod, &container("sidecar", 0), now);

        assert!(tracker.observe(&pod, &container("app", 1), now).is_some());
        assert!(tracker.observe(&pod, &container("sidecar", 0), now).is_none());
        assert_eq!(tracker.tracked_containers(), 2);
    }

    #[test]
    fn test_missing_last_state_uses_unknown_reason() {
        let tracker = RestartTracker::new();
        let pod = PodIdentity::new("default", "web");
        let now = Utc::now();
        let bare = |count| ContainerSnapshot {
            name: "app".to_string(),
            restart_count: count,
            last_state: None,
        };

        tracker.observe(&pod, &bare(0), now);
        let event = tracker.observe(&pod, &bare(1), now).unwrap();
        assert_eq!(event.reason, "Unknown");
        assert_eq!(event.message, "");
        assert_eq!(event.exit_code, None);
    }

    #[test]
    fn test_phase_changes() {
        let tracker = RestartTracker::new();
        let pod = PodIdentity::new("default", "web");

        let first = tracker.observe_phase(&pod, WorkloadPhase::Running).unwrap();
        assert_eq!(first.previous, None);

        assert!(tracker.observe_phase(&pod, WorkloadPhase::Running).is_none());

        let change = tracker.observe_phase(&pod, WorkloadPhase::Failed).unwrap();
        assert_eq!(change.previous, Some(WorkloadPhase::Running));
        assert_eq!(change.current, WorkloadPhase::Failed);
    }

    #[test]
    fn test_forget_pod() {
        let tracker = RestartTracker::new();
        let web = PodIdentity::new("default", "web");
        let web2 = PodIdentity::new("default", "web-2");
        let now = Utc::now();

        tracker.observe(&web, &container("app", 0), now);
        tracker.observe(&web2, &container("app", 0), now);
        tracker.observe_phase(&web, WorkloadPhase::Running);

        tracker.forget_pod(&web);

        assert_eq!(tracker.restart_count(&web, "app"), None);
        assert_eq!(tracker.restart_count(&web2, "app"), Some(0));
        assert_eq!(tracker.tracked_pods(), 0);
    }
}
