//! Kubernetes pod watch source
//!
//! Wraps the raw `watch` verb on pods cluster-wide and maps the
//! delivered objects into workload snapshots. The last seen resource
//! version is kept across reconnects so a new watch resumes where the
//! previous one ended.

use super::{EventStream, WorkloadEventSource};
use crate::error::SourceError;
use crate::models::{
    ContainerSnapshot, ContainerTermination, PodIdentity, WorkloadEvent, WorkloadPhase,
    WorkloadSnapshot,
};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{ContainerState, ContainerStatus, Pod};
use kube::api::{Api, WatchEvent, WatchParams};
use kube::core::ErrorResponse;
use kube::{Client, ResourceExt};
use std::sync::{Arc, Mutex};
use tokio::sync::RwLock;
use tokio_stream::StreamExt;
use tracing::{debug, info, warn};

/// Server-side watch timeout; the API server caps this below 300 seconds
const DEFAULT_WATCH_TIMEOUT_SECS: u32 = 290;

/// Lazily constructed Kubernetes client.
///
/// Missing credentials or an unreachable API server at startup are not
/// fatal: every caller retries construction until it succeeds.
#[derive(Clone, Default)]
pub struct ClientProvider {
    client: Arc<RwLock<Option<Client>>>,
}

impl ClientProvider {
    /// Provider that infers configuration from the environment on first use
    pub fn infer() -> Self {
        Self::default()
    }

    /// Provider around an already constructed client
    pub fn from_client(client: Client) -> Self {
        Self {
            client: Arc::new(RwLock::new(Some(client))),
        }
    }

    /// Get the cached client or try to build one
    pub async fn get(&self) -> Result<Client, SourceError> {
        if let Some(client) = self.client.read().await.as_ref() {
            return Ok(client.clone());
        }

        let client = Client::try_default().await?;
        info!("Kubernetes client configured");
        *self.client.write().await = Some(client.clone());
        Ok(client)
    }
}

/// Pod watch over the whole cluster
pub struct KubeEventSource {
    provider: ClientProvider,
    timeout_secs: u32,
    resource_version: Arc<Mutex<Option<String>>>,
}

impl KubeEventSource {
    pub fn new(provider: ClientProvider) -> Self {
        Self {
            provider,
            timeout_secs: DEFAULT_WATCH_TIMEOUT_SECS,
            resource_version: Arc::new(Mutex::new(None)),
        }
    }

    /// Set the server-side watch timeout
    pub fn with_timeout_secs(mut self, timeout_secs: u32) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    fn current_version(&self) -> String {
        lock_version(&self.resource_version)
            .clone()
            .unwrap_or_else(|| "0".to_string())
    }
}

#[async_trait]
impl WorkloadEventSource for KubeEventSource {
    async fn watch(&self) -> Result<EventStream, SourceError> {
        let client = self.provider.get().await?;
        let api: Api<Pod> = Api::all(client);
        let version = self.current_version();
        let params = WatchParams::default().timeout(self.timeout_secs);

        debug!(resource_version = %version, "Opening pod watch");
        let raw = api.watch(&params, &version).await?;

        let resource_version = Arc::clone(&self.resource_version);
        let stream = raw.filter_map(move |item| match item {
            Ok(WatchEvent::Added(pod)) => map_pod(&resource_version, &pod, WorkloadEvent::Added),
            Ok(WatchEvent::Modified(pod)) => {
                map_pod(&resource_version, &pod, WorkloadEvent::Modified)
            }
            Ok(WatchEvent::Deleted(pod)) => {
                map_pod(&resource_version, &pod, WorkloadEvent::Deleted)
            }
            Ok(WatchEvent::Bookmark(bookmark)) => {
                *lock_version(&resource_version) = Some(bookmark.metadata.resource_version);
                None
            }
            Ok(WatchEvent::Error(status)) => Some(Err(map_watch_error(&resource_version, status))),
            Err(e) => Some(Err(SourceError::Kube(e))),
        });

        Ok(Box::pin(stream))
    }
}

fn lock_version(version: &Mutex<Option<String>>) -> std::sync::MutexGuard<'_, Option<String>> {
    version.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Turn an error frame into a `SourceError`, dropping the stored version on 410
fn map_watch_error(resource_version: &Mutex<Option<String>>, status: ErrorResponse) -> SourceError {
    let err = SourceError::Watch {
        code: status.code,
        message: status.message,
    };
    if err.is_gone() {
        *lock_version(resource_version) = None;
    }
    err
}

fn map_pod(
    resource_version: &Mutex<Option<String>>,
    pod: &Pod,
    wrap: fn(WorkloadSnapshot) -> WorkloadEvent,
) -> Option<Result<WorkloadEvent, SourceError>> {
    if let Some(version) = pod.resource_version() {
        *lock_version(resource_version) = Some(version);
    }

    match snapshot_from_pod(pod) {
        Some(snapshot) => Some(Ok(wrap(snapshot))),
        None => {
            warn!("Skipping pod without a name in watch delivery");
            None
        }
    }
}

/// Map a Kubernetes pod into the snapshot the pipeline works on
pub fn snapshot_from_pod(pod: &Pod) -> Option<WorkloadSnapshot> {
    let name = pod.metadata.name.clone()?;
    let namespace = pod
        .metadata
        .namespace
        .clone()
        .unwrap_or_else(|| "default".to_string());

    let status = pod.status.as_ref();
    let phase = status
        .and_then(|s| s.phase.as_deref())
        .map(WorkloadPhase::parse)
        .unwrap_or(WorkloadPhase::Unknown);

    let unschedulable = status
        .and_then(|s| s.conditions.as_ref())
        .map(|conditions| {
            conditions.iter().any(|c| {
                c.type_ == "PodScheduled"
                    && c.status == "False"
                    && c.reason.as_deref() == Some("Unschedulable")
            })
        })
        .unwrap_or(false);

    let phase_reason = status.and_then(|s| s.reason.clone().or_else(|| s.message.clone()));

    let containers = status
        .and_then(|s| s.container_statuses.as_ref())
        .map(|statuses| statuses.iter().map(container_snapshot).collect())
        .unwrap_or_default();

    Some(WorkloadSnapshot {
        pod: PodIdentity::new(namespace, name),
        uid: pod.metadata.uid.clone(),
        phase,
        phase_reason,
        unschedulable,
        node_name: pod.spec.as_ref().and_then(|s| s.node_name.clone()),
        containers,
    })
}

fn container_snapshot(status: &ContainerStatus) -> ContainerSnapshot {
    ContainerSnapshot {
        name: status.name.clone(),
        restart_count: status.restart_count.max(0) as u32,
        last_state: last_termination(status),
    }
}

/// Prefer the previous termination, then the current waiting or terminated state
fn last_termination(status: &ContainerStatus) -> Option<ContainerTermination> {
    let terminated = |state: &ContainerState| {
        state.terminated.as_ref().map(|t| ContainerTermination {
            reason: t.reason.clone(),
            message: t.message.clone(),
            exit_code: Some(t.exit_code),
        })
    };
    let waiting = |state: &ContainerState| {
        state.waiting.as_ref().map(|w| ContainerTermination {
            reason: w.reason.clone(),
            message: w.message.clone(),
            exit_code: None,
        })
    };

    status
        .last_state
        .as_ref()
        .and_then(terminated)
        .or_else(|| status.state.as_ref().and_then(waiting))
        .or_else(|| status.state.as_ref().and_then(terminated))
}
