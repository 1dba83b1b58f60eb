//! Resource usage polling
//!
//! Pulls per-pod CPU and memory from metrics-server on its own timer.
//! Usage is optional input to classification: when the source is
//! missing or failing the cache is emptied and every lookup yields
//! `None`.

use super::{ClientProvider, UsageSource};
use crate::dispatch::{Broadcaster, LiveUpdate};
use crate::error::SourceError;
use crate::health::{components, HealthRegistry};
use crate::models::{PodUsage, UsageSnapshot};
use async_trait::async_trait;
use chrono::Utc;
use kube::api::{Api, ApiResource, DynamicObject, GroupVersionKind, ListParams};
use kube::ResourceExt;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::interval;
use tracing::{debug, info, warn};

const BYTES_PER_MIB: f64 = 1024.0 * 1024.0;

/// Pod usage from the `metrics.k8s.io/v1beta1` API
pub struct MetricsServerUsage {
    provider: ClientProvider,
}

impl MetricsServerUsage {
    pub fn new(provider: ClientProvider) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl UsageSource for MetricsServerUsage {
    async fn fetch(&self) -> Result<HashMap<String, PodUsage>, SourceError> {
        let client = self.provider.get().await?;
        let gvk = GroupVersionKind::gvk("metrics.k8s.io", "v1beta1", "PodMetrics");
        let resource = ApiResource::from_gvk_with_plural(&gvk, "pods");
        let api: Api<DynamicObject> = Api::all_with(client, &resource);

        let list = api.list(&ListParams::default()).await?;
        let mut usage = HashMap::with_capacity(list.items.len());

        for object in &list.items {
            let namespace = object.namespace().unwrap_or_else(|| "default".to_string());
            let key = format!("{}/{}", namespace, object.name_any());
            usage.insert(key, pod_usage(&object.data)?);
        }
        Ok(usage)
    }
}

/// Sum the container usage of one `PodMetrics` object
fn pod_usage(data: &serde_json::Value) -> Result<PodUsage, SourceError> {
    let mut total = PodUsage::default();
    let containers = data
        .get("containers")
        .and_then(|c| c.as_array())
        .map(Vec::as_slice)
        .unwrap_or_default();

    for container in containers {
        let usage = &container["usage"];
        if let Some(cpu) = usage["cpu"].as_str() {
            total.cpu_millicores += parse_cpu_millicores(cpu)
                .ok_or_else(|| SourceError::Malformed(format!("cpu quantity '{}'", cpu)))?;
        }
        if let Some(memory) = usage["memory"].as_str() {
            total.memory_mib += parse_memory_mib(memory)
                .ok_or_else(|| SourceError::Malformed(format!("memory quantity '{}'", memory)))?;
        }
    }
    Ok(total)
}

/// Parse a Kubernetes quantity into its base unit (cores or bytes)
fn parse_quantity(quantity: &str) -> Option<f64> {
    let quantity = quantity.trim();
    if quantity.is_empty() {
        return None;
    }

    const BINARY: [(&str, f64); 6] = [
        ("Ki", 1024.0),
        ("Mi", 1_048_576.0),
        ("Gi", 1_073_741_824.0),
        ("Ti", 1_099_511_627_776.0),
        ("Pi", 1_125_899_906_842_624.0),
        ("Ei", 1_152_921_504_606_846_976.0),
    ];
    for (suffix, factor) in BINARY {
        if let Some(number) = quantity.strip_suffix(suffix) {
            return number.parse::<f64>().ok().map(|n| n * factor);
        }
    }

    let (number, factor) = match quantity.chars().last()? {
        'n' => (&quantity[..quantity.len() - 1], 1e-9),
        'u' => (&quantity[..quantity.len() - 1], 1e-6),
        'm' => (&quantity[..quantity.len() - 1], 1e-3),
        'k' => (&quantity[..quantity.len() - 1], 1e3),
        'M' => (&quantity[..quantity.len() - 1], 1e6),
        'G' => (&quantity[..quantity.len() - 1], 1e9),
        'T' => (&quantity[..quantity.len() - 1], 1e12),
        'P' => (&quantity[..quantity.len() - 1], 1e15),
        'E' => (&quantity[..quantity.len() - 1], 1e18),
        _ => (quantity, 1.0),
    };

    number
        .parse::<f64>()
        .ok()
        .filter(|n| n.is_finite() && *n >= 0.0)
        .map(|n| n * factor)
}

/// Parse a CPU quantity (`250m`, `1`, `1500000n`) into millicores
pub fn parse_cpu_millicores(quantity: &str) -> Option<u64> {
    parse_quantity(quantity).map(|cores| (cores * 1000.0).round() as u64)
}

/// Parse a memory quantity (`128Mi`, `1Gi`, `524288Ki`, `1e9`) into MiB
pub fn parse_memory_mib(quantity: &str) -> Option<u64> {
    parse_quantity(quantity).map(|bytes| (bytes / BYTES_PER_MIB).round() as u64)
}

/// Latest usage per pod, shared with the pipeline
#[derive(Clone, Default)]
pub struct UsageCache {
    inner: Arc<RwLock<HashMap<String, PodUsage>>>,
}

impl UsageCache {
    /// Usage of a pod keyed `namespace/name`
    pub async fn get(&self, key: &str) -> Option<PodUsage> {
        self.inner.read().await.get(key).copied()
    }

    pub async fn replace(&self, usage: HashMap<String, PodUsage>) {
        *self.inner.write().await = usage;
    }

    pub async fn clear(&self) {
        self.inner.write().await.clear();
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }
}

/// Periodic refresh of the usage cache
pub struct UsagePoller {
    source: Arc<dyn UsageSource>,
    cache: UsageCache,
    broadcaster: Broadcaster,
    health: HealthRegistry,
    interval: Duration,
}

impl UsagePoller {
    pub fn new(
        source: Arc<dyn UsageSource>,
        cache: UsageCache,
        broadcaster: Broadcaster,
        health: HealthRegistry,
        interval: Duration,
    ) -> Self {
        Self {
            source,
            cache,
            broadcaster,
            health,
            interval,
        }
    }

    pub async fn run(self, mut shutdown: tokio::sync::broadcast::Receiver<()>) {
        info!(
            interval_secs = self.interval.as_secs(),
            "Starting resource usage polling"
        );
        let mut ticker = interval(self.interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.poll_once().await {
                        debug!(error = %e, "Usage poll failed");
                    }
                }
                _ = shutdown.recv() => {
                    info!("Shutting down resource usage polling");
                    break;
                }
            }
        }
    }

    /// Refresh the cache once, returning the number of pods with usage
    pub async fn poll_once(&self) -> Result<usize, SourceError> {
        match self.source.fetch().await {
            Ok(usage) => {
                let pods = usage.len();
                let snapshot = UsageSnapshot {
                    collected_at: Utc::now(),
                    pods: usage.iter().map(|(k, v)| (k.clone(), *v)).collect(),
                };
                self.cache.replace(usage).await;
                self.health.set_healthy(components::USAGE).await;
                self.broadcaster.publish(LiveUpdate::UsageSnapshot(snapshot));
                Ok(pods)
            }
            Err(e) => {
                warn!(error = %e, "Resource usage unavailable");
                self.cache.clear().await;
                self.health
                    .set_degraded(components::USAGE, e.to_string())
                    .await;
                Err(e)
            }
        }
    }
}
