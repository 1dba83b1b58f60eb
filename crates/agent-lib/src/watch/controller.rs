//! Workload watch controller
//!
//! Owns the subscription to the pod event stream and feeds every
//! delivery through the incident pipeline. Transport failures never
//! end the loop: they are recorded, surfaced through the watch status
//! and retried after a fixed delay until `stop()` is called.

use super::WorkloadEventSource;
use crate::error::SourceError;
use crate::health::components;
use crate::incident::IncidentPipeline;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, RwLock};
use tokio::time::Instant;
use tokio_stream::StreamExt;
use tracing::{debug, info};

/// Default pause between a failed watch and the next connect attempt
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Default floor between two connects after streams that end cleanly
pub const DEFAULT_MIN_CONNECT_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct WatchConfig {
    pub reconnect_delay: Duration,
    pub min_connect_interval: Duration,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            min_connect_interval: DEFAULT_MIN_CONNECT_INTERVAL,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WatchState {
    #[default]
    Idle,
    Connecting,
    Watching,
    Backoff,
    Stopped,
}

impl WatchState {
    pub fn as_str(&self) -> &'static str {
        match self {
            WatchState::Idle => "idle",
            WatchState::Connecting => "connecting",
            WatchState::Watching => "watching",
            WatchState::Backoff => "backoff",
            WatchState::Stopped => "stopped",
        }
    }
}

/// Observable state of the watch loop
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchStatus {
    pub state: WatchState,
    pub connected: bool,
    /// Reconnects since the controller started
    pub reconnect_attempts: u32,
    pub last_error: Option<String>,
    pub events_processed: u64,
    pub last_event_at: Option<DateTime<Utc>>,
}

/// Shared read handle onto the controller status
#[derive(Clone, Default)]
pub struct WatchStatusHandle {
    inner: Arc<RwLock<WatchStatus>>,
}

impl WatchStatusHandle {
    pub async fn snapshot(&self) -> WatchStatus {
        self.inner.read().await.clone()
    }
}

pub struct WatchController {
    source: Arc<dyn WorkloadEventSource>,
    pipeline: IncidentPipeline,
    config: WatchConfig,
    status: WatchStatusHandle,
    shutdown: watch::Sender<bool>,
}

impl WatchController {
    pub fn new(
        source: Arc<dyn WorkloadEventSource>,
        pipeline: IncidentPipeline,
        config: WatchConfig,
    ) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            source,
            pipeline,
            config,
            status: WatchStatusHandle::default(),
            shutdown,
        }
    }

    pub fn status_handle(&self) -> WatchStatusHandle {
        self.status.clone()
    }

    /// Request the loop to stop. Safe to call more than once.
    ///
    /// In-flight enrichment and notification tasks are left to finish.
    pub fn stop(&self) {
        if !self.shutdown.send_replace(true) {
            info!("Stopping workload watch");
        }
    }

    /// Run the watch loop until `stop()` is called
    pub async fn run(&self) {
        let mut shutdown = self.shutdown.subscribe();

        loop {
            let stop_requested = *shutdown.borrow();
            if stop_requested {
                break;
            }
            self.set_state(WatchState::Connecting).await;
            let connected_at = Instant::now();

            let result = tokio::select! {
                result = self.consume() => result,
                _ = stopped(&mut shutdown) => break,
            };

            match result {
                Ok(()) => {
                    debug!("Watch stream ended, reconnecting");
                    let pause = self
                        .config
                        .min_connect_interval
                        .saturating_sub(connected_at.elapsed());
                    if !pause.is_zero() {
                        tokio::select! {
                            _ = tokio::time::sleep(pause) => {}
                            _ = stopped(&mut shutdown) => break,
                        }
                    }
                }
                Err(e) => {
                    self.enter_backoff(&e).await;
                    tokio::select! {
                        _ = tokio::time::sleep(self.config.reconnect_delay) => {}
                        _ = stopped(&mut shutdown) => break,
                    }
                }
            }
        }

        {
            let mut status = self.status.inner.write().await;
            status.state = WatchState::Stopped;
            status.connected = false;
        }
        self.pipeline.metrics().set_watch_connected(false);
        let attempts = self.status.inner.read().await.reconnect_attempts;
        self.pipeline
            .logger()
            .log_watch_state(WatchState::Stopped.as_str(), attempts, None);
    }

    /// Open one subscription and drain it, returning when it ends or fails
    async fn consume(&self) -> Result<(), SourceError> {
        let mut stream = self.source.watch().await?;
        self.enter_watching().await;

        while let Some(item) = stream.next().await {
            let event = item?;
            let outcome = self.pipeline.handle(event).await;
            if !outcome.tasks.is_empty() {
                // Detached from the loop; failures are logged when reaped
                tokio::spawn(outcome.wait());
            }

            let mut status = self.status.inner.write().await;
            status.events_processed += 1;
            status.last_event_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn set_state(&self, state: WatchState) {
        self.status.inner.write().await.state = state;
    }

    async fn enter_watching(&self) {
        let attempts = {
            let mut status = self.status.inner.write().await;
            status.state = WatchState::Watching;
            status.connected = true;
            status.reconnect_attempts
        };

        self.pipeline.health().set_healthy(components::WATCH).await;
        self.pipeline.metrics().set_watch_connected(true);
        self.pipeline
            .logger()
            .log_watch_state(WatchState::Watching.as_str(), attempts, None);
    }

    async fn enter_backoff(&self, error: &SourceError) {
        let message = error.to_string();
        let attempts = {
            let mut status = self.status.inner.write().await;
            status.state = WatchState::Backoff;
            status.connected = false;
            status.reconnect_attempts += 1;
            status.last_error = Some(message.clone());
            status.reconnect_attempts
        };

        self.pipeline
            .health()
            .set_degraded(components::WATCH, message.as_str())
            .await;
        let metrics = self.pipeline.metrics();
        metrics.set_watch_connected(false);
        metrics.inc_watch_reconnects();
        self.pipeline
            .logger()
            .log_watch_state(WatchState::Backoff.as_str(), attempts, Some(&message));
    }
}

async fn stopped(shutdown: &mut watch::Receiver<bool>) {
    // The sender lives in the controller, so this only errors once it is gone.
    let _ = shutdown.wait_for(|stop| *stop).await;
}
