//! Best-effort live updates
//!
//! Subscribers only see updates published while they are attached.
//! There is no replay and a slow subscriber skips what it lagged behind on.

use crate::models::{AlertRecord, Incident, UsageSnapshot};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::trace;

/// Default number of updates buffered per subscriber
const DEFAULT_CAPACITY: usize = 256;

/// A record change pushed to subscribers
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum LiveUpdate {
    IncidentCreated(Incident),
    IncidentUpdated(Incident),
    AlertCreated(AlertRecord),
    AlertUpdated(AlertRecord),
    UsageSnapshot(UsageSnapshot),
}

impl LiveUpdate {
    /// Event name used on the SSE stream
    pub fn event_name(&self) -> &'static str {
        match self {
            LiveUpdate::IncidentCreated(_) => "incident_created",
            LiveUpdate::IncidentUpdated(_) => "incident_updated",
            LiveUpdate::AlertCreated(_) => "alert_created",
            LiveUpdate::AlertUpdated(_) => "alert_updated",
            LiveUpdate::UsageSnapshot(_) => "usage_snapshot",
        }
    }
}

/// Fan-out of live updates over a tokio broadcast channel
#[derive(Clone)]
pub struct Broadcaster {
    tx: broadcast::Sender<LiveUpdate>,
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl Broadcaster {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publish to every attached subscriber, returning how many received it
    pub fn publish(&self, update: LiveUpdate) -> usize {
        let event = update.event_name();
        match self.tx.send(update) {
            Ok(receivers) => receivers,
            Err(_) => {
                trace!(event = event, "No live subscribers attached");
                0
            }
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LiveUpdate> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}
