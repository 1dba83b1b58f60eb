//! Out-of-band notification of incidents and alerts
//!
//! Delivery is strictly best-effort: every failure is logged and
//! swallowed so the incident pipeline never blocks on it beyond the
//! configured timeout.

use crate::error::DeliveryError;
use crate::models::{AlertRecord, Incident};
use crate::observability::{ControllerMetrics, StructuredLogger};
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Default timeout for a single delivery
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// One message handed to the delivery collaborator
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutboundMessage {
    /// Addressee; `None` when the channel itself is the destination
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipient: Option<String>,
    pub subject: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub html: Option<String>,
}

/// Trait for notification transports
#[async_trait]
pub trait DeliveryChannel: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    async fn send(&self, message: &OutboundMessage) -> Result<(), DeliveryError>;
}

/// Posts each message as JSON to a webhook
pub struct WebhookDelivery {
    url: String,
    client: reqwest::Client,
}

impl WebhookDelivery {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl DeliveryChannel for WebhookDelivery {
    fn name(&self) -> &'static str {
        "webhook"
    }

    async fn send(&self, message: &OutboundMessage) -> Result<(), DeliveryError> {
        let response = self.client.post(&self.url).json(message).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(DeliveryError::Rejected(status.as_u16()));
        }
        Ok(())
    }
}

/// Formats records and hands them to the delivery channel
pub struct Notifier {
    channel: Option<Arc<dyn DeliveryChannel>>,
    recipients: Vec<String>,
    timeout: Duration,
    logger: StructuredLogger,
    metrics: ControllerMetrics,
}

impl Notifier {
    pub fn new(channel: Arc<dyn DeliveryChannel>, recipients: Vec<String>) -> Self {
        Self {
            channel: Some(channel),
            recipients,
            timeout: DEFAULT_TIMEOUT,
            logger: StructuredLogger::default(),
            metrics: ControllerMetrics::new(),
        }
    }

    /// Notifier without a channel; every call is a silent no-op
    pub fn disabled() -> Self {
        Self {
            channel: None,
            recipients: Vec::new(),
            timeout: DEFAULT_TIMEOUT,
            logger: StructuredLogger::default(),
            metrics: ControllerMetrics::new(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = logger;
        self
    }

    pub fn with_metrics(mut self, metrics: ControllerMetrics) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.channel.is_some()
    }

    /// Notify about an incident; true when at least one delivery succeeded
    pub async fn notify_incident(&self, incident: &Incident) -> bool {
        let (subject, content, html) = render_incident(incident);
        self.dispatch(&incident.id, subject, content, html).await
    }

    /// Notify about an alert; true when at least one delivery succeeded
    pub async fn notify_alert(&self, alert: &AlertRecord) -> bool {
        let (subject, content, html) = render_alert(alert);
        self.dispatch(&alert.id, subject, content, html).await
    }

    async fn dispatch(&self, record_id: &str, subject: String, content: String, html: String) -> bool {
        let Some(channel) = self.channel.as_ref() else {
            debug!(record_id = %record_id, "Notifications disabled, skipping");
            return false;
        };

        let recipients: Vec<Option<String>> = if self.recipients.is_empty() {
            vec![None]
        } else {
            self.recipients.iter().cloned().map(Some).collect()
        };

        let mut delivered = false;
        for recipient in recipients {
            let message = OutboundMessage {
                recipient,
                subject: subject.clone(),
                content: content.clone(),
                html: Some(html.clone()),
            };
            let target = message.recipient.clone().unwrap_or_else(|| channel.name().to_string());

            let result = match tokio::time::timeout(self.timeout, channel.send(&message)).await {
                Ok(result) => result,
                Err(_) => Err(DeliveryError::Timeout(self.timeout)),
            };

            match result {
                Ok(()) => {
                    debug!(record_id = %record_id, recipient = %target, "Notification sent");
                    self.metrics.inc_notification("sent");
                    delivered = true;
                }
                Err(e) => {
                    self.logger
                        .log_notification_failed(record_id, &target, &e.to_string());
                    self.metrics.inc_notification("failed");
                }
            }
        }
        delivered
    }
}

fn render_incident(incident: &Incident) -> (String, String, String) {
    let subject = format!(
        "[{}] {} in {}",
        incident.severity.as_str().to_uppercase(),
        incident.category,
        incident.pod
    );

    let container = incident.container_name.as_deref().unwrap_or("-");
    let exit_code = incident
        .exit_code
        .map(|c| c.to_string())
        .unwrap_or_else(|| "-".to_string());
    let analysis = incident
        .root_cause_summary
        .as_deref()
        .unwrap_or("Root-cause analysis pending.");

    let fields = [
        ("Incident", incident.id.clone()),
        ("Pod", incident.pod.to_string()),
        ("Container", container.to_string()),
        ("Severity", incident.severity.to_string()),
        ("Category", incident.category.to_string()),
        ("Reason", incident.reason.clone()),
        ("Message", incident.message.clone()),
        ("Restart count", incident.restart_count.to_string()),
        ("Exit code", exit_code),
        ("Detected", incident.detected_at.to_rfc3339()),
        ("Status", incident.status.to_string()),
    ];

    (subject, render_plain(&fields, analysis), render_html(&fields, analysis))
}

fn render_alert(alert: &AlertRecord) -> (String, String, String) {
    let subject = format!(
        "[{}] Pod {} is {}",
        alert.severity.as_str().to_uppercase(),
        alert.pod,
        alert.phase
    );
    let analysis = alert.summary.as_deref().unwrap_or("Analysis pending.");

    let fields = [
        ("Alert", alert.id.clone()),
        ("Pod", alert.pod.to_string()),
        ("Phase", alert.phase.to_string()),
        ("Severity", alert.severity.to_string()),
        ("Category", alert.category.to_string()),
        ("Status", alert.status.to_string()),
        ("Raised", alert.timestamp.to_rfc3339()),
    ];

    (subject, render_plain(&fields, analysis), render_html(&fields, analysis))
}

fn render_plain(fields: &[(&str, String)], analysis: &str) -> String {
    let mut out = String::new();
    for (name, value) in fields {
        out.push_str(&format!("{}: {}\n", name, value));
    }
    out.push_str("\nAnalysis:\n");
    out.push_str(analysis);
    out.push('\n');
    out
}

fn render_html(fields: &[(&str, String)], analysis: &str) -> String {
    let rows: String = fields
        .iter()
        .map(|(name, value)| {
            format!(
                "<tr><th align=\"left\">{}</th><td>{}</td></tr>",
                name,
                escape_html(value)
            )
        })
        .collect();

    format!(
        "<table>{}</table><h3>Analysis</h3><pre>{}</pre>",
        rows,
        escape_html(analysis)
    )
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
