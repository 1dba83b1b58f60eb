//! Controller configuration
//!
//! Values come from an optional file named by `INCIDENT_CONFIG`,
//! overridden by `INCIDENT_*` environment variables.

use anyhow::{bail, Context, Result};
use config::builder::{ConfigBuilder, DefaultState};
use serde::Deserialize;
use std::time::Duration;

/// Environment variable naming an optional configuration file
pub const CONFIG_FILE_ENV: &str = "INCIDENT_CONFIG";

/// Controller configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ControllerConfig {
    /// Cluster label attached to structured log events
    #[serde(default = "default_cluster_name")]
    pub cluster_name: String,

    /// Port of the query API, health and metrics server
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Fixed pause before reconnecting a failed watch
    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay_secs: u64,

    /// Resource usage poll interval, 0 disables polling
    #[serde(default = "default_usage_poll_interval")]
    pub usage_poll_interval_secs: u64,

    #[serde(default = "default_incident_capacity")]
    pub incident_capacity: usize,

    #[serde(default = "default_alert_capacity")]
    pub alert_capacity: usize,

    /// Same-pod history window used for severity
    #[serde(default = "default_severity_window")]
    pub severity_window_secs: u64,

    /// Comma separated namespaces whose failures are always critical
    #[serde(default = "default_critical_namespaces")]
    pub critical_namespaces: String,

    /// Base URL of an OpenAI-compatible text generation endpoint
    #[serde(default)]
    pub ai_endpoint: Option<String>,

    #[serde(default)]
    pub ai_api_key: Option<String>,

    #[serde(default = "default_ai_model")]
    pub ai_model: String,

    #[serde(default = "default_enrichment_timeout")]
    pub enrichment_timeout_secs: u64,

    /// Webhook receiving outbound notifications
    #[serde(default)]
    pub notify_webhook_url: Option<String>,

    /// Comma separated notification recipients
    #[serde(default)]
    pub notify_recipients: String,

    #[serde(default = "default_notify_timeout")]
    pub notify_timeout_secs: u64,

    /// Heal incidents once their analysis is attached
    #[serde(default = "default_auto_heal")]
    pub auto_heal: bool,

    /// Forget tracked restart counts of deleted pods
    #[serde(default)]
    pub evict_on_delete: bool,

    /// Live update buffer per subscriber
    #[serde(default = "default_broadcast_capacity")]
    pub broadcast_capacity: usize,
}

fn default_cluster_name() -> String {
    "local".to_string()
}

fn default_api_port() -> u16 {
    8080
}

fn default_reconnect_delay() -> u64 {
    5
}

fn default_usage_poll_interval() -> u64 {
    30
}

fn default_incident_capacity() -> usize {
    incident_lib::incident::DEFAULT_INCIDENT_CAPACITY
}

fn default_alert_capacity() -> usize {
    incident_lib::incident::DEFAULT_ALERT_CAPACITY
}

fn default_severity_window() -> u64 {
    3600
}

fn default_critical_namespaces() -> String {
    "production,kube-system".to_string()
}

fn default_ai_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_enrichment_timeout() -> u64 {
    20
}

fn default_notify_timeout() -> u64 {
    10
}

fn default_auto_heal() -> bool {
    true
}

fn default_broadcast_capacity() -> usize {
    256
}

impl ControllerConfig {
    /// Load configuration from the optional file and the environment
    pub fn load() -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Ok(path) = std::env::var(CONFIG_FILE_ENV) {
            builder = builder.add_source(config::File::with_name(&path));
        }
        builder = builder.add_source(
            config::Environment::with_prefix("INCIDENT").try_parsing(true),
        );

        Self::from_builder(builder)
    }

    /// Deserialize and validate an assembled set of sources
    pub fn from_builder(builder: ConfigBuilder<DefaultState>) -> Result<Self> {
        let config: Self = builder
            .build()
            .context("Failed to read configuration sources")?
            .try_deserialize()
            .context("Invalid configuration")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("reconnect_delay_secs", self.reconnect_delay_secs),
            ("severity_window_secs", self.severity_window_secs),
            ("enrichment_timeout_secs", self.enrichment_timeout_secs),
            ("notify_timeout_secs", self.notify_timeout_secs),
            ("incident_capacity", self.incident_capacity as u64),
            ("alert_capacity", self.alert_capacity as u64),
            ("broadcast_capacity", self.broadcast_capacity as u64),
        ];
        for (name, value) in positive {
            if value == 0 {
                bail!("{} must be greater than zero", name);
            }
        }

        for (name, value) in [
            ("ai_endpoint", &self.ai_endpoint),
            ("notify_webhook_url", &self.notify_webhook_url),
        ] {
            if let Some(url) = value {
                url::Url::parse(url).with_context(|| format!("{} is not a valid URL", name))?;
            }
        }
        Ok(())
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_secs)
    }

    /// `None` when usage polling is disabled
    pub fn usage_poll_interval(&self) -> Option<Duration> {
        (self.usage_poll_interval_secs > 0)
            .then(|| Duration::from_secs(self.usage_poll_interval_secs))
    }

    pub fn severity_window(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.severity_window_secs as i64)
    }

    pub fn enrichment_timeout(&self) -> Duration {
        Duration::from_secs(self.enrichment_timeout_secs)
    }

    pub fn notify_timeout(&self) -> Duration {
        Duration::from_secs(self.notify_timeout_secs)
    }

    pub fn critical_namespace_list(&self) -> Vec<String> {
        split_list(&self.critical_namespaces)
    }

    pub fn recipient_list(&self) -> Vec<String> {
        split_list(&self.notify_recipients)
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}
