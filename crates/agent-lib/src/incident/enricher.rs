//! Root-cause enrichment
//!
//! Asks an external text-generation service for a root-cause analysis
//! and falls back to a static per-category template whenever the
//! service is missing, fails, times out or answers with something that
//! cannot be used. `enrich` therefore always produces an analysis.

use super::templates::template_for;
use crate::error::GenerationError;
use crate::models::{AlertRecord, Category, Classification, Incident, PodIdentity, WorkloadPhase};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Default bound on a single generation call
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20);

const SYSTEM_PROMPT: &str = "You are a Kubernetes site reliability engineer. \
    Diagnose workload failures concisely and suggest concrete remediation steps.";

/// Trait for text-generation backends
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError>;
}

/// OpenAI-compatible chat completion client
pub struct HttpTextGenerator {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    model: String,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

impl HttpTextGenerator {
    pub fn new(endpoint: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            api_key: None,
            model: model.into(),
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }
}

#[async_trait]
impl TextGenerator for HttpTextGenerator {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        let url = format!("{}/v1/chat/completions", self.endpoint);
        let body = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            temperature: 0.2,
        };

        let mut request = self.client.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatResponse = response.json().await?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or(GenerationError::EmptyResponse)
    }
}

/// What the enricher knows about the failing workload
#[derive(Debug, Clone)]
pub struct EnrichmentContext {
    pub pod: PodIdentity,
    pub container_name: Option<String>,
    pub reason: String,
    pub message: String,
    pub exit_code: Option<i32>,
    pub restart_count: u32,
    pub phase: Option<WorkloadPhase>,
}

impl EnrichmentContext {
    pub fn from_incident(incident: &Incident) -> Self {
        Self {
            pod: incident.pod.clone(),
            container_name: incident.container_name.clone(),
            reason: incident.reason.clone(),
            message: incident.message.clone(),
            exit_code: incident.exit_code,
            restart_count: incident.restart_count,
            phase: None,
        }
    }

    pub fn from_alert(alert: &AlertRecord, phase_reason: Option<&str>, restart_count: u32) -> Self {
        Self {
            pod: alert.pod.clone(),
            container_name: None,
            reason: phase_reason.unwrap_or("").to_string(),
            message: String::new(),
            exit_code: None,
            restart_count,
            phase: Some(alert.phase),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisSource {
    Generated,
    Fallback,
}

impl AnalysisSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisSource::Generated => "generated",
            AnalysisSource::Fallback => "fallback",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootCauseAnalysis {
    pub root_cause: String,
    pub remediation_steps: Vec<String>,
    pub source: AnalysisSource,
    /// Why the template was used, when it was
    pub fallback_reason: Option<String>,
}

impl RootCauseAnalysis {
    /// Template analysis for a category
    pub fn fallback(category: Category, reason: impl Into<String>) -> Self {
        let template = template_for(category);
        Self {
            root_cause: template.root_cause.to_string(),
            remediation_steps: template
                .remediation_steps
                .iter()
                .map(|s| s.to_string())
                .collect(),
            source: AnalysisSource::Fallback,
            fallback_reason: Some(reason.into()),
        }
    }

    /// Single string stored on the record
    pub fn summary(&self) -> String {
        if self.remediation_steps.is_empty() {
            return self.root_cause.clone();
        }

        let steps: Vec<String> = self
            .remediation_steps
            .iter()
            .enumerate()
            .map(|(i, step)| format!("{}. {}", i + 1, step))
            .collect();
        format!("{}\n\nRemediation:\n{}", self.root_cause, steps.join("\n"))
    }
}

#[derive(Deserialize)]
struct GeneratedAnalysis {
    #[serde(rename = "rootCause")]
    root_cause: String,
    #[serde(rename = "remediationSteps", default)]
    remediation_steps: Vec<String>,
}

/// Parse a generated response as a fenced JSON block or free text
fn parse_response(text: &str) -> Option<RootCauseAnalysis> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Some(start) = trimmed.find("```json") {
        let body = &trimmed[start + "```json".len()..];
        let end = body.find("```")?;
        let parsed: GeneratedAnalysis = serde_json::from_str(body[..end].trim()).ok()?;
        if parsed.root_cause.trim().is_empty() {
            return None;
        }
        return Some(RootCauseAnalysis {
            root_cause: parsed.root_cause.trim().to_string(),
            remediation_steps: parsed
                .remediation_steps
                .into_iter()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            source: AnalysisSource::Generated,
            fallback_reason: None,
        });
    }

    Some(RootCauseAnalysis {
        root_cause: trimmed.to_string(),
        remediation_steps: Vec::new(),
        source: AnalysisSource::Generated,
        fallback_reason: None,
    })
}

fn build_prompt(context: &EnrichmentContext, classification: Classification) -> String {
    let mut prompt = format!(
        "A Kubernetes workload needs a root-cause analysis.\n\n\
         Pod: {}\nNamespace: {}\nCategory: {}\nSeverity: {}\nRestart count: {}\n",
        context.pod.name,
        context.pod.namespace,
        classification.category,
        classification.severity,
        context.restart_count,
    );
    if let Some(container) = &context.container_name {
        prompt.push_str(&format!("Container: {}\n", container));
    }
    if let Some(phase) = context.phase {
        prompt.push_str(&format!("Phase: {}\n", phase));
    }
    if !context.reason.is_empty() {
        prompt.push_str(&format!("Reason: {}\n", context.reason));
    }
    if !context.message.is_empty() {
        prompt.push_str(&format!("Message: {}\n", context.message));
    }
    if let Some(code) = context.exit_code {
        prompt.push_str(&format!("Exit code: {}\n", code));
    }
    prompt.push_str(
        "\nAnswer with a fenced ```json block containing \"rootCause\" (string) and \
         \"remediationSteps\" (array of 3 to 5 strings).",
    );
    prompt
}

/// Root-cause analysis with template fallback
pub struct RootCauseEnricher {
    generator: Option<Arc<dyn TextGenerator>>,
    timeout: Duration,
}

impl Default for RootCauseEnricher {
    fn default() -> Self {
        Self::fallback_only()
    }
}

impl RootCauseEnricher {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self {
            generator: Some(generator),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Enricher that always uses the templates
    pub fn fallback_only() -> Self {
        Self {
            generator: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn is_configured(&self) -> bool {
        self.generator.is_some()
    }

    pub async fn enrich(
        &self,
        context: &EnrichmentContext,
        classification: Classification,
    ) -> RootCauseAnalysis {
        let Some(generator) = &self.generator else {
            debug!(pod = %context.pod, "Text generation not configured, using template");
            return RootCauseAnalysis::fallback(
                classification.category,
                GenerationError::NotConfigured.to_string(),
            );
        };

        let prompt = build_prompt(context, classification);
        let error = match tokio::time::timeout(self.timeout, generator.generate(&prompt)).await {
            Ok(Ok(text)) => match parse_response(&text) {
                Some(analysis) => return analysis,
                None => "malformed generator response".to_string(),
            },
            Ok(Err(e)) => e.to_string(),
            Err(_) => GenerationError::Timeout(self.timeout).to_string(),
        };

        warn!(pod = %context.pod, error = %error, "Root-cause generation failed");
        RootCauseAnalysis::fallback(classification.category, error)
    }
}
