//! Error types for the incident controller
//!
//! Transport, generation and delivery errors are contained by the
//! components that produce them. Only `QueryError` reaches API callers.

use thiserror::Error;

/// Failures of the workload watch and resource-usage sources
#[derive(Debug, Error)]
pub enum SourceError {
    /// Client construction or request failed
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    /// The API server sent an error frame on the watch stream
    #[error("watch error ({code}): {message}")]
    Watch { code: u16, message: String },

    /// An object could not be mapped to a workload snapshot
    #[error("malformed object: {0}")]
    Malformed(String),
}

impl SourceError {
    /// The stored resource version is too old and the watch must re-list
    pub fn is_gone(&self) -> bool {
        matches!(self, SourceError::Watch { code: 410, .. })
    }
}

/// Failures of the text-generation capability
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("text generation is not configured")]
    NotConfigured,

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("generator returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("generator returned no content")]
    EmptyResponse,

    #[error("generator timed out after {0:?}")]
    Timeout(std::time::Duration),
}

/// Failures of the notification delivery capability
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("delivery rejected with status {0}")]
    Rejected(u16),

    #[error("delivery timed out after {0:?}")]
    Timeout(std::time::Duration),
}

/// Errors reported synchronously to query callers
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    #[error("{kind} '{id}' not found or already resolved")]
    NotFound { kind: &'static str, id: String },

    #[error("invalid parameter '{name}': {reason}")]
    InvalidParameter { name: &'static str, reason: String },
}

impl QueryError {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        QueryError::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        QueryError::InvalidParameter {
            name,
            reason: reason.into(),
        }
    }
}

/// Validate an optional page size against the store capacity
pub fn validate_limit(limit: Option<i64>, max: usize) -> Result<Option<usize>, QueryError> {
    match limit {
        None => Ok(None),
        Some(l) if l < 1 => Err(QueryError::invalid("limit", "must be at least 1")),
        Some(l) if l as u64 > max as u64 => Err(QueryError::invalid(
            "limit",
            format!("must not exceed {}", max),
        )),
        Some(l) => Ok(Some(l as usize)),
    }
}
