//! Subcommand implementations

pub mod alerts;
pub mod incidents;
pub mod status;

/// Append an optional query parameter to a path
fn with_query(path: &str, name: &str, value: Option<impl std::fmt::Display>) -> String {
    match value {
        Some(value) => format!("{}?{}={}", path, name, value),
        None => path.to_string(),
    }
}
