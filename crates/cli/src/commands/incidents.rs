//! Incident-related CLI commands

use anyhow::{bail, Result};
use chrono::Utc;
use tabled::Tabled;

use super::with_query;
use crate::client::{ApiClient, EvictResponse, Incident, IncidentStats};
use crate::output::{
    color_severity, color_status, format_age, format_seconds, print_info, print_json,
    print_success, print_table, print_warning, truncate, OutputFormat,
};

/// Row for incidents table
#[derive(Tabled)]
struct IncidentRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Pod")]
    pod: String,
    #[tabled(rename = "Container")]
    container: String,
    #[tabled(rename = "Category")]
    category: String,
    #[tabled(rename = "Severity")]
    severity: String,
    #[tabled(rename = "Restarts")]
    restarts: u32,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Age")]
    age: String,
}

/// Row for key/count breakdowns
#[derive(Tabled)]
struct CountRow {
    #[tabled(rename = "Group")]
    group: String,
    #[tabled(rename = "Key")]
    key: String,
    #[tabled(rename = "Count")]
    count: usize,
}

/// List incidents, newest first
pub async fn list_incidents(
    client: &ApiClient,
    limit: Option<u32>,
    namespace: Option<String>,
    severity: Option<String>,
    format: OutputFormat,
) -> Result<()> {
    let incidents: Vec<Incident> = client
        .get(&with_query("api/v1/incidents", "limit", limit))
        .await?;

    let filtered: Vec<Incident> = incidents
        .into_iter()
        .filter(|i| namespace.as_ref().map_or(true, |ns| &i.pod.namespace == ns))
        .filter(|i| {
            severity
                .as_ref()
                .map_or(true, |s| i.severity.eq_ignore_ascii_case(s))
        })
        .collect();

    match format {
        OutputFormat::Json => print_json(&filtered)?,
        OutputFormat::Table => {
            if filtered.is_empty() {
                print_warning("No incidents found");
                return Ok(());
            }

            let now = Utc::now();
            let total = filtered.len();
            let rows: Vec<IncidentRow> = filtered
                .iter()
                .map(|i| IncidentRow {
                    id: i.id.clone(),
                    pod: i.pod.to_string(),
                    container: i.container_name.clone().unwrap_or_else(|| "-".to_string()),
                    category: i.category.clone(),
                    severity: color_severity(&i.severity),
                    restarts: i.restart_count,
                    status: color_status(&i.status),
                    age: format_age(i.detected_at, now),
                })
                .collect();

            print_table(rows);
            println!("\nTotal: {} incidents", total);
        }
    }

    Ok(())
}

/// Show one incident with its root-cause analysis
pub async fn get_incident(client: &ApiClient, id: &str, format: OutputFormat) -> Result<()> {
    let incident: Incident = client.get(&format!("api/v1/incidents/{}", id)).await?;

    match format {
        OutputFormat::Json => print_json(&incident)?,
        OutputFormat::Table => print_incident(&incident),
    }
    Ok(())
}

/// Mark an incident as healed
pub async fn resolve_incident(client: &ApiClient, id: &str, format: OutputFormat) -> Result<()> {
    let incident: Incident = match client
        .post(&format!("api/v1/incidents/{}/resolve", id))
        .await
    {
        Ok(incident) => incident,
        Err(e) if e.is_not_found() => bail!("Incident {} does not exist or is already healed", id),
        Err(e) => return Err(e.into()),
    };

    match format {
        OutputFormat::Json => print_json(&incident)?,
        OutputFormat::Table => {
            let ttr = incident
                .healed_at
                .map(|healed| (healed - incident.detected_at).num_seconds() as f64)
                .map(format_seconds)
                .unwrap_or_else(|| "-".to_string());
            print_success(&format!("Incident {} resolved after {}", incident.id, ttr));
        }
    }
    Ok(())
}

/// Show incident aggregates
pub async fn show_stats(client: &ApiClient, top: Option<u32>, format: OutputFormat) -> Result<()> {
    let stats: IncidentStats = client
        .get(&with_query("api/v1/incidents/stats", "top", top))
        .await?;

    match format {
        OutputFormat::Json => print_json(&stats)?,
        OutputFormat::Table => {
            println!("Total incidents: {}", stats.total);
            match stats.mttr_seconds {
                Some(mttr) => println!("Mean time to recovery: {}", format_seconds(mttr)),
                None => println!("Mean time to recovery: -"),
            }

            let groups = [
                ("status", &stats.by_status),
                ("severity", &stats.by_severity),
                ("category", &stats.by_category),
                ("namespace", &stats.by_namespace),
            ];
            let rows: Vec<CountRow> = groups
                .iter()
                .flat_map(|(group, counts)| {
                    counts.iter().map(move |(key, count)| CountRow {
                        group: group.to_string(),
                        key: key.clone(),
                        count: *count,
                    })
                })
                .collect();
            if !rows.is_empty() {
                print_table(rows);
            }

            if !stats.top_pods.is_empty() {
                println!("\nMost affected pods:");
                for (rank, pod) in stats.top_pods.iter().enumerate() {
                    println!("  {}. {} ({})", rank + 1, pod.pod, pod.count);
                }
            }
        }
    }
    Ok(())
}

/// Drop incidents older than the given age
pub async fn evict_incidents(
    client: &ApiClient,
    older_than_secs: u64,
    format: OutputFormat,
) -> Result<()> {
    let path = format!("api/v1/incidents?older_than_secs={}", older_than_secs);
    let response: EvictResponse = client.delete(&path).await?;

    match format {
        OutputFormat::Json => print_json(&response)?,
        OutputFormat::Table => print_info(&format!("Removed {} incidents", response.removed)),
    }
    Ok(())
}

fn print_incident(incident: &Incident) {
    println!("ID:            {}", incident.id);
    println!("Pod:           {}", incident.pod);
    if let Some(container) = &incident.container_name {
        println!("Container:     {}", container);
    }
    println!("Status:        {}", color_status(&incident.status));
    println!("Severity:      {}", color_severity(&incident.severity));
    println!("Category:      {}", incident.category);
    println!("Reason:        {}", incident.reason);
    println!("Restarts:      {}", incident.restart_count);
    if let Some(code) = incident.exit_code {
        println!("Exit code:     {}", code);
    }
    if !incident.message.is_empty() {
        println!("Message:       {}", truncate(&incident.message, 120));
    }
    println!("Detected at:   {}", incident.detected_at.to_rfc3339());
    if let Some(healed) = incident.healed_at {
        println!("Healed at:     {}", healed.to_rfc3339());
    }
    println!("Notified:      {}", if incident.notification_sent { "yes" } else { "no" });

    match &incident.root_cause_summary {
        Some(summary) => println!("\nRoot cause analysis:\n{}", summary),
        None => print_warning("Root cause analysis pending"),
    }
}
