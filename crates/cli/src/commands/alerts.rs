//! Alert-related CLI commands

use anyhow::Result;
use chrono::Utc;
use tabled::Tabled;

use super::with_query;
use crate::client::{Alert, AlertStats, ApiClient, EvictResponse};
use crate::output::{
    color_severity, color_status, format_age, print_info, print_json, print_success,
    print_table, print_warning, OutputFormat,
};

/// Row for alerts table
#[derive(Tabled)]
struct AlertRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Pod")]
    pod: String,
    #[tabled(rename = "Phase")]
    phase: String,
    #[tabled(rename = "Category")]
    category: String,
    #[tabled(rename = "Severity")]
    severity: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Ack")]
    acknowledged: String,
    #[tabled(rename = "Age")]
    age: String,
}

/// List alerts, newest first
pub async fn list_alerts(
    client: &ApiClient,
    limit: Option<u32>,
    firing_only: bool,
    format: OutputFormat,
) -> Result<()> {
    let alerts: Vec<Alert> = client
        .get(&with_query("api/v1/alerts", "limit", limit))
        .await?;

    let filtered: Vec<Alert> = alerts
        .into_iter()
        .filter(|a| !firing_only || a.status == "firing")
        .collect();

    match format {
        OutputFormat::Json => print_json(&filtered)?,
        OutputFormat::Table => {
            if filtered.is_empty() {
                print_warning("No alerts found");
                return Ok(());
            }

            let now = Utc::now();
            let total = filtered.len();
            let rows: Vec<AlertRow> = filtered
                .iter()
                .map(|a| AlertRow {
                    id: a.id.clone(),
                    pod: a.pod.to_string(),
                    phase: a.phase.clone(),
                    category: a.category.clone(),
                    severity: color_severity(&a.severity),
                    status: color_status(&a.status),
                    acknowledged: if a.acknowledged { "yes" } else { "no" }.to_string(),
                    age: format_age(a.timestamp, now),
                })
                .collect();

            print_table(rows);
            println!("\nTotal: {} alerts", total);
        }
    }

    Ok(())
}

/// Show one alert
pub async fn get_alert(client: &ApiClient, id: &str, format: OutputFormat) -> Result<()> {
    let alert: Alert = client.get(&format!("api/v1/alerts/{}", id)).await?;

    match format {
        OutputFormat::Json => print_json(&alert)?,
        OutputFormat::Table => {
            println!("ID:            {}", alert.id);
            println!("Pod:           {}", alert.pod);
            println!("Phase:         {}", alert.phase);
            println!("Status:        {}", color_status(&alert.status));
            println!("Severity:      {}", color_severity(&alert.severity));
            println!("Category:      {}", alert.category);
            println!("Raised at:     {}", alert.timestamp.to_rfc3339());
            println!(
                "Acknowledged:  {}",
                if alert.acknowledged { "yes" } else { "no" }
            );
            if let Some(summary) = &alert.summary {
                println!("\nSummary:\n{}", summary);
            }
        }
    }
    Ok(())
}

/// Acknowledge an alert
pub async fn acknowledge_alert(client: &ApiClient, id: &str, format: OutputFormat) -> Result<()> {
    let alert: Alert = client
        .post(&format!("api/v1/alerts/{}/acknowledge", id))
        .await?;

    match format {
        OutputFormat::Json => print_json(&alert)?,
        OutputFormat::Table => print_success(&format!("Alert {} acknowledged", alert.id)),
    }
    Ok(())
}

/// Show alert aggregates
pub async fn show_stats(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let stats: AlertStats = client.get("api/v1/alerts/stats").await?;

    match format {
        OutputFormat::Json => print_json(&stats)?,
        OutputFormat::Table => {
            println!("Total alerts:  {}", stats.total);
            println!("Firing:        {}", stats.firing);
            println!("Resolved:      {}", stats.resolved);
            println!("Acknowledged:  {}", stats.acknowledged);
            for (severity, count) in &stats.by_severity {
                println!("  {:<10} {}", color_severity(severity), count);
            }
            for (namespace, count) in &stats.by_namespace {
                println!("  {:<20} {}", namespace, count);
            }
        }
    }
    Ok(())
}

/// Drop alerts older than the given age
pub async fn evict_alerts(
    client: &ApiClient,
    older_than_secs: u64,
    format: OutputFormat,
) -> Result<()> {
    let path = format!("api/v1/alerts?older_than_secs={}", older_than_secs);
    let response: EvictResponse = client.delete(&path).await?;

    match format {
        OutputFormat::Json => print_json(&response)?,
        OutputFormat::Table => print_info(&format!("Removed {} alerts", response.removed)),
    }
    Ok(())
}
