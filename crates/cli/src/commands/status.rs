//! Controller status command

use anyhow::Result;
use colored::Colorize;

use crate::client::{ApiClient, ControllerStatus};
use crate::output::{color_status, print_json, OutputFormat};

/// Show watch state and record counts
pub async fn show_status(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let status: ControllerStatus = client.get("api/v1/status").await?;

    match format {
        OutputFormat::Json => print_json(&status)?,
        OutputFormat::Table => {
            let watch = &status.watch;
            let connected = if watch.connected {
                "connected".green().to_string()
            } else {
                "disconnected".red().to_string()
            };

            println!("Watch:               {} ({})", color_status(&watch.state), connected);
            println!("Reconnects:          {}", watch.reconnect_attempts);
            println!("Events processed:    {}", watch.events_processed);
            if let Some(at) = watch.last_event_at {
                println!("Last event:          {}", at.to_rfc3339());
            }
            if let Some(error) = &watch.last_error {
                println!("Last error:          {}", error.yellow());
            }
            println!("Tracked containers:  {}", status.tracked_containers);
            println!("Tracked pods:        {}", status.tracked_pods);
            println!(
                "Incidents:           {}/{}",
                status.incidents, status.incident_capacity
            );
            println!("Alerts:              {}/{}", status.alerts, status.alert_capacity);
            println!("Live subscribers:    {}", status.live_subscribers);
        }
    }
    Ok(())
}
