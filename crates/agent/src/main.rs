//! Incident controller
//!
//! Watches pod lifecycle events cluster-wide, turns restarts and
//! failing phases into classified incidents and alerts, and serves
//! them over an HTTP API with live Server-Sent Events.

use anyhow::{Context, Result};
use incident_agent::{api, config::ControllerConfig};
use incident_lib::{
    dispatch::{Broadcaster, Notifier, WebhookDelivery},
    health::{components, HealthRegistry},
    incident::{
        AlertStore, Classifier, HttpTextGenerator, IncidentPipeline, IncidentStore,
        PipelineSettings, RootCauseEnricher,
    },
    observability::{ControllerMetrics, StructuredLogger},
    watch::{
        ClientProvider, KubeEventSource, MetricsServerUsage, UsageCache, UsagePoller,
        WatchConfig, WatchController,
    },
};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const CONTROLLER_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting incident-controller");

    let config = ControllerConfig::load().context("Failed to load configuration")?;
    info!(cluster = %config.cluster_name, api_port = config.api_port, "Controller configured");

    let health_registry = HealthRegistry::new();
    health_registry.register(components::WATCH).await;
    health_registry.register(components::ENRICHER).await;
    health_registry.register(components::NOTIFIER).await;
    health_registry.register(components::USAGE).await;

    let metrics = ControllerMetrics::new();
    let logger = StructuredLogger::new(&config.cluster_name);
    logger.log_startup(CONTROLLER_VERSION, config.api_port);

    let enricher = match &config.ai_endpoint {
        Some(endpoint) => {
            let mut generator = HttpTextGenerator::new(endpoint, &config.ai_model);
            if let Some(key) = &config.ai_api_key {
                generator = generator.with_api_key(key);
            }
            RootCauseEnricher::new(Arc::new(generator)).with_timeout(config.enrichment_timeout())
        }
        None => {
            info!("No text generation endpoint configured, using fallback analysis only");
            RootCauseEnricher::fallback_only()
        }
    };

    let notifier = match &config.notify_webhook_url {
        Some(url) => Notifier::new(Arc::new(WebhookDelivery::new(url)), config.recipient_list())
            .with_timeout(config.notify_timeout())
            .with_logger(logger.clone())
            .with_metrics(metrics.clone()),
        None => {
            info!("No notification webhook configured, notifications disabled");
            Notifier::disabled()
        }
    };

    let broadcaster = Broadcaster::new(config.broadcast_capacity);
    let usage = UsageCache::default();

    let pipeline = IncidentPipeline::builder()
        .classifier(Classifier::new(
            config.critical_namespace_list(),
            config.severity_window(),
        ))
        .enricher(enricher)
        .notifier(notifier)
        .incidents(IncidentStore::new(config.incident_capacity))
        .alerts(AlertStore::new(config.alert_capacity))
        .usage(usage.clone())
        .broadcaster(broadcaster.clone())
        .health(health_registry.clone())
        .metrics(metrics.clone())
        .logger(logger.clone())
        .settings(PipelineSettings {
            auto_heal: config.auto_heal,
            evict_on_delete: config.evict_on_delete,
        })
        .build()?;

    let provider = ClientProvider::infer();
    let controller = Arc::new(WatchController::new(
        Arc::new(KubeEventSource::new(provider.clone())),
        pipeline.clone(),
        WatchConfig {
            reconnect_delay: config.reconnect_delay(),
            ..WatchConfig::default()
        },
    ));

    let (shutdown_tx, _) = tokio::sync::broadcast::channel::<()>(1);

    let watch_handle = {
        let controller = Arc::clone(&controller);
        tokio::spawn(async move { controller.run().await })
    };

    let usage_handle = match config.usage_poll_interval() {
        Some(interval) => {
            let poller = UsagePoller::new(
                Arc::new(MetricsServerUsage::new(provider)),
                usage,
                broadcaster,
                health_registry.clone(),
                interval,
            );
            Some(tokio::spawn(poller.run(shutdown_tx.subscribe())))
        }
        None => {
            info!("Resource usage polling disabled");
            None
        }
    };

    let app_state = Arc::new(api::AppState::new(pipeline, controller.status_handle()));
    let api_handle = tokio::spawn(api::serve(
        config.api_port,
        app_state,
        shutdown_tx.subscribe(),
    ));

    // Mark controller as ready after initialization
    health_registry.set_ready(true).await;

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    logger.log_shutdown("SIGINT received");

    controller.stop();
    let _ = shutdown_tx.send(());

    if let Err(e) = watch_handle.await {
        warn!(error = %e, "Watch task ended abnormally");
    }
    if let Some(handle) = usage_handle {
        if let Err(e) = handle.await {
            warn!(error = %e, "Usage poller ended abnormally");
        }
    }
    match api_handle.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(error = %e, "API server failed"),
        Err(e) => warn!(error = %e, "API server task ended abnormally"),
    }

    info!("Shutdown complete");
    Ok(())
}
