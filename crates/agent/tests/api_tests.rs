//! Integration tests for the controller API endpoints

use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    Router,
};
use chrono::{Duration, Utc};
use incident_agent::api::{create_router, AppState};
use incident_lib::{
    health::{components, HealthRegistry},
    incident::{AlertStore, IncidentPipeline, IncidentStore, PipelineSettings},
    observability::ControllerMetrics,
    watch::WatchStatusHandle,
    ContainerSnapshot, ContainerTermination, PodIdentity, WorkloadEvent, WorkloadPhase,
    WorkloadSnapshot,
};
use prometheus::Registry;
use std::sync::Arc;
use tower::ServiceExt;

fn snapshot(phase: WorkloadPhase, restart_count: u32) -> WorkloadSnapshot {
    WorkloadSnapshot {
        pod: PodIdentity::new("orders", "checkout-7f8"),
        uid: Some("uid-1".to_string()),
        phase,
        phase_reason: None,
        unschedulable: false,
        node_name: Some("node-a".to_string()),
        containers: vec![ContainerSnapshot {
            name: "api".to_string(),
            restart_count,
            last_state: Some(ContainerTermination {
                reason: Some("OOMKilled".to_string()),
                message: Some("memory limit exceeded".to_string()),
                exit_code: Some(137),
            }),
        }],
    }
}

async fn setup_test_app() -> (Router, IncidentPipeline) {
    let health_registry = HealthRegistry::new();
    health_registry.register(components::WATCH).await;
    health_registry.register(components::ENRICHER).await;

    let pipeline = IncidentPipeline::builder()
        .incidents(IncidentStore::new(50))
        .alerts(AlertStore::new(20))
        .health(health_registry)
        .metrics(ControllerMetrics::with_registry(&Registry::new()).unwrap())
        .settings(PipelineSettings {
            auto_heal: false,
            evict_on_delete: false,
        })
        .build()
        .unwrap();

    let state = Arc::new(AppState::new(pipeline.clone(), WatchStatusHandle::default()));
    (create_router(state), pipeline)
}

/// Record one restart incident detected at `detected_at`
async fn seed_incident(pipeline: &IncidentPipeline, detected_at: chrono::DateTime<Utc>) -> String {
    pipeline
        .handle_at(
            WorkloadEvent::Added(snapshot(WorkloadPhase::Running, 0)),
            detected_at,
        )
        .await
        .wait()
        .await;
    let outcome = pipeline
        .handle_at(
            WorkloadEvent::Modified(snapshot(WorkloadPhase::Running, 1)),
            detected_at,
        )
        .await;
    let id = outcome.incident_ids[0].clone();
    outcome.wait().await;
    id
}

async fn send(app: &Router, method: Method, uri: &str) -> (StatusCode, serde_json::Value) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method(method)
                .uri(uri)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if body.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&body).unwrap()
    };
    (status, json)
}

#[tokio::test]
async fn test_healthz_returns_ok_when_healthy() {
    let (app, _pipeline) = setup_test_app().await;

    let (status, health) = send(&app, Method::GET, "/healthz").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["status"], "healthy");
}

#[tokio::test]
async fn test_healthz_returns_ok_when_watch_degraded() {
    let (app, pipeline) = setup_test_app().await;

    pipeline
        .health()
        .set_degraded(components::WATCH, "API server unreachable")
        .await;

    let (status, health) = send(&app, Method::GET, "/healthz").await;

    // Degraded still returns 200 (operational)
    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["status"], "degraded");
}

#[tokio::test]
async fn test_healthz_returns_503_when_unhealthy() {
    let (app, pipeline) = setup_test_app().await;

    pipeline
        .health()
        .set_unhealthy(components::ENRICHER, "Failed")
        .await;

    let (status, health) = send(&app, Method::GET, "/healthz").await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(health["status"], "unhealthy");
}

#[tokio::test]
async fn test_readyz_follows_readiness() {
    let (app, pipeline) = setup_test_app().await;

    let (status, readiness) = send(&app, Method::GET, "/readyz").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(readiness["ready"], false);

    pipeline.health().set_ready(true).await;

    let (status, readiness) = send(&app, Method::GET, "/readyz").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(readiness["ready"], true);
}

#[tokio::test]
async fn test_metrics_endpoint_returns_prometheus_text() {
    let (app, _pipeline) = setup_test_app().await;

    let response = app
        .oneshot(
            Request::builder()
                .uri("/metrics")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers().get("content-type").unwrap();
    assert!(content_type.to_str().unwrap().starts_with("text/plain"));
}

#[tokio::test]
async fn test_status_reports_watch_and_counts() {
    let (app, pipeline) = setup_test_app().await;
    seed_incident(&pipeline, Utc::now()).await;

    let (status, body) = send(&app, Method::GET, "/api/v1/status").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["watch"]["state"], "idle");
    assert_eq!(body["watch"]["connected"], false);
    assert_eq!(body["trackedContainers"], 1);
    assert_eq!(body["trackedPods"], 1);
    assert_eq!(body["incidents"], 1);
    assert_eq!(body["incidentCapacity"], 50);
    assert_eq!(body["alertCapacity"], 20);
}

#[tokio::test]
async fn test_list_and_get_incidents() {
    let (app, pipeline) = setup_test_app().await;
    let id = seed_incident(&pipeline, Utc::now()).await;

    let (status, list) = send(&app, Method::GET, "/api/v1/incidents?limit=10").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list.as_array().unwrap().len(), 1);
    assert_eq!(list[0]["id"], id.as_str());
    assert_eq!(list[0]["category"], "OutOfMemory");
    assert_eq!(list[0]["restartCount"], 1);

    let (status, incident) = send(&app, Method::GET, &format!("/api/v1/incidents/{}", id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(incident["pod"]["namespace"], "orders");
    assert!(incident["rootCauseSummary"]
        .as_str()
        .unwrap()
        .contains("OOMKilled"));
}

#[tokio::test]
async fn test_invalid_limit_is_rejected() {
    let (app, _pipeline) = setup_test_app().await;

    let (status, body) = send(&app, Method::GET, "/api/v1/incidents?limit=0").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("limit"));

    let (status, _) = send(&app, Method::GET, "/api/v1/incidents?limit=51").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app, Method::GET, "/api/v1/alerts?limit=21").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_unknown_incident_returns_404() {
    let (app, _pipeline) = setup_test_app().await;

    let (status, body) = send(&app, Method::GET, "/api/v1/incidents/inc-missing").await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("inc-missing"));
}

#[tokio::test]
async fn test_resolve_incident_once() {
    let (app, pipeline) = setup_test_app().await;
    let id = seed_incident(&pipeline, Utc::now()).await;
    let uri = format!("/api/v1/incidents/{}/resolve", id);

    let (status, incident) = send(&app, Method::POST, &uri).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(incident["status"], "healed");
    assert!(incident["healedAt"].is_string());

    let (status, _) = send(&app, Method::POST, &uri).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_incident_stats() {
    let (app, pipeline) = setup_test_app().await;
    seed_incident(&pipeline, Utc::now()).await;

    let (status, stats) = send(&app, Method::GET, "/api/v1/incidents/stats").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["total"], 1);

    let (status, _) = send(&app, Method::GET, "/api/v1/incidents/stats?top=0").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app, Method::GET, "/api/v1/incidents/stats?top=51").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_evict_incidents() {
    let (app, pipeline) = setup_test_app().await;
    seed_incident(&pipeline, Utc::now() - Duration::hours(2)).await;

    let (status, _) = send(&app, Method::DELETE, "/api/v1/incidents").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(
        &app,
        Method::DELETE,
        "/api/v1/incidents?older_than_secs=86400",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["removed"], 0);

    let (status, body) = send(
        &app,
        Method::DELETE,
        "/api/v1/incidents?older_than_secs=3600",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["removed"], 1);
    assert_eq!(pipeline.incidents().len().await, 0);
}

#[tokio::test]
async fn test_evict_with_oversized_age() {
    let (app, pipeline) = setup_test_app().await;
    seed_incident(&pipeline, Utc::now()).await;

    // Representable as a duration, but reaches back before the earliest date
    let (status, body) = send(
        &app,
        Method::DELETE,
        "/api/v1/incidents?older_than_secs=10000000000000",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["removed"], 0);

    let (status, body) = send(
        &app,
        Method::DELETE,
        "/api/v1/alerts?older_than_secs=10000000000000",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["removed"], 0);

    // Too large for a duration at all
    let (status, body) = send(
        &app,
        Method::DELETE,
        "/api/v1/incidents?older_than_secs=86399999999913600",
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("older_than_secs"));

    assert_eq!(pipeline.incidents().len().await, 1);
}

#[tokio::test]
async fn test_malformed_query_returns_json_error() {
    let (app, _pipeline) = setup_test_app().await;

    for uri in [
        "/api/v1/incidents?limit=abc",
        "/api/v1/incidents/stats?top=many",
        "/api/v1/alerts?older_than_secs=1h",
    ] {
        let method = if uri.contains("older_than_secs") {
            Method::DELETE
        } else {
            Method::GET
        };
        let (status, body) = send(&app, method, uri).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{}", uri);
        assert!(
            body["error"].as_str().unwrap().contains("query"),
            "{}",
            uri
        );
    }
}

#[tokio::test]
async fn test_alert_lifecycle() {
    let (app, pipeline) = setup_test_app().await;

    let outcome = pipeline
        .handle(WorkloadEvent::Modified(snapshot(WorkloadPhase::Failed, 0)))
        .await;
    let id = outcome.alert_id.clone().unwrap();
    outcome.wait().await;

    let (status, list) = send(&app, Method::GET, "/api/v1/alerts").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list[0]["id"], id.as_str());
    assert_eq!(list[0]["status"], "firing");

    let uri = format!("/api/v1/alerts/{}/acknowledge", id);
    let (status, alert) = send(&app, Method::POST, &uri).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(alert["acknowledged"], true);

    let (status, _) = send(&app, Method::POST, &uri).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, stats) = send(&app, Method::GET, "/api/v1/alerts/stats").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["firing"], 1);
    assert_eq!(stats["acknowledged"], 1);

    let (status, _) = send(&app, Method::GET, "/api/v1/alerts/alr-missing").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_events_stream_is_server_sent_events() {
    let (app, pipeline) = setup_test_app().await;

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/v1/events")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers().get("content-type").unwrap();
    assert!(content_type
        .to_str()
        .unwrap()
        .starts_with("text/event-stream"));
    assert_eq!(pipeline.broadcaster().subscriber_count(), 1);
}
