//! HTTP API for incident queries, health checks and Prometheus metrics

use axum::{
    async_trait,
    extract::{rejection::QueryRejection, FromRequestParts, Path, Query, State},
    http::{request::Parts, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use incident_lib::{
    error::validate_limit,
    health::{ComponentStatus, HealthRegistry},
    incident::{AlertStats, IncidentPipeline, IncidentStats},
    watch::{WatchStatus, WatchStatusHandle},
    AlertRecord, Incident, QueryError,
};
use prometheus::{Encoder, TextEncoder};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;
use tokio_stream::{wrappers::BroadcastStream, Stream, StreamExt};
use tracing::{debug, error, info};

const DEFAULT_TOP_PODS: usize = 5;
const MAX_TOP_PODS: i64 = 50;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub pipeline: IncidentPipeline,
    pub watch_status: WatchStatusHandle,
}

impl AppState {
    pub fn new(pipeline: IncidentPipeline, watch_status: WatchStatusHandle) -> Self {
        Self {
            pipeline,
            watch_status,
        }
    }

    fn health_registry(&self) -> &HealthRegistry {
        self.pipeline.health()
    }
}

/// Query failures rendered as `{ "error": "..." }`
#[derive(Debug)]
pub struct ApiError(QueryError);

impl From<QueryError> for ApiError {
    fn from(err: QueryError) -> Self {
        Self(err)
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.0 {
            QueryError::NotFound { .. } => StatusCode::NOT_FOUND,
            QueryError::InvalidParameter { .. } => StatusCode::BAD_REQUEST,
        };
        let body = ErrorBody {
            error: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self(QueryError::invalid("query", rejection.body_text()))
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

/// `Query` whose rejections use the JSON error body
#[derive(Debug)]
pub struct ApiQuery<T>(pub T);

#[async_trait]
impl<T, S> FromRequestParts<S> for ApiQuery<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(value) = Query::<T>::from_request_parts(parts, state).await?;
        Ok(Self(value))
    }
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct StatsParams {
    pub top: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct EvictParams {
    pub older_than_secs: Option<i64>,
}

impl EvictParams {
    fn age(&self) -> Result<chrono::Duration, QueryError> {
        match self.older_than_secs {
            None => Err(QueryError::invalid("older_than_secs", "is required")),
            Some(secs) if secs < 0 => {
                Err(QueryError::invalid("older_than_secs", "must not be negative"))
            }
            Some(secs) => chrono::Duration::try_seconds(secs)
                .ok_or_else(|| QueryError::invalid("older_than_secs", "is out of range")),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct EvictResponse {
    pub removed: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub watch: WatchStatus,
    pub tracked_containers: usize,
    pub tracked_pods: usize,
    pub incidents: usize,
    pub incident_capacity: usize,
    pub alerts: usize,
    pub alert_capacity: usize,
    pub live_subscribers: usize,
}

/// Health check response - returns 200 if healthy or degraded, 503 if unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry().health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy => StatusCode::OK,
        ComponentStatus::Degraded => StatusCode::OK,
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

/// Readiness check response - returns 200 if ready, 503 if not ready
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry().readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Prometheus metrics endpoint
async fn metrics() -> Response {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!(error = %e, "Failed to encode metrics");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
        .into_response()
}

async fn status(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    let pipeline = &state.pipeline;
    Json(StatusResponse {
        watch: state.watch_status.snapshot().await,
        tracked_containers: pipeline.tracker().tracked_containers(),
        tracked_pods: pipeline.tracker().tracked_pods(),
        incidents: pipeline.incidents().len().await,
        incident_capacity: pipeline.incidents().capacity().await,
        alerts: pipeline.alerts().len().await,
        alert_capacity: pipeline.alerts().capacity().await,
        live_subscribers: pipeline.broadcaster().subscriber_count(),
    })
}

async fn list_incidents(
    State(state): State<Arc<AppState>>,
    ApiQuery(params): ApiQuery<ListParams>,
) -> ApiResult<Vec<Incident>> {
    let store = state.pipeline.incidents();
    let limit = validate_limit(params.limit, store.capacity().await)?;
    Ok(Json(store.list(limit).await))
}

async fn incident_stats(
    State(state): State<Arc<AppState>>,
    ApiQuery(params): ApiQuery<StatsParams>,
) -> ApiResult<IncidentStats> {
    let top = match params.top {
        None => DEFAULT_TOP_PODS,
        Some(top) if (1..=MAX_TOP_PODS).contains(&top) => top as usize,
        Some(_) => {
            let reason = format!("must be between 1 and {}", MAX_TOP_PODS);
            return Err(QueryError::invalid("top", reason).into());
        }
    };
    Ok(Json(state.pipeline.incidents().stats(top).await))
}

async fn get_incident(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Incident> {
    state
        .pipeline
        .incidents()
        .get(&id)
        .await
        .map(Json)
        .ok_or_else(|| QueryError::not_found("incident", id).into())
}

async fn resolve_incident(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Incident> {
    let incident = state.pipeline.resolve_incident(&id).await?;
    Ok(Json(incident))
}

async fn evict_incidents(
    State(state): State<Arc<AppState>>,
    ApiQuery(params): ApiQuery<EvictParams>,
) -> ApiResult<EvictResponse> {
    let age = params.age()?;
    let removed = state.pipeline.incidents().evict_older_than(age).await;
    info!(
        removed = removed,
        older_than_secs = age.num_seconds(),
        "Evicted incidents"
    );
    Ok(Json(EvictResponse { removed }))
}

async fn list_alerts(
    State(state): State<Arc<AppState>>,
    ApiQuery(params): ApiQuery<ListParams>,
) -> ApiResult<Vec<AlertRecord>> {
    let store = state.pipeline.alerts();
    let limit = validate_limit(params.limit, store.capacity().await)?;
    Ok(Json(store.list(limit).await))
}

async fn alert_stats(State(state): State<Arc<AppState>>) -> Json<AlertStats> {
    Json(state.pipeline.alerts().stats().await)
}

async fn get_alert(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<AlertRecord> {
    state
        .pipeline
        .alerts()
        .get(&id)
        .await
        .map(Json)
        .ok_or_else(|| QueryError::not_found("alert", id).into())
}

async fn acknowledge_alert(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<AlertRecord> {
    let alert = state.pipeline.acknowledge_alert(&id).await?;
    Ok(Json(alert))
}

async fn evict_alerts(
    State(state): State<Arc<AppState>>,
    ApiQuery(params): ApiQuery<EvictParams>,
) -> ApiResult<EvictResponse> {
    let age = params.age()?;
    let removed = state.pipeline.alerts().evict_older_than(age).await;
    info!(
        removed = removed,
        older_than_secs = age.num_seconds(),
        "Evicted alerts"
    );
    Ok(Json(EvictResponse { removed }))
}

/// Live updates as Server-Sent Events; lagging clients skip missed updates
async fn events(
    State(state): State<Arc<AppState>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let updates = BroadcastStream::new(state.pipeline.broadcaster().subscribe());

    let stream = updates.filter_map(|update| match update {
        Ok(update) => match Event::default()
            .event(update.event_name())
            .json_data(&update)
        {
            Ok(event) => Some(Ok(event)),
            Err(e) => {
                error!(error = %e, "Failed to encode live update");
                None
            }
        },
        Err(e) => {
            debug!(error = %e, "Live update subscriber lagged");
            None
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .route("/api/v1/status", get(status))
        .route(
            "/api/v1/incidents",
            get(list_incidents).delete(evict_incidents),
        )
        .route("/api/v1/incidents/stats", get(incident_stats))
        .route("/api/v1/incidents/:id", get(get_incident))
        .route("/api/v1/incidents/:id/resolve", post(resolve_incident))
        .route("/api/v1/alerts", get(list_alerts).delete(evict_alerts))
        .route("/api/v1/alerts/stats", get(alert_stats))
        .route("/api/v1/alerts/:id", get(get_alert))
        .route("/api/v1/alerts/:id/acknowledge", post(acknowledge_alert))
        .route("/api/v1/events", get(events))
        .with_state(state)
}

/// Start the API server and run it until shutdown is signalled
pub async fn serve(
    port: u16,
    state: Arc<AppState>,
    mut shutdown: tokio::sync::broadcast::Receiver<()>,
) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
        })
        .await?;

    Ok(())
}
