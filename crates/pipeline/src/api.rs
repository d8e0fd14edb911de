//! HTTP API: health checks, Prometheus metrics, the query surface
//! consumed by dashboards and the CLI, and the WebSocket attach point
//! for live observers

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use futures_util::{SinkExt, StreamExt};
use pipeline_lib::{
    analytics::OutlierLog,
    broadcast::{BroadcastManager, OBSERVER_QUEUE_DEPTH},
    health::{ComponentStatus, HealthRegistry},
    observability::PipelineMetrics,
    store::{StoreError, TelemetryStore},
};
use prometheus::{Encoder, TextEncoder};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub health_registry: HealthRegistry,
    pub metrics: PipelineMetrics,
    pub store: TelemetryStore,
    pub broadcast: Arc<BroadcastManager>,
    pub outlier_log: Arc<OutlierLog>,
}

fn default_hours() -> u32 {
    24
}

#[derive(Debug, Deserialize)]
struct MeasurementsQuery {
    #[serde(default = "default_hours")]
    hours: u32,
    limit: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct WindowQuery {
    #[serde(default = "default_hours")]
    hours: u32,
}

#[derive(Debug, Deserialize)]
struct AlertsQuery {
    #[serde(default = "default_hours")]
    hours: u32,
    severity: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LogsQuery {
    #[serde(default = "default_hours")]
    hours: u32,
    level: Option<String>,
    component: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RecentOutliersQuery {
    #[serde(default = "default_outlier_limit")]
    limit: usize,
}

fn default_outlier_limit() -> usize {
    20
}

type ApiError = (StatusCode, Json<serde_json::Value>);

fn store_error(e: StoreError) -> ApiError {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": e.to_string() })),
    )
}

/// Run a blocking store query off the async worker threads
async fn query<T, F>(state: &AppState, f: F) -> Result<Json<T>, ApiError>
where
    T: Send + 'static,
    F: FnOnce(TelemetryStore) -> Result<T, StoreError> + Send + 'static,
{
    let store = state.store.clone();
    match tokio::task::spawn_blocking(move || f(store)).await {
        Ok(Ok(value)) => Ok(Json(value)),
        Ok(Err(e)) => Err(store_error(e)),
        Err(e) => Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": e.to_string() })),
        )),
    }
}

/// Health check - 200 if healthy/degraded, 503 if unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;
    let status_code = match health.status {
        ComponentStatus::Healthy => StatusCode::OK,
        ComponentStatus::Degraded => StatusCode::OK, // Still operational
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status_code, Json(health))
}

/// Readiness check - 200 once the pipeline is wired up
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;
    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status_code, Json(readiness))
}

/// Prometheus metrics endpoint
async fn metrics() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer).unwrap();
    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
}

async fn measurements(
    State(state): State<Arc<AppState>>,
    Query(params): Query<MeasurementsQuery>,
) -> impl IntoResponse {
    query(&state, move |store| {
        store.recent_measurements(params.hours, params.limit)
    })
    .await
}

async fn summaries(
    State(state): State<Arc<AppState>>,
    Query(params): Query<WindowQuery>,
) -> impl IntoResponse {
    query(&state, move |store| store.minute_summaries(params.hours)).await
}

async fn alerts(
    State(state): State<Arc<AppState>>,
    Query(params): Query<AlertsQuery>,
) -> impl IntoResponse {
    query(&state, move |store| {
        store.alert_events(params.hours, params.severity.as_deref())
    })
    .await
}

async fn logs(
    State(state): State<Arc<AppState>>,
    Query(params): Query<LogsQuery>,
) -> impl IntoResponse {
    query(&state, move |store| {
        store.system_logs(
            params.hours,
            params.level.as_deref(),
            params.component.as_deref(),
        )
    })
    .await
}

async fn stats(
    State(state): State<Arc<AppState>>,
    Query(params): Query<WindowQuery>,
) -> impl IntoResponse {
    query(&state, move |store| store.window_stats(params.hours)).await
}

async fn outlier_summary(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.outlier_log.summary().await)
}

async fn recent_outliers(
    State(state): State<Arc<AppState>>,
    Query(params): Query<RecentOutliersQuery>,
) -> impl IntoResponse {
    Json(state.outlier_log.recent(params.limit).await)
}

/// Observer attach point: upgrades to a WebSocket and registers the
/// connection with the broadcast manager
async fn ws(State(state): State<Arc<AppState>>, upgrade: WebSocketUpgrade) -> impl IntoResponse {
    upgrade.on_upgrade(move |socket| observe(socket, state))
}

async fn observe(socket: WebSocket, state: Arc<AppState>) {
    let (tx, mut rx) = mpsc::channel::<String>(OBSERVER_QUEUE_DEPTH);
    let id = state.broadcast.connect(tx);
    state
        .metrics
        .set_connected_observers(state.broadcast.observer_count() as i64);

    let (mut sink, mut stream) = socket.split();
    let forward = async {
        while let Some(text) = rx.recv().await {
            if sink.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    };
    let drain = async {
        while let Some(Ok(message)) = stream.next().await {
            if matches!(message, Message::Close(_)) {
                break;
            }
        }
    };
    tokio::select! {
        _ = forward => {}
        _ = drain => {}
    }

    state.broadcast.disconnect(id);
    state
        .metrics
        .set_connected_observers(state.broadcast.observer_count() as i64);
    debug!(observer_id = id, "WebSocket observer detached");
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .route("/ws", get(ws))
        .route("/api/measurements", get(measurements))
        .route("/api/summaries", get(summaries))
        .route("/api/alerts", get(alerts))
        .route("/api/logs", get(logs))
        .route("/api/stats", get(stats))
        .route("/api/outliers/summary", get(outlier_summary))
        .route("/api/outliers/recent", get(recent_outliers))
        .with_state(state)
}

/// Start the API server
pub async fn serve(port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
