// src/api/handlers.rs

use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{delete, get, post},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::activity::{ActivityEntry, ActivityLog};
use crate::api::response::ApiResult;
use crate::control::{
    BatchReport, DispatchCoordinator, DispatchStats, PollerStatus, RegistryPoller,
    ReplicaController, ReplicaStatus, WorkerRegistry, WorkerSnapshot,
};

// Application state
pub struct AppState {
    pub registry: Arc<WorkerRegistry>,
    pub poller: Arc<RegistryPoller>,
    pub replicas: Arc<ReplicaController>,
    pub dispatcher: Arc<DispatchCoordinator>,
    pub activity: Arc<ActivityLog>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessImagesRequest {
    pub file_names: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateReplicasRequest {
    pub min_replicas: u32,
    pub max_replicas: u32,
}

#[derive(Serialize)]
pub struct StatsResponse {
    pub stats: DispatchStats,
    pub success_rate: f64,
    pub average_batch_time_ms: u64,
    pub dispatching: bool,
    pub poller: PollerStatus,
    pub poll_attempts: u64,
}

// Create routes for the control surface
pub fn create_api_routes(app_state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/workers", get(list_workers))
        .route("/api/workers/:name", delete(delete_worker))
        .route("/api/process-images", post(process_images))
        .route("/api/replicas", get(get_replicas))
        .route("/api/update-replicas", post(update_replicas))
        .route("/api/activity", get(get_activity))
        .route("/api/stats", get(get_stats))
        .with_state(app_state)
}

async fn health_check() -> &'static str {
    "OK"
}

// Current published worker set
async fn list_workers(State(state): State<Arc<AppState>>) -> ApiResult<WorkerSnapshot> {
    let snapshot = state.registry.snapshot().await;
    ApiResult::Ok(snapshot.as_ref().clone())
}

// Delete a worker, then refresh so the dashboard sees it terminating
async fn delete_worker(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> ApiResult<String> {
    let result = state.registry.delete(&name).await;
    if result.is_ok() {
        state.poller.refresh_now();
    }
    result.map(|()| format!("deletion of {} requested", name)).into()
}

async fn process_images(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ProcessImagesRequest>,
) -> ApiResult<BatchReport> {
    state
        .dispatcher
        .clone()
        .dispatch_detached(request.file_names)
        .await
        .into()
}

async fn get_replicas(State(state): State<Arc<AppState>>) -> ApiResult<ReplicaStatus> {
    ApiResult::Ok(state.replicas.status().await)
}

async fn update_replicas(
    State(state): State<Arc<AppState>>,
    Json(request): Json<UpdateReplicasRequest>,
) -> ApiResult<ReplicaStatus> {
    state
        .dispatcher
        .configure_replicas(request.min_replicas, request.max_replicas)
        .await
        .into()
}

async fn get_activity(State(state): State<Arc<AppState>>) -> ApiResult<Vec<ActivityEntry>> {
    ApiResult::Ok(state.activity.snapshot())
}

async fn get_stats(State(state): State<Arc<AppState>>) -> ApiResult<StatsResponse> {
    let stats = state.dispatcher.stats().await;

    ApiResult::Ok(StatsResponse {
        success_rate: stats.success_rate(),
        average_batch_time_ms: stats.average_batch_time_ms(),
        stats,
        dispatching: state.dispatcher.is_dispatching(),
        poller: state.poller.status().await,
        poll_attempts: state.poller.ticks(),
    })
}
