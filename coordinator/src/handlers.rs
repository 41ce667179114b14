use axum::{
    extract::{Multipart, Path, State},
    routing::{get, post},
    Json, Router,
};
use common::{
    Destination, FinishNodeResponse, ImageReceivedResponse, InitTaskRequest, InitTaskResponse,
    ProcessRequest, ProcessResponse, StopTaskResponse, Task, TaskKind,
};
use tower_http::trace::TraceLayer;

use crate::coordinator::FinishOutcome;
use crate::error::CoordinatorError;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/v1/tasks", post(create_task).get(list_tasks))
        .route("/api/v1/tasks/:id", get(get_task))
        .route("/api/v1/tasks/:id/stop", post(stop_task))
        .route("/api/v1/tasks/:id/nodes/:node/process", post(process_update))
        .route("/api/v1/tasks/:id/nodes/:node/finish", post(finish_node))
        .route("/api/v1/tasks/:id/images", post(upload_image))
        // rutas de la API vieja
        .route("/image/:id", post(upload_image))
        .route("/task/init/:kind/:destination", get(legacy_init_task))
        .route("/task/status/:id", get(get_task))
        .route("/task/stop/:id", get(stop_task))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/* ---------------- handlers HTTP ---------------- */

async fn health() -> &'static str {
    "ok"
}

async fn create_task(
    State(state): State<AppState>,
    Json(req): Json<InitTaskRequest>,
) -> Result<Json<InitTaskResponse>, CoordinatorError> {
    let resp = state
        .coordinator
        .init_task(req.kind, req.destination, req.name, req.priority)
        .await?;
    Ok(Json(resp))
}

// kind puede venir como código ("1", "2") o como nombre
async fn legacy_init_task(
    State(state): State<AppState>,
    Path((kind, destination)): Path<(String, String)>,
) -> Result<Json<InitTaskResponse>, CoordinatorError> {
    let kind: TaskKind = kind.parse()?;
    let destination: Destination = destination.parse()?;
    let resp = state
        .coordinator
        .init_task(kind, destination, None, 0)
        .await?;
    Ok(Json(resp))
}

async fn list_tasks(State(state): State<AppState>) -> Json<Vec<Task>> {
    Json(state.coordinator.list_tasks())
}

async fn get_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Task>, CoordinatorError> {
    Ok(Json(state.coordinator.get_status(&id)?))
}

async fn stop_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<StopTaskResponse>, CoordinatorError> {
    Ok(Json(state.coordinator.stop_task(&id).await?))
}

async fn process_update(
    State(state): State<AppState>,
    Path((id, node)): Path<(String, String)>,
    Json(req): Json<ProcessRequest>,
) -> Result<Json<ProcessResponse>, CoordinatorError> {
    let resp = state
        .coordinator
        .process_update(&id, &node, req.image_count, req.node_count)
        .await?;
    Ok(Json(resp))
}

async fn finish_node(
    State(state): State<AppState>,
    Path((id, node)): Path<(String, String)>,
) -> Result<Json<FinishNodeResponse>, CoordinatorError> {
    let resp = match state.coordinator.finish_node(&id, &node).await? {
        FinishOutcome::TaskNotFound { message } => FinishNodeResponse {
            task_id: id,
            node_key: node,
            task_status: None,
            message: Some(message),
        },
        FinishOutcome::Recorded { node: record, task_status } => FinishNodeResponse {
            task_id: id,
            node_key: record.node_key,
            task_status: Some(task_status),
            message: None,
        },
    };
    Ok(Json(resp))
}

// multipart con el archivo en el campo `image`
async fn upload_image(
    State(state): State<AppState>,
    Path(id): Path<String>,
    mut multipart: Multipart,
) -> Result<Json<ImageReceivedResponse>, CoordinatorError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| CoordinatorError::InvalidUpload(e.to_string()))?
    {
        if field.name() != Some("image") {
            continue;
        }
        let bytes = field
            .bytes()
            .await
            .map_err(|e| CoordinatorError::InvalidUpload(e.to_string()))?;
        let resp = state.coordinator.receive_image(&id, bytes.to_vec()).await?;
        return Ok(Json(resp));
    }
    Err(CoordinatorError::InvalidUpload("falta el campo image".to_string()))
}
