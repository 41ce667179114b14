use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use common::{DomainError, ErrorBody, NodeKey, TaskId};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("tarea {task_id} no encontrada")]
    NotFound { task_id: TaskId },

    #[error("nodo {node_key} no existe en la tarea {task_id}")]
    NodeNotFound { task_id: TaskId, node_key: NodeKey },

    #[error("la tarea {task_id} ya existe")]
    AlreadyExists { task_id: TaskId },

    #[error("la tarea {task_id} ya fue detenida")]
    AlreadyStopped { task_id: TaskId },

    /// Fallo de transporte o status no-2xx de un nodo. Nunca corta un fan-out.
    #[error("falló la llamada al nodo {node_key}: {reason}")]
    WorkerCallFailed { node_key: NodeKey, reason: String },

    #[error("upload inválido: {0}")]
    InvalidUpload(String),

    #[error("no se pudo guardar la imagen de la tarea {task_id}: {reason}")]
    ImageWriteFailed { task_id: TaskId, reason: String },

    #[error("falló la persistencia: {0}")]
    PersistenceFailed(#[from] PersistError),

    #[error(transparent)]
    Invalid(#[from] DomainError),
}

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("error de io: {0}")]
    Io(#[from] std::io::Error),

    #[error("error de json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Backend(String),
}

impl CoordinatorError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            CoordinatorError::NotFound { .. } | CoordinatorError::NodeNotFound { .. } => {
                StatusCode::NOT_FOUND
            }
            CoordinatorError::AlreadyExists { .. } => StatusCode::CONFLICT,
            CoordinatorError::AlreadyStopped { .. }
            | CoordinatorError::Invalid(_)
            | CoordinatorError::InvalidUpload(_) => StatusCode::BAD_REQUEST,
            CoordinatorError::WorkerCallFailed { .. } => StatusCode::BAD_GATEWAY,
            CoordinatorError::ImageWriteFailed { .. } | CoordinatorError::PersistenceFailed(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for CoordinatorError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorBody {
            error: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
