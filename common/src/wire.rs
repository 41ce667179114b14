use serde::{Deserialize, Serialize};

use crate::task::{Destination, NodeKey, TaskId, TaskKind, TaskStatus};

/* --------- API del coordinador --------- */

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitTaskRequest {
    pub kind: TaskKind,
    pub destination: Destination,

    /// Si no viene, se usa el nombre del tipo de tarea
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub priority: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InitStatus {
    Created,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitTaskResponse {
    pub task_id: TaskId,
    pub kind: TaskKind,
    pub name: String,
    pub destination: Destination,
    pub status: InitStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessRequest {
    pub image_count: u64,
    pub node_count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessResponse {
    pub task_id: TaskId,
    pub node_key: NodeKey,
    pub progress: f64,
    pub task_status: TaskStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StopTaskResponse {
    pub task_id: TaskId,
    pub status: TaskStatus,
}

/// Respuesta de FinishNode. Si la tarea no existe no es un error HTTP:
/// sólo viene `message` y `task_status` queda vacío.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinishNodeResponse {
    pub task_id: TaskId,
    pub node_key: NodeKey,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_status: Option<TaskStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageReceivedResponse {
    pub task_id: TaskId,
    pub file_name: String,
    pub image_count: u64,
    pub task_status: TaskStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

/* --------- RPC hacia los nodos --------- */

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitWorkerTaskRequest {
    pub kind: TaskKind,
    pub task_id: TaskId,
    pub node_key: NodeKey,
    pub name: String,
    pub priority: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerAck {
    pub ok: bool,
}
