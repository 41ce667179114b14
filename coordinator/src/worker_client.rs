use async_trait::async_trait;
use common::{InitWorkerTaskRequest, TaskId};
use reqwest::Client;
use tracing::debug;

/// Llamada saliente hacia un nodo.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerCall {
    Init(InitWorkerTaskRequest),
    Stop { task_id: TaskId },
}

impl WorkerCall {
    pub fn name(&self) -> &'static str {
        match self {
            WorkerCall::Init(_) => "init",
            WorkerCall::Stop { .. } => "stop",
        }
    }
}

/// Resultado de una llamada. Los errores son datos: un fan-out tiene que poder
/// seguir con el resto de los nodos.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub ok: bool,
    /// `None` si ni siquiera hubo respuesta HTTP
    pub status_code: Option<u16>,
    pub body: String,
}

impl Outcome {
    pub fn transport_error(reason: impl Into<String>) -> Self {
        Self {
            ok: false,
            status_code: None,
            body: reason.into(),
        }
    }
}

#[async_trait]
pub trait WorkerClient: Send + Sync {
    /// Un solo intento, sin reintentos ni timeout propio.
    async fn invoke(&self, node_address: &str, call: WorkerCall) -> Outcome;
}

/// Cliente HTTP real hacia los nodos:
/// - init: `POST {node}/task/init` con JSON
/// - stop: `POST {node}/task/stop/{task_id}`
#[derive(Debug, Clone, Default)]
pub struct HttpWorkerClient {
    client: Client,
}

impl HttpWorkerClient {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }
}

#[async_trait]
impl WorkerClient for HttpWorkerClient {
    async fn invoke(&self, node_address: &str, call: WorkerCall) -> Outcome {
        let request = match &call {
            WorkerCall::Init(payload) => self
                .client
                .post(format!("{}/task/init", node_address))
                .json(payload),
            WorkerCall::Stop { task_id } => self
                .client
                .post(format!("{}/task/stop/{}", node_address, task_id)),
        };

        let resp = match request.send().await {
            Ok(resp) => resp,
            Err(e) => return Outcome::transport_error(e.to_string()),
        };

        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        debug!(
            "{} -> {} respondió {}: {}",
            call.name(),
            node_address,
            status,
            body
        );

        Outcome {
            ok: status.is_success(),
            status_code: Some(status.as_u16()),
            body,
        }
    }
}
