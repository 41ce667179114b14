use anyhow::{Context, Result};
use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use common::{InitWorkerTaskRequest, NodeKey, ProcessRequest, TaskId, WorkerAck};
use reqwest::Client;
use std::{
    collections::HashMap,
    env,
    future::Future,
    net::SocketAddr,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};
use tokio::{net::TcpListener, task::JoinHandle, time::sleep};
use tracing::{debug, info, warn};

const DEFAULT_IMAGES_PER_TASK: u64 = common::TASK_IMAGE_LIMIT;
const DEFAULT_IMAGES_PER_REPORT: u64 = 120;
const DEFAULT_REPORT_INTERVAL_MS: u64 = 2000;

/// Configuración del nodo simulado, leída de variables de entorno.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub node_key: NodeKey,
    pub bind: SocketAddr,
    /// En Docker: COORDINATOR_URL=http://coordinator:8080
    pub coordinator_url: String,
    pub images_per_task: u64,
    pub images_per_report: u64,
    pub report_interval: Duration,
    /// Cantidad de nodos que reporta el edge en cada process
    pub node_count: u64,
}

impl NodeConfig {
    pub fn from_env() -> Result<Self> {
        let node_key = env::var("NODE_KEY").unwrap_or_else(|_| "0".to_string());
        let bind = env::var("NODE_BIND")
            .unwrap_or_else(|_| "0.0.0.0:9000".to_string())
            .parse()
            .context("NODE_BIND inválido")?;
        let coordinator_url = env::var("COORDINATOR_URL")
            .unwrap_or_else(|_| "http://localhost:8080".to_string())
            .trim_end_matches('/')
            .to_string();

        Ok(Self {
            node_key,
            bind,
            coordinator_url,
            images_per_task: env_u64("IMAGES_PER_TASK", DEFAULT_IMAGES_PER_TASK)?,
            images_per_report: env_u64("IMAGES_PER_REPORT", DEFAULT_IMAGES_PER_REPORT)?.max(1),
            report_interval: Duration::from_millis(env_u64(
                "REPORT_INTERVAL_MS",
                DEFAULT_REPORT_INTERVAL_MS,
            )?),
            node_count: env_u64("NODE_COUNT", 1)?.max(1),
        })
    }
}

fn env_u64(var: &str, default: u64) -> Result<u64> {
    match env::var(var) {
        Ok(raw) => raw
            .parse::<u64>()
            .with_context(|| format!("{} inválido: {}", var, raw)),
        Err(_) => Ok(default),
    }
}

/// Loops de reporte activos, por tarea. Cada loop se borra solo al terminar.
#[derive(Clone, Default)]
struct RunningTasks(Arc<Mutex<HashMap<TaskId, JoinHandle<()>>>>);

impl RunningTasks {
    fn lock(&self) -> MutexGuard<'_, HashMap<TaskId, JoinHandle<()>>> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Lanza `job` para la tarea, reemplazando (y abortando) uno anterior.
    /// El handle entra al mapa antes de que el job pueda terminar y borrarse.
    fn start<F>(&self, task_id: TaskId, job: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut running = self.lock();
        let registry = self.clone();
        let id = task_id.clone();
        let handle = tokio::spawn(async move {
            job.await;
            registry.lock().remove(&id);
        });
        if let Some(old) = running.insert(task_id, handle) {
            old.abort();
        }
    }

    /// Aborta el loop de la tarea. Devuelve si estaba corriendo.
    fn stop(&self, task_id: &str) -> bool {
        match self.lock().remove(task_id) {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    fn len(&self) -> usize {
        self.lock().len()
    }
}

#[derive(Clone)]
struct NodeState {
    config: Arc<NodeConfig>,
    client: Client,
    running: RunningTasks,
}

/// Levanta el servidor del nodo: recibe init/stop del coordinador y, por cada
/// tarea iniciada, le reporta avance hasta terminar.
pub async fn run(config: NodeConfig) -> Result<()> {
    let hostname = hostname::get()
        .unwrap_or_default()
        .to_string_lossy()
        .to_string();

    let bind = config.bind;
    let state = NodeState {
        config: Arc::new(config),
        client: Client::new(),
        running: RunningTasks::default(),
    };

    info!(
        "nodo {} en {} reportando a {}",
        state.config.node_key, hostname, state.config.coordinator_url
    );

    let app = Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/task/init", post(init_task))
        .route("/task/stop/:id", post(stop_task))
        .with_state(state);

    let listener = TcpListener::bind(bind).await?;
    info!("nodo escuchando en {}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}

async fn init_task(
    State(state): State<NodeState>,
    Json(req): Json<InitWorkerTaskRequest>,
) -> Json<WorkerAck> {
    if req.node_key != state.config.node_key {
        warn!(
            "init para el nodo {} recibido en el nodo {}",
            req.node_key, state.config.node_key
        );
    }
    info!(
        "tarea {} {} ({}) iniciada, prioridad {}",
        req.kind, req.task_id, req.name, req.priority
    );

    let task_id = req.task_id.clone();
    let loop_state = state.clone();
    state.running.start(task_id, async move {
        report_loop(&loop_state, &req.task_id, &req.node_key).await;
    });
    debug!("{} loops de reporte activos", state.running.len());

    Json(WorkerAck { ok: true })
}

async fn stop_task(State(state): State<NodeState>, Path(id): Path<String>) -> Json<WorkerAck> {
    if state.running.stop(&id) {
        info!("tarea {} detenida", id);
    } else {
        info!("stop para la tarea {} que no estaba corriendo", id);
    }
    Json(WorkerAck { ok: true })
}

/// Simula la captura de imágenes: cada intervalo suma un lote y lo reporta.
/// Al llegar al total avisa finish y termina.
async fn report_loop(state: &NodeState, task_id: &str, node_key: &str) {
    let cfg = &state.config;
    let base = format!(
        "{}/api/v1/tasks/{}/nodes/{}",
        cfg.coordinator_url, task_id, node_key
    );

    let mut images: u64 = 0;
    while images < cfg.images_per_task {
        sleep(cfg.report_interval).await;
        images = (images + cfg.images_per_report).min(cfg.images_per_task);

        let res = state
            .client
            .post(format!("{}/process", base))
            .json(&ProcessRequest {
                image_count: images,
                node_count: cfg.node_count,
            })
            .send()
            .await;

        match res {
            Ok(resp) if resp.status().is_success() => {
                info!("tarea {}: {} imágenes reportadas", task_id, images)
            }
            Ok(resp) => {
                warn!(
                    "coordinador devolvió status {} al reportar la tarea {}",
                    resp.status(),
                    task_id
                );
                if resp.status() == reqwest::StatusCode::NOT_FOUND {
                    return;
                }
            }
            Err(e) => warn!("error HTTP reportando la tarea {}: {:?}", task_id, e),
        }
    }

    match state.client.post(format!("{}/finish", base)).send().await {
        Ok(resp) => info!("tarea {} terminada, finish -> {}", task_id, resp.status()),
        Err(e) => warn!("error HTTP en finish de la tarea {}: {:?}", task_id, e),
    }
}
