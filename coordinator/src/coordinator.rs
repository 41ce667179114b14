use std::sync::Arc;

use common::{
    new_task_id, progress, Destination, ImageReceivedResponse, InitStatus, InitTaskResponse,
    InitWorkerTaskRequest, NodeRecord, NodeStatus, ProcessResponse, StopTaskResponse, Task,
    TaskKind, TaskStatus, TASK_IMAGE_LIMIT,
};
use tracing::{info, warn};

use crate::config::NodeAddresses;
use crate::error::CoordinatorError;
use crate::images::{CleanupQueue, ImageStore};
use crate::store::TaskStore;
use crate::worker_client::{WorkerCall, WorkerClient};

/// Resultado de FinishNode. Una tarea desconocida no es un error: se devuelve
/// un mensaje.
#[derive(Debug, Clone, PartialEq)]
pub enum FinishOutcome {
    TaskNotFound { message: String },
    Recorded { node: NodeRecord, task_status: TaskStatus },
}

/// Máquina de estados de las tareas: reparte cada tarea a sus nodos, registra
/// el avance de cada nodo y deriva el estado global.
#[derive(Clone)]
pub struct Coordinator {
    store: Arc<TaskStore>,
    workers: Arc<dyn WorkerClient>,
    nodes: NodeAddresses,
    images: Arc<dyn ImageStore>,
    cleanup: CleanupQueue,
}

impl Coordinator {
    pub fn new(
        store: Arc<TaskStore>,
        workers: Arc<dyn WorkerClient>,
        nodes: NodeAddresses,
        images: Arc<dyn ImageStore>,
        cleanup: CleanupQueue,
    ) -> Self {
        Self {
            store,
            workers,
            nodes,
            images,
            cleanup,
        }
    }

    pub fn store(&self) -> &TaskStore {
        &self.store
    }

    /// Crea la tarea (sin nodos) y la reparte, en orden y de a un nodo, a los
    /// nodos del destino. Cada nodo que acepta queda registrado en el acto, así
    /// que ya puede reportar avance mientras siguen los init de los demás.
    /// Un nodo que falla el init queda fuera de la tarea (sin reintento).
    /// Para `edge` el resultado es `failed` si falló el único nodo; para `master`
    /// siempre es `created`.
    pub async fn init_task(
        &self,
        kind: TaskKind,
        destination: Destination,
        name: Option<String>,
        priority: u32,
    ) -> Result<InitTaskResponse, CoordinatorError> {
        let task_id = new_task_id();
        let name = name.unwrap_or_else(|| kind.as_str().to_string());

        let task = Task::new(
            task_id.clone(),
            kind,
            name.clone(),
            priority,
            destination,
            Vec::new(),
        );
        let task = self.store.create(task).await?;
        info!(
            "tarea {} {} creada para {} (created_at={})",
            kind, task_id, destination, task.created_at
        );

        let mut accepted = 0;
        for (node_key, address) in self.nodes.for_destination(destination) {
            let call = WorkerCall::Init(InitWorkerTaskRequest {
                kind,
                task_id: task_id.clone(),
                node_key: node_key.clone(),
                name: name.clone(),
                priority,
            });

            let outcome = self.workers.invoke(&address, call).await;
            if outcome.ok {
                self.store.add_node(&task_id, &node_key).await?;
                info!(
                    "tarea {} {} creada en el nodo {} ({})",
                    kind, task_id, node_key, address
                );
                accepted += 1;
            } else {
                let err = CoordinatorError::WorkerCallFailed {
                    node_key,
                    reason: outcome.body,
                };
                warn!("init de la tarea {}: {}", task_id, err);
            }
        }

        let status = match destination {
            Destination::Edge if accepted == 0 => InitStatus::Failed,
            _ => InitStatus::Created,
        };
        info!(
            "tarea {} repartida: {} nodos aceptaron ({:?})",
            task_id, accepted, status
        );

        Ok(InitTaskResponse {
            task_id,
            kind,
            name,
            destination,
            status,
        })
    }

    /// Un nodo reporta avance: pasa a `processing`, se guarda el progreso y se
    /// vuelve a mirar si todos los nodos conocidos están en `finished`.
    pub async fn process_update(
        &self,
        task_id: &str,
        node_key: &str,
        image_count: u64,
        node_count: u64,
    ) -> Result<ProcessResponse, CoordinatorError> {
        let (node, task_status, finished_now) = self.store.update(task_id, |task| {
            let value = progress(task.destination, image_count, node_count)?;
            let node = task
                .nodes
                .get_mut(node_key)
                .ok_or_else(|| CoordinatorError::NodeNotFound {
                    task_id: task_id.to_string(),
                    node_key: node_key.to_string(),
                })?;

            node.advance(NodeStatus::Processing);
            node.record_progress(value);
            let node = node.clone();

            task.advance(TaskStatus::Processing);
            // sólo puede dispararse si los otros nodos ya terminaron vía FinishNode
            let finished_now = task.all_nodes_finished() && task.advance(TaskStatus::Finished);

            Ok((node, task.status, finished_now))
        })
        .await?;

        info!(
            "tarea {} nodo {}: images={} progress={} status={:?}",
            task_id, node_key, image_count, node.progress, node.status
        );

        if finished_now {
            info!("tarea {} terminada: todos los nodos en finished", task_id);
            self.cleanup.enqueue(task_id);
        }

        Ok(ProcessResponse {
            task_id: task_id.to_string(),
            node_key: node.node_key,
            progress: node.progress,
            task_status,
        })
    }

    /// Detiene la tarea. El cambio de estado local es lo que cuenta; el stop a
    /// cada nodo es un intento único y sus fallos sólo se loguean.
    pub async fn stop_task(&self, task_id: &str) -> Result<StopTaskResponse, CoordinatorError> {
        let task = self.store.update(task_id, |task| {
            if task.status == TaskStatus::Stopped {
                return Err(CoordinatorError::AlreadyStopped {
                    task_id: task.id.clone(),
                });
            }
            task.advance(TaskStatus::Stopped);
            for node in task.nodes.values_mut() {
                node.advance(NodeStatus::End);
            }
            Ok(task.clone())
        })
        .await?;

        for (node_key, address) in self.nodes.for_destination(task.destination) {
            let call = WorkerCall::Stop {
                task_id: task.id.clone(),
            };
            let outcome = self.workers.invoke(&address, call).await;
            if outcome.ok {
                info!("tarea {} detenida en el nodo {}", task.id, node_key);
            } else {
                let err = CoordinatorError::WorkerCallFailed {
                    node_key,
                    reason: outcome.body,
                };
                warn!("stop de la tarea {}: {}", task.id, err);
            }
        }

        self.cleanup.enqueue(&task.id);
        info!("tarea {} detenida (ended_at={:?})", task.id, task.ended_at);

        Ok(StopTaskResponse {
            task_id: task.id,
            status: task.status,
        })
    }

    /// Un nodo avisa que terminó. La tarea sólo pasa a `finished` cuando las
    /// cinco claves fijas (`edge`, `0`..`3`) existen y están en `finished`.
    pub async fn finish_node(
        &self,
        task_id: &str,
        node_key: &str,
    ) -> Result<FinishOutcome, CoordinatorError> {
        let res = self.store.update(task_id, |task| {
            let node = task
                .nodes
                .get_mut(node_key)
                .ok_or_else(|| CoordinatorError::NodeNotFound {
                    task_id: task_id.to_string(),
                    node_key: node_key.to_string(),
                })?;
            node.advance(NodeStatus::Finished);
            let node = node.clone();

            let finished_now = task.quorum_finished() && task.advance(TaskStatus::Finished);
            Ok((node, task.status, finished_now))
        })
        .await;

        let (node, task_status, finished_now) = match res {
            Ok(v) => v,
            Err(err @ CoordinatorError::NotFound { .. }) => {
                warn!("finish para una tarea desconocida: {}", err);
                return Ok(FinishOutcome::TaskNotFound {
                    message: err.to_string(),
                });
            }
            Err(err) => return Err(err),
        };

        info!("tarea {} nodo {} en finished", task_id, node_key);
        if finished_now {
            info!("tarea {} terminada: quórum de nodos completo", task_id);
            self.cleanup.enqueue(task_id);
        }

        Ok(FinishOutcome::Recorded { node, task_status })
    }

    /// Recibe una imagen capturada para la tarea: la guarda en el directorio de
    /// imágenes y suma uno al contador. Al llegar a `TASK_IMAGE_LIMIT` la tarea
    /// pasa a `finished` y se encola la limpieza.
    pub async fn receive_image(
        &self,
        task_id: &str,
        bytes: Vec<u8>,
    ) -> Result<ImageReceivedResponse, CoordinatorError> {
        let task = self.store.get(task_id)?;
        if task.status == TaskStatus::Stopped {
            // sus imágenes ya se limpiaron
            return Err(CoordinatorError::AlreadyStopped { task_id: task.id });
        }

        let images = self.images.clone();
        let id = task.id.clone();
        let file_name = tokio::task::spawn_blocking(move || images.save(&id, &bytes))
            .await
            .map_err(|e| CoordinatorError::ImageWriteFailed {
                task_id: task.id.clone(),
                reason: e.to_string(),
            })?
            .map_err(|e| CoordinatorError::ImageWriteFailed {
                task_id: task.id.clone(),
                reason: format!("{:#}", e),
            })?;

        let (image_count, task_status, finished_now) = self
            .store
            .update(task_id, |task| {
                task.image_count += 1;
                let finished_now =
                    task.image_count >= TASK_IMAGE_LIMIT && task.advance(TaskStatus::Finished);
                Ok((task.image_count, task.status, finished_now))
            })
            .await?;

        info!(
            "imagen {} recibida para la tarea {}, image_count={}",
            file_name, task_id, image_count
        );
        if finished_now {
            info!(
                "tarea {} terminada: {} imágenes recibidas",
                task_id, image_count
            );
            self.cleanup.enqueue(task_id);
        }

        Ok(ImageReceivedResponse {
            task_id: task_id.to_string(),
            file_name,
            image_count,
            task_status,
        })
    }

    pub fn get_status(&self, task_id: &str) -> Result<Task, CoordinatorError> {
        self.store.get(task_id)
    }

    pub fn list_tasks(&self) -> Vec<Task> {
        self.store.list()
    }
}
