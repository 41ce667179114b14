use std::sync::{Arc, PoisonError, RwLock};

use common::{NodeRecord, Task};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::{CoordinatorError, PersistError};
use crate::persistence::{TaskPersistence, TaskTable};

/// Tabla en memoria de todas las tareas. Es la única fuente de verdad; el
/// colaborador de persistencia sólo recibe copias.
///
/// Las mutaciones toman el lock de escritura de la tabla (serializa todas las
/// escrituras, también las de tareas distintas). Las lecturas comparten el lock.
/// El lock nunca se sostiene a través de un `.await`.
pub struct TaskStore {
    tasks: RwLock<TaskTable>,
    persistence: Arc<dyn TaskPersistence>,
    // serializa snapshot + escritura para que un flush viejo no pise a uno nuevo
    flush: Mutex<()>,
}

impl TaskStore {
    pub fn new(persistence: Arc<dyn TaskPersistence>) -> Self {
        Self {
            tasks: RwLock::new(TaskTable::new()),
            persistence,
            flush: Mutex::new(()),
        }
    }

    /// Repuebla la tabla desde el colaborador de persistencia (arranque).
    pub fn restore(persistence: Arc<dyn TaskPersistence>) -> Result<Self, PersistError> {
        let table = persistence.load()?;
        debug!("restauradas {} tareas", table.len());
        Ok(Self {
            tasks: RwLock::new(table),
            persistence,
            flush: Mutex::new(()),
        })
    }

    pub async fn create(&self, task: Task) -> Result<Task, CoordinatorError> {
        {
            let mut tasks = self.tasks.write().unwrap_or_else(PoisonError::into_inner);
            if tasks.contains_key(&task.id) {
                return Err(CoordinatorError::AlreadyExists {
                    task_id: task.id.clone(),
                });
            }
            tasks.insert(task.id.clone(), task.clone());
        }
        self.persist().await;
        Ok(task)
    }

    pub fn get(&self, task_id: &str) -> Result<Task, CoordinatorError> {
        let tasks = self.tasks.read().unwrap_or_else(PoisonError::into_inner);
        tasks
            .get(task_id)
            .cloned()
            .ok_or_else(|| CoordinatorError::NotFound {
                task_id: task_id.to_string(),
            })
    }

    /// Todas las tareas, ordenadas por fecha de creación.
    pub fn list(&self) -> Vec<Task> {
        let tasks = self.tasks.read().unwrap_or_else(PoisonError::into_inner);
        let mut out: Vec<Task> = tasks.values().cloned().collect();
        out.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        out
    }

    pub fn len(&self) -> usize {
        self.tasks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Aplica `f` a la tarea dentro de la sección crítica. Si `f` devuelve
    /// error no se persiste nada; `f` debe validar antes de mutar.
    pub async fn update<R, F>(&self, task_id: &str, f: F) -> Result<R, CoordinatorError>
    where
        F: FnOnce(&mut Task) -> Result<R, CoordinatorError>,
    {
        let out = {
            let mut tasks = self.tasks.write().unwrap_or_else(PoisonError::into_inner);
            let task = tasks
                .get_mut(task_id)
                .ok_or_else(|| CoordinatorError::NotFound {
                    task_id: task_id.to_string(),
                })?;
            f(task)?
        };
        self.persist().await;
        Ok(out)
    }

    /// Muta un solo nodo de la tarea y devuelve su estado resultante.
    pub async fn update_node<F>(
        &self,
        task_id: &str,
        node_key: &str,
        f: F,
    ) -> Result<NodeRecord, CoordinatorError>
    where
        F: FnOnce(&mut NodeRecord),
    {
        self.update(task_id, |task| {
            let node = task
                .nodes
                .get_mut(node_key)
                .ok_or_else(|| CoordinatorError::NodeNotFound {
                    task_id: task_id.to_string(),
                    node_key: node_key.to_string(),
                })?;
            f(node);
            Ok(node.clone())
        })
        .await
    }

    /// Registra un nodo que aceptó la tarea, en estado `created`. Si ya estaba
    /// se devuelve tal cual.
    pub async fn add_node(
        &self,
        task_id: &str,
        node_key: &str,
    ) -> Result<NodeRecord, CoordinatorError> {
        self.update(task_id, |task| {
            let node = task
                .nodes
                .entry(node_key.to_string())
                .or_insert_with(|| NodeRecord::new(node_key));
            Ok(node.clone())
        })
        .await
    }

    /// Vuelca la tabla completa al colaborador de persistencia, fuera de los
    /// hilos del runtime. Best-effort: un fallo se loguea y no se propaga; la
    /// tabla en memoria sigue siendo válida.
    pub async fn persist(&self) -> bool {
        let _flush = self.flush.lock().await;
        let snapshot = self
            .tasks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        let persistence = self.persistence.clone();
        let res = tokio::task::spawn_blocking(move || persistence.save(&snapshot)).await;

        match res {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                let err = CoordinatorError::PersistenceFailed(e);
                warn!("no se pudo persistir la tabla de tareas: {}", err);
                false
            }
            Err(e) => {
                warn!("panic o join error persistiendo la tabla: {:?}", e);
                false
            }
        }
    }
}
