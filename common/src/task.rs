use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt, str::FromStr};

use crate::DomainError;

pub type TaskId = String;
pub type NodeKey = String;

/// Claves de los cuatro nodos master, en el orden en que se reparte la tarea.
pub const MASTER_NODE_KEYS: [&str; 4] = ["0", "1", "2", "3"];
pub const EDGE_NODE_KEY: &str = "edge";

/// Claves que FinishNode exige en estado `finished` para cerrar la tarea.
/// Es fija: no depende del destino con el que se creó la tarea.
pub const QUORUM_NODE_KEYS: [&str; 5] = ["edge", "0", "1", "2", "3"];

/// Imágenes que equivalen a una unidad de progreso.
pub const IMAGES_PER_UNIT: f64 = 125.0;

/// Imágenes recibidas a partir de las cuales la tarea se da por terminada.
pub const TASK_IMAGE_LIMIT: u64 = 1440;

/// Genera un id corto (8 hex) a partir de un UUID v4. No se reintenta en caso de colisión.
pub fn new_task_id() -> TaskId {
    let full = uuid::Uuid::new_v4().simple().to_string();
    full[..8].to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    Reconnaissance,
    Track,
}

impl TaskKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::Reconnaissance => "reconnaissance",
            TaskKind::Track => "track",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for TaskKind {
    type Err = DomainError;

    // acepta también los códigos numéricos que usaba la API vieja
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "1" | "reconnaissance" => Ok(TaskKind::Reconnaissance),
            "2" | "track" => Ok(TaskKind::Track),
            other => Err(DomainError::InvalidTaskKind(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Destination {
    Master,
    Edge,
}

impl Destination {
    pub fn as_str(&self) -> &'static str {
        match self {
            Destination::Master => "master",
            Destination::Edge => "edge",
        }
    }

    /// Conjunto de nodos al que se reparte una tarea con este destino.
    pub fn node_keys(&self) -> Vec<NodeKey> {
        match self {
            Destination::Master => MASTER_NODE_KEYS.iter().map(|k| k.to_string()).collect(),
            Destination::Edge => vec![EDGE_NODE_KEY.to_string()],
        }
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for Destination {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "master" => Ok(Destination::Master),
            "edge" => Ok(Destination::Edge),
            other => Err(DomainError::InvalidDestination(other.to_string())),
        }
    }
}

/// Estado de un nodo dentro de una tarea. El orden de las variantes es el orden
/// del ciclo de vida: sólo se avanza, nunca se retrocede.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    Created,
    Processing,
    Finished,
    End,
}

/// Estado global de la tarea, también ordenado. `Stopped` es el estado terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Created,
    Processing,
    Finished,
    Stopped,
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskStatus::Created => "created",
            TaskStatus::Processing => "processing",
            TaskStatus::Finished => "finished",
            TaskStatus::Stopped => "stopped",
        };
        f.pad(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub node_key: NodeKey,
    pub status: NodeStatus,

    /// Progreso acumulado; la unidad depende del tipo de nodo
    pub progress: f64,

    pub created_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl NodeRecord {
    pub fn new(node_key: impl Into<NodeKey>) -> Self {
        Self {
            node_key: node_key.into(),
            status: NodeStatus::Created,
            progress: 0.0,
            created_at: Utc::now(),
            ended_at: None,
        }
    }

    /// Mueve el nodo a `target` si todavía no lo alcanzó. Devuelve si hubo cambio.
    pub fn advance(&mut self, target: NodeStatus) -> bool {
        if self.status >= target {
            return false;
        }
        self.status = target;
        if target >= NodeStatus::Finished && self.ended_at.is_none() {
            self.ended_at = Some(Utc::now());
        }
        true
    }

    /// El progreso es monótono: un valor menor que el actual se ignora.
    pub fn record_progress(&mut self, progress: f64) {
        if progress > self.progress {
            self.progress = progress;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub kind: TaskKind,
    pub name: String,
    pub priority: u32,
    pub destination: Destination,
    pub status: TaskStatus,

    pub created_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,

    /// Imágenes subidas al coordinador para esta tarea
    #[serde(default)]
    pub image_count: u64,

    /// Registro por nodo. Sólo entran los nodos que aceptaron el init y
    /// ninguno se borra.
    pub nodes: BTreeMap<NodeKey, NodeRecord>,
}

impl Task {
    pub fn new<I>(
        id: TaskId,
        kind: TaskKind,
        name: String,
        priority: u32,
        destination: Destination,
        node_keys: I,
    ) -> Self
    where
        I: IntoIterator<Item = NodeKey>,
    {
        let nodes = node_keys
            .into_iter()
            .map(|key| (key.clone(), NodeRecord::new(key)))
            .collect();

        Self {
            id,
            kind,
            name,
            priority,
            destination,
            status: TaskStatus::Created,
            created_at: Utc::now(),
            ended_at: None,
            image_count: 0,
            nodes,
        }
    }

    /// Avanza el estado global (nunca retrocede). Al pasar a `finished` o
    /// `stopped` se registra la hora de fin.
    pub fn advance(&mut self, target: TaskStatus) -> bool {
        if self.status >= target {
            return false;
        }
        self.status = target;
        if target >= TaskStatus::Finished {
            self.ended_at = Some(Utc::now());
        }
        true
    }

    /// ¿Todos los nodos conocidos están en `finished`?
    pub fn all_nodes_finished(&self) -> bool {
        self.nodes
            .values()
            .all(|node| node.status == NodeStatus::Finished)
    }

    /// Chequeo de quórum de FinishNode: las cinco claves fijas deben existir y
    /// estar en `finished`, sin importar con qué destino se creó la tarea.
    pub fn quorum_finished(&self) -> bool {
        QUORUM_NODE_KEYS.iter().all(|key| {
            self.nodes
                .get(*key)
                .map(|node| node.status == NodeStatus::Finished)
                .unwrap_or(false)
        })
    }
}

/// Progreso reportado por un nodo.
/// - edge: `image_count / node_count * 125`
/// - master: `image_count / 125`
pub fn progress(
    destination: Destination,
    image_count: u64,
    node_count: u64,
) -> Result<f64, DomainError> {
    match destination {
        Destination::Edge => {
            if node_count == 0 {
                return Err(DomainError::InvalidNodeCount);
            }
            Ok(image_count as f64 / node_count as f64 * IMAGES_PER_UNIT)
        }
        Destination::Master => Ok(image_count as f64 / IMAGES_PER_UNIT),
    }
}
