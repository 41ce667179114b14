use std::{
    collections::HashMap,
    fs,
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, Ordering},
        Mutex, PoisonError,
    },
};

use common::{Task, TaskId};

use crate::error::PersistError;

pub type TaskTable = HashMap<TaskId, Task>;

/// Colaborador de durabilidad: sobrescribe la tabla completa en cada escritura y
/// la lee completa al arrancar.
pub trait TaskPersistence: Send + Sync {
    fn load(&self) -> Result<TaskTable, PersistError>;
    fn save(&self, table: &TaskTable) -> Result<(), PersistError>;
}

/// Snapshot JSON en disco. Escribe a un archivo temporal y lo renombra encima
/// del destino para no dejar un archivo a medias.
#[derive(Debug, Clone)]
pub struct JsonFilePersistence {
    path: PathBuf,
}

impl JsonFilePersistence {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl TaskPersistence for JsonFilePersistence {
    fn load(&self) -> Result<TaskTable, PersistError> {
        if !self.path.exists() {
            return Ok(TaskTable::new());
        }
        let raw = fs::read(&self.path)?;
        Ok(serde_json::from_slice(&raw)?)
    }

    fn save(&self, table: &TaskTable) -> Result<(), PersistError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(table)?)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

/// Persistencia en memoria, para tests. `fail_writes` simula un backend caído.
#[derive(Debug, Default)]
pub struct MemoryPersistence {
    table: Mutex<TaskTable>,
    fail_writes: AtomicBool,
    saves: Mutex<usize>,
}

impl MemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> TaskTable {
        self.table
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Cantidad de escrituras exitosas.
    pub fn save_count(&self) -> usize {
        *self.saves.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl TaskPersistence for MemoryPersistence {
    fn load(&self) -> Result<TaskTable, PersistError> {
        Ok(self.snapshot())
    }

    fn save(&self, table: &TaskTable) -> Result<(), PersistError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(PersistError::Backend("escritura deshabilitada".to_string()));
        }
        *self.table.lock().unwrap_or_else(PoisonError::into_inner) = table.clone();
        *self.saves.lock().unwrap_or_else(PoisonError::into_inner) += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{new_task_id, Destination, NodeStatus, TaskKind};
    use pretty_assertions::assert_eq;

    fn sample_table() -> TaskTable {
        let mut table = TaskTable::new();
        for destination in [Destination::Master, Destination::Edge] {
            let mut task = common::Task::new(
                new_task_id(),
                TaskKind::Reconnaissance,
                "reconnaissance".to_string(),
                3,
                destination,
                destination.node_keys(),
            );
            if let Some(node) = task.nodes.values_mut().next() {
                node.advance(NodeStatus::Processing);
                node.record_progress(2.0);
            }
            table.insert(task.id.clone(), task);
        }
        table
    }

    #[test]
    fn json_file_round_trip() {
        let dir = std::env::temp_dir().join(format!("coordinator-{}", uuid::Uuid::new_v4()));
        let store = JsonFilePersistence::new(dir.join("tasks.json"));

        assert!(store.load().unwrap().is_empty());

        let table = sample_table();
        store.save(&table).unwrap();
        let loaded = store.load().unwrap();
        assert_eq!(loaded, table);

        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn corrupt_snapshot_is_an_error() {
        let dir = std::env::temp_dir().join(format!("coordinator-{}", uuid::Uuid::new_v4()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("tasks.json");
        fs::write(&path, b"{not json").unwrap();

        let store = JsonFilePersistence::new(&path);
        assert!(matches!(store.load(), Err(PersistError::Json(_))));

        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn memory_persistence_can_fail() {
        let store = MemoryPersistence::new();
        store.set_fail_writes(true);
        assert!(store.save(&sample_table()).is_err());
        assert_eq!(store.save_count(), 0);
        store.set_fail_writes(false);
        store.save(&sample_table()).unwrap();
        assert_eq!(store.snapshot().len(), 2);
    }
}
