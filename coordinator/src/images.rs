use std::{fs, path::PathBuf, sync::Arc};

use common::TaskId;
use glob::glob;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Dónde viven las imágenes de las tareas. Guardar y limpiar son operaciones
/// bloqueantes; el coordinador las corre en el pool bloqueante de tokio.
pub trait ImageStore: Send + Sync + 'static {
    /// Guarda una imagen recibida y devuelve el nombre del archivo.
    fn save(&self, task_id: &str, bytes: &[u8]) -> anyhow::Result<String>;

    /// Borra las imágenes de la tarea. Devuelve cuántos archivos se borraron.
    fn cleanup(&self, task_id: &str) -> anyhow::Result<usize>;
}

/// Directorio plano de imágenes: `{dir}/{task_id}_image.jpg`, sobrescrito en
/// cada subida.
#[derive(Debug, Clone)]
pub struct ImageDir {
    dir: PathBuf,
}

impl ImageDir {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

pub fn image_file_name(task_id: &str) -> String {
    format!("{}_image.jpg", task_id)
}

impl ImageStore for ImageDir {
    fn save(&self, task_id: &str, bytes: &[u8]) -> anyhow::Result<String> {
        fs::create_dir_all(&self.dir)?;
        let file_name = image_file_name(task_id);
        fs::write(self.dir.join(&file_name), bytes)?;
        Ok(file_name)
    }

    // todo archivo cuyo nombre contenga el id
    fn cleanup(&self, task_id: &str) -> anyhow::Result<usize> {
        let pattern = self.dir.join(format!("*{}*", glob::Pattern::escape(task_id)));
        let pattern = pattern.to_string_lossy();

        let mut removed = 0;
        for entry in glob(&pattern)? {
            let path = entry?;
            if path.is_file() {
                fs::remove_file(&path)?;
                info!("imagen borrada: {}", path.display());
                removed += 1;
            }
        }
        Ok(removed)
    }
}

/// Cola de limpiezas pendientes. Es externa al ciclo de vida: su resultado
/// nunca llega al request que la disparó.
#[derive(Debug, Clone)]
pub struct CleanupQueue {
    tx: mpsc::UnboundedSender<TaskId>,
}

impl CleanupQueue {
    /// Crea la cola y lanza el loop consumidor. Requiere un runtime de tokio.
    pub fn spawn(images: Arc<dyn ImageStore>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run_cleanup_loop(rx, images));
        Self { tx }
    }

    /// Encola sin bloquear. Si el loop ya no existe sólo se loguea.
    pub fn enqueue(&self, task_id: &str) {
        if self.tx.send(task_id.to_string()).is_err() {
            warn!(
                "cola de limpieza cerrada, no se limpian las imágenes de {}",
                task_id
            );
        }
    }
}

async fn run_cleanup_loop(mut rx: mpsc::UnboundedReceiver<TaskId>, images: Arc<dyn ImageStore>) {
    while let Some(task_id) = rx.recv().await {
        let images = images.clone();
        let id = task_id.clone();
        let res = tokio::task::spawn_blocking(move || images.cleanup(&id)).await;

        match res {
            Ok(Ok(removed)) => info!("limpieza de la tarea {}: {} archivos", task_id, removed),
            Ok(Err(e)) => warn!("error limpiando imágenes de {}: {:?}", task_id, e),
            Err(e) => warn!("panic o join error limpiando {}: {:?}", task_id, e),
        }
    }
}
