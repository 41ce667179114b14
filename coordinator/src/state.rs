use std::sync::Arc;

use crate::config::NodeAddresses;
use crate::coordinator::Coordinator;
use crate::error::PersistError;
use crate::images::{CleanupQueue, ImageStore};
use crate::persistence::TaskPersistence;
use crate::store::TaskStore;
use crate::worker_client::WorkerClient;

/// Estado compartido por los handlers HTTP.
#[derive(Clone)]
pub struct AppState {
    pub coordinator: Coordinator,
}

impl AppState {
    pub fn new(coordinator: Coordinator) -> Self {
        Self { coordinator }
    }

    /// Arma el coordinador completo: restaura la tabla desde la persistencia y
    /// lanza la cola de limpieza. Tiene que llamarse dentro de un runtime de tokio.
    pub fn build(
        nodes: NodeAddresses,
        workers: Arc<dyn WorkerClient>,
        persistence: Arc<dyn TaskPersistence>,
        images: Arc<dyn ImageStore>,
    ) -> Result<Self, PersistError> {
        let store = Arc::new(TaskStore::restore(persistence)?);
        let cleanup = CleanupQueue::spawn(images.clone());
        Ok(Self::new(Coordinator::new(store, workers, nodes, images, cleanup)))
    }
}
