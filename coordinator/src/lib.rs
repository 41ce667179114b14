//! Coordinador de tareas distribuidas: reparte cada tarea a los nodos master
//! (cuatro) o al nodo edge, sigue el avance de cada nodo y deriva el estado
//! global de la tarea.

pub mod config;
pub mod coordinator;
pub mod error;
pub mod handlers;
pub mod images;
pub mod persistence;
pub mod state;
pub mod store;
pub mod worker_client;

pub use coordinator::{Coordinator, FinishOutcome};
pub use error::{CoordinatorError, PersistError};
pub use state::AppState;
