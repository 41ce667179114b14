pub mod task;
pub mod wire;

pub use task::*;
pub use wire::*;

use thiserror::Error;

/// Errores de validación de valores del dominio (parseo de rutas, progreso).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainError {
    #[error("tipo de tarea desconocido: {0}")]
    InvalidTaskKind(String),

    #[error("destino desconocido: {0}")]
    InvalidDestination(String),

    #[error("node_count debe ser mayor que cero")]
    InvalidNodeCount,
}
