use std::{env, net::SocketAddr, path::PathBuf};

use common::{Destination, EDGE_NODE_KEY, MASTER_NODE_KEYS};
use thiserror::Error;

pub const DEFAULT_BIND: &str = "0.0.0.0:8080";
pub const DEFAULT_TASKS_FILE: &str = "data/tasks.json";
pub const DEFAULT_IMAGE_DIR: &str = "image";
pub const DEFAULT_EDGE_NODE: &str = "http://127.0.0.1:9100";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("valor inválido para {var}: {value}")]
    Invalid { var: &'static str, value: String },
}

/// Direcciones de los nodos. Es configuración estática: no cambia en runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeAddresses {
    pub masters: [String; 4],
    pub edge: String,
}

impl NodeAddresses {
    /// URL base del nodo con esta clave (`"0"`..`"3"` o `"edge"`).
    pub fn address(&self, node_key: &str) -> Option<&str> {
        if node_key == EDGE_NODE_KEY {
            return Some(self.edge.as_str());
        }
        MASTER_NODE_KEYS
            .iter()
            .position(|k| *k == node_key)
            .map(|i| self.masters[i].as_str())
    }

    /// Pares (clave, dirección) en el orden del fan-out para un destino.
    pub fn for_destination(&self, destination: Destination) -> Vec<(String, String)> {
        destination
            .node_keys()
            .into_iter()
            .filter_map(|key| {
                let addr = self.address(&key)?.to_string();
                Some((key, addr))
            })
            .collect()
    }
}

impl Default for NodeAddresses {
    fn default() -> Self {
        Self {
            masters: [0, 1, 2, 3].map(|i| format!("http://127.0.0.1:{}", 9000 + i)),
            edge: DEFAULT_EDGE_NODE.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    pub bind: SocketAddr,
    pub nodes: NodeAddresses,
    pub tasks_file: PathBuf,
    pub image_dir: PathBuf,
}

impl CoordinatorConfig {
    /// Lee la configuración de variables de entorno:
    /// - COORDINATOR_BIND (default 0.0.0.0:8080)
    /// - MASTER_NODE_0 .. MASTER_NODE_3, EDGE_NODE
    /// - TASKS_FILE, IMAGE_DIR
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| env::var(var).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let bind_raw = lookup("COORDINATOR_BIND").unwrap_or_else(|| DEFAULT_BIND.to_string());
        let bind = bind_raw.parse().map_err(|_| ConfigError::Invalid {
            var: "COORDINATOR_BIND",
            value: bind_raw.clone(),
        })?;

        let mut nodes = NodeAddresses::default();
        for (i, slot) in nodes.masters.iter_mut().enumerate() {
            if let Some(addr) = lookup(&format!("MASTER_NODE_{i}")) {
                *slot = validate_url("MASTER_NODE_*", addr)?;
            }
        }
        if let Some(addr) = lookup("EDGE_NODE") {
            nodes.edge = validate_url("EDGE_NODE", addr)?;
        }

        let tasks_file = lookup("TASKS_FILE")
            .unwrap_or_else(|| DEFAULT_TASKS_FILE.to_string())
            .into();
        let image_dir = lookup("IMAGE_DIR")
            .unwrap_or_else(|| DEFAULT_IMAGE_DIR.to_string())
            .into();

        Ok(Self {
            bind,
            nodes,
            tasks_file,
            image_dir,
        })
    }
}

fn validate_url(var: &'static str, value: String) -> Result<String, ConfigError> {
    if value.starts_with("http://") || value.starts_with("https://") {
        Ok(value.trim_end_matches('/').to_string())
    } else {
        Err(ConfigError::Invalid { var, value })
    }
}
