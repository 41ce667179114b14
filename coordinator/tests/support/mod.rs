#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use coordinator::images::{image_file_name, ImageStore};
use coordinator::config::NodeAddresses;
use coordinator::persistence::MemoryPersistence;
use coordinator::worker_client::{Outcome, WorkerCall, WorkerClient};
use coordinator::{AppState, Coordinator};

pub const EDGE_ADDR: &str = "http://127.0.0.1:9100";

pub fn master_addr(i: usize) -> String {
    format!("http://127.0.0.1:{}", 9000 + i)
}

/// Cliente de nodos falso: registra cada llamada y falla para las direcciones dadas.
#[derive(Default)]
pub struct FakeWorkers {
    calls: Mutex<Vec<(String, WorkerCall)>>,
    failing: HashSet<String>,
}

impl FakeWorkers {
    pub fn failing(addresses: &[String]) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            failing: addresses.iter().cloned().collect(),
        }
    }

    pub fn calls(&self) -> Vec<(String, WorkerCall)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn stop_calls(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|(_, call)| matches!(call, WorkerCall::Stop { .. }))
            .map(|(addr, _)| addr)
            .collect()
    }
}

#[async_trait]
impl WorkerClient for FakeWorkers {
    async fn invoke(&self, node_address: &str, call: WorkerCall) -> Outcome {
        self.calls
            .lock()
            .unwrap()
            .push((node_address.to_string(), call));

        if self.failing.contains(node_address) {
            Outcome {
                ok: false,
                status_code: Some(500),
                body: "nodo caído".to_string(),
            }
        } else {
            Outcome {
                ok: true,
                status_code: Some(200),
                body: r#"{"ok":true}"#.to_string(),
            }
        }
    }
}

/// Almacén de imágenes en memoria: anota cada imagen guardada y cada limpieza.
#[derive(Default)]
pub struct RecordingImages {
    saved: Mutex<Vec<(String, usize)>>,
    cleaned: Mutex<Vec<String>>,
}

impl RecordingImages {
    /// (task_id, bytes) de cada imagen guardada, en orden.
    pub fn saved(&self) -> Vec<(String, usize)> {
        self.saved.lock().unwrap().clone()
    }

    pub fn cleaned(&self) -> Vec<String> {
        self.cleaned.lock().unwrap().clone()
    }

    /// Espera (hasta ~1s) a que la cola de fondo procese `n` limpiezas.
    pub async fn wait_for(&self, n: usize) -> Vec<String> {
        for _ in 0..100 {
            if self.cleaned.lock().unwrap().len() >= n {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        self.cleaned()
    }
}

impl ImageStore for RecordingImages {
    fn save(&self, task_id: &str, bytes: &[u8]) -> anyhow::Result<String> {
        self.saved
            .lock()
            .unwrap()
            .push((task_id.to_string(), bytes.len()));
        Ok(image_file_name(task_id))
    }

    fn cleanup(&self, task_id: &str) -> anyhow::Result<usize> {
        self.cleaned.lock().unwrap().push(task_id.to_string());
        Ok(0)
    }
}

pub struct Harness {
    pub state: AppState,
    pub workers: Arc<FakeWorkers>,
    pub persistence: Arc<MemoryPersistence>,
    pub images: Arc<RecordingImages>,
}

impl Harness {
    pub fn coordinator(&self) -> &Coordinator {
        &self.state.coordinator
    }
}

pub fn harness(failing: &[String]) -> Harness {
    harness_with(failing, Arc::new(MemoryPersistence::new()))
}

pub fn harness_with(failing: &[String], persistence: Arc<MemoryPersistence>) -> Harness {
    let workers = Arc::new(FakeWorkers::failing(failing));
    let images = Arc::new(RecordingImages::default());
    let state = AppState::build(
        NodeAddresses::default(),
        workers.clone(),
        persistence.clone(),
        images.clone(),
    )
    .expect("restore from memory persistence");

    Harness {
        state,
        workers,
        persistence,
        images,
    }
}
