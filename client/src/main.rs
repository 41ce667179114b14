use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use common::{
    Destination, ErrorBody, FinishNodeResponse, ImageReceivedResponse, InitTaskRequest,
    InitTaskResponse, ProcessRequest, ProcessResponse, StopTaskResponse, Task, TaskKind,
};
use reqwest::{
    multipart::{Form, Part},
    Client, Response,
};
use std::{env, path::PathBuf};

/// - En Docker: COORDINATOR_URL=http://coordinator:8080
/// - Local: default http://localhost:8080
fn coordinator_base_url() -> String {
    env::var("COORDINATOR_URL").unwrap_or_else(|_| "http://localhost:8080".to_string())
}

#[derive(Parser)]
#[command(name = "client")]
#[command(about = "CLI simple para hablar con el coordinador de tareas")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Crea una tarea y la reparte a los nodos
    Init {
        /// reconnaissance | track (o 1 | 2)
        #[arg(value_name = "TIPO")]
        kind: TaskKind,
        /// master | edge
        #[arg(value_name = "DESTINO")]
        destination: Destination,
        #[arg(long)]
        name: Option<String>,
        #[arg(long, default_value_t = 0)]
        priority: u32,
    },
    /// Consulta el estado de una tarea
    Status {
        #[arg(value_name = "TASK_ID")]
        id: String,
    },
    /// Lista todas las tareas
    List,
    /// Detiene una tarea en todos sus nodos
    Stop {
        #[arg(value_name = "TASK_ID")]
        id: String,
    },
    /// Reporta avance de un nodo (lo que haría el nodo mismo)
    Process {
        #[arg(value_name = "TASK_ID")]
        id: String,
        #[arg(value_name = "NODO")]
        node: String,
        #[arg(long = "images")]
        image_count: u64,
        #[arg(long = "nodes", default_value_t = 1)]
        node_count: u64,
    },
    /// Marca un nodo como terminado
    Finish {
        #[arg(value_name = "TASK_ID")]
        id: String,
        #[arg(value_name = "NODO")]
        node: String,
    },
    /// Sube una imagen capturada para la tarea
    Image {
        #[arg(value_name = "TASK_ID")]
        id: String,
        #[arg(value_name = "ARCHIVO")]
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let client = Client::new();
    let base_url = coordinator_base_url();

    match cli.command {
        Commands::Init {
            kind,
            destination,
            name,
            priority,
        } => {
            let url = format!("{}/api/v1/tasks", base_url);
            let resp = client
                .post(&url)
                .json(&InitTaskRequest {
                    kind,
                    destination,
                    name,
                    priority,
                })
                .send()
                .await?;
            let created: InitTaskResponse = decode(resp).await?;

            println!("Tarea creada:");
            println!("  id: {}", created.task_id);
            println!("  tipo: {}", created.kind);
            println!("  nombre: {}", created.name);
            println!("  destino: {}", created.destination);
            println!("  estado: {:?}", created.status);
        }
        Commands::Status { id } => {
            let url = format!("{}/api/v1/tasks/{id}", base_url);
            let task: Task = decode(client.get(&url).send().await?).await?;
            print_task(&task);
        }
        Commands::List => {
            let url = format!("{}/api/v1/tasks", base_url);
            let tasks: Vec<Task> = decode(client.get(&url).send().await?).await?;
            if tasks.is_empty() {
                println!("No hay tareas");
            }
            for task in tasks {
                println!(
                    "{}  {:<14} {:<6} {:<10} nodos={}",
                    task.id,
                    task.kind,
                    task.destination,
                    task.status,
                    task.nodes.len()
                );
            }
        }
        Commands::Stop { id } => {
            let url = format!("{}/api/v1/tasks/{id}/stop", base_url);
            let stopped: StopTaskResponse = decode(client.post(&url).send().await?).await?;
            println!("Tarea {} -> {}", stopped.task_id, stopped.status);
        }
        Commands::Process {
            id,
            node,
            image_count,
            node_count,
        } => {
            let url = format!("{}/api/v1/tasks/{id}/nodes/{node}/process", base_url);
            let resp = client
                .post(&url)
                .json(&ProcessRequest {
                    image_count,
                    node_count,
                })
                .send()
                .await?;
            let update: ProcessResponse = decode(resp).await?;
            println!(
                "Tarea {} nodo {}: progreso {} (tarea {})",
                update.task_id, update.node_key, update.progress, update.task_status
            );
        }
        Commands::Finish { id, node } => {
            let url = format!("{}/api/v1/tasks/{id}/nodes/{node}/finish", base_url);
            let done: FinishNodeResponse = decode(client.post(&url).send().await?).await?;
            match (done.task_status, done.message) {
                (Some(status), _) => {
                    println!("Tarea {} nodo {} terminado (tarea {})", done.task_id, done.node_key, status)
                }
                (None, Some(message)) => println!("{}", message),
                (None, None) => println!("Respuesta vacía del coordinador"),
            }
        }
        Commands::Image { id, file } => {
            let bytes = tokio::fs::read(&file).await?;
            let file_name = file
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| "image.jpg".to_string());
            let form = Form::new().part("image", Part::bytes(bytes).file_name(file_name));

            let url = format!("{}/api/v1/tasks/{id}/images", base_url);
            let resp = client.post(&url).multipart(form).send().await?;
            let received: ImageReceivedResponse = decode(resp).await?;
            println!(
                "Imagen {} recibida: {} imágenes (tarea {})",
                received.file_name, received.image_count, received.task_status
            );
        }
    }

    Ok(())
}

/// Decodifica la respuesta o convierte el `{"error": ...}` del coordinador en error.
async fn decode<T: serde::de::DeserializeOwned>(resp: Response) -> Result<T> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp.json().await?);
    }
    let text = resp.text().await.unwrap_or_default();
    match serde_json::from_str::<ErrorBody>(&text) {
        Ok(body) => bail!("{} ({})", body.error, status),
        Err(_) => bail!("el coordinador respondió {}: {}", status, text),
    }
}

fn print_task(task: &Task) {
    println!("Tarea:");
    println!("  id: {}", task.id);
    println!("  tipo: {}", task.kind);
    println!("  nombre: {}", task.name);
    println!("  prioridad: {}", task.priority);
    println!("  destino: {}", task.destination);
    println!("  estado: {}", task.status);
    println!("  imágenes: {}", task.image_count);
    println!("  creada: {}", task.created_at);
    if let Some(ended) = task.ended_at {
        println!("  terminada: {}", ended);
    }
    for node in task.nodes.values() {
        println!(
            "  nodo {:<4} {:?} progreso={}",
            node.node_key, node.status, node.progress
        );
    }
}
