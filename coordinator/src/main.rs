use std::sync::Arc;

use anyhow::Context;
use coordinator::{
    config::CoordinatorConfig, handlers, images::ImageDir, persistence::JsonFilePersistence,
    worker_client::HttpWorkerClient, AppState,
};
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("coordinator=debug,tower_http=info")),
        )
        .init();

    let config = CoordinatorConfig::from_env()?;
    info!("nodos configurados: {:?}", config.nodes);

    let persistence = Arc::new(JsonFilePersistence::new(&config.tasks_file));
    let state = AppState::build(
        config.nodes.clone(),
        Arc::new(HttpWorkerClient::new()),
        persistence,
        Arc::new(ImageDir::new(&config.image_dir)),
    )
    .with_context(|| format!("no se pudo restaurar {}", config.tasks_file.display()))?;
    info!(
        "{} tareas restauradas desde {}",
        state.coordinator.store().len(),
        config.tasks_file.display()
    );
    info!("imágenes en {}", config.image_dir.display());

    // router HTTP
    let app = handlers::build_router(state);

    let listener = TcpListener::bind(config.bind).await?;
    info!("coordinador escuchando en {}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}
