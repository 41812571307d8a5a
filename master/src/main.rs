mod config;
mod deps;
mod handlers;
mod heartbeat;
mod scheduler;
mod state;

use anyhow::Context;
use common::{LocalStorage, Registry, Storage};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::MasterConfig;
use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("master=debug,tower_http=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = MasterConfig::from_env();
    info!("configuración del master: {:?}", config);

    let local = LocalStorage::new(&config.storage_root).with_splits(config.input_splits_per_file);
    info!(
        "almacenamiento en {} ({} split(s) por archivo)",
        local.root().display(),
        config.input_splits_per_file
    );
    let storage: Arc<dyn Storage> = Arc::new(local);
    let registry = Registry::builtin();
    info!("jobs registrados: {:?}", registry.job_kinds());

    let state = AppState::new(&config, registry, storage);

    // router HTTP
    let app = handlers::build_router(state);

    let listener = TcpListener::bind(&config.listen_addr)
        .await
        .with_context(|| format!("no se pudo escuchar en {}", config.listen_addr))?;
    info!("master escuchando en {}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}
