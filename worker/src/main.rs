mod capacity;
mod config;
mod executor;
mod worker;

use anyhow::Result;
use common::{LocalStorage, Registry};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::capacity::CapacityTracker;
use crate::config::WorkerConfig;
use crate::worker::Runtime;

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("worker=debug,reqwest=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = WorkerConfig::from_env();
    info!("configuración del worker: {:?}", config);

    let runtime = Runtime {
        registry: Arc::new(Registry::builtin()),
        storage: Arc::new(LocalStorage::new(&config.storage_root)),
        tracker: Arc::new(CapacityTracker::new(config.slots)),
    };

    worker::run(config, runtime).await
}
