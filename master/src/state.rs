// master/src/state.rs

use chrono::{DateTime, Utc};
use common::{JobId, Registry, Storage, WorkerId};
use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex},
};

use crate::config::MasterConfig;
use crate::scheduler::{AssignPolicy, JobManager};

#[derive(Clone)]
pub struct AppState {
    // todo el estado de scheduling va bajo un único lock
    pub manager: Arc<Mutex<JobManager>>,
    pub workers: Arc<Mutex<HashMap<WorkerId, WorkerMeta>>>,
    // ids entregados por POST /jobs que todavía no se arrancaron
    pub reserved_jobs: Arc<Mutex<HashSet<JobId>>>,
    pub registry: Arc<Registry>,
    pub storage: Arc<dyn Storage>,
}

impl AppState {
    pub fn new(config: &MasterConfig, registry: Registry, storage: Arc<dyn Storage>) -> Self {
        let policy = AssignPolicy {
            divisor: config.assign_divisor,
        };
        let manager = JobManager::new(storage.clone(), config.max_simultaneous_jobs, policy);

        Self {
            manager: Arc::new(Mutex::new(manager)),
            workers: Arc::new(Mutex::new(HashMap::new())),
            reserved_jobs: Arc::new(Mutex::new(HashSet::new())),
            registry: Arc::new(registry),
            storage,
        }
    }
}

/// Lo que el master sabe de un worker, sólo para observabilidad.
/// No hay timeouts: un worker que deja de mandar heartbeats simplemente
/// envejece acá.
#[derive(Debug, Clone)]
pub struct WorkerMeta {
    pub hostname: String,
    pub last_heartbeat: DateTime<Utc>,
    pub available_slots: u32,

    // Métricas
    pub vertices_assigned: u64,
    pub vertices_succeeded: u64,
    pub vertices_failed: u64,

    pub last_cpu_percent: Option<f32>,
    pub last_mem_bytes: Option<u64>,
}

impl WorkerMeta {
    pub fn new(hostname: String) -> Self {
        Self {
            hostname,
            last_heartbeat: Utc::now(),
            available_slots: 0,
            vertices_assigned: 0,
            vertices_succeeded: 0,
            vertices_failed: 0,
            last_cpu_percent: None,
            last_mem_bytes: None,
        }
    }
}
