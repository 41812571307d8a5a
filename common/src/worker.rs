use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::vertex::VertexDescriptor;

pub type WorkerId = String;

/// Heartbeat periódico del worker: capacidad libre + vértices terminados.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatRequest {
    pub worker_id: WorkerId,
    pub hostname: String,
    pub available_slots: u32,

    /// Vértices terminados (éxito o fallo) desde el heartbeat anterior
    pub completed: Vec<VertexDescriptor>,

    pub cpu_percent: Option<f32>,
    pub mem_bytes: Option<u64>,
}

/// Respuesta del master: vértices recién asignados a este worker.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HeartbeatResponse {
    pub assigned: Vec<VertexDescriptor>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct WorkerMetrics {
    pub worker_id: WorkerId,
    pub hostname: String,
    pub last_heartbeat_at: DateTime<Utc>,
    pub last_heartbeat_secs_ago: u64,
    pub available_slots: u32,
    pub vertices_assigned: u64,
    pub vertices_succeeded: u64,
    pub vertices_failed: u64,
    pub cpu_percent: Option<f32>,
    pub mem_bytes: Option<u64>,
}
