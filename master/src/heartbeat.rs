// master/src/heartbeat.rs

use common::VertexDescriptor;
use tracing::debug;

use crate::scheduler::{JobManager, Relocation};

/// Resultado de aplicar un heartbeat al scheduler.
#[derive(Debug, Default)]
pub struct HeartbeatOutcome {
    pub assigned: Vec<VertexDescriptor>,
    pub relocations: Vec<Relocation>,
    pub succeeded: u64,
    pub failed: u64,
}

/// Primero se aplican los reportes (así lo que liberan se puede asignar en
/// este mismo heartbeat) y después se asigna según los slots libres.
///
/// Se llama con el lock del scheduler tomado.
pub fn apply_heartbeat(
    manager: &mut JobManager,
    worker_id: &str,
    available_slots: u32,
    completed: Vec<VertexDescriptor>,
) -> HeartbeatOutcome {
    let mut outcome = HeartbeatOutcome::default();

    debug!(
        "heartbeat de {}: {} reportes, {} slots libres",
        worker_id,
        completed.len(),
        available_slots
    );

    for mut vertex in completed {
        if vertex.worker.is_none() {
            vertex.worker = Some(worker_id.to_string());
        }
        let success = vertex.success;
        let completion = manager.record_completion(vertex);

        // sólo cuentan para las métricas los reportes que el scheduler aceptó
        if completion.is_applied() {
            if success {
                outcome.succeeded += 1;
            } else {
                outcome.failed += 1;
            }
        }
        outcome.relocations.extend(completion.into_relocations());
    }

    outcome.assigned = manager.assign_to_worker(worker_id, available_slots);
    outcome
}
