use common::{EngineError, Registry, Storage, VertexContext, VertexDescriptor, VertexOutput};
use std::sync::Arc;
use tokio::sync::OwnedSemaphorePermit;
use tracing::{info, warn};

use crate::capacity::CapacityTracker;

/// Ejecuta un vértice asignado y deja el reporte en el tracker.
///
/// Bloqueante: se llama desde `spawn_blocking`. El slot se libera antes de
/// dejar el reporte, así el heartbeat que lo lleva ya ve el slot libre.
pub fn execute(
    vertex: VertexDescriptor,
    registry: &Registry,
    storage: Arc<dyn Storage>,
    tracker: &CapacityTracker,
    slot: OwnedSemaphorePermit,
) {
    info!(
        "ejecutando vértice ({}) tipo={} con {} entradas{}",
        vertex,
        vertex.vertex_kind,
        vertex.inputs.len(),
        if vertex.is_last_stage() { " (última etapa)" } else { "" }
    );

    let result = run_vertex(&vertex, registry, storage);
    tracker.release_slot(slot);

    match result {
        Ok(output) => {
            info!("vértice ({}) OK ({} destinos)", vertex, output.len());
            tracker.report_success(vertex, output);
        }
        Err(e) => {
            warn!("vértice ({}) falló: {}", vertex, e);
            tracker.report_failure(vertex);
        }
    }
}

fn run_vertex(
    vertex: &VertexDescriptor,
    registry: &Registry,
    storage: Arc<dyn Storage>,
) -> Result<VertexOutput, EngineError> {
    let mut user_code = registry.load_vertex(&vertex.vertex_kind)?;

    // si falla la apertura de una entrada, las ya abiertas se cierran al salir
    let mut inputs = Vec::with_capacity(vertex.inputs.len());
    for location in &vertex.inputs {
        inputs.push(storage.open_input(location)?);
    }

    let mut ctx = VertexContext::new(vertex, inputs, storage);
    user_code.run(&mut ctx)?;
    Ok(ctx.into_output())
}
