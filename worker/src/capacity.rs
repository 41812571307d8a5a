use common::{VertexDescriptor, VertexOutput};
use std::{
    collections::VecDeque,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::debug;

/// Slots de ejecución del worker + buffer de vértices terminados que el
/// próximo heartbeat se lleva.
///
/// Cada slot es un permiso del semáforo: se libera al soltar el permiso,
/// así que un vértice que entra en pánico también lo devuelve.
#[derive(Debug)]
pub struct CapacityTracker {
    total_slots: u32,
    slots: Arc<Semaphore>,
    completed: Mutex<VecDeque<VertexDescriptor>>,
}

impl CapacityTracker {
    pub fn new(total_slots: u32) -> Self {
        Self {
            total_slots,
            slots: Arc::new(Semaphore::new(total_slots as usize)),
            completed: Mutex::new(VecDeque::new()),
        }
    }

    // ningún vértice corre con este lock tomado: un lock envenenado igual tiene datos válidos
    fn completed(&self) -> MutexGuard<'_, VecDeque<VertexDescriptor>> {
        self.completed.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn total_slots(&self) -> u32 {
        self.total_slots
    }

    pub fn available_slots(&self) -> u32 {
        self.slots.available_permits() as u32
    }

    /// None si no queda ningún slot libre.
    pub fn reserve_slot(&self) -> Option<OwnedSemaphorePermit> {
        self.slots.clone().try_acquire_owned().ok()
    }

    pub fn release_slot(&self, slot: OwnedSemaphorePermit) {
        drop(slot);
    }

    pub fn report_success(&self, mut vertex: VertexDescriptor, output: VertexOutput) {
        vertex.finished = true;
        vertex.success = true;
        vertex.output = output;
        self.push(vertex);
    }

    pub fn report_failure(&self, mut vertex: VertexDescriptor) {
        vertex.finished = true;
        vertex.success = false;
        self.push(vertex);
    }

    fn push(&self, vertex: VertexDescriptor) {
        debug!("vértice ({}) terminado, queda para el próximo heartbeat", vertex);
        self.completed().push_back(vertex);
    }

    /// Saca todos los reportes pendientes. Lo que se devuelve acá no se
    /// vuelve a reportar.
    pub fn drain_completed(&self) -> Vec<VertexDescriptor> {
        self.completed().drain(..).collect()
    }
}
