// master/src/scheduler.rs

use common::{Destination, JobDescriptor, JobId, JobStatus, Storage, VertexDescriptor};
use std::{
    collections::{HashMap, HashSet, VecDeque},
    sync::Arc,
};
use tracing::{debug, error, info, warn};

use crate::deps::{DependencyTable, StageKey};

/// Cuántos vértices se entregan por heartbeat: `ceil(slots / divisor)`.
///
/// Evita que un solo worker se lleve toda la cola de una vez. Es política
/// configurable, no un invariante.
#[derive(Debug, Clone, Copy)]
pub struct AssignPolicy {
    pub divisor: u32,
}

impl Default for AssignPolicy {
    fn default() -> Self {
        Self { divisor: 3 }
    }
}

impl AssignPolicy {
    pub fn max_assignments(&self, available_slots: u32) -> usize {
        let d = self.divisor.max(1);
        available_slots.div_ceil(d) as usize
    }
}

/// Mover la salida final de un job a su directorio de destino.
///
/// Se ejecuta FUERA del lock del scheduler (ver handlers::run_relocations).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relocation {
    pub job_id: JobId,
    pub files: Vec<String>,
    pub output_dir: String,
}

impl Relocation {
    pub fn apply(&self, storage: &dyn Storage) -> common::Result<()> {
        storage.relocate(&self.files, &self.output_dir)
    }
}

/// Qué hizo el scheduler con un reporte de vértice.
#[derive(Debug, PartialEq, Eq)]
pub enum Completion {
    /// Descartado: job desconocido o terminado, etapa vieja, duplicado...
    Ignored,
    Applied(Vec<Relocation>),
}

impl Completion {
    pub fn is_applied(&self) -> bool {
        matches!(self, Completion::Applied(_))
    }

    pub fn into_relocations(self) -> Vec<Relocation> {
        match self {
            Completion::Applied(relocations) => relocations,
            Completion::Ignored => Vec::new(),
        }
    }
}

#[derive(Debug)]
struct RunningJob {
    desc: JobDescriptor,
    status: JobStatus,
    /// Cantidad de vértices por etapa; la de la etapa 0 se resuelve al arrancarla
    stage_counts: Vec<Option<u32>>,
}

enum Step {
    Idle,
    Finish,
    StartStage(u32),
}

impl RunningJob {
    fn next_step(&self) -> Step {
        let st = &self.status;
        if st.finished {
            return Step::Idle;
        }
        if st.current_stage < 0 {
            return Step::StartStage(0);
        }
        if st.vertices_running_in_stage > 0 {
            return Step::Idle;
        }
        let next = st.current_stage as u32 + 1;
        if next == st.total_stages {
            Step::Finish
        } else {
            Step::StartStage(next)
        }
    }
}

/// Estado del coordinador: admisión de jobs, avance de etapas, generación
/// de vértices, tabla de dependencias y fallos.
///
/// No tiene locks propios: quien lo usa lo pone detrás de un único Mutex
/// (ver `AppState::manager`), así cada operación pública es atómica
/// respecto de las demás.
pub struct JobManager {
    storage: Arc<dyn Storage>,
    max_simultaneous_jobs: usize,
    policy: AssignPolicy,

    // jobs aceptados que esperan lugar
    queued: VecDeque<JobDescriptor>,
    // jobs en curso y terminados que el cliente todavía no consultó
    running: HashMap<JobId, RunningJob>,
    // orden de admisión, para generar vértices de forma determinista
    admission_order: Vec<JobId>,
    // vértices listos para asignar
    allocatable: VecDeque<VertexDescriptor>,
    // vértices asignados esperando reporte
    in_progress: HashSet<VertexDescriptor>,
    deps: DependencyTable,
}

impl JobManager {
    pub fn new(storage: Arc<dyn Storage>, max_simultaneous_jobs: usize, policy: AssignPolicy) -> Self {
        info!(
            "job manager inicializado (max_simultaneous_jobs={}, assign_divisor={})",
            max_simultaneous_jobs, policy.divisor
        );
        Self {
            storage,
            max_simultaneous_jobs: max_simultaneous_jobs.max(1),
            policy,
            queued: VecDeque::new(),
            running: HashMap::new(),
            admission_order: Vec::new(),
            allocatable: VecDeque::new(),
            in_progress: HashSet::new(),
            deps: DependencyTable::new(),
        }
    }

    /* ---------------- operaciones públicas ---------------- */

    /// Encola un job nuevo y lo arranca si hay lugar.
    pub fn submit(&mut self, job: JobDescriptor) -> Vec<Relocation> {
        info!(
            "job {} encolado (code_ref={}, etapas={})",
            job.id,
            job.code_ref,
            job.spec.stages.len()
        );
        self.queued.push_back(job);
        self.reconcile()
    }

    /// Admite jobs en cola mientras haya capacidad y avanza la etapa de todo
    /// job cuya etapa actual no tenga vértices pendientes.
    ///
    /// Repite hasta que no haya cambios: una etapa sin vértices avanza en la
    /// misma pasada, y un job que termina libera lugar para el siguiente.
    pub fn reconcile(&mut self) -> Vec<Relocation> {
        let mut relocations = Vec::new();

        loop {
            self.admit_queued();

            let mut progressed = false;
            let ids: Vec<JobId> = self.admission_order.clone();
            for id in ids {
                if self.advance_job(&id, &mut relocations) {
                    progressed = true;
                }
            }

            if !progressed {
                break;
            }
        }

        relocations
    }

    /// Entrega hasta `ceil(slots / divisor)` vértices, los más viejos primero.
    pub fn assign_to_worker(&mut self, worker_id: &str, available_slots: u32) -> Vec<VertexDescriptor> {
        let mut assigned = Vec::new();

        if available_slots == 0 {
            debug!("worker {} sin slots libres, no se asigna nada", worker_id);
            return assigned;
        }

        let max = self.policy.max_assignments(available_slots);
        for _ in 0..max {
            let Some(mut vertex) = self.allocatable.pop_front() else {
                break;
            };
            vertex.worker = Some(worker_id.to_string());
            self.in_progress.insert(vertex.clone());

            info!("vértice ({}) asignado al worker {}", vertex, worker_id);
            assigned.push(vertex);
        }

        assigned
    }

    /// Aplica el reporte de un vértice terminado.
    pub fn record_completion(&mut self, vertex: VertexDescriptor) -> Completion {
        let Some(status) = self.running.get(&vertex.job_id).map(|j| j.status) else {
            debug!("reporte de vértice ({}) para job inexistente, se ignora", vertex);
            return Completion::Ignored;
        };

        if status.finished {
            debug!("reporte de vértice ({}) para job ya terminado, se ignora", vertex);
            return Completion::Ignored;
        }

        if (vertex.stage as i32) < status.current_stage {
            info!(
                "reporte de vértice ({}) de una etapa anterior a la actual ({}), se ignora",
                vertex, status.current_stage
            );
            return Completion::Ignored;
        }

        if !vertex.finished {
            warn!(
                "worker {:?} reportó el vértice ({}) sin terminar, se ignora",
                vertex.worker, vertex
            );
            return Completion::Ignored;
        }

        if !self.in_progress.contains(&vertex) {
            warn!(
                "worker {:?} reportó el vértice ({}) que no está en curso (duplicado o nunca asignado), se ignora",
                vertex.worker, vertex
            );
            return Completion::Ignored;
        }

        info!(
            "worker {:?} reportó vértice ({}): {}",
            vertex.worker,
            vertex,
            if vertex.success { "OK" } else { "FALLÓ" }
        );

        // cualquier vértice fallido tira abajo el job entero
        if !vertex.success {
            self.fail_job(&vertex.job_id);
            return Completion::Applied(self.reconcile());
        }

        self.in_progress.remove(&vertex);

        let key = if vertex.stage + 1 < status.total_stages {
            StageKey::Stage(vertex.stage + 1)
        } else {
            StageKey::Final
        };

        if vertex.output.is_empty() {
            warn!("vértice ({}) terminó sin salidas", vertex);
        }
        for (dest, _) in vertex.output.iter() {
            let misrouted = matches!(
                (key, dest),
                (StageKey::Final, Destination::NextVertex(_)) | (StageKey::Stage(_), Destination::Final)
            );
            if misrouted {
                warn!(
                    "vértice ({}) escribió al destino {} que no corresponde a su etapa",
                    vertex, dest
                );
            }
        }

        self.deps.record(&vertex.job_id, key, &vertex.output);

        if let Some(job) = self.running.get_mut(&vertex.job_id) {
            job.status.vertices_running_in_stage =
                job.status.vertices_running_in_stage.saturating_sub(1);
        }

        Completion::Applied(self.reconcile())
    }

    /// Estado del job. Si ya terminó, esta consulta lo purga.
    pub fn query_status(&mut self, job_id: &str) -> Option<JobStatus> {
        let Some(job) = self.running.get(job_id) else {
            if let Some(queued) = self.queued.iter().find(|j| j.id == job_id) {
                info!("consulta de estado job={} - EN COLA", job_id);
                return Some(JobStatus::new(queued.spec.stages.len() as u32));
            }
            info!("consulta de estado job={} - NO ENCONTRADO", job_id);
            return None;
        };

        let status = job.status;
        if status.finished {
            info!("consulta de estado job={} - TERMINADO, se purga", job_id);
            self.running.remove(job_id);
            self.admission_order.retain(|id| id != job_id);
        } else {
            info!("consulta de estado job={} - EN CURSO", job_id);
        }
        Some(status)
    }

    /// Marca el job como terminado (fallido) y limpia sus vértices y su tabla.
    ///
    /// El job queda en `running` hasta la próxima consulta de estado, así el
    /// cliente ve hasta dónde llegó.
    pub fn fail_job(&mut self, job_id: &str) {
        let Some(job) = self.running.get_mut(job_id) else {
            info!("fallando job {} - no encontrado", job_id);
            return;
        };

        warn!(
            "fallando job {} en la etapa {} ({} de {} vértices pendientes)",
            job_id,
            job.status.current_stage,
            job.status.vertices_running_in_stage,
            job.status.vertices_in_stage
        );
        job.status.finished = true;

        self.allocatable.retain(|v| v.job_id != job_id);
        self.in_progress.retain(|v| v.job_id != job_id);
        self.deps.discard(job_id);
    }

    pub fn allocatable_len(&self) -> usize {
        self.allocatable.len()
    }

    pub fn in_progress_len(&self) -> usize {
        self.in_progress.len()
    }

    /* ---------------- internas ---------------- */

    fn active_jobs(&self) -> usize {
        self.running.values().filter(|j| !j.status.finished).count()
    }

    fn admit_queued(&mut self) {
        while self.active_jobs() < self.max_simultaneous_jobs {
            let Some(job) = self.queued.pop_front() else {
                break;
            };
            self.start_job(job);
        }
    }

    fn start_job(&mut self, job: JobDescriptor) {
        let total = job.spec.stages.len() as u32;
        let mut status = JobStatus::new(total);
        let stage_counts = job.spec.stages.iter().map(|s| s.num_vertices).collect();

        let id = job.id.clone();
        self.deps.init_job(&id);

        if total == 0 {
            error!("job {} no tiene etapas, se marca terminado sin salida", id);
            status.finished = true;
            self.deps.discard(&id);
        } else {
            info!("job {} arrancado ({} etapas)", id, total);
        }

        self.running.insert(
            id.clone(),
            RunningJob {
                desc: job,
                status,
                stage_counts,
            },
        );
        self.admission_order.push(id);
    }

    /// Un paso de avance para un job. Devuelve true si algo cambió.
    fn advance_job(&mut self, job_id: &str, relocations: &mut Vec<Relocation>) -> bool {
        let step = match self.running.get(job_id) {
            Some(job) => job.next_step(),
            None => return false,
        };

        match step {
            Step::Idle => false,
            Step::Finish => {
                self.finish_job(job_id, relocations);
                true
            }
            Step::StartStage(stage) => {
                self.start_stage(job_id, stage);
                true
            }
        }
    }

    fn finish_job(&mut self, job_id: &str, relocations: &mut Vec<Relocation>) {
        let Some(job) = self.running.get_mut(job_id) else {
            return;
        };
        job.status.finished = true;

        let files = self.deps.final_outputs(job_id);
        self.deps.discard(job_id);

        info!(
            "job {} terminó todas sus etapas ({} archivos de salida final)",
            job_id,
            files.len()
        );

        if files.is_empty() {
            warn!("job {} no produjo salida final, no se crea directorio de salida", job_id);
            return;
        }

        relocations.push(Relocation {
            job_id: job_id.to_string(),
            files,
            output_dir: job.desc.output_path.clone(),
        });
    }

    fn start_stage(&mut self, job_id: &str, stage: u32) {
        // la etapa 0 se dimensiona con las particiones de entrada
        let partitions = if stage == 0 {
            let Some(job) = self.running.get(job_id) else {
                return;
            };
            let input = job.desc.input_path.clone();
            match self.storage.list_input_partitions(&input) {
                Ok(parts) => {
                    if parts.is_empty() {
                        warn!("job {}: no hay archivos de entrada en {}", job_id, input);
                    }
                    Some(parts)
                }
                Err(e) => {
                    error!("job {}: no se pudo listar la entrada {}: {}", job_id, input, e);
                    self.fail_job(job_id);
                    return;
                }
            }
        } else {
            None
        };

        let Some(job) = self.running.get_mut(job_id) else {
            return;
        };

        if let Some(parts) = &partitions {
            job.stage_counts[0] = Some(parts.len() as u32);
        }

        let idx = stage as usize;
        let count = job.stage_counts[idx].unwrap_or(0);
        let is_last = stage + 1 == job.status.total_stages;
        let next_stage_vertices = if is_last {
            None
        } else {
            Some(job.stage_counts[idx + 1].unwrap_or(0))
        };
        let vertex_kind = job.desc.spec.stages[idx].vertex.clone();

        job.status.current_stage = stage as i32;
        job.status.vertices_in_stage = count;
        job.status.vertices_running_in_stage = count;

        for v in 0..count {
            let inputs = match &partitions {
                Some(parts) => vec![parts[v as usize].clone()],
                None => self.deps.inputs_for(job_id, stage, v),
            };

            let mut desc = VertexDescriptor::new(job_id, stage, v);
            desc.vertex_kind = vertex_kind.clone();
            desc.code_ref = job.desc.code_ref.clone();
            desc.inputs = inputs;
            desc.next_stage_vertices = next_stage_vertices;

            self.allocatable.push_back(desc);
        }

        info!(
            "job {}: etapa {} ({}) con {} vértices lista para asignar",
            job_id, stage, vertex_kind, count
        );
    }
}
