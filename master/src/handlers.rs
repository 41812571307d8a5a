use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use common::{
    HeartbeatRequest, HeartbeatResponse, JobDescriptor, JobKindsResponse, JobStatus,
    StartJobRequest, StartJobResponse, Storage, SubmitJobResponse, WorkerMetrics,
};
use std::sync::{Arc, Mutex, MutexGuard};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::heartbeat::apply_heartbeat;
use crate::scheduler::Relocation;
use crate::state::{AppState, WorkerMeta};

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/v1/jobs", post(create_job))
        .route("/api/v1/jobs/:id", get(get_job))
        .route("/api/v1/jobs/:id/start", post(start_job))
        .route("/api/v1/kinds", get(list_kinds))
        .route("/api/v1/workers", get(list_workers))
        .route("/api/v1/workers/heartbeat", post(worker_heartbeat))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/* ---------------- helpers ---------------- */

/// Un lock envenenado significa que otro handler entró en pánico a mitad de
/// una operación: se responde 500 en vez de propagar el pánico.
fn lock<T>(m: &Mutex<T>) -> Result<MutexGuard<'_, T>, StatusCode> {
    m.lock().map_err(|_| {
        error!("lock envenenado en el estado del master");
        StatusCode::INTERNAL_SERVER_ERROR
    })
}

/// Mueve la salida final de los jobs terminados. Corre con el lock del
/// scheduler ya liberado; un error sólo se loguea.
async fn run_relocations(storage: Arc<dyn Storage>, relocations: Vec<Relocation>) {
    for reloc in relocations {
        let storage = storage.clone();
        let job_id = reloc.job_id.clone();
        let dest = reloc.output_dir.clone();

        let res = tokio::task::spawn_blocking(move || reloc.apply(storage.as_ref())).await;
        match res {
            Ok(Ok(())) => info!("salida del job {} movida a {}", job_id, dest),
            Ok(Err(e)) => error!("no se pudo mover la salida del job {} a {}: {}", job_id, dest, e),
            Err(e) => error!("tarea de reubicación del job {} abortada: {:?}", job_id, e),
        }
    }
}

/* ---------------- handlers HTTP ---------------- */

async fn health() -> &'static str {
    "ok"
}

// Reserva un id de job; el job todavía no existe para el scheduler
async fn create_job(State(state): State<AppState>) -> Result<Json<SubmitJobResponse>, StatusCode> {
    let job_id = uuid::Uuid::new_v4().to_string();
    {
        let mut reserved = lock(&state.reserved_jobs)?;
        reserved.insert(job_id.clone());
    }

    info!("id de job reservado: {}", job_id);
    Ok(Json(SubmitJobResponse { job_id }))
}

// Carga el código del job, arma el descriptor y lo manda al scheduler
async fn start_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<StartJobRequest>,
) -> (StatusCode, Json<StartJobResponse>) {
    let reserved = match lock(&state.reserved_jobs) {
        Ok(r) => r.contains(&id),
        Err(code) => return (code, Json(StartJobResponse::rejected("estado interno inválido"))),
    };
    if !reserved {
        warn!("pedido de arranque para job {} sin id reservado", id);
        return (
            StatusCode::NOT_FOUND,
            Json(StartJobResponse::rejected(format!("job {} no reservado", id))),
        );
    }

    let spec = match state.registry.load_job(&req.code_ref) {
        Ok(spec) => spec,
        Err(e) => {
            warn!("job {}: no se pudo cargar el código {}: {}", id, req.code_ref, e);
            return (StatusCode::BAD_REQUEST, Json(StartJobResponse::rejected(e.to_string())));
        }
    };
    if let Err(e) = spec.validate() {
        warn!("job {}: especificación inválida: {}", id, e);
        return (StatusCode::BAD_REQUEST, Json(StartJobResponse::rejected(e.to_string())));
    }

    let job = JobDescriptor {
        id: id.clone(),
        code_ref: req.code_ref,
        input_path: req.input_path,
        output_path: req.output_path,
        spec,
    };

    let relocations = {
        let mut reserved = match lock(&state.reserved_jobs) {
            Ok(r) => r,
            Err(code) => return (code, Json(StartJobResponse::rejected("estado interno inválido"))),
        };
        // si otro pedido ya lo arrancó, no se encola dos veces
        if !reserved.remove(&id) {
            return (
                StatusCode::CONFLICT,
                Json(StartJobResponse::rejected(format!("job {} ya arrancado", id))),
            );
        }
        drop(reserved);

        let mut manager = match lock(&state.manager) {
            Ok(m) => m,
            Err(code) => return (code, Json(StartJobResponse::rejected("estado interno inválido"))),
        };
        manager.submit(job)
    };

    run_relocations(state.storage.clone(), relocations).await;
    (StatusCode::OK, Json(StartJobResponse::ok()))
}

// Estado de un job; si ya terminó, esta consulta lo purga
async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<JobStatus>, StatusCode> {
    let status = {
        let mut manager = lock(&state.manager)?;
        manager.query_status(&id)
    };

    status.map(Json).ok_or(StatusCode::NOT_FOUND)
}

async fn list_kinds(State(state): State<AppState>) -> Json<JobKindsResponse> {
    Json(JobKindsResponse {
        jobs: state.registry.job_kinds(),
        vertices: state.registry.vertex_kinds(),
    })
}

// Heartbeat de worker: trae reportes y se lleva vértices nuevos
async fn worker_heartbeat(
    State(state): State<AppState>,
    Json(req): Json<HeartbeatRequest>,
) -> Result<Json<HeartbeatResponse>, StatusCode> {
    let HeartbeatRequest {
        worker_id,
        hostname,
        available_slots,
        completed,
        cpu_percent,
        mem_bytes,
    } = req;

    let outcome = {
        let mut manager = lock(&state.manager)?;
        apply_heartbeat(&mut manager, &worker_id, available_slots, completed)
    };

    {
        let mut workers = lock(&state.workers)?;
        let meta = workers.entry(worker_id.clone()).or_insert_with(|| {
            info!("worker nuevo: {} ({})", worker_id, hostname);
            WorkerMeta::new(hostname.clone())
        });
        meta.hostname = hostname;
        meta.last_heartbeat = Utc::now();
        meta.available_slots = available_slots;
        meta.vertices_assigned += outcome.assigned.len() as u64;
        meta.vertices_succeeded += outcome.succeeded;
        meta.vertices_failed += outcome.failed;
        meta.last_cpu_percent = cpu_percent;
        meta.last_mem_bytes = mem_bytes;
    }

    run_relocations(state.storage.clone(), outcome.relocations).await;

    Ok(Json(HeartbeatResponse {
        assigned: outcome.assigned,
    }))
}

async fn list_workers(State(state): State<AppState>) -> Result<Json<Vec<WorkerMetrics>>, StatusCode> {
    let now = Utc::now();
    let workers = lock(&state.workers)?;

    let mut out: Vec<WorkerMetrics> = workers
        .iter()
        .map(|(wid, meta)| WorkerMetrics {
            worker_id: wid.clone(),
            hostname: meta.hostname.clone(),
            last_heartbeat_at: meta.last_heartbeat,
            last_heartbeat_secs_ago: (now - meta.last_heartbeat).num_seconds().max(0) as u64,
            available_slots: meta.available_slots,
            vertices_assigned: meta.vertices_assigned,
            vertices_succeeded: meta.vertices_succeeded,
            vertices_failed: meta.vertices_failed,
            cpu_percent: meta.last_cpu_percent,
            mem_bytes: meta.last_mem_bytes,
        })
        .collect();
    out.sort_by(|a, b| a.worker_id.cmp(&b.worker_id));

    Ok(Json(out))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MasterConfig;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use common::{Destination, LocalStorage, Registry, VertexDescriptor};
    use serde::de::DeserializeOwned;
    use std::{env, fs, path::PathBuf};
    use tower::ServiceExt;

    fn temp_dir(sub: &str) -> PathBuf {
        let base = env::temp_dir().join("master_handlers_tests").join(sub);
        let _ = fs::remove_dir_all(&base);
        fs::create_dir_all(&base).unwrap();
        base
    }

    fn app(root: &PathBuf) -> Router {
        let storage: Arc<dyn Storage> = Arc::new(LocalStorage::new(root));
        let state = AppState::new(&MasterConfig::default(), Registry::builtin(), storage);
        build_router(state)
    }

    async fn call(app: &Router, method: &str, uri: &str, body: Option<serde_json::Value>) -> (StatusCode, Vec<u8>) {
        let builder = Request::builder().method(method).uri(uri);
        let req = match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let resp = app.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (status, bytes.to_vec())
    }

    fn parse<T: DeserializeOwned>(bytes: &[u8]) -> T {
        serde_json::from_slice(bytes).unwrap()
    }

    fn heartbeat(worker: &str, slots: u32, completed: Vec<VertexDescriptor>) -> serde_json::Value {
        serde_json::to_value(HeartbeatRequest {
            worker_id: worker.to_string(),
            hostname: "test".to_string(),
            available_slots: slots,
            completed,
            cpu_percent: None,
            mem_bytes: None,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn health_responde_ok() {
        let root = temp_dir("health");
        let (code, body) = call(&app(&root), "GET", "/health", None).await;
        assert_eq!(code, StatusCode::OK);
        assert_eq!(body, b"ok");
    }

    #[tokio::test]
    async fn start_sin_reserva_es_404_y_codigo_desconocido_es_400() {
        let root = temp_dir("rechazos");
        let app = app(&root);

        let start = serde_json::json!({"code_ref": "echo", "input_path": "in", "output_path": "out"});
        let (code, body) = call(&app, "POST", "/api/v1/jobs/nada/start", Some(start)).await;
        assert_eq!(code, StatusCode::NOT_FOUND);
        assert!(!parse::<StartJobResponse>(&body).started);

        let (_, body) = call(&app, "POST", "/api/v1/jobs", None).await;
        let id = parse::<SubmitJobResponse>(&body).job_id;

        let bad = serde_json::json!({"code_ref": "no_existe", "input_path": "in", "output_path": "out"});
        let (code, body) = call(&app, "POST", &format!("/api/v1/jobs/{}/start", id), Some(bad)).await;
        assert_eq!(code, StatusCode::BAD_REQUEST);
        let resp: StartJobResponse = parse(&body);
        assert!(!resp.started);
        assert!(resp.reason.unwrap().contains("no_existe"));

        // nunca llegó al scheduler
        let (code, _) = call(&app, "GET", &format!("/api/v1/jobs/{}", id), None).await;
        assert_eq!(code, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn job_echo_completo_por_heartbeats_reubica_la_salida() {
        let root = temp_dir("echo_completo");
        fs::create_dir_all(root.join("in")).unwrap();
        fs::write(root.join("in/a.txt"), "a").unwrap();
        fs::write(root.join("in/b.txt"), "b").unwrap();
        fs::create_dir_all(root.join("tmp")).unwrap();
        let app = app(&root);

        let (_, body) = call(&app, "POST", "/api/v1/jobs", None).await;
        let id = parse::<SubmitJobResponse>(&body).job_id;

        let start = serde_json::json!({"code_ref": "echo", "input_path": "in", "output_path": "out"});
        let (code, body) = call(&app, "POST", &format!("/api/v1/jobs/{}/start", id), Some(start.clone())).await;
        assert_eq!(code, StatusCode::OK);
        assert!(parse::<StartJobResponse>(&body).started);

        // el id ya se consumió
        let (code, _) = call(&app, "POST", &format!("/api/v1/jobs/{}/start", id), Some(start)).await;
        assert_eq!(code, StatusCode::NOT_FOUND);

        let (_, body) = call(&app, "GET", &format!("/api/v1/jobs/{}", id), None).await;
        let st: JobStatus = parse(&body);
        assert_eq!(st.current_stage, 0);
        assert_eq!(st.vertices_in_stage, 2);

        // ceil(6/3) = 2 -> los dos vértices
        let (_, body) = call(&app, "POST", "/api/v1/workers/heartbeat", Some(heartbeat("w1", 6, Vec::new()))).await;
        let assigned = parse::<HeartbeatResponse>(&body).assigned;
        assert_eq!(assigned.len(), 2);

        let mut reports = Vec::new();
        for mut v in assigned {
            let name = format!("tmp/salida{}.txt", v.vertex);
            fs::write(root.join(&name), "x").unwrap();
            v.finished = true;
            v.success = true;
            v.output.push(Destination::Final, name);
            reports.push(v);
        }
        let (code, body) = call(&app, "POST", "/api/v1/workers/heartbeat", Some(heartbeat("w1", 6, reports))).await;
        assert_eq!(code, StatusCode::OK);
        assert!(parse::<HeartbeatResponse>(&body).assigned.is_empty());

        let (_, body) = call(&app, "GET", &format!("/api/v1/jobs/{}", id), None).await;
        assert!(parse::<JobStatus>(&body).completed());
        assert!(root.join("out/salida0.txt").exists());
        assert!(root.join("out/salida1.txt").exists());

        // purgado después de verlo terminado
        let (code, _) = call(&app, "GET", &format!("/api/v1/jobs/{}", id), None).await;
        assert_eq!(code, StatusCode::NOT_FOUND);

        let (_, body) = call(&app, "GET", "/api/v1/workers", None).await;
        let workers: Vec<WorkerMetrics> = parse(&body);
        assert_eq!(workers.len(), 1);
        assert_eq!(workers[0].vertices_assigned, 2);
        assert_eq!(workers[0].vertices_succeeded, 2);
    }

    #[tokio::test]
    async fn kinds_lista_jobs_registrados() {
        let root = temp_dir("kinds");
        let (_, body) = call(&app(&root), "GET", "/api/v1/kinds", None).await;
        let kinds: JobKindsResponse = parse(&body);
        assert!(kinds.jobs.contains(&"echo".to_string()));
        assert!(kinds.vertices.contains(&"concat".to_string()));
    }

    #[tokio::test]
    async fn salida_final_inexistente_no_impide_completar_el_job() {
        let root = temp_dir("reubicacion_fallida");
        fs::create_dir_all(root.join("in")).unwrap();
        fs::write(root.join("in/a.txt"), "a").unwrap();
        let app = app(&root);

        let (_, body) = call(&app, "POST", "/api/v1/jobs", None).await;
        let id = parse::<SubmitJobResponse>(&body).job_id;
        let start = serde_json::json!({"code_ref": "echo", "input_path": "in", "output_path": "out"});
        let (code, _) = call(&app, "POST", &format!("/api/v1/jobs/{}/start", id), Some(start)).await;
        assert_eq!(code, StatusCode::OK);

        let (_, body) = call(&app, "POST", "/api/v1/workers/heartbeat", Some(heartbeat("w1", 3, Vec::new()))).await;
        let mut v = parse::<HeartbeatResponse>(&body).assigned.remove(0);
        v.finished = true;
        v.success = true;
        v.output.push(Destination::Final, "tmp/no_existe.txt");

        // el mismo reporte llega dos veces; el segundo se descarta
        for _ in 0..2 {
            let (code, _) =
                call(&app, "POST", "/api/v1/workers/heartbeat", Some(heartbeat("w1", 3, vec![v.clone()]))).await;
            assert_eq!(code, StatusCode::OK);
        }

        let (code, body) = call(&app, "GET", &format!("/api/v1/jobs/{}", id), None).await;
        assert_eq!(code, StatusCode::OK);
        assert!(parse::<JobStatus>(&body).completed());

        let files = fs::read_dir(root.join("out")).map(|d| d.count()).unwrap_or(0);
        assert_eq!(files, 0);

        let (_, body) = call(&app, "GET", "/api/v1/workers", None).await;
        let workers: Vec<WorkerMetrics> = parse(&body);
        assert_eq!(workers[0].vertices_succeeded, 1);
        assert_eq!(workers[0].vertices_failed, 0);
    }
}
