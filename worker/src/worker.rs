use anyhow::Result;
use common::{
    HeartbeatRequest, HeartbeatResponse, Registry, Storage, VertexDescriptor, WorkerId,
};
use reqwest::Client;
use std::sync::Arc;
use sysinfo::{CpuExt, System, SystemExt};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::capacity::CapacityTracker;
use crate::config::WorkerConfig;
use crate::executor;

/// Todo lo que necesita un vértice despachado en este worker.
#[derive(Clone)]
pub struct Runtime {
    pub registry: Arc<Registry>,
    pub storage: Arc<dyn Storage>,
    pub tracker: Arc<CapacityTracker>,
}

/// Loop principal del worker.
/// - Cada intervalo manda un heartbeat con slots libres y vértices terminados.
/// - Lanza cada vértice asignado en un hilo de bloqueo.
/// - Nunca recibe conexiones: sólo el worker le habla al master.
pub async fn run(config: WorkerConfig, runtime: Runtime) -> Result<()> {
    let client = Client::new();
    let hb_url = format!("{}/api/v1/workers/heartbeat", config.master_url);

    let worker_id: WorkerId = uuid::Uuid::new_v4().to_string();
    let hostname = hostname::get()
        .unwrap_or_default()
        .to_string_lossy()
        .to_string();

    info!(
        "worker {} ({}) con {} slots contra {}",
        worker_id,
        hostname,
        runtime.tracker.total_slots(),
        config.master_url
    );

    // System para leer CPU y memoria
    let mut sys = System::new_all();

    let mut ticker = interval(config.heartbeat_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        sys.refresh_cpu();
        sys.refresh_memory();
        let cpu_percent = sys.global_cpu_info().cpu_usage();
        // used_memory devuelve KB -> lo pasamos a bytes
        let mem_bytes = sys.used_memory() * 1024;

        let completed = runtime.tracker.drain_completed();
        let n_reports = completed.len();
        let req = HeartbeatRequest {
            worker_id: worker_id.clone(),
            hostname: hostname.clone(),
            available_slots: runtime.tracker.available_slots(),
            completed,
            cpu_percent: Some(cpu_percent),
            mem_bytes: Some(mem_bytes),
        };

        let assigned = match send_heartbeat(&client, &hb_url, &req).await {
            Ok(resp) => resp.assigned,
            Err(e) => {
                // los reportes drenados se pierden; el master no los reintenta
                warn!(
                    "heartbeat fallido ({} reportes perdidos): {:?}",
                    n_reports, e
                );
                continue;
            }
        };

        debug!(
            "heartbeat OK: {} reportes enviados, {} vértices nuevos",
            n_reports,
            assigned.len()
        );

        for vertex in assigned {
            dispatch(&runtime, vertex);
        }
    }
}

async fn send_heartbeat(client: &Client, url: &str, req: &HeartbeatRequest) -> Result<HeartbeatResponse> {
    let resp = client.post(url).json(req).send().await?.error_for_status()?;
    Ok(resp.json().await?)
}

/// Toma un slot y corre el vértice en un hilo de bloqueo. El permiso viaja
/// con el vértice: se suelta al terminar, también si el hilo entra en pánico,
/// y en ese caso se reporta el fallo con la copia del descriptor.
pub fn dispatch(runtime: &Runtime, vertex: VertexDescriptor) {
    let Some(slot) = runtime.tracker.reserve_slot() else {
        warn!("sin slots libres para el vértice ({}), se reporta fallo", vertex);
        runtime.tracker.report_failure(vertex);
        return;
    };

    let rt = runtime.clone();
    let copy = vertex.clone();

    tokio::spawn(async move {
        let tracker = rt.tracker.clone();
        let handle = tokio::task::spawn_blocking(move || {
            executor::execute(vertex, &rt.registry, rt.storage.clone(), &rt.tracker, slot)
        });

        if let Err(e) = handle.await {
            warn!("panic o join error en vértice ({}): {:?}", copy, e);
            tracker.report_failure(copy);
        }
    });
}
