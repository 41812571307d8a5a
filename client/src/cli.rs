use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use common::{
    JobKindsResponse, JobStatus, LocalStorage, StartJobRequest, StartJobResponse, Storage,
    SubmitJobResponse, WorkerMetrics,
};
use reqwest::{Client, StatusCode};
use std::{env, time::Duration};

/// Igual que en el worker:
/// - En Docker: MASTER_URL=http://master:8080
/// - Local: default http://localhost:8080
fn master_base_url() -> String {
    env::var("MASTER_URL")
        .unwrap_or_else(|_| "http://localhost:8080".to_string())
        .trim_end_matches('/')
        .to_string()
}

fn poll_interval() -> Duration {
    let ms = env::var("STATUS_POLL_MS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(5000);
    Duration::from_millis(ms.max(1))
}

#[derive(Parser, Debug)]
#[command(name = "client")]
#[command(about = "CLI para lanzar jobs por etapas en el master")]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Lanza un job y espera a que termine
    Run {
        /// Nombre del job registrado en el master (ver `kinds`)
        #[arg(value_name = "CODE_REF")]
        code_ref: String,

        /// Directorio o patrón glob con las particiones de entrada
        #[arg(value_name = "INPUT")]
        input: String,

        /// Directorio donde queda la salida final
        #[arg(value_name = "OUTPUT")]
        output: String,

        /// Verifica que la entrada exista antes de pedir el job (usa STORAGE_ROOT)
        #[arg(long)]
        check_input: bool,
    },
    /// Consulta el estado de un job (si ya terminó, el master lo olvida)
    Status {
        #[arg(value_name = "JOB_ID")]
        id: String,
    },
    /// Lista los workers que mandaron heartbeat
    Workers,
    /// Lista los jobs y tipos de vértice registrados
    Kinds,
}

/// Una línea con el estado de un job.
pub fn summarize(status: &JobStatus) -> String {
    let estado = if !status.finished {
        "EN CURSO"
    } else if status.completed() {
        "COMPLETADO"
    } else {
        "FALLIDO"
    };
    format!(
        "{} etapas {}/{} - vértices pendientes {}/{}",
        estado,
        status.stages_done(),
        status.total_stages,
        status.vertices_running_in_stage,
        status.vertices_in_stage
    )
}

/// Ejecuta el comando y devuelve el código de salida del proceso.
pub async fn run() -> Result<i32> {
    let cli = Cli::parse();
    let client = Client::new();
    let base_url = master_base_url();

    match cli.command {
        Commands::Run {
            code_ref,
            input,
            output,
            check_input,
        } => {
            if check_input {
                let root = env::var("STORAGE_ROOT").unwrap_or_else(|_| "/data".to_string());
                let storage = LocalStorage::new(root);
                if !storage.exists(&input) {
                    eprintln!("La entrada {} no existe", input);
                    return Ok(1);
                }
            }
            run_job(&client, &base_url, code_ref, input, output).await
        }

        Commands::Status { id } => {
            let url = format!("{}/api/v1/jobs/{}", base_url, id);
            let resp = client.get(&url).send().await?;
            if resp.status().is_success() {
                let status: JobStatus = resp.json().await?;
                println!("Job {}: {}", id, summarize(&status));
                Ok(0)
            } else {
                println!("Error: job no encontrado (status {})", resp.status());
                Ok(1)
            }
        }

        Commands::Workers => {
            let url = format!("{}/api/v1/workers", base_url);
            let resp = client.get(&url).send().await?;
            if !resp.status().is_success() {
                println!("Error consultando /api/v1/workers (status {})", resp.status());
                return Ok(1);
            }

            let workers: Vec<WorkerMetrics> = resp.json().await?;
            if workers.is_empty() {
                println!("Ningún worker mandó heartbeat todavía.");
            }
            for w in workers {
                println!("Worker {}", w.worker_id);
                println!("  host           : {}", w.hostname);
                println!("  last_heartbeat : {} s ago", w.last_heartbeat_secs_ago);
                println!("  slots libres   : {}", w.available_slots);
                println!(
                    "  vértices       : asignados={}, ok={}, fallidos={}",
                    w.vertices_assigned, w.vertices_succeeded, w.vertices_failed
                );
                match w.cpu_percent {
                    Some(cpu) => println!("  cpu_percent    : {:.1}%", cpu),
                    None => println!("  cpu_percent    : (sin datos)"),
                }
                match w.mem_bytes {
                    Some(mem) => println!("  mem_bytes      : {}", mem),
                    None => println!("  mem_bytes      : (sin datos)"),
                }
                println!();
            }
            Ok(0)
        }

        Commands::Kinds => {
            let url = format!("{}/api/v1/kinds", base_url);
            let kinds: JobKindsResponse = client.get(&url).send().await?.error_for_status()?.json().await?;
            println!("Jobs:");
            for j in kinds.jobs {
                println!("  - {}", j);
            }
            println!("Tipos de vértice:");
            for v in kinds.vertices {
                println!("  - {}", v);
            }
            Ok(0)
        }
    }
}

/// Pide id, arranca el job y consulta el estado hasta que termine.
async fn run_job(
    client: &Client,
    base_url: &str,
    code_ref: String,
    input_path: String,
    output_path: String,
) -> Result<i32> {
    // 1) Reservar id
    let url = format!("{}/api/v1/jobs", base_url);
    let SubmitJobResponse { job_id } = client
        .post(&url)
        .send()
        .await?
        .error_for_status()?
        .json()
        .await
        .context("respuesta inválida al pedir id de job")?;
    println!("Job {} reservado", job_id);

    // 2) Arrancarlo
    let url = format!("{}/api/v1/jobs/{}/start", base_url, job_id);
    let resp = client
        .post(&url)
        .json(&StartJobRequest {
            code_ref,
            input_path,
            output_path: output_path.clone(),
        })
        .send()
        .await?;
    let start: StartJobResponse = resp.json().await.context("respuesta inválida al arrancar el job")?;
    if !start.started {
        eprintln!(
            "El master no arrancó el job {}: {}",
            job_id,
            start.reason.unwrap_or_default()
        );
        return Ok(1);
    }
    println!("Job {} arrancado", job_id);

    // 3) Esperar; la consulta que ve el job terminado es la última
    let url = format!("{}/api/v1/jobs/{}", base_url, job_id);
    let every = poll_interval();
    let mut last_line = String::new();
    loop {
        let resp = client.get(&url).send().await?;
        if resp.status() == StatusCode::NOT_FOUND {
            bail!("el master ya no conoce el job {}", job_id);
        }
        let status: JobStatus = resp.error_for_status()?.json().await?;

        let line = summarize(&status);
        if line != last_line {
            println!("  {}", line);
            last_line = line;
        }

        if status.finished {
            return if status.completed() {
                println!("Job {} completado. Salida en {}", job_id, output_path);
                Ok(0)
            } else {
                eprintln!("Job {} falló", job_id);
                Ok(1)
            };
        }

        tokio::time::sleep(every).await;
    }
}
