use serde::{Deserialize, Serialize};

use crate::job::JobId;

/* --------- Pedidos del cliente --------- */

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitJobResponse {
    pub job_id: JobId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartJobRequest {
    /// Clave del job en el registro del master, ej: "echo"
    pub code_ref: String,
    pub input_path: String,
    pub output_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartJobResponse {
    pub started: bool,
    /// Motivo del rechazo si `started == false`
    pub reason: Option<String>,
}

impl StartJobResponse {
    pub fn ok() -> Self {
        Self {
            started: true,
            reason: None,
        }
    }

    pub fn rejected(reason: impl Into<String>) -> Self {
        Self {
            started: false,
            reason: Some(reason.into()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobKindsResponse {
    pub jobs: Vec<String>,
    pub vertices: Vec<String>,
}
