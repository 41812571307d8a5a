use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

pub type JobId = String;

/// Una etapa del cómputo: qué tipo de vértice corre y cuántos vértices hay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VertexStage {
    /// Clave del tipo de vértice en el registro (ej: "echo").
    pub vertex: String,

    /// Cantidad de vértices. En la etapa 0 se ignora: el master la
    /// reemplaza por la cantidad de particiones de entrada.
    pub num_vertices: Option<u32>,
}

impl VertexStage {
    pub fn new(vertex: &str, num_vertices: Option<u32>) -> Self {
        Self {
            vertex: vertex.to_string(),
            num_vertices,
        }
    }
}

/// Lista ordenada de etapas que define un job.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSpec {
    pub stages: Vec<VertexStage>,
}

impl JobSpec {
    pub fn new(stages: Vec<VertexStage>) -> Self {
        Self { stages }
    }

    /// Las etapas posteriores a la 0 tienen que declarar su cantidad de
    /// vértices. Un job sin etapas NO se rechaza acá: lo resuelve la
    /// admisión del master como fallo terminal.
    pub fn validate(&self) -> Result<()> {
        for (idx, stage) in self.stages.iter().enumerate().skip(1) {
            if stage.num_vertices.is_none() {
                return Err(EngineError::InvalidJob(format!(
                    "la etapa {} ({}) no declara cantidad de vértices",
                    idx, stage.vertex
                )));
            }
        }
        Ok(())
    }
}

/// Job tal como lo guarda el coordinador.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobDescriptor {
    pub id: JobId,

    /// Referencia al código del usuario (clave del registro de jobs)
    pub code_ref: String,

    /// Directorio (o patrón glob) con las particiones de entrada
    pub input_path: String,

    /// Directorio final donde se reubica la salida de la última etapa
    pub output_path: String,

    pub spec: JobSpec,
}

/// Foto del estado de un job.
///
/// No hay código de error: un job terminado que no llegó a la última etapa
/// con cero vértices pendientes es un job fallido. Ver [`JobStatus::completed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStatus {
    /// Índice de la etapa actual, -1 antes de arrancar
    pub current_stage: i32,
    pub total_stages: u32,
    pub vertices_in_stage: u32,
    pub vertices_running_in_stage: u32,
    pub finished: bool,
}

impl JobStatus {
    pub fn new(total_stages: u32) -> Self {
        Self {
            current_stage: -1,
            total_stages,
            vertices_in_stage: 0,
            vertices_running_in_stage: 0,
            finished: false,
        }
    }

    /// true si el job terminó recorriendo todas sus etapas.
    pub fn completed(&self) -> bool {
        self.finished
            && self.total_stages > 0
            && self.current_stage == self.total_stages as i32 - 1
            && self.vertices_running_in_stage == 0
    }

    /// Etapas que terminaron de ejecutarse.
    pub fn stages_done(&self) -> u32 {
        let base = self.current_stage.max(0) as u32;
        if self.completed() {
            base + 1
        } else {
            base
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_exige_cantidad_desde_la_segunda_etapa() {
        let ok = JobSpec::new(vec![
            VertexStage::new("a", None),
            VertexStage::new("b", Some(2)),
        ]);
        assert!(ok.validate().is_ok());

        let bad = JobSpec::new(vec![
            VertexStage::new("a", None),
            VertexStage::new("b", None),
        ]);
        assert!(matches!(bad.validate(), Err(EngineError::InvalidJob(_))));
    }

    #[test]
    fn validate_acepta_job_sin_etapas() {
        assert!(JobSpec::default().validate().is_ok());
    }

    #[test]
    fn completed_distingue_exito_de_fallo() {
        let mut st = JobStatus::new(2);
        assert!(!st.completed());

        st.current_stage = 1;
        st.vertices_in_stage = 2;
        st.vertices_running_in_stage = 0;
        st.finished = true;
        assert!(st.completed());
        assert_eq!(st.stages_done(), 2);

        // fallo en la etapa 0 con un vértice todavía pendiente
        let failed = JobStatus {
            current_stage: 0,
            total_stages: 2,
            vertices_in_stage: 3,
            vertices_running_in_stage: 1,
            finished: true,
        };
        assert!(!failed.completed());
        assert_eq!(failed.stages_done(), 0);
    }

    #[test]
    fn job_sin_etapas_nunca_esta_completo() {
        let mut st = JobStatus::new(0);
        st.finished = true;
        assert!(!st.completed());
    }
}
