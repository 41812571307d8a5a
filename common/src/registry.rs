use std::collections::HashMap;

use crate::builtin;
use crate::context::Vertex;
use crate::error::{EngineError, Result};
use crate::job::JobSpec;

pub type JobFactory = fn() -> JobSpec;
pub type VertexFactory = fn() -> Box<dyn Vertex>;

/// Cargador de código: resuelve por nombre la especificación de un job
/// (en el master) y la implementación de un tipo de vértice (en el worker).
///
/// Cada implementación se registra con una función constructora.
#[derive(Clone, Default)]
pub struct Registry {
    jobs: HashMap<String, JobFactory>,
    vertices: HashMap<String, VertexFactory>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registro con los jobs de ejemplo incluidos.
    pub fn builtin() -> Self {
        let mut reg = Self::new();
        builtin::register(&mut reg);
        reg
    }

    pub fn register_job(&mut self, name: &str, factory: JobFactory) -> &mut Self {
        self.jobs.insert(name.to_string(), factory);
        self
    }

    pub fn register_vertex(&mut self, name: &str, factory: VertexFactory) -> &mut Self {
        self.vertices.insert(name.to_string(), factory);
        self
    }

    pub fn load_job(&self, code_ref: &str) -> Result<JobSpec> {
        self.jobs
            .get(code_ref)
            .map(|factory| factory())
            .ok_or_else(|| EngineError::UnknownJobKind(code_ref.to_string()))
    }

    pub fn load_vertex(&self, kind: &str) -> Result<Box<dyn Vertex>> {
        self.vertices
            .get(kind)
            .map(|factory| factory())
            .ok_or_else(|| EngineError::UnknownVertexKind(kind.to_string()))
    }

    pub fn job_kinds(&self) -> Vec<String> {
        let mut names: Vec<String> = self.jobs.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn vertex_kinds(&self) -> Vec<String> {
        let mut names: Vec<String> = self.vertices.keys().cloned().collect();
        names.sort();
        names
    }
}
