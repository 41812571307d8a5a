use std::{
    fmt,
    io::{Read, Write},
    sync::Arc,
};

use crate::error::Result;
use crate::job::JobId;
use crate::storage::Storage;
use crate::vertex::{Destination, VertexDescriptor, VertexOutput};

/// Código de usuario que corre en cada vértice de una etapa.
///
/// El único contrato: leer de `ctx` las entradas, escribir salidas con
/// `ctx.open_output()` y registrar cada archivo producido con `ctx.emit()`
/// indicando a qué vértice de la etapa siguiente va (o `Final`).
pub trait Vertex: Send {
    fn run(&mut self, ctx: &mut VertexContext) -> Result<()>;
}

/// Lo que el worker le da a un vértice para ejecutarse.
pub struct VertexContext {
    pub job_id: JobId,
    pub stage: u32,
    pub vertex: u32,
    pub vertex_kind: String,

    /// None si este vértice está en la última etapa
    pub next_stage_vertices: Option<u32>,

    inputs: Vec<Box<dyn Read + Send>>,
    storage: Arc<dyn Storage>,
    output: VertexOutput,
}

impl VertexContext {
    pub fn new(
        descriptor: &VertexDescriptor,
        inputs: Vec<Box<dyn Read + Send>>,
        storage: Arc<dyn Storage>,
    ) -> Self {
        Self {
            job_id: descriptor.job_id.clone(),
            stage: descriptor.stage,
            vertex: descriptor.vertex,
            vertex_kind: descriptor.vertex_kind.clone(),
            next_stage_vertices: descriptor.next_stage_vertices,
            inputs,
            storage,
            output: VertexOutput::new(),
        }
    }

    /// Un stream por cada ubicación de entrada, en el orden del descriptor.
    pub fn inputs(&mut self) -> &mut [Box<dyn Read + Send>] {
        &mut self.inputs
    }

    /// Abre un archivo de salida nuevo para este vértice.
    pub fn open_output(&self) -> Result<(Box<dyn Write + Send>, String)> {
        self.storage
            .open_output(&self.job_id, self.stage, self.vertex, &self.vertex_kind)
    }

    pub fn emit(&mut self, destination: Destination, location: impl Into<String>) {
        self.output.push(destination, location);
    }

    /// Destino para un índice arbitrario: `Final` en la última etapa, si no
    /// `NextVertex(idx % n)`. None si la etapa siguiente no tiene vértices.
    pub fn destination_for(&self, idx: u32) -> Option<Destination> {
        match self.next_stage_vertices {
            None => Some(Destination::Final),
            Some(0) => None,
            Some(n) => Some(Destination::NextVertex(idx % n)),
        }
    }

    pub fn output(&self) -> &VertexOutput {
        &self.output
    }

    /// Consume el contexto (cerrando las entradas) y devuelve la tabla de salidas.
    pub fn into_output(self) -> VertexOutput {
        self.output
    }
}

impl fmt::Debug for VertexContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VertexContext")
            .field("job_id", &self.job_id)
            .field("stage", &self.stage)
            .field("vertex", &self.vertex)
            .field("vertex_kind", &self.vertex_kind)
            .field("next_stage_vertices", &self.next_stage_vertices)
            .field("inputs", &self.inputs.len())
            .field("output", &self.output)
            .finish()
    }
}
