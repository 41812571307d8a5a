//! Jobs de ejemplo que vienen registrados en `Registry::builtin()`.

use std::io::{self, Write};

use tracing::info;

use crate::context::{Vertex, VertexContext};
use crate::error::{EngineError, Result};
use crate::job::{JobSpec, VertexStage};
use crate::registry::Registry;

pub const ECHO: &str = "echo";
pub const CONCAT: &str = "concat";

/// Vértices de la segunda etapa del job "concat"
const CONCAT_REDUCERS: u32 = 2;

pub fn register(reg: &mut Registry) {
    reg.register_job(ECHO, echo_job)
        .register_job(CONCAT, concat_job)
        .register_vertex(ECHO, || Box::new(EchoVertex) as Box<dyn Vertex>)
        .register_vertex(CONCAT, || Box::new(ConcatVertex) as Box<dyn Vertex>);
}

/// Una sola etapa: un vértice echo por partición de entrada.
pub fn echo_job() -> JobSpec {
    JobSpec::new(vec![VertexStage::new(ECHO, None)])
}

/// Dos etapas: concat por partición -> concat en CONCAT_REDUCERS vértices.
pub fn concat_job() -> JobSpec {
    JobSpec::new(vec![
        VertexStage::new(CONCAT, None),
        VertexStage::new(CONCAT, Some(CONCAT_REDUCERS)),
    ])
}

fn vertex_err(e: io::Error) -> EngineError {
    EngineError::Vertex(e.to_string())
}

/// Escribe una línea fija, sin leer la entrada.
pub struct EchoVertex;

impl Vertex for EchoVertex {
    fn run(&mut self, ctx: &mut VertexContext) -> Result<()> {
        let Some(dest) = ctx.destination_for(ctx.vertex) else {
            return Ok(());
        };

        let (mut out, location) = ctx.open_output()?;
        writeln!(
            out,
            "echo job={} stage={} vertex={}",
            ctx.job_id, ctx.stage, ctx.vertex
        )
        .map_err(vertex_err)?;
        out.flush().map_err(vertex_err)?;

        info!("vértice echo {} escribió {}", ctx.vertex, location);
        ctx.emit(dest, location);
        Ok(())
    }
}

/// Copia todas sus entradas, en orden, a un único archivo de salida.
pub struct ConcatVertex;

impl Vertex for ConcatVertex {
    fn run(&mut self, ctx: &mut VertexContext) -> Result<()> {
        let Some(dest) = ctx.destination_for(ctx.vertex) else {
            return Ok(());
        };

        let (mut out, location) = ctx.open_output()?;
        let mut copied: u64 = 0;
        for input in ctx.inputs().iter_mut() {
            copied += io::copy(input, &mut out).map_err(vertex_err)?;
        }
        out.flush().map_err(vertex_err)?;

        info!(
            "vértice concat {} copió {} bytes a {} (destino {})",
            ctx.vertex, copied, location, dest
        );
        ctx.emit(dest, location);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{LocalStorage, Storage};
    use crate::vertex::{Destination, VertexDescriptor};
    use std::{env, fs, io::Read, path::PathBuf, sync::Arc};

    fn temp_dir(sub: &str) -> PathBuf {
        let base = env::temp_dir().join("builtin_tests").join(sub);
        let _ = fs::remove_dir_all(&base);
        fs::create_dir_all(&base).unwrap();
        base
    }

    fn read_all(storage: &dyn Storage, loc: &str) -> String {
        let mut s = String::new();
        storage.open_input(loc).unwrap().read_to_string(&mut s).unwrap();
        s
    }

    #[test]
    fn concat_copia_entradas_en_orden_hacia_la_etapa_siguiente() {
        let root = temp_dir("concat");
        fs::write(root.join("a.txt"), "uno\n").unwrap();
        fs::write(root.join("b.txt"), "dos\n").unwrap();
        let storage: Arc<dyn Storage> = Arc::new(LocalStorage::new(&root));

        let mut desc = VertexDescriptor::new("J1", 0, 3);
        desc.vertex_kind = CONCAT.to_string();
        desc.next_stage_vertices = Some(2);

        let inputs = vec![
            storage.open_input("a.txt").unwrap(),
            storage.open_input("b.txt").unwrap(),
        ];
        let mut ctx = VertexContext::new(&desc, inputs, storage.clone());
        ConcatVertex.run(&mut ctx).unwrap();

        let out = ctx.into_output();
        // vértice 3 con 2 vértices siguientes -> destino 1
        let files = out.get(&Destination::NextVertex(1)).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(read_all(storage.as_ref(), &files[0]), "uno\ndos\n");
    }

    #[test]
    fn echo_en_ultima_etapa_va_a_salida_final() {
        let root = temp_dir("echo");
        let storage: Arc<dyn Storage> = Arc::new(LocalStorage::new(&root));

        let mut desc = VertexDescriptor::new("J2", 0, 0);
        desc.vertex_kind = ECHO.to_string();

        let mut ctx = VertexContext::new(&desc, Vec::new(), storage.clone());
        EchoVertex.run(&mut ctx).unwrap();

        let files = ctx.output().get(&Destination::Final).unwrap().clone();
        assert_eq!(files.len(), 1);
        assert!(read_all(storage.as_ref(), &files[0]).starts_with("echo job=J2"));
    }

    #[test]
    fn sin_vertices_siguientes_no_produce_salida() {
        let root = temp_dir("vacio");
        let storage: Arc<dyn Storage> = Arc::new(LocalStorage::new(&root));

        let mut desc = VertexDescriptor::new("J3", 0, 0);
        desc.next_stage_vertices = Some(0);

        let mut ctx = VertexContext::new(&desc, Vec::new(), storage);
        ConcatVertex.run(&mut ctx).unwrap();
        assert!(ctx.output().is_empty());
    }
}
