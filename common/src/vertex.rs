use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};

use crate::job::JobId;
use crate::worker::WorkerId;

/* --------- Destino de una salida --------- */

/// A quién va dirigido un archivo de salida: a un vértice concreto de la
/// etapa siguiente, o a la salida final del job (última etapa).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Destination {
    NextVertex(u32),
    Final,
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Destination::NextVertex(idx) => write!(f, "v{}", idx),
            Destination::Final => write!(f, "final"),
        }
    }
}

/* --------- Tabla de salidas de un vértice --------- */

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputRoute {
    pub destination: Destination,
    pub locations: Vec<String>,
}

/// Tabla destino -> archivos producidos que llena el vértice al ejecutarse.
///
/// En JSON viaja como lista de rutas porque las claves de un objeto JSON
/// tienen que ser strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<OutputRoute>", into = "Vec<OutputRoute>")]
pub struct VertexOutput {
    routes: BTreeMap<Destination, Vec<String>>,
}

impl VertexOutput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Agrega un archivo al destino dado (nunca pisa lo anterior).
    pub fn push(&mut self, destination: Destination, location: impl Into<String>) {
        self.routes
            .entry(destination)
            .or_default()
            .push(location.into());
    }

    pub fn get(&self, destination: &Destination) -> Option<&Vec<String>> {
        self.routes.get(destination)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Destination, &Vec<String>)> {
        self.routes.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }
}

impl From<Vec<OutputRoute>> for VertexOutput {
    fn from(list: Vec<OutputRoute>) -> Self {
        let mut out = VertexOutput::new();
        for route in list {
            let entry = out.routes.entry(route.destination).or_default();
            entry.extend(route.locations);
        }
        out
    }
}

impl From<VertexOutput> for Vec<OutputRoute> {
    fn from(out: VertexOutput) -> Self {
        out.routes
            .into_iter()
            .map(|(destination, locations)| OutputRoute {
                destination,
                locations,
            })
            .collect()
    }
}

/* --------- Descriptor de vértice --------- */

/// Unidad de trabajo que viaja entre master y worker.
///
/// Igualdad y hash sólo miran (job_id, stage, vertex): la copia del master
/// y la que devuelve el worker son el mismo vértice aunque difieran en
/// asignación o salida.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VertexDescriptor {
    pub job_id: JobId,
    pub stage: u32,
    pub vertex: u32,

    /// Clave del tipo de vértice en el registro
    pub vertex_kind: String,

    /// Referencia al código del job (informativa para el worker)
    pub code_ref: String,

    /// Worker al que se asignó (None mientras está en cola)
    pub worker: Option<WorkerId>,

    /// Ubicaciones de entrada
    pub inputs: Vec<String>,

    /// Lo que el vértice produjo, por destino
    pub output: VertexOutput,

    pub finished: bool,
    pub success: bool,

    /// Vértices de la etapa siguiente; None si es la última etapa
    pub next_stage_vertices: Option<u32>,
}

impl VertexDescriptor {
    pub fn new(job_id: &str, stage: u32, vertex: u32) -> Self {
        Self {
            job_id: job_id.to_string(),
            stage,
            vertex,
            vertex_kind: String::new(),
            code_ref: String::new(),
            worker: None,
            inputs: Vec::new(),
            output: VertexOutput::new(),
            finished: false,
            success: false,
            next_stage_vertices: None,
        }
    }

    pub fn is_last_stage(&self) -> bool {
        self.next_stage_vertices.is_none()
    }
}

impl PartialEq for VertexDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.job_id == other.job_id && self.stage == other.stage && self.vertex == other.vertex
    }
}

impl Eq for VertexDescriptor {}

impl Hash for VertexDescriptor {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.job_id.hash(state);
        self.stage.hash(state);
        self.vertex.hash(state);
    }
}

impl fmt::Display for VertexDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "job={} stage={} vertex={}", self.job_id, self.stage, self.vertex)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn igualdad_solo_por_job_etapa_y_vertice() {
        let mut stored = VertexDescriptor::new("J1", 1, 4);
        stored.worker = Some("w-1".to_string());
        stored.inputs = vec!["/tmp/a".to_string()];

        let mut reported = VertexDescriptor::new("J1", 1, 4);
        reported.finished = true;
        reported.success = true;
        reported.output.push(Destination::Final, "/tmp/out");

        assert_eq!(stored, reported);

        let mut set = HashSet::new();
        set.insert(stored);
        assert!(set.contains(&reported));

        assert_ne!(reported, VertexDescriptor::new("J1", 0, 4));
        assert_ne!(reported, VertexDescriptor::new("J2", 1, 4));
    }

    #[test]
    fn push_acumula_por_destino() {
        let mut out = VertexOutput::new();
        out.push(Destination::NextVertex(0), "a");
        out.push(Destination::NextVertex(0), "b");
        out.push(Destination::Final, "c");

        assert_eq!(out.len(), 2);
        assert_eq!(
            out.get(&Destination::NextVertex(0)),
            Some(&vec!["a".to_string(), "b".to_string()])
        );
        assert!(out.get(&Destination::NextVertex(1)).is_none());
    }

    #[test]
    fn salida_viaja_como_lista_en_json() {
        let mut out = VertexOutput::new();
        out.push(Destination::NextVertex(2), "/tmp/x");
        out.push(Destination::Final, "/tmp/y");

        let json = serde_json::to_value(&out).unwrap();
        assert!(json.is_array());

        let back: VertexOutput = serde_json::from_value(json).unwrap();
        assert_eq!(back, out);
    }

    #[test]
    fn descriptor_sin_etapa_siguiente_es_ultima_etapa() {
        let mut v = VertexDescriptor::new("J", 0, 0);
        assert!(v.is_last_stage());
        v.next_stage_vertices = Some(3);
        assert!(!v.is_last_stage());
    }
}
