// master/src/deps.rs

use common::{Destination, JobId, VertexOutput};
use std::collections::HashMap;

/// Etapa que consume una salida: una etapa concreta o la salida final del job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageKey {
    Stage(u32),
    Final,
}

type Buckets = HashMap<Destination, Vec<String>>;

/// Tabla de dependencias de salida, por job:
/// etapa consumidora -> vértice destino -> archivos acumulados.
///
/// Varios productores de la misma etapa agregan al mismo bucket; nunca se
/// pisa una lista existente.
#[derive(Debug, Default)]
pub struct DependencyTable {
    jobs: HashMap<JobId, HashMap<StageKey, Buckets>>,
}

impl DependencyTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn init_job(&mut self, job_id: &str) {
        self.jobs.insert(job_id.to_string(), HashMap::new());
    }

    pub fn contains(&self, job_id: &str) -> bool {
        self.jobs.contains_key(job_id)
    }

    pub fn discard(&mut self, job_id: &str) -> bool {
        self.jobs.remove(job_id).is_some()
    }

    /// Agrega la salida de un vértice bajo la etapa consumidora `key`.
    /// Devuelve false si el job no tiene tabla (ya fue descartado).
    pub fn record(&mut self, job_id: &str, key: StageKey, output: &VertexOutput) -> bool {
        let Some(stages) = self.jobs.get_mut(job_id) else {
            return false;
        };
        let buckets = stages.entry(key).or_default();
        for (dest, files) in output.iter() {
            if files.is_empty() {
                continue;
            }
            buckets.entry(*dest).or_default().extend(files.iter().cloned());
        }
        true
    }

    pub fn bucket(&self, job_id: &str, key: StageKey, dest: Destination) -> Option<&Vec<String>> {
        self.jobs.get(job_id)?.get(&key)?.get(&dest)
    }

    /// Entradas del vértice `vertex` de la etapa `stage` (vacío si nadie le escribió).
    pub fn inputs_for(&self, job_id: &str, stage: u32, vertex: u32) -> Vec<String> {
        self.bucket(job_id, StageKey::Stage(stage), Destination::NextVertex(vertex))
            .cloned()
            .unwrap_or_default()
    }

    /// Archivos dirigidos a la salida final, en orden de llegada.
    pub fn final_outputs(&self, job_id: &str) -> Vec<String> {
        self.bucket(job_id, StageKey::Final, Destination::Final)
            .cloned()
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output(entries: &[(Destination, &str)]) -> VertexOutput {
        let mut out = VertexOutput::new();
        for (d, f) in entries {
            out.push(*d, *f);
        }
        out
    }

    #[test]
    fn record_concatena_en_orden_de_llegada() {
        let mut t = DependencyTable::new();
        t.init_job("J1");

        t.record("J1", StageKey::Stage(1), &output(&[(Destination::NextVertex(0), "a0")]));
        t.record(
            "J1",
            StageKey::Stage(1),
            &output(&[(Destination::NextVertex(0), "b0"), (Destination::NextVertex(2), "b2")]),
        );

        assert_eq!(t.inputs_for("J1", 1, 0), vec!["a0", "b0"]);
        assert_eq!(t.inputs_for("J1", 1, 2), vec!["b2"]);
        assert!(t.inputs_for("J1", 1, 1).is_empty());
        assert!(t.bucket("J1", StageKey::Stage(1), Destination::NextVertex(1)).is_none());
    }

    #[test]
    fn record_ignora_listas_vacias() {
        let mut t = DependencyTable::new();
        t.init_job("J1");

        let out: VertexOutput = vec![common::OutputRoute {
            destination: Destination::NextVertex(3),
            locations: Vec::new(),
        }]
        .into();
        t.record("J1", StageKey::Stage(1), &out);

        assert!(t.bucket("J1", StageKey::Stage(1), Destination::NextVertex(3)).is_none());
    }

    #[test]
    fn record_sin_tabla_no_hace_nada() {
        let mut t = DependencyTable::new();
        assert!(!t.record("X", StageKey::Final, &output(&[(Destination::Final, "f")])));
        assert!(!t.contains("X"));
    }

    #[test]
    fn final_outputs_junta_todo_lo_final() {
        let mut t = DependencyTable::new();
        t.init_job("J1");
        t.record("J1", StageKey::Final, &output(&[(Destination::Final, "f1")]));
        t.record("J1", StageKey::Final, &output(&[(Destination::Final, "f2")]));

        // un destino que no es Final en la última etapa no cuenta como salida
        t.record("J1", StageKey::Final, &output(&[(Destination::NextVertex(0), "x")]));

        assert_eq!(t.final_outputs("J1"), vec!["f1", "f2"]);

        assert!(t.discard("J1"));
        assert!(t.final_outputs("J1").is_empty());
    }
}
