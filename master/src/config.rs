// master/src/config.rs

use common::env::parse_or;
use std::env;

pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8080";
pub const DEFAULT_MAX_SIMULTANEOUS_JOBS: usize = 2;
pub const DEFAULT_ASSIGN_DIVISOR: u32 = 3;
pub const DEFAULT_STORAGE_ROOT: &str = "/data";
pub const DEFAULT_INPUT_SPLITS_PER_FILE: u32 = 1;

/// Configuración del master, leída una vez al arrancar.
#[derive(Debug, Clone)]
pub struct MasterConfig {
    pub listen_addr: String,
    pub max_simultaneous_jobs: usize,
    pub assign_divisor: u32,
    pub storage_root: String,
    /// Rangos alineados a líneas en que se parte cada archivo de entrada.
    pub input_splits_per_file: u32,
}

impl Default for MasterConfig {
    fn default() -> Self {
        Self {
            listen_addr: DEFAULT_LISTEN_ADDR.to_string(),
            max_simultaneous_jobs: DEFAULT_MAX_SIMULTANEOUS_JOBS,
            assign_divisor: DEFAULT_ASSIGN_DIVISOR,
            storage_root: DEFAULT_STORAGE_ROOT.to_string(),
            input_splits_per_file: DEFAULT_INPUT_SPLITS_PER_FILE,
        }
    }
}

impl MasterConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Igual que `from_env` pero con la fuente de variables inyectada.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let d = Self::default();
        Self {
            listen_addr: lookup("MASTER_LISTEN_ADDR").unwrap_or(d.listen_addr),
            max_simultaneous_jobs: parse_or(
                "MAX_SIMULTANEOUS_JOBS",
                lookup("MAX_SIMULTANEOUS_JOBS"),
                d.max_simultaneous_jobs,
            )
            .max(1),
            assign_divisor: parse_or("ASSIGN_DIVISOR", lookup("ASSIGN_DIVISOR"), d.assign_divisor)
                .max(1),
            storage_root: lookup("STORAGE_ROOT").unwrap_or(d.storage_root),
            input_splits_per_file: parse_or(
                "INPUT_SPLITS_PER_FILE",
                lookup("INPUT_SPLITS_PER_FILE"),
                d.input_splits_per_file,
            )
            .max(1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn sin_variables_usa_valores_por_defecto() {
        let cfg = MasterConfig::from_lookup(lookup(&[]));
        assert_eq!(cfg.listen_addr, "0.0.0.0:8080");
        assert_eq!(cfg.max_simultaneous_jobs, 2);
        assert_eq!(cfg.assign_divisor, 3);
        assert_eq!(cfg.storage_root, "/data");
        assert_eq!(cfg.input_splits_per_file, 1);
    }

    #[test]
    fn valores_invalidos_vuelven_al_defecto() {
        let cfg = MasterConfig::from_lookup(lookup(&[
            ("MAX_SIMULTANEOUS_JOBS", "muchos"),
            ("ASSIGN_DIVISOR", "0"),
            ("STORAGE_ROOT", "/tmp/dryad"),
            ("INPUT_SPLITS_PER_FILE", "0"),
        ]));
        assert_eq!(cfg.max_simultaneous_jobs, 2);
        assert_eq!(cfg.assign_divisor, 1);
        assert_eq!(cfg.storage_root, "/tmp/dryad");
        assert_eq!(cfg.input_splits_per_file, 1);
    }

    #[test]
    fn splits_por_archivo_se_leen_del_entorno() {
        let cfg = MasterConfig::from_lookup(lookup(&[("INPUT_SPLITS_PER_FILE", "4")]));
        assert_eq!(cfg.input_splits_per_file, 4);
    }
}
