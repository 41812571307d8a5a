use std::{
    fs::{self, File, OpenOptions},
    io::{self, BufRead, BufReader, Read, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
};

use glob::glob;
use tracing::debug;

use crate::error::{EngineError, Result};

/// Almacenamiento compartido entre master y workers.
///
/// El master sólo usa `list_input_partitions` (al arrancar la etapa 0) y
/// `relocate` (al terminar el job); el worker abre entradas y salidas.
pub trait Storage: Send + Sync {
    /// Particiones de entrada de un job, en orden estable. Cada una es un
    /// archivo completo o un rango `ruta#inicio-fin` alineado a líneas.
    fn list_input_partitions(&self, path: &str) -> Result<Vec<String>>;

    fn open_input(&self, location: &str) -> Result<Box<dyn Read + Send>>;

    /// Abre un archivo de salida con nombre único y devuelve su ubicación.
    fn open_output(
        &self,
        job_id: &str,
        stage: u32,
        vertex: u32,
        vertex_kind: &str,
    ) -> Result<(Box<dyn Write + Send>, String)>;

    /// Mueve los archivos dados dentro de `dest_dir`, conservando el nombre.
    fn relocate(&self, locations: &[String], dest_dir: &str) -> Result<()>;

    fn exists(&self, path: &str) -> bool;
}

/// Implementación sobre el filesystem local (ej: un volumen /data montado
/// en todos los contenedores).
#[derive(Debug, Clone)]
pub struct LocalStorage {
    root: PathBuf,
    splits_per_file: u32,
}

impl LocalStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            splits_per_file: 1,
        }
    }

    /// Parte cada archivo de entrada en `n` rangos de bytes (mínimo 1).
    pub fn with_splits(mut self, n: u32) -> Self {
        self.splits_per_file = n.max(1);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Rutas relativas se resuelven contra `root`; absolutas se respetan.
    fn resolve(&self, path: &str) -> PathBuf {
        let p = Path::new(path);
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            self.root.join(p)
        }
    }
}

fn is_glob_pattern(path: &str) -> bool {
    path.contains(&['*', '?', '['][..])
}

/// Rangos `[inicio, fin)` de igual tamaño que cubren `len` bytes.
fn byte_ranges(len: u64, n: u32) -> Vec<(u64, u64)> {
    let chunk = len.div_ceil(u64::from(n)).max(1);
    let mut ranges = Vec::new();
    let mut start = 0;
    while start < len {
        let end = (start + chunk).min(len);
        ranges.push((start, end));
        start = end;
    }
    ranges
}

/// `ruta#inicio-fin` -> (ruta, inicio, fin). Cualquier otra cosa es un
/// archivo completo.
fn parse_split(location: &str) -> Option<(&str, u64, u64)> {
    let (path, range) = location.rsplit_once('#')?;
    let (start, end) = range.split_once('-')?;
    let start: u64 = start.parse().ok()?;
    let end: u64 = end.parse().ok()?;
    (start <= end).then_some((path, start, end))
}

/// Lector de un rango de bytes que entrega sólo líneas completas: descarta
/// la línea parcial del inicio (es del rango anterior) y termina la última
/// línea que empieza antes de `end` aunque lo cruce.
struct LineRange<R> {
    inner: R,
    pos: u64,
    end: u64,
    line: Vec<u8>,
    offset: usize,
}

impl<R: BufRead + Seek> LineRange<R> {
    fn new(mut inner: R, start: u64, end: u64) -> io::Result<Self> {
        let mut pos = start;
        if start > 0 {
            inner.seek(SeekFrom::Start(start - 1))?;
            let mut prev = [0u8; 1];
            if inner.read(&mut prev)? == 1 && prev[0] != b'\n' {
                let mut partial = Vec::new();
                pos += inner.read_until(b'\n', &mut partial)? as u64;
            }
        }
        Ok(Self {
            inner,
            pos,
            end,
            line: Vec::new(),
            offset: 0,
        })
    }
}

impl<R: BufRead> Read for LineRange<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.offset >= self.line.len() {
            self.line.clear();
            self.offset = 0;
            if self.pos >= self.end {
                return Ok(0);
            }
            let n = self.inner.read_until(b'\n', &mut self.line)?;
            if n == 0 {
                return Ok(0);
            }
            self.pos += n as u64;
        }
        let n = buf.len().min(self.line.len() - self.offset);
        buf[..n].copy_from_slice(&self.line[self.offset..self.offset + n]);
        self.offset += n;
        Ok(n)
    }
}

fn sanitize(s: &str) -> String {
    s.chars()
        .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

impl Storage for LocalStorage {
    fn list_input_partitions(&self, path: &str) -> Result<Vec<String>> {
        let resolved = self.resolve(path);
        let mut files: Vec<PathBuf> = Vec::new();

        if is_glob_pattern(path) {
            let pattern = resolved.to_string_lossy().to_string();
            let entries = glob(&pattern)
                .map_err(|e| EngineError::InvalidJob(format!("patrón inválido {}: {}", pattern, e)))?;
            for entry in entries.flatten() {
                if entry.is_file() {
                    files.push(entry);
                }
            }
        } else {
            if !resolved.is_dir() {
                return Err(EngineError::NotFound(resolved.display().to_string()));
            }
            let entries = fs::read_dir(&resolved)
                .map_err(|e| EngineError::io(resolved.display().to_string(), e))?;
            for entry in entries.flatten() {
                if let Ok(ft) = entry.file_type() {
                    if ft.is_file() {
                        files.push(entry.path());
                    }
                }
            }
        }

        files.sort();

        let mut partitions = Vec::with_capacity(files.len());
        for file in files {
            let name = file.to_string_lossy().to_string();
            if self.splits_per_file <= 1 {
                partitions.push(name);
                continue;
            }
            let len = fs::metadata(&file)
                .map_err(|e| EngineError::io(name.clone(), e))?
                .len();
            if len == 0 {
                partitions.push(name);
                continue;
            }
            for (start, end) in byte_ranges(len, self.splits_per_file) {
                partitions.push(format!("{}#{}-{}", name, start, end));
            }
        }

        debug!("{} particiones de entrada en {}", partitions.len(), path);
        Ok(partitions)
    }

    fn open_input(&self, location: &str) -> Result<Box<dyn Read + Send>> {
        if let Some((path, start, end)) = parse_split(location) {
            let file = File::open(self.resolve(path)).map_err(|e| EngineError::io(location, e))?;
            let reader = LineRange::new(BufReader::new(file), start, end)
                .map_err(|e| EngineError::io(location, e))?;
            return Ok(Box::new(reader));
        }
        let path = self.resolve(location);
        let file = File::open(&path).map_err(|e| EngineError::io(location, e))?;
        Ok(Box::new(file))
    }

    fn open_output(
        &self,
        job_id: &str,
        stage: u32,
        vertex: u32,
        vertex_kind: &str,
    ) -> Result<(Box<dyn Write + Send>, String)> {
        let dir = self.root.join("tmp");
        fs::create_dir_all(&dir).map_err(|e| EngineError::io(dir.display().to_string(), e))?;

        let name = format!(
            "job{}_s{}_v{}_{}__{}.txt",
            sanitize(job_id),
            stage,
            vertex,
            sanitize(vertex_kind),
            uuid::Uuid::new_v4()
        );
        let path = dir.join(name);
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| EngineError::io(path.display().to_string(), e))?;

        Ok((Box::new(file), path.to_string_lossy().to_string()))
    }

    fn relocate(&self, locations: &[String], dest_dir: &str) -> Result<()> {
        let dest = self.resolve(dest_dir);
        fs::create_dir_all(&dest).map_err(|e| EngineError::io(dest_dir, e))?;

        for loc in locations {
            let src = self.resolve(loc);
            if !src.is_file() {
                return Err(EngineError::NotFound(src.display().to_string()));
            }
            let name = src
                .file_name()
                .ok_or_else(|| EngineError::NotFound(loc.clone()))?;
            fs::rename(&src, dest.join(name)).map_err(|e| EngineError::io(loc.clone(), e))?;
        }
        Ok(())
    }

    fn exists(&self, path: &str) -> bool {
        self.resolve(path).exists()
    }
}
