use thiserror::Error;

/// Errores compartidos por master y worker.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("error de I/O en {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("no existe: {0}")]
    NotFound(String),

    #[error("tipo de job no registrado: {0}")]
    UnknownJobKind(String),

    #[error("tipo de vértice no registrado: {0}")]
    UnknownVertexKind(String),

    #[error("job inválido: {0}")]
    InvalidJob(String),

    #[error("el vértice falló: {0}")]
    Vertex(String),
}

impl EngineError {
    pub fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        EngineError::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
