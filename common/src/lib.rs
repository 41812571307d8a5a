pub mod builtin;
pub mod context;
pub mod env;
pub mod error;
pub mod job;
pub mod registry;
pub mod requests;
pub mod storage;
pub mod vertex;
pub mod worker;

pub use context::{Vertex, VertexContext};
pub use error::{EngineError, Result};
pub use job::{JobDescriptor, JobId, JobSpec, JobStatus, VertexStage};
pub use registry::Registry;
pub use requests::{JobKindsResponse, StartJobRequest, StartJobResponse, SubmitJobResponse};
pub use storage::{LocalStorage, Storage};
pub use vertex::{Destination, OutputRoute, VertexDescriptor, VertexOutput};
pub use worker::{HeartbeatRequest, HeartbeatResponse, WorkerId, WorkerMetrics};
