use crate::backend::BackendError;
use crate::shader::ShaderError;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A backend call returned a failure.
    #[error(transparent)]
    Backend(#[from] BackendError),
    /// The shader binary could not be read.
    #[error(transparent)]
    Shader(#[from] ShaderError),
    #[error("no discrete or integrated adapter among {0} enumerated")]
    NoAdapter(usize),
    #[error("adapter '{0}' exposes no compute-capable queue family")]
    NoComputeQueue(String),
    #[error("adapter '{0}' has no host-visible, host-coherent memory type")]
    NoHostMemory(String),
    #[error("memory type {memory_type} cannot back a storage buffer (allowed types {allowed:#b})")]
    IncompatibleMemoryType { memory_type: u32, allowed: u32 },
    #[error("memory heap of type {memory_type} holds {available} bytes, {required} required")]
    HeapTooSmall { memory_type: u32, available: u64, required: u64 },
    #[error("invalid configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;
