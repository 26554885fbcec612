//! The call surface the pipeline consumes from a compute driver.
//!
//! Backends hand out opaque [`Handle`]s and take them back through
//! [`ComputeBackend::release`]. Descriptor sets and command buffers live inside
//! their pools and are never released on their own.

pub mod host;
#[cfg(feature = "vulkan")]
pub mod vk;

use serde::Serialize;

use crate::select::{AdapterInfo, MemoryTypeInfo, QueueFamilyInfo, QueueRequest};

/// Opaque backend object identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Handle(pub u64);

impl std::fmt::Display for Handle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum ResourceKind {
    Instance,
    Device,
    Buffer,
    Memory,
    ShaderModule,
    DescriptorSetLayout,
    PipelineLayout,
    Pipeline,
    DescriptorPool,
    CommandPool,
    Fence,
}

/// Something that must be handed back to the backend exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resource {
    pub kind: ResourceKind,
    pub handle: Handle,
    /// Device that created the object; `None` for instances and devices.
    pub owner: Option<Handle>,
}

#[derive(Debug, thiserror::Error)]
#[error("{call} failed: {reason}")]
pub struct BackendError {
    pub call: &'static str,
    pub reason: String,
}

impl BackendError {
    pub fn new(call: &'static str, reason: impl Into<String>) -> Self {
        Self { call, reason: reason.into() }
    }
}

pub type BackendResult<T> = std::result::Result<T, BackendError>;

#[derive(Debug, Clone, Default)]
pub struct InstanceDesc {
    pub app_name: String,
    /// At most one layer, typically the Khronos validation layer.
    pub layer: Option<String>,
}

/// What a buffer needs from the allocation it is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryRequirements {
    /// Bytes to allocate; at least the buffer size, rounded up by the driver.
    pub size: u64,
    /// Bit `i` set when memory type `i` may back the buffer.
    pub memory_type_bits: u32,
}

impl MemoryRequirements {
    pub fn allows(&self, memory_type: u32) -> bool {
        memory_type < 32 && self.memory_type_bits & (1 << memory_type) != 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferBinding {
    pub buffer: Handle,
    pub range: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchDesc {
    pub pipeline: Handle,
    pub layout: Handle,
    pub descriptor_set: Handle,
    pub group_count: [u32; 3],
}

pub trait ComputeBackend {
    fn name(&self) -> &str;

    fn create_instance(&mut self, desc: &InstanceDesc) -> BackendResult<Handle>;
    fn enumerate_adapters(&mut self, instance: Handle) -> BackendResult<Vec<AdapterInfo>>;
    fn queue_families(&mut self, adapter: Handle) -> BackendResult<Vec<QueueFamilyInfo>>;
    fn memory_types(&mut self, adapter: Handle) -> BackendResult<Vec<MemoryTypeInfo>>;

    fn create_device(&mut self, adapter: Handle, queues: &[QueueRequest]) -> BackendResult<Handle>;
    fn get_queue(&mut self, device: Handle, family_index: u32) -> BackendResult<Handle>;

    fn create_buffer(&mut self, device: Handle, size: u64) -> BackendResult<Handle>;
    fn buffer_memory_requirements(&mut self, device: Handle, buffer: Handle) -> BackendResult<MemoryRequirements>;
    fn allocate_memory(&mut self, device: Handle, size: u64, memory_type: u32) -> BackendResult<Handle>;
    fn bind_buffer_memory(&mut self, device: Handle, buffer: Handle, memory: Handle) -> BackendResult<()>;
    /// Map, copy `data` to offset 0, unmap.
    fn write_memory(&mut self, device: Handle, memory: Handle, data: &[u8]) -> BackendResult<()>;
    /// Map, fill `out` from offset 0, unmap.
    fn read_memory(&mut self, device: Handle, memory: Handle, out: &mut [u8]) -> BackendResult<()>;

    /// `code` is the raw shader binary as read from disk.
    fn create_shader_module(&mut self, device: Handle, code: &[u8]) -> BackendResult<Handle>;
    fn create_descriptor_set_layout(&mut self, device: Handle, storage_buffers: u32) -> BackendResult<Handle>;
    fn create_pipeline_layout(&mut self, device: Handle, set_layout: Handle) -> BackendResult<Handle>;
    fn create_compute_pipeline(
        &mut self,
        device: Handle,
        layout: Handle,
        shader: Handle,
        entry_point: &str,
    ) -> BackendResult<Handle>;
    fn create_descriptor_pool(&mut self, device: Handle, storage_buffers: u32) -> BackendResult<Handle>;
    fn allocate_descriptor_set(&mut self, device: Handle, pool: Handle, layout: Handle) -> BackendResult<Handle>;
    /// Point bindings `0..buffers.len()` of `set` at the given buffers.
    fn write_storage_buffers(&mut self, device: Handle, set: Handle, buffers: &[BufferBinding]) -> BackendResult<()>;

    fn create_command_pool(&mut self, device: Handle, family_index: u32) -> BackendResult<Handle>;
    fn allocate_command_buffer(&mut self, device: Handle, pool: Handle) -> BackendResult<Handle>;
    fn record_dispatch(&mut self, device: Handle, command_buffer: Handle, dispatch: &DispatchDesc) -> BackendResult<()>;

    fn create_fence(&mut self, device: Handle) -> BackendResult<Handle>;
    fn submit(&mut self, device: Handle, queue: Handle, command_buffer: Handle, fence: Handle) -> BackendResult<()>;
    fn wait_for_fence(&mut self, device: Handle, fence: Handle, timeout_ns: u64) -> BackendResult<()>;

    fn release(&mut self, resource: Resource);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requirements_allow_listed_types_only() {
        let reqs = MemoryRequirements { size: 1088, memory_type_bits: 0b101 };
        assert!(reqs.allows(0));
        assert!(!reqs.allows(1));
        assert!(reqs.allows(2));
        assert!(!reqs.allows(40));
    }
}
