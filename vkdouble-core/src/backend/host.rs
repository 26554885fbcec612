//! CPU emulation of the compute backend.
//!
//! Used by the test suite and by `--backend host`. Memory lives in plain byte
//! vectors and a submitted dispatch runs a host kernel over the two storage
//! buffers bound to its descriptor set (binding 0 in, binding 1 out). Every
//! acquire and release is written to a [`Ledger`] so teardown can be checked.

use std::collections::HashMap;

use log::{debug, warn};

use super::{
    BackendError, BackendResult, BufferBinding, ComputeBackend, DispatchDesc, Handle, InstanceDesc,
    MemoryRequirements, Resource, ResourceKind,
};
use crate::select::{AdapterInfo, AdapterKind, MemoryFlags, MemoryTypeInfo, QueueCaps, QueueFamilyInfo, QueueRequest};

pub type HostKernel = Box<dyn Fn(&[f32], &mut [f32])>;

/// Adapter topology the host backend reports.
#[derive(Debug, Clone)]
pub struct HostAdapter {
    pub kind: AdapterKind,
    pub name: String,
    pub families: Vec<QueueFamilyInfo>,
    pub memory_types: Vec<MemoryTypeInfo>,
    /// Buffer allocations are rounded up to a multiple of this.
    pub buffer_alignment: u64,
    /// Memory types allowed to back a buffer, one bit per type index.
    pub buffer_memory_type_bits: u32,
}

impl HostAdapter {
    /// One discrete adapter with a universal queue family, a device-local
    /// heap and a small host-visible, host-coherent heap.
    pub fn emulated() -> Self {
        Self {
            kind: AdapterKind::Discrete,
            name: "vkdouble host emulator".into(),
            families: vec![QueueFamilyInfo {
                index: 0,
                caps: QueueCaps::GRAPHICS | QueueCaps::COMPUTE | QueueCaps::TRANSFER,
                queue_count: 1,
            }],
            memory_types: vec![
                MemoryTypeInfo { index: 0, flags: MemoryFlags::DEVICE_LOCAL, heap_index: 0, heap_size: 1 << 30 },
                MemoryTypeInfo {
                    index: 1,
                    flags: MemoryFlags::HOST_VISIBLE | MemoryFlags::HOST_COHERENT,
                    heap_index: 1,
                    heap_size: 256 << 20,
                },
            ],
            buffer_alignment: 64,
            buffer_memory_type_bits: 0b11,
        }
    }
}

/// Ordered record of acquire/release events.
#[derive(Debug, Default, Clone)]
pub struct Ledger {
    acquired: Vec<(ResourceKind, Handle)>,
    released: Vec<(ResourceKind, Handle)>,
    violations: Vec<String>,
}

impl Ledger {
    pub fn acquired(&self) -> &[(ResourceKind, Handle)] {
        &self.acquired
    }

    pub fn released(&self) -> &[(ResourceKind, Handle)] {
        &self.released
    }

    /// Releases of unknown handles and parents released before their children.
    pub fn violations(&self) -> &[String] {
        &self.violations
    }

    pub fn acquired_count(&self, kind: ResourceKind) -> usize {
        self.acquired.iter().filter(|(k, _)| *k == kind).count()
    }

    pub fn released_count(&self, kind: ResourceKind) -> usize {
        self.released.iter().filter(|(k, _)| *k == kind).count()
    }

    /// Same number of acquires and releases per kind, and no violations.
    pub fn is_balanced(&self) -> bool {
        self.violations.is_empty()
            && self.acquired.iter().all(|(k, _)| self.acquired_count(*k) == self.released_count(*k))
            && self.released.iter().all(|(k, _)| self.acquired_count(*k) == self.released_count(*k))
    }
}

#[derive(Debug)]
enum Object {
    Instance,
    Device { adapter: usize },
    Queue,
    Buffer { size: u64, memory: Option<Handle> },
    Memory { memory_type: u32, flags: MemoryFlags, bytes: Vec<u8> },
    ShaderModule,
    SetLayout { storage_buffers: u32 },
    PipelineLayout,
    Pipeline,
    DescriptorPool,
    DescriptorSet { bindings: Vec<Option<Handle>> },
    CommandPool,
    CommandBuffer { dispatch: Option<DispatchDesc> },
    Fence { signaled: bool },
}

impl Object {
    /// `None` for objects that die with their parent.
    fn kind(&self) -> Option<ResourceKind> {
        match self {
            Object::Instance => Some(ResourceKind::Instance),
            Object::Device { .. } => Some(ResourceKind::Device),
            Object::Buffer { .. } => Some(ResourceKind::Buffer),
            Object::Memory { .. } => Some(ResourceKind::Memory),
            Object::ShaderModule => Some(ResourceKind::ShaderModule),
            Object::SetLayout { .. } => Some(ResourceKind::DescriptorSetLayout),
            Object::PipelineLayout => Some(ResourceKind::PipelineLayout),
            Object::Pipeline => Some(ResourceKind::Pipeline),
            Object::DescriptorPool => Some(ResourceKind::DescriptorPool),
            Object::CommandPool => Some(ResourceKind::CommandPool),
            Object::Fence { .. } => Some(ResourceKind::Fence),
            Object::Queue | Object::DescriptorSet { .. } | Object::CommandBuffer { .. } => None,
        }
    }
}

#[derive(Debug)]
struct Entry {
    parent: Option<Handle>,
    object: Object,
}

pub struct HostBackend {
    adapters: Vec<HostAdapter>,
    /// Instance that reported each adapter, filled by enumeration.
    adapter_owner: HashMap<usize, Handle>,
    objects: HashMap<Handle, Entry>,
    next: u64,
    kernel: HostKernel,
    ledger: Ledger,
    fail_call: Option<&'static str>,
    layers: Vec<String>,
}

const ADAPTER_BASE: u64 = 0xada0_0000;

impl Default for HostBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl HostBackend {
    pub fn new() -> Self {
        Self::with_adapters(vec![HostAdapter::emulated()])
    }

    pub fn with_adapters(adapters: Vec<HostAdapter>) -> Self {
        Self {
            adapters,
            adapter_owner: HashMap::new(),
            objects: HashMap::new(),
            next: 1,
            kernel: Box::new(|input: &[f32], output: &mut [f32]| {
                for (o, i) in output.iter_mut().zip(input) {
                    *o = *i * 2.0;
                }
            }),
            ledger: Ledger::default(),
            fail_call: None,
            layers: Vec::new(),
        }
    }

    /// Replace the kernel run on submit.
    pub fn with_kernel(mut self, kernel: impl Fn(&[f32], &mut [f32]) + 'static) -> Self {
        self.kernel = Box::new(kernel);
        self
    }

    /// Make the named trait call fail every time it is made.
    pub fn failing_at(mut self, call: &'static str) -> Self {
        self.fail_call = Some(call);
        self
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// Layers requested by every `create_instance` so far.
    pub fn requested_layers(&self) -> &[String] {
        &self.layers
    }

    /// Objects still alive, pool-owned ones included.
    pub fn live_objects(&self) -> usize {
        self.objects.len()
    }

    fn check(&self, call: &'static str) -> BackendResult<()> {
        match self.fail_call {
            Some(c) if c == call => Err(BackendError::new(call, "injected failure")),
            _ => Ok(()),
        }
    }

    fn insert(&mut self, parent: Option<Handle>, object: Object) -> Handle {
        let handle = Handle(self.next);
        self.next += 1;
        if let Some(kind) = object.kind() {
            self.ledger.acquired.push((kind, handle));
        }
        self.objects.insert(handle, Entry { parent, object });
        handle
    }

    fn entry(&self, call: &'static str, handle: Handle) -> BackendResult<&Entry> {
        self.objects
            .get(&handle)
            .ok_or_else(|| BackendError::new(call, format!("unknown handle {}", handle)))
    }

    fn entry_mut(&mut self, call: &'static str, handle: Handle) -> BackendResult<&mut Entry> {
        self.objects
            .get_mut(&handle)
            .ok_or_else(|| BackendError::new(call, format!("unknown handle {}", handle)))
    }

    fn expect_device(&self, call: &'static str, device: Handle) -> BackendResult<usize> {
        match self.entry(call, device)?.object {
            Object::Device { adapter } => Ok(adapter),
            _ => Err(BackendError::new(call, format!("{} is not a device", device))),
        }
    }

    fn adapter_index(&self, call: &'static str, adapter: Handle) -> BackendResult<usize> {
        let idx = adapter
            .0
            .checked_sub(ADAPTER_BASE)
            .map(|i| i as usize)
            .filter(|i| *i < self.adapters.len())
            .ok_or_else(|| BackendError::new(call, format!("unknown adapter {}", adapter)))?;
        Ok(idx)
    }

    fn host_bytes(&mut self, call: &'static str, memory: Handle) -> BackendResult<&mut Vec<u8>> {
        match &mut self.entry_mut(call, memory)?.object {
            Object::Memory { flags, bytes, .. } => {
                if !flags.contains(MemoryFlags::HOST_VISIBLE) {
                    return Err(BackendError::new(call, "memory is not host-visible"));
                }
                Ok(bytes)
            }
            _ => Err(BackendError::new(call, format!("{} is not a memory allocation", memory))),
        }
    }

    /// Memory bound behind a storage binding, with the buffer's size.
    fn bound_memory(&self, call: &'static str, buffer: Option<Handle>) -> BackendResult<(Handle, u64)> {
        let buffer = buffer.ok_or_else(|| BackendError::new(call, "descriptor binding not written"))?;
        match self.entry(call, buffer)?.object {
            Object::Buffer { size, memory: Some(memory) } => Ok((memory, size)),
            Object::Buffer { memory: None, .. } => Err(BackendError::new(call, "buffer has no memory bound")),
            _ => Err(BackendError::new(call, format!("{} is not a buffer", buffer))),
        }
    }

    fn execute(&mut self, dispatch: &DispatchDesc) -> BackendResult<()> {
        const CALL: &str = "submit";
        let bindings = match &self.entry(CALL, dispatch.descriptor_set)?.object {
            Object::DescriptorSet { bindings } => bindings.clone(),
            _ => return Err(BackendError::new(CALL, "dispatch without a descriptor set")),
        };
        if bindings.len() < 2 {
            return Err(BackendError::new(CALL, "kernel needs an input and an output binding"));
        }
        let (in_mem, in_size) = self.bound_memory(CALL, bindings[0])?;
        let (out_mem, out_size) = self.bound_memory(CALL, bindings[1])?;
        let elem = std::mem::size_of::<f32>() as u64;
        if in_size % elem != 0 || out_size % elem != 0 {
            return Err(BackendError::new(
                CALL,
                format!("binding sizes {} and {} are not whole f32 elements", in_size, out_size),
            ));
        }

        let input: Vec<f32> = {
            let bytes = self.host_bytes(CALL, in_mem)?;
            bytemuck::pod_collect_to_vec(&bytes[..in_size as usize])
        };
        let mut output: Vec<f32> = {
            let bytes = self.host_bytes(CALL, out_mem)?;
            bytemuck::pod_collect_to_vec(&bytes[..out_size as usize])
        };
        (self.kernel)(&input, &mut output);

        let bytes = self.host_bytes(CALL, out_mem)?;
        bytes[..out_size as usize].copy_from_slice(bytemuck::cast_slice(&output));
        debug!("host dispatch {:?} over {} elements", dispatch.group_count, input.len().min(output.len()));
        Ok(())
    }
}

impl ComputeBackend for HostBackend {
    fn name(&self) -> &str {
        "host"
    }

    fn create_instance(&mut self, desc: &InstanceDesc) -> BackendResult<Handle> {
        self.check("create_instance")?;
        if let Some(layer) = &desc.layer {
            self.layers.push(layer.clone());
        }
        Ok(self.insert(None, Object::Instance))
    }

    fn enumerate_adapters(&mut self, instance: Handle) -> BackendResult<Vec<AdapterInfo>> {
        self.check("enumerate_adapters")?;
        self.entry("enumerate_adapters", instance)?;
        let mut out = Vec::with_capacity(self.adapters.len());
        for (i, a) in self.adapters.iter().enumerate() {
            self.adapter_owner.insert(i, instance);
            out.push(AdapterInfo { id: Handle(ADAPTER_BASE + i as u64), kind: a.kind, name: a.name.clone() });
        }
        Ok(out)
    }

    fn queue_families(&mut self, adapter: Handle) -> BackendResult<Vec<QueueFamilyInfo>> {
        self.check("queue_families")?;
        let idx = self.adapter_index("queue_families", adapter)?;
        Ok(self.adapters[idx].families.clone())
    }

    fn memory_types(&mut self, adapter: Handle) -> BackendResult<Vec<MemoryTypeInfo>> {
        self.check("memory_types")?;
        let idx = self.adapter_index("memory_types", adapter)?;
        Ok(self.adapters[idx].memory_types.clone())
    }

    fn create_device(&mut self, adapter: Handle, queues: &[QueueRequest]) -> BackendResult<Handle> {
        self.check("create_device")?;
        let idx = self.adapter_index("create_device", adapter)?;
        if queues.is_empty() {
            return Err(BackendError::new("create_device", "no queue requested"));
        }
        for (i, q) in queues.iter().enumerate() {
            if !self.adapters[idx].families.iter().any(|f| f.index == q.family_index) {
                return Err(BackendError::new("create_device", format!("no queue family {}", q.family_index)));
            }
            if queues[..i].iter().any(|p| p.family_index == q.family_index) {
                return Err(BackendError::new("create_device", "queue family requested twice"));
            }
        }
        let parent = self.adapter_owner.get(&idx).copied();
        Ok(self.insert(parent, Object::Device { adapter: idx }))
    }

    fn get_queue(&mut self, device: Handle, family_index: u32) -> BackendResult<Handle> {
        self.check("get_queue")?;
        let adapter = self.expect_device("get_queue", device)?;
        if !self.adapters[adapter].families.iter().any(|f| f.index == family_index) {
            return Err(BackendError::new("get_queue", format!("no queue family {}", family_index)));
        }
        Ok(self.insert(Some(device), Object::Queue))
    }

    fn create_buffer(&mut self, device: Handle, size: u64) -> BackendResult<Handle> {
        self.check("create_buffer")?;
        self.expect_device("create_buffer", device)?;
        if size == 0 {
            return Err(BackendError::new("create_buffer", "zero-sized buffer"));
        }
        Ok(self.insert(Some(device), Object::Buffer { size, memory: None }))
    }

    fn buffer_memory_requirements(&mut self, device: Handle, buffer: Handle) -> BackendResult<MemoryRequirements> {
        self.check("buffer_memory_requirements")?;
        let adapter = self.expect_device("buffer_memory_requirements", device)?;
        let size = match self.entry("buffer_memory_requirements", buffer)?.object {
            Object::Buffer { size, .. } => size,
            _ => return Err(BackendError::new("buffer_memory_requirements", "not a buffer")),
        };
        let a = &self.adapters[adapter];
        let align = a.buffer_alignment.max(1);
        Ok(MemoryRequirements { size: size.div_ceil(align) * align, memory_type_bits: a.buffer_memory_type_bits })
    }

    fn allocate_memory(&mut self, device: Handle, size: u64, memory_type: u32) -> BackendResult<Handle> {
        self.check("allocate_memory")?;
        let adapter = self.expect_device("allocate_memory", device)?;
        let ty = self.adapters[adapter]
            .memory_types
            .iter()
            .find(|t| t.index == memory_type)
            .copied()
            .ok_or_else(|| BackendError::new("allocate_memory", format!("no memory type {}", memory_type)))?;
        if size > ty.heap_size {
            return Err(BackendError::new("allocate_memory", "out of device memory"));
        }
        let bytes = vec![0u8; size as usize];
        Ok(self.insert(Some(device), Object::Memory { memory_type, flags: ty.flags, bytes }))
    }

    fn bind_buffer_memory(&mut self, device: Handle, buffer: Handle, memory: Handle) -> BackendResult<()> {
        self.check("bind_buffer_memory")?;
        let adapter = self.expect_device("bind_buffer_memory", device)?;
        let (memory_type, mem_len) = match &self.entry("bind_buffer_memory", memory)?.object {
            Object::Memory { memory_type, bytes, .. } => (*memory_type, bytes.len() as u64),
            _ => return Err(BackendError::new("bind_buffer_memory", "not a memory allocation")),
        };
        let a = &self.adapters[adapter];
        let align = a.buffer_alignment.max(1);
        let type_bits = a.buffer_memory_type_bits;
        if memory_type >= 32 || type_bits & (1 << memory_type) == 0 {
            return Err(BackendError::new("bind_buffer_memory", format!("memory type {} not allowed for buffer", memory_type)));
        }
        match &mut self.entry_mut("bind_buffer_memory", buffer)?.object {
            Object::Buffer { memory: Some(_), .. } => Err(BackendError::new("bind_buffer_memory", "buffer already bound")),
            Object::Buffer { size, .. } if size.div_ceil(align) * align > mem_len => {
                Err(BackendError::new("bind_buffer_memory", "allocation smaller than buffer requirements"))
            }
            Object::Buffer { memory: slot, .. } => {
                *slot = Some(memory);
                Ok(())
            }
            _ => Err(BackendError::new("bind_buffer_memory", "not a buffer")),
        }
    }

    fn write_memory(&mut self, device: Handle, memory: Handle, data: &[u8]) -> BackendResult<()> {
        self.check("write_memory")?;
        self.expect_device("write_memory", device)?;
        let bytes = self.host_bytes("write_memory", memory)?;
        if data.len() > bytes.len() {
            return Err(BackendError::new("write_memory", "write past end of allocation"));
        }
        bytes[..data.len()].copy_from_slice(data);
        Ok(())
    }

    fn read_memory(&mut self, device: Handle, memory: Handle, out: &mut [u8]) -> BackendResult<()> {
        self.check("read_memory")?;
        self.expect_device("read_memory", device)?;
        let bytes = self.host_bytes("read_memory", memory)?;
        if out.len() > bytes.len() {
            return Err(BackendError::new("read_memory", "read past end of allocation"));
        }
        out.copy_from_slice(&bytes[..out.len()]);
        Ok(())
    }

    fn create_shader_module(&mut self, device: Handle, code: &[u8]) -> BackendResult<Handle> {
        self.check("create_shader_module")?;
        self.expect_device("create_shader_module", device)?;
        if code.is_empty() {
            return Err(BackendError::new("create_shader_module", "empty shader binary"));
        }
        Ok(self.insert(Some(device), Object::ShaderModule))
    }

    fn create_descriptor_set_layout(&mut self, device: Handle, storage_buffers: u32) -> BackendResult<Handle> {
        self.check("create_descriptor_set_layout")?;
        self.expect_device("create_descriptor_set_layout", device)?;
        Ok(self.insert(Some(device), Object::SetLayout { storage_buffers }))
    }

    fn create_pipeline_layout(&mut self, device: Handle, set_layout: Handle) -> BackendResult<Handle> {
        self.check("create_pipeline_layout")?;
        self.expect_device("create_pipeline_layout", device)?;
        self.entry("create_pipeline_layout", set_layout)?;
        Ok(self.insert(Some(device), Object::PipelineLayout))
    }

    fn create_compute_pipeline(
        &mut self,
        device: Handle,
        layout: Handle,
        shader: Handle,
        entry_point: &str,
    ) -> BackendResult<Handle> {
        self.check("create_compute_pipeline")?;
        self.expect_device("create_compute_pipeline", device)?;
        self.entry("create_compute_pipeline", layout)?;
        match self.entry("create_compute_pipeline", shader)?.object {
            Object::ShaderModule => {}
            _ => return Err(BackendError::new("create_compute_pipeline", "not a shader module")),
        }
        if entry_point.is_empty() {
            return Err(BackendError::new("create_compute_pipeline", "empty entry point"));
        }
        Ok(self.insert(Some(device), Object::Pipeline))
    }

    fn create_descriptor_pool(&mut self, device: Handle, _storage_buffers: u32) -> BackendResult<Handle> {
        self.check("create_descriptor_pool")?;
        self.expect_device("create_descriptor_pool", device)?;
        Ok(self.insert(Some(device), Object::DescriptorPool))
    }

    fn allocate_descriptor_set(&mut self, device: Handle, pool: Handle, layout: Handle) -> BackendResult<Handle> {
        self.check("allocate_descriptor_set")?;
        self.expect_device("allocate_descriptor_set", device)?;
        self.entry("allocate_descriptor_set", pool)?;
        let count = match self.entry("allocate_descriptor_set", layout)?.object {
            Object::SetLayout { storage_buffers } => storage_buffers as usize,
            _ => return Err(BackendError::new("allocate_descriptor_set", "not a descriptor set layout")),
        };
        Ok(self.insert(Some(pool), Object::DescriptorSet { bindings: vec![None; count] }))
    }

    fn write_storage_buffers(&mut self, device: Handle, set: Handle, buffers: &[BufferBinding]) -> BackendResult<()> {
        self.check("write_storage_buffers")?;
        self.expect_device("write_storage_buffers", device)?;
        match &mut self.entry_mut("write_storage_buffers", set)?.object {
            Object::DescriptorSet { bindings } => {
                if buffers.len() > bindings.len() {
                    return Err(BackendError::new("write_storage_buffers", "more buffers than bindings"));
                }
                for (slot, b) in bindings.iter_mut().zip(buffers) {
                    *slot = Some(b.buffer);
                }
                Ok(())
            }
            _ => Err(BackendError::new("write_storage_buffers", "not a descriptor set")),
        }
    }

    fn create_command_pool(&mut self, device: Handle, family_index: u32) -> BackendResult<Handle> {
        self.check("create_command_pool")?;
        let adapter = self.expect_device("create_command_pool", device)?;
        if !self.adapters[adapter].families.iter().any(|f| f.index == family_index) {
            return Err(BackendError::new("create_command_pool", format!("no queue family {}", family_index)));
        }
        Ok(self.insert(Some(device), Object::CommandPool))
    }

    fn allocate_command_buffer(&mut self, device: Handle, pool: Handle) -> BackendResult<Handle> {
        self.check("allocate_command_buffer")?;
        self.expect_device("allocate_command_buffer", device)?;
        self.entry("allocate_command_buffer", pool)?;
        Ok(self.insert(Some(pool), Object::CommandBuffer { dispatch: None }))
    }

    fn record_dispatch(&mut self, device: Handle, command_buffer: Handle, dispatch: &DispatchDesc) -> BackendResult<()> {
        self.check("record_dispatch")?;
        self.expect_device("record_dispatch", device)?;
        self.entry("record_dispatch", dispatch.pipeline)?;
        self.entry("record_dispatch", dispatch.layout)?;
        self.entry("record_dispatch", dispatch.descriptor_set)?;
        match &mut self.entry_mut("record_dispatch", command_buffer)?.object {
            Object::CommandBuffer { dispatch: slot } => {
                *slot = Some(*dispatch);
                Ok(())
            }
            _ => Err(BackendError::new("record_dispatch", "not a command buffer")),
        }
    }

    fn create_fence(&mut self, device: Handle) -> BackendResult<Handle> {
        self.check("create_fence")?;
        self.expect_device("create_fence", device)?;
        Ok(self.insert(Some(device), Object::Fence { signaled: false }))
    }

    fn submit(&mut self, device: Handle, queue: Handle, command_buffer: Handle, fence: Handle) -> BackendResult<()> {
        self.check("submit")?;
        self.expect_device("submit", device)?;
        self.entry("submit", queue)?;
        let dispatch = match &self.entry("submit", command_buffer)?.object {
            Object::CommandBuffer { dispatch: Some(d) } => *d,
            Object::CommandBuffer { dispatch: None } => return Err(BackendError::new("submit", "empty command buffer")),
            _ => return Err(BackendError::new("submit", "not a command buffer")),
        };
        self.execute(&dispatch)?;
        match &mut self.entry_mut("submit", fence)?.object {
            Object::Fence { signaled } => {
                *signaled = true;
                Ok(())
            }
            _ => Err(BackendError::new("submit", "not a fence")),
        }
    }

    fn wait_for_fence(&mut self, device: Handle, fence: Handle, _timeout_ns: u64) -> BackendResult<()> {
        self.check("wait_for_fence")?;
        self.expect_device("wait_for_fence", device)?;
        match self.entry("wait_for_fence", fence)?.object {
            Object::Fence { signaled: true } => Ok(()),
            Object::Fence { signaled: false } => Err(BackendError::new("wait_for_fence", "timeout")),
            _ => Err(BackendError::new("wait_for_fence", "not a fence")),
        }
    }

    fn release(&mut self, resource: Resource) {
        let Some(entry) = self.objects.remove(&resource.handle) else {
            warn!("release of unknown {:?} {}", resource.kind, resource.handle);
            self.ledger.violations.push(format!("unknown {:?} {}", resource.kind, resource.handle));
            return;
        };
        if entry.object.kind() != Some(resource.kind) {
            self.ledger
                .violations
                .push(format!("{} released as {:?} but is {:?}", resource.handle, resource.kind, entry.object.kind()));
        }
        // Pool-owned children go with their parent; anything else still alive is a leak.
        let children: Vec<Handle> = self
            .objects
            .iter()
            .filter(|(_, e)| e.parent == Some(resource.handle))
            .map(|(h, _)| *h)
            .collect();
        for child in children {
            let Some(kind) = self.objects.get(&child).map(|e| e.object.kind()) else { continue };
            match kind {
                None => {
                    self.objects.remove(&child);
                }
                Some(kind) => self
                    .ledger
                    .violations
                    .push(format!("{:?} {} released before child {:?} {}", resource.kind, resource.handle, kind, child)),
            }
        }
        self.ledger.released.push((resource.kind, resource.handle));
    }
}
