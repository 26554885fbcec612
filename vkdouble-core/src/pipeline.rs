//! The demo procedure: instance → adapter → device → buffer pair →
//! compute pipeline → one dispatch → read back.
//!
//! Every object lives in a [`ResourceScope`], so leaving early at any step
//! still releases everything acquired so far, newest first.

use log::{debug, info, warn};
use serde::Serialize;

use crate::backend::{BufferBinding, ComputeBackend, DispatchDesc, Handle, InstanceDesc, ResourceKind};
use crate::config::RunConfig;
use crate::error::{Error, Result};
use crate::scope::ResourceScope;
use crate::select::{
    queue_requests, select_adapter, select_memory_type, select_queue_families, AdapterInfo, MemoryChoice,
    MemoryFlags, MemoryTypeInfo, QueueFamilyInfo, QueueFamilySelection,
};
use crate::shader;

/// Descriptor bindings used by the kernel: input, output.
const STORAGE_BINDINGS: u32 = 2;

/// Last step a run got through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum Stage {
    Buffers,
    Pipeline,
    Dispatch,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub backend: String,
    pub adapter: AdapterInfo,
    /// Raw selector result before fallbacks.
    pub selection: QueueFamilySelection,
    pub compute_family: u32,
    pub transfer_family: u32,
    pub queue_requests: usize,
    pub memory: MemoryChoice,
    pub stage: Stage,
    pub output: Option<Vec<f32>>,
}

impl RunReport {
    /// Up to `n` leading output values; empty when nothing was dispatched.
    pub fn preview(&self, n: usize) -> &[f32] {
        match &self.output {
            Some(out) => &out[..n.min(out.len())],
            None => &[],
        }
    }
}

#[derive(Debug, Clone)]
pub struct DeviceSummary {
    pub adapter: AdapterInfo,
    pub families: Vec<QueueFamilyInfo>,
    pub memory_types: Vec<MemoryTypeInfo>,
    pub selected: bool,
}

#[derive(Debug, Clone, Copy)]
struct BoundBuffer {
    buffer: Handle,
    memory: Handle,
}

#[derive(Debug, Clone, Copy)]
struct BufferPair {
    input: BoundBuffer,
    output: BoundBuffer,
}

#[derive(Debug, Clone, Copy)]
struct ComputeObjects {
    pipeline: Handle,
    layout: Handle,
    descriptor_set: Handle,
}

fn instance_desc(cfg: &RunConfig) -> InstanceDesc {
    InstanceDesc { app_name: cfg.app_name.clone(), layer: cfg.layer().map(str::to_string) }
}

/// Enumerate adapters with their queue families and memory types.
pub fn list_devices<B: ComputeBackend + ?Sized>(backend: &mut B, cfg: &RunConfig) -> Result<Vec<DeviceSummary>> {
    let mut scope = ResourceScope::new(backend);
    let desc = instance_desc(cfg);
    let instance = scope.acquire(ResourceKind::Instance, None, |b| b.create_instance(&desc))?;
    let adapters = scope.backend().enumerate_adapters(instance)?;
    let chosen = select_adapter(&adapters).map(|a| a.id);

    let mut out = Vec::with_capacity(adapters.len());
    for adapter in adapters {
        let families = scope.backend().queue_families(adapter.id)?;
        let memory_types = scope.backend().memory_types(adapter.id)?;
        let selected = chosen == Some(adapter.id);
        out.push(DeviceSummary { adapter, families, memory_types, selected });
    }
    Ok(out)
}

/// Run the procedure as far as `cfg` asks.
pub fn run<B: ComputeBackend + ?Sized>(backend: &mut B, cfg: &RunConfig) -> Result<RunReport> {
    cfg.validate()?;
    let backend_name = backend.name().to_string();
    let mut scope = ResourceScope::new(backend);

    let desc = instance_desc(cfg);
    let instance = scope.acquire(ResourceKind::Instance, None, |b| b.create_instance(&desc))?;
    match &desc.layer {
        Some(layer) => info!("created {} instance with layer {}", backend_name, layer),
        None => info!("created {} instance", backend_name),
    }

    let adapter = pick_adapter(scope.backend(), instance)?;
    info!("using adapter '{}' ({})", adapter.name, adapter.kind.label());

    let families = scope.backend().queue_families(adapter.id)?;
    let selection = select_queue_families(&families, cfg.queue_policy);
    let compute_family = selection.compute.ok_or_else(|| Error::NoComputeQueue(adapter.name.clone()))?;
    let transfer_family = selection.transfer.unwrap_or_else(|| {
        warn!("no transfer-capable queue family, using compute family {}", compute_family);
        compute_family
    });
    let requests = queue_requests(compute_family, transfer_family);
    let device = scope.acquire(ResourceKind::Device, None, |b| b.create_device(adapter.id, &requests))?;
    let compute_queue = scope.backend().get_queue(device, compute_family)?;
    let transfer_queue = scope.backend().get_queue(device, transfer_family)?;
    info!(
        "created device: compute family {}, transfer family {}, {} queue request(s)",
        compute_family,
        transfer_family,
        requests.len()
    );
    debug!("compute queue {}, transfer queue {}", compute_queue, transfer_queue);

    let memory_types = scope.backend().memory_types(adapter.id)?;
    let memory = select_memory_type(&memory_types, MemoryFlags::HOST_VISIBLE | MemoryFlags::HOST_COHERENT)
        .ok_or_else(|| Error::NoHostMemory(adapter.name.clone()))?;
    let pair = create_buffer_pair(&mut scope, device, cfg, memory)?;

    let mut report = RunReport {
        backend: backend_name,
        adapter,
        selection,
        compute_family,
        transfer_family,
        queue_requests: requests.len(),
        memory,
        stage: Stage::Buffers,
        output: None,
    };
    if !cfg.build_pipeline {
        return Ok(report);
    }

    let objects = build_compute_objects(&mut scope, device, cfg, &pair)?;
    report.stage = Stage::Pipeline;
    if !cfg.dispatch {
        return Ok(report);
    }

    report.output = Some(dispatch(&mut scope, device, compute_queue, compute_family, cfg, &pair, &objects)?);
    report.stage = Stage::Dispatch;
    Ok(report)
}

fn pick_adapter<B: ComputeBackend + ?Sized>(backend: &mut B, instance: Handle) -> Result<AdapterInfo> {
    let adapters = backend.enumerate_adapters(instance)?;
    for (i, a) in adapters.iter().enumerate() {
        info!("GPU {}: {} ({})", i, a.name, a.kind.label());
    }
    select_adapter(&adapters).cloned().ok_or(Error::NoAdapter(adapters.len()))
}

fn create_buffer_pair<B: ComputeBackend + ?Sized>(
    scope: &mut ResourceScope<'_, B>,
    device: Handle,
    cfg: &RunConfig,
    memory: MemoryChoice,
) -> Result<BufferPair> {
    let size = cfg.buffer_size();
    let required = size * 2;
    if memory.heap_size < required {
        return Err(Error::HeapTooSmall { memory_type: memory.index, available: memory.heap_size, required });
    }

    let input = create_bound_buffer(scope, device, size, memory.index)?;
    let output = create_bound_buffer(scope, device, size, memory.index)?;

    let values: Vec<f32> = (0..cfg.element_count).map(|i| i as f32).collect();
    scope.backend().write_memory(device, input.memory, bytemuck::cast_slice(&values))?;
    info!("created buffer pair: 2 x {} bytes in memory type {}", size, memory.index);
    Ok(BufferPair { input, output })
}

/// Buffer with its own allocation, bound at offset 0. The allocation is
/// sized by the buffer's memory requirements, not by `size`.
fn create_bound_buffer<B: ComputeBackend + ?Sized>(
    scope: &mut ResourceScope<'_, B>,
    device: Handle,
    size: u64,
    memory_type: u32,
) -> Result<BoundBuffer> {
    let buffer = scope.acquire(ResourceKind::Buffer, Some(device), |b| b.create_buffer(device, size))?;
    let reqs = scope.backend().buffer_memory_requirements(device, buffer)?;
    if !reqs.allows(memory_type) {
        return Err(Error::IncompatibleMemoryType { memory_type, allowed: reqs.memory_type_bits });
    }
    debug!("buffer {} needs {} bytes for {} requested", buffer, reqs.size, size);
    let memory =
        scope.acquire(ResourceKind::Memory, Some(device), |b| b.allocate_memory(device, reqs.size, memory_type))?;
    scope.backend().bind_buffer_memory(device, buffer, memory)?;
    Ok(BoundBuffer { buffer, memory })
}

fn build_compute_objects<B: ComputeBackend + ?Sized>(
    scope: &mut ResourceScope<'_, B>,
    device: Handle,
    cfg: &RunConfig,
    pair: &BufferPair,
) -> Result<ComputeObjects> {
    let code = shader::load_spirv(&cfg.shader.path)?;
    info!("loaded shader {} ({} bytes)", cfg.shader.path.display(), code.len());

    let module = scope.acquire(ResourceKind::ShaderModule, Some(device), |b| b.create_shader_module(device, &code))?;
    let set_layout = scope.acquire(ResourceKind::DescriptorSetLayout, Some(device), |b| {
        b.create_descriptor_set_layout(device, STORAGE_BINDINGS)
    })?;
    let layout = scope.acquire(ResourceKind::PipelineLayout, Some(device), |b| {
        b.create_pipeline_layout(device, set_layout)
    })?;
    let pipeline = scope.acquire(ResourceKind::Pipeline, Some(device), |b| {
        b.create_compute_pipeline(device, layout, module, &cfg.shader.entry_point)
    })?;
    let pool = scope.acquire(ResourceKind::DescriptorPool, Some(device), |b| {
        b.create_descriptor_pool(device, STORAGE_BINDINGS)
    })?;

    let descriptor_set = scope.backend().allocate_descriptor_set(device, pool, set_layout)?;
    let range = cfg.buffer_size();
    let bindings = [
        BufferBinding { buffer: pair.input.buffer, range },
        BufferBinding { buffer: pair.output.buffer, range },
    ];
    scope.backend().write_storage_buffers(device, descriptor_set, &bindings)?;
    info!("created compute pipeline (entry point '{}')", cfg.shader.entry_point);
    Ok(ComputeObjects { pipeline, layout, descriptor_set })
}

fn dispatch<B: ComputeBackend + ?Sized>(
    scope: &mut ResourceScope<'_, B>,
    device: Handle,
    queue: Handle,
    family: u32,
    cfg: &RunConfig,
    pair: &BufferPair,
    objects: &ComputeObjects,
) -> Result<Vec<f32>> {
    let pool = scope.acquire(ResourceKind::CommandPool, Some(device), |b| b.create_command_pool(device, family))?;
    let cmd = scope.backend().allocate_command_buffer(device, pool)?;
    let desc = DispatchDesc {
        pipeline: objects.pipeline,
        layout: objects.layout,
        descriptor_set: objects.descriptor_set,
        group_count: [cfg.group_count(), 1, 1],
    };
    scope.backend().record_dispatch(device, cmd, &desc)?;

    let fence = scope.acquire(ResourceKind::Fence, Some(device), |b| b.create_fence(device))?;
    scope.backend().submit(device, queue, cmd, fence)?;
    scope.backend().wait_for_fence(device, fence, u64::MAX)?;
    info!("dispatch of {} workgroup(s) complete", desc.group_count[0]);

    let mut bytes = vec![0u8; cfg.buffer_size() as usize];
    scope.backend().read_memory(device, pair.output.memory, &mut bytes)?;
    Ok(bytemuck::pod_collect_to_vec(&bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::host::{HostAdapter, HostBackend};
    use crate::select::{AdapterKind, QueueCaps};

    fn buffers_only() -> RunConfig {
        RunConfig { build_pipeline: false, dispatch: false, ..Default::default() }
    }

    #[test]
    fn buffers_stage_needs_no_shader() {
        let mut backend = HostBackend::new();
        let report = run(&mut backend, &buffers_only()).unwrap();
        assert_eq!(report.stage, Stage::Buffers);
        assert!(report.output.is_none());
        assert!(report.preview(16).is_empty());
        assert_eq!(report.memory.index, 1);
        assert_eq!(report.queue_requests, 1);
        assert!(backend.ledger().is_balanced());
        assert_eq!(backend.ledger().acquired_count(ResourceKind::Buffer), 2);
        assert_eq!(backend.ledger().acquired_count(ResourceKind::Memory), 2);
    }

    #[test]
    fn split_families_issue_two_requests() {
        let mut adapter = HostAdapter::emulated();
        adapter.families = vec![
            QueueFamilyInfo { index: 0, caps: QueueCaps::GRAPHICS | QueueCaps::COMPUTE, queue_count: 16 },
            QueueFamilyInfo { index: 1, caps: QueueCaps::TRANSFER, queue_count: 2 },
        ];
        let mut backend = HostBackend::with_adapters(vec![adapter]);
        let report = run(&mut backend, &buffers_only()).unwrap();
        assert_eq!((report.compute_family, report.transfer_family), (0, 1));
        assert_eq!(report.queue_requests, 2);
    }

    #[test]
    fn missing_transfer_family_falls_back_to_compute() {
        let mut adapter = HostAdapter::emulated();
        adapter.families = vec![QueueFamilyInfo { index: 0, caps: QueueCaps::COMPUTE, queue_count: 1 }];
        let mut backend = HostBackend::with_adapters(vec![adapter]);
        let report = run(&mut backend, &buffers_only()).unwrap();
        assert_eq!(report.selection.transfer, None);
        assert_eq!(report.transfer_family, 0);
        assert_eq!(report.queue_requests, 1);
    }

    #[test]
    fn missing_compute_family_is_fatal_and_clean() {
        let mut adapter = HostAdapter::emulated();
        adapter.families = vec![QueueFamilyInfo { index: 0, caps: QueueCaps::TRANSFER, queue_count: 1 }];
        let mut backend = HostBackend::with_adapters(vec![adapter]);
        let err = run(&mut backend, &buffers_only()).unwrap_err();
        assert!(matches!(err, Error::NoComputeQueue(_)));
        assert!(backend.ledger().is_balanced());
        assert_eq!(backend.ledger().released_count(ResourceKind::Instance), 1);
    }

    #[test]
    fn cpu_only_host_has_no_adapter() {
        let mut adapter = HostAdapter::emulated();
        adapter.kind = AdapterKind::Cpu;
        let mut backend = HostBackend::with_adapters(vec![adapter]);
        assert!(matches!(run(&mut backend, &buffers_only()), Err(Error::NoAdapter(1))));
        assert!(backend.ledger().is_balanced());
    }

    #[test]
    fn heap_budget_is_checked() {
        let mut adapter = HostAdapter::emulated();
        adapter.memory_types[1].heap_size = 1024;
        let mut backend = HostBackend::with_adapters(vec![adapter]);
        let err = run(&mut backend, &buffers_only()).unwrap_err();
        assert!(matches!(err, Error::HeapTooSmall { required: 2048, available: 1024, .. }));
    }

    #[test]
    fn unaligned_element_count_allocates_by_requirements() {
        let mut backend = HostBackend::new();
        let cfg = RunConfig { element_count: 257, ..buffers_only() };
        let report = run(&mut backend, &cfg).unwrap();
        assert_eq!(report.stage, Stage::Buffers);
        assert!(backend.ledger().is_balanced());
    }

    #[test]
    fn memory_type_outside_buffer_requirements_is_fatal_and_clean() {
        let mut adapter = HostAdapter::emulated();
        adapter.buffer_memory_type_bits = 0b01;
        let mut backend = HostBackend::with_adapters(vec![adapter]);
        let err = run(&mut backend, &buffers_only()).unwrap_err();
        assert!(matches!(err, Error::IncompatibleMemoryType { memory_type: 1, allowed: 0b01 }), "{:?}", err);
        assert_eq!(backend.ledger().acquired_count(ResourceKind::Memory), 0);
        assert!(backend.ledger().is_balanced());
    }

    #[test]
    fn list_devices_marks_selection() {
        let mut integrated = HostAdapter::emulated();
        integrated.kind = AdapterKind::Integrated;
        integrated.name = "igpu".into();
        let mut backend = HostBackend::with_adapters(vec![integrated, HostAdapter::emulated()]);
        let list = list_devices(&mut backend, &RunConfig::default()).unwrap();
        assert_eq!(list.len(), 2);
        assert!(!list[0].selected);
        assert!(list[1].selected);
        assert_eq!(list[1].memory_types.len(), 2);
        assert!(backend.ledger().is_balanced());
    }

    #[test]
    fn validation_layer_reaches_instance() {
        let mut backend = HostBackend::new();
        let mut cfg = buffers_only();
        cfg.validation.enabled = true;
        run(&mut backend, &cfg).unwrap();
        assert_eq!(backend.requested_layers(), ["VK_LAYER_KHRONOS_validation".to_string()]);
    }
}
