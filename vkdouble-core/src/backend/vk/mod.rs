//! Vulkan backend using Ash (feature-gated).
//!
//! The loader is resolved at runtime with `Entry::load`, so building does not
//! need the Vulkan SDK. Dispatchable objects (instances, devices) are kept in
//! maps keyed by their raw handle; everything else travels as a raw `u64`.

use std::collections::HashMap;
use std::ffi::{c_char, CStr, CString};

use ash::vk::{self, Handle as _};
use log::{debug, warn};

use super::{
    BackendError, BackendResult, BufferBinding, ComputeBackend, DispatchDesc, Handle, InstanceDesc,
    MemoryRequirements, Resource, ResourceKind,
};
use crate::select::{AdapterInfo, AdapterKind, MemoryFlags, MemoryTypeInfo, QueueCaps, QueueFamilyInfo, QueueRequest};

fn vk_err(call: &'static str) -> impl Fn(vk::Result) -> BackendError {
    move |e| BackendError::new(call, e.to_string())
}

pub struct VulkanBackend {
    entry: ash::Entry,
    instances: HashMap<Handle, ash::Instance>,
    /// Instance each physical device was enumerated from.
    adapters: HashMap<Handle, Handle>,
    devices: HashMap<Handle, ash::Device>,
    /// Size and memory type of each live allocation.
    allocations: HashMap<Handle, (u64, u32)>,
}

impl VulkanBackend {
    pub fn new() -> BackendResult<Self> {
        let entry = unsafe { ash::Entry::load() }.map_err(|e| BackendError::new("load_vulkan", e.to_string()))?;
        Ok(Self {
            entry,
            instances: HashMap::new(),
            adapters: HashMap::new(),
            devices: HashMap::new(),
            allocations: HashMap::new(),
        })
    }

    fn instance(&self, call: &'static str, instance: Handle) -> BackendResult<&ash::Instance> {
        self.instances
            .get(&instance)
            .ok_or_else(|| BackendError::new(call, format!("unknown instance {}", instance)))
    }

    fn adapter(&self, call: &'static str, adapter: Handle) -> BackendResult<(&ash::Instance, vk::PhysicalDevice)> {
        let owner = self
            .adapters
            .get(&adapter)
            .ok_or_else(|| BackendError::new(call, format!("unknown adapter {}", adapter)))?;
        Ok((self.instance(call, *owner)?, vk::PhysicalDevice::from_raw(adapter.0)))
    }

    fn device(&self, call: &'static str, device: Handle) -> BackendResult<&ash::Device> {
        self.devices
            .get(&device)
            .ok_or_else(|| BackendError::new(call, format!("unknown device {}", device)))
    }
}

impl ComputeBackend for VulkanBackend {
    fn name(&self) -> &str {
        "vulkan"
    }

    fn create_instance(&mut self, desc: &InstanceDesc) -> BackendResult<Handle> {
        const CALL: &str = "create_instance";
        let app_name_c = CString::new(desc.app_name.as_str()).map_err(|e| BackendError::new(CALL, e.to_string()))?;
        let engine_name_c = CString::new("vkdouble-core").map_err(|e| BackendError::new(CALL, e.to_string()))?;
        let app_info = vk::ApplicationInfo::builder()
            .application_name(&app_name_c)
            .application_version(vk::make_api_version(0, 0, 1, 0))
            .engine_name(&engine_name_c)
            .engine_version(vk::make_api_version(0, 0, 1, 0))
            .api_version(vk::API_VERSION_1_1);

        let layer = desc
            .layer
            .as_deref()
            .map(CString::new)
            .transpose()
            .map_err(|e| BackendError::new(CALL, e.to_string()))?;
        let layer_ptrs: Vec<*const c_char> = layer.iter().map(|l| l.as_ptr()).collect();

        let instance_ci = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_layer_names(&layer_ptrs);
        let instance = unsafe { self.entry.create_instance(&instance_ci, None) }.map_err(vk_err(CALL))?;
        let handle = Handle(instance.handle().as_raw());
        self.instances.insert(handle, instance);
        Ok(handle)
    }

    fn enumerate_adapters(&mut self, instance: Handle) -> BackendResult<Vec<AdapterInfo>> {
        const CALL: &str = "enumerate_adapters";
        let inst = self.instance(CALL, instance)?;
        let pdevices = unsafe { inst.enumerate_physical_devices() }.map_err(vk_err(CALL))?;
        let mut out = Vec::with_capacity(pdevices.len());
        for pd in pdevices {
            let props = unsafe { inst.get_physical_device_properties(pd) };
            let name = unsafe { CStr::from_ptr(props.device_name.as_ptr()) }
                .to_string_lossy()
                .into_owned();
            debug!(
                "{} (API {}.{}.{})",
                name,
                vk::api_version_major(props.api_version),
                vk::api_version_minor(props.api_version),
                vk::api_version_patch(props.api_version)
            );
            out.push(AdapterInfo { id: Handle(pd.as_raw()), kind: adapter_kind(props.device_type), name });
        }
        for a in &out {
            self.adapters.insert(a.id, instance);
        }
        Ok(out)
    }

    fn queue_families(&mut self, adapter: Handle) -> BackendResult<Vec<QueueFamilyInfo>> {
        let (inst, pd) = self.adapter("queue_families", adapter)?;
        let families = unsafe { inst.get_physical_device_queue_family_properties(pd) };
        Ok(families
            .iter()
            .enumerate()
            .map(|(i, f)| QueueFamilyInfo { index: i as u32, caps: queue_caps(f.queue_flags), queue_count: f.queue_count })
            .collect())
    }

    fn memory_types(&mut self, adapter: Handle) -> BackendResult<Vec<MemoryTypeInfo>> {
        let (inst, pd) = self.adapter("memory_types", adapter)?;
        let mem_props = unsafe { inst.get_physical_device_memory_properties(pd) };
        Ok((0..mem_props.memory_type_count as usize)
            .map(|i| {
                let ty = mem_props.memory_types[i];
                MemoryTypeInfo {
                    index: i as u32,
                    flags: memory_flags(ty.property_flags),
                    heap_index: ty.heap_index,
                    heap_size: mem_props.memory_heaps[ty.heap_index as usize].size,
                }
            })
            .collect())
    }

    fn create_device(&mut self, adapter: Handle, queues: &[QueueRequest]) -> BackendResult<Handle> {
        const CALL: &str = "create_device";
        let (inst, pd) = self.adapter(CALL, adapter)?;
        let priorities: Vec<Vec<f32>> =
            queues.iter().map(|q| vec![q.priority; q.queue_count as usize]).collect();
        let queue_ci: Vec<vk::DeviceQueueCreateInfo> = queues
            .iter()
            .zip(&priorities)
            .map(|(q, p)| {
                vk::DeviceQueueCreateInfo::builder()
                    .queue_family_index(q.family_index)
                    .queue_priorities(p)
                    .build()
            })
            .collect();
        let device_ci = vk::DeviceCreateInfo::builder().queue_create_infos(&queue_ci);
        let device = unsafe { inst.create_device(pd, &device_ci, None) }.map_err(vk_err(CALL))?;
        let handle = Handle(device.handle().as_raw());
        self.devices.insert(handle, device);
        Ok(handle)
    }

    fn get_queue(&mut self, device: Handle, family_index: u32) -> BackendResult<Handle> {
        let dev = self.device("get_queue", device)?;
        let queue = unsafe { dev.get_device_queue(family_index, 0) };
        Ok(Handle(queue.as_raw()))
    }

    fn create_buffer(&mut self, device: Handle, size: u64) -> BackendResult<Handle> {
        let dev = self.device("create_buffer", device)?;
        let buf_ci = vk::BufferCreateInfo::builder()
            .size(size)
            .usage(vk::BufferUsageFlags::STORAGE_BUFFER)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);
        let buffer = unsafe { dev.create_buffer(&buf_ci, None) }.map_err(vk_err("create_buffer"))?;
        Ok(Handle(buffer.as_raw()))
    }

    fn buffer_memory_requirements(&mut self, device: Handle, buffer: Handle) -> BackendResult<MemoryRequirements> {
        let dev = self.device("buffer_memory_requirements", device)?;
        let reqs = unsafe { dev.get_buffer_memory_requirements(vk::Buffer::from_raw(buffer.0)) };
        Ok(MemoryRequirements { size: reqs.size, memory_type_bits: reqs.memory_type_bits })
    }

    fn allocate_memory(&mut self, device: Handle, size: u64, memory_type: u32) -> BackendResult<Handle> {
        let dev = self.device("allocate_memory", device)?;
        let alloc = vk::MemoryAllocateInfo::builder().allocation_size(size).memory_type_index(memory_type);
        let memory = unsafe { dev.allocate_memory(&alloc, None) }.map_err(vk_err("allocate_memory"))?;
        let handle = Handle(memory.as_raw());
        self.allocations.insert(handle, (size, memory_type));
        Ok(handle)
    }

    fn bind_buffer_memory(&mut self, device: Handle, buffer: Handle, memory: Handle) -> BackendResult<()> {
        const CALL: &str = "bind_buffer_memory";
        let dev = self.device(CALL, device)?;
        let (alloc_size, memory_type) = *self
            .allocations
            .get(&memory)
            .ok_or_else(|| BackendError::new(CALL, format!("unknown allocation {}", memory)))?;
        let buffer = vk::Buffer::from_raw(buffer.0);
        let reqs = unsafe { dev.get_buffer_memory_requirements(buffer) };
        if reqs.memory_type_bits & (1 << memory_type) == 0 {
            return Err(BackendError::new(CALL, format!("memory type {} not allowed for buffer", memory_type)));
        }
        if reqs.size > alloc_size {
            return Err(BackendError::new(CALL, format!("buffer needs {} bytes, allocation has {}", reqs.size, alloc_size)));
        }
        unsafe { dev.bind_buffer_memory(buffer, vk::DeviceMemory::from_raw(memory.0), 0) }.map_err(vk_err(CALL))
    }

    fn write_memory(&mut self, device: Handle, memory: Handle, data: &[u8]) -> BackendResult<()> {
        if data.is_empty() {
            return Ok(());
        }
        let dev = self.device("write_memory", device)?;
        let mem = vk::DeviceMemory::from_raw(memory.0);
        unsafe {
            let ptr = dev
                .map_memory(mem, 0, data.len() as u64, vk::MemoryMapFlags::empty())
                .map_err(vk_err("write_memory"))? as *mut u8;
            std::ptr::copy_nonoverlapping(data.as_ptr(), ptr, data.len());
            dev.unmap_memory(mem);
        }
        Ok(())
    }

    fn read_memory(&mut self, device: Handle, memory: Handle, out: &mut [u8]) -> BackendResult<()> {
        if out.is_empty() {
            return Ok(());
        }
        let dev = self.device("read_memory", device)?;
        let mem = vk::DeviceMemory::from_raw(memory.0);
        unsafe {
            let ptr = dev
                .map_memory(mem, 0, out.len() as u64, vk::MemoryMapFlags::empty())
                .map_err(vk_err("read_memory"))? as *const u8;
            std::ptr::copy_nonoverlapping(ptr, out.as_mut_ptr(), out.len());
            dev.unmap_memory(mem);
        }
        Ok(())
    }

    fn create_shader_module(&mut self, device: Handle, code: &[u8]) -> BackendResult<Handle> {
        const CALL: &str = "create_shader_module";
        let dev = self.device(CALL, device)?;
        let mut cursor = std::io::Cursor::new(code);
        let words = ash::util::read_spv(&mut cursor).map_err(|e| BackendError::new(CALL, e.to_string()))?;
        let info = vk::ShaderModuleCreateInfo::builder().code(&words);
        let module = unsafe { dev.create_shader_module(&info, None) }.map_err(vk_err(CALL))?;
        Ok(Handle(module.as_raw()))
    }

    fn create_descriptor_set_layout(&mut self, device: Handle, storage_buffers: u32) -> BackendResult<Handle> {
        let dev = self.device("create_descriptor_set_layout", device)?;
        let bindings: Vec<vk::DescriptorSetLayoutBinding> = (0..storage_buffers)
            .map(|i| {
                vk::DescriptorSetLayoutBinding::builder()
                    .binding(i)
                    .descriptor_type(vk::DescriptorType::STORAGE_BUFFER)
                    .descriptor_count(1)
                    .stage_flags(vk::ShaderStageFlags::COMPUTE)
                    .build()
            })
            .collect();
        let layout_ci = vk::DescriptorSetLayoutCreateInfo::builder().bindings(&bindings);
        let layout = unsafe { dev.create_descriptor_set_layout(&layout_ci, None) }
            .map_err(vk_err("create_descriptor_set_layout"))?;
        Ok(Handle(layout.as_raw()))
    }

    fn create_pipeline_layout(&mut self, device: Handle, set_layout: Handle) -> BackendResult<Handle> {
        let dev = self.device("create_pipeline_layout", device)?;
        let set_layouts = [vk::DescriptorSetLayout::from_raw(set_layout.0)];
        let layout_ci = vk::PipelineLayoutCreateInfo::builder().set_layouts(&set_layouts);
        let layout = unsafe { dev.create_pipeline_layout(&layout_ci, None) }.map_err(vk_err("create_pipeline_layout"))?;
        Ok(Handle(layout.as_raw()))
    }

    fn create_compute_pipeline(
        &mut self,
        device: Handle,
        layout: Handle,
        shader: Handle,
        entry_point: &str,
    ) -> BackendResult<Handle> {
        const CALL: &str = "create_compute_pipeline";
        let dev = self.device(CALL, device)?;
        let entry_c = CString::new(entry_point).map_err(|e| BackendError::new(CALL, e.to_string()))?;
        let stage = vk::PipelineShaderStageCreateInfo::builder()
            .stage(vk::ShaderStageFlags::COMPUTE)
            .module(vk::ShaderModule::from_raw(shader.0))
            .name(&entry_c)
            .build();
        let pipeline_ci = vk::ComputePipelineCreateInfo::builder()
            .stage(stage)
            .layout(vk::PipelineLayout::from_raw(layout.0))
            .build();
        let pipelines = unsafe {
            dev.create_compute_pipelines(vk::PipelineCache::null(), std::slice::from_ref(&pipeline_ci), None)
        }
        .map_err(|(_, e)| vk_err(CALL)(e))?;
        let pipeline = pipelines
            .first()
            .copied()
            .ok_or_else(|| BackendError::new(CALL, "driver returned no pipeline"))?;
        Ok(Handle(pipeline.as_raw()))
    }

    fn create_descriptor_pool(&mut self, device: Handle, storage_buffers: u32) -> BackendResult<Handle> {
        let dev = self.device("create_descriptor_pool", device)?;
        let sizes = [vk::DescriptorPoolSize { ty: vk::DescriptorType::STORAGE_BUFFER, descriptor_count: storage_buffers }];
        let pool_ci = vk::DescriptorPoolCreateInfo::builder().max_sets(1).pool_sizes(&sizes);
        let pool = unsafe { dev.create_descriptor_pool(&pool_ci, None) }.map_err(vk_err("create_descriptor_pool"))?;
        Ok(Handle(pool.as_raw()))
    }

    fn allocate_descriptor_set(&mut self, device: Handle, pool: Handle, layout: Handle) -> BackendResult<Handle> {
        const CALL: &str = "allocate_descriptor_set";
        let dev = self.device(CALL, device)?;
        let layouts = [vk::DescriptorSetLayout::from_raw(layout.0)];
        let alloc_ci = vk::DescriptorSetAllocateInfo::builder()
            .descriptor_pool(vk::DescriptorPool::from_raw(pool.0))
            .set_layouts(&layouts);
        let sets = unsafe { dev.allocate_descriptor_sets(&alloc_ci) }.map_err(vk_err(CALL))?;
        let set = sets.first().copied().ok_or_else(|| BackendError::new(CALL, "driver returned no set"))?;
        Ok(Handle(set.as_raw()))
    }

    fn write_storage_buffers(&mut self, device: Handle, set: Handle, buffers: &[BufferBinding]) -> BackendResult<()> {
        let dev = self.device("write_storage_buffers", device)?;
        let infos: Vec<vk::DescriptorBufferInfo> = buffers
            .iter()
            .map(|b| vk::DescriptorBufferInfo { buffer: vk::Buffer::from_raw(b.buffer.0), offset: 0, range: b.range })
            .collect();
        let writes: Vec<vk::WriteDescriptorSet> = infos
            .iter()
            .enumerate()
            .map(|(i, info)| {
                vk::WriteDescriptorSet::builder()
                    .dst_set(vk::DescriptorSet::from_raw(set.0))
                    .dst_binding(i as u32)
                    .descriptor_type(vk::DescriptorType::STORAGE_BUFFER)
                    .buffer_info(std::slice::from_ref(info))
                    .build()
            })
            .collect();
        unsafe { dev.update_descriptor_sets(&writes, &[]) };
        Ok(())
    }

    fn create_command_pool(&mut self, device: Handle, family_index: u32) -> BackendResult<Handle> {
        let dev = self.device("create_command_pool", device)?;
        let pool_ci = vk::CommandPoolCreateInfo::builder().queue_family_index(family_index);
        let pool = unsafe { dev.create_command_pool(&pool_ci, None) }.map_err(vk_err("create_command_pool"))?;
        Ok(Handle(pool.as_raw()))
    }

    fn allocate_command_buffer(&mut self, device: Handle, pool: Handle) -> BackendResult<Handle> {
        const CALL: &str = "allocate_command_buffer";
        let dev = self.device(CALL, device)?;
        let alloc_ci = vk::CommandBufferAllocateInfo::builder()
            .command_pool(vk::CommandPool::from_raw(pool.0))
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);
        let bufs = unsafe { dev.allocate_command_buffers(&alloc_ci) }.map_err(vk_err(CALL))?;
        let cmd = bufs.first().copied().ok_or_else(|| BackendError::new(CALL, "driver returned no command buffer"))?;
        Ok(Handle(cmd.as_raw()))
    }

    fn record_dispatch(&mut self, device: Handle, command_buffer: Handle, dispatch: &DispatchDesc) -> BackendResult<()> {
        const CALL: &str = "record_dispatch";
        let dev = self.device(CALL, device)?;
        let cmd = vk::CommandBuffer::from_raw(command_buffer.0);
        let [x, y, z] = dispatch.group_count;
        let begin = vk::CommandBufferBeginInfo::builder().flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        unsafe {
            dev.begin_command_buffer(cmd, &begin).map_err(vk_err(CALL))?;
            dev.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::COMPUTE, vk::Pipeline::from_raw(dispatch.pipeline.0));
            dev.cmd_bind_descriptor_sets(
                cmd,
                vk::PipelineBindPoint::COMPUTE,
                vk::PipelineLayout::from_raw(dispatch.layout.0),
                0,
                &[vk::DescriptorSet::from_raw(dispatch.descriptor_set.0)],
                &[],
            );
            dev.cmd_dispatch(cmd, x, y, z);
            dev.cmd_pipeline_barrier(
                cmd,
                vk::PipelineStageFlags::COMPUTE_SHADER,
                vk::PipelineStageFlags::HOST,
                vk::DependencyFlags::empty(),
                &[host_read_barrier()],
                &[],
                &[],
            );
            dev.end_command_buffer(cmd).map_err(vk_err(CALL))?;
        }
        Ok(())
    }

    fn create_fence(&mut self, device: Handle) -> BackendResult<Handle> {
        let dev = self.device("create_fence", device)?;
        let fence_ci = vk::FenceCreateInfo::builder();
        let fence = unsafe { dev.create_fence(&fence_ci, None) }.map_err(vk_err("create_fence"))?;
        Ok(Handle(fence.as_raw()))
    }

    fn submit(&mut self, device: Handle, queue: Handle, command_buffer: Handle, fence: Handle) -> BackendResult<()> {
        let dev = self.device("submit", device)?;
        let cmds = [vk::CommandBuffer::from_raw(command_buffer.0)];
        let submit = vk::SubmitInfo::builder().command_buffers(&cmds).build();
        unsafe {
            dev.queue_submit(vk::Queue::from_raw(queue.0), std::slice::from_ref(&submit), vk::Fence::from_raw(fence.0))
        }
        .map_err(vk_err("submit"))
    }

    fn wait_for_fence(&mut self, device: Handle, fence: Handle, timeout_ns: u64) -> BackendResult<()> {
        let dev = self.device("wait_for_fence", device)?;
        unsafe { dev.wait_for_fences(&[vk::Fence::from_raw(fence.0)], true, timeout_ns) }.map_err(vk_err("wait_for_fence"))
    }

    fn release(&mut self, resource: Resource) {
        let raw = resource.handle.0;
        match resource.kind {
            ResourceKind::Instance => {
                if let Some(inst) = self.instances.remove(&resource.handle) {
                    self.adapters.retain(|_, owner| *owner != resource.handle);
                    unsafe { inst.destroy_instance(None) };
                }
            }
            ResourceKind::Device => {
                if let Some(dev) = self.devices.remove(&resource.handle) {
                    unsafe {
                        dev.device_wait_idle().ok();
                        dev.destroy_device(None);
                    }
                }
            }
            kind => {
                let Some(dev) = resource.owner.and_then(|d| self.devices.get(&d)) else {
                    warn!("cannot release {:?} {}: owning device is gone", kind, resource.handle);
                    return;
                };
                unsafe {
                    match kind {
                        ResourceKind::Buffer => dev.destroy_buffer(vk::Buffer::from_raw(raw), None),
                        ResourceKind::Memory => dev.free_memory(vk::DeviceMemory::from_raw(raw), None),
                        ResourceKind::ShaderModule => dev.destroy_shader_module(vk::ShaderModule::from_raw(raw), None),
                        ResourceKind::DescriptorSetLayout => {
                            dev.destroy_descriptor_set_layout(vk::DescriptorSetLayout::from_raw(raw), None)
                        }
                        ResourceKind::PipelineLayout => {
                            dev.destroy_pipeline_layout(vk::PipelineLayout::from_raw(raw), None)
                        }
                        ResourceKind::Pipeline => dev.destroy_pipeline(vk::Pipeline::from_raw(raw), None),
                        ResourceKind::DescriptorPool => {
                            dev.destroy_descriptor_pool(vk::DescriptorPool::from_raw(raw), None)
                        }
                        ResourceKind::CommandPool => dev.destroy_command_pool(vk::CommandPool::from_raw(raw), None),
                        ResourceKind::Fence => dev.destroy_fence(vk::Fence::from_raw(raw), None),
                        ResourceKind::Instance | ResourceKind::Device => {}
                    }
                }
                if kind == ResourceKind::Memory {
                    self.allocations.remove(&resource.handle);
                }
            }
        }
    }
}

impl Drop for VulkanBackend {
    fn drop(&mut self) {
        // Anything still alive here escaped a scope.
        unsafe {
            for (_, dev) in self.devices.drain() {
                dev.device_wait_idle().ok();
                dev.destroy_device(None);
            }
            for (_, inst) in self.instances.drain() {
                inst.destroy_instance(None);
            }
        }
    }
}

/// Makes shader writes visible to host reads after the fence wait.
fn host_read_barrier() -> vk::MemoryBarrier {
    vk::MemoryBarrier::builder()
        .src_access_mask(vk::AccessFlags::SHADER_WRITE)
        .dst_access_mask(vk::AccessFlags::HOST_READ)
        .build()
}

fn adapter_kind(ty: vk::PhysicalDeviceType) -> AdapterKind {
    match ty {
        vk::PhysicalDeviceType::DISCRETE_GPU => AdapterKind::Discrete,
        vk::PhysicalDeviceType::INTEGRATED_GPU => AdapterKind::Integrated,
        vk::PhysicalDeviceType::VIRTUAL_GPU => AdapterKind::Virtual,
        vk::PhysicalDeviceType::CPU => AdapterKind::Cpu,
        _ => AdapterKind::Other,
    }
}

fn queue_caps(flags: vk::QueueFlags) -> QueueCaps {
    let mut caps = QueueCaps::empty();
    caps.set(QueueCaps::GRAPHICS, flags.contains(vk::QueueFlags::GRAPHICS));
    caps.set(QueueCaps::COMPUTE, flags.contains(vk::QueueFlags::COMPUTE));
    caps.set(QueueCaps::TRANSFER, flags.contains(vk::QueueFlags::TRANSFER));
    caps.set(QueueCaps::SPARSE_BINDING, flags.contains(vk::QueueFlags::SPARSE_BINDING));
    caps
}

fn memory_flags(flags: vk::MemoryPropertyFlags) -> MemoryFlags {
    let mut out = MemoryFlags::empty();
    out.set(MemoryFlags::DEVICE_LOCAL, flags.contains(vk::MemoryPropertyFlags::DEVICE_LOCAL));
    out.set(MemoryFlags::HOST_VISIBLE, flags.contains(vk::MemoryPropertyFlags::HOST_VISIBLE));
    out.set(MemoryFlags::HOST_COHERENT, flags.contains(vk::MemoryPropertyFlags::HOST_COHERENT));
    out.set(MemoryFlags::HOST_CACHED, flags.contains(vk::MemoryPropertyFlags::HOST_CACHED));
    out.set(MemoryFlags::LAZILY_ALLOCATED, flags.contains(vk::MemoryPropertyFlags::LAZILY_ALLOCATED));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_types_map() {
        assert_eq!(adapter_kind(vk::PhysicalDeviceType::DISCRETE_GPU), AdapterKind::Discrete);
        assert_eq!(adapter_kind(vk::PhysicalDeviceType::INTEGRATED_GPU), AdapterKind::Integrated);
        assert_eq!(adapter_kind(vk::PhysicalDeviceType::OTHER), AdapterKind::Other);
    }

    #[test]
    fn queue_flags_map() {
        let caps = queue_caps(vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER | vk::QueueFlags::PROTECTED);
        assert_eq!(caps, QueueCaps::COMPUTE | QueueCaps::TRANSFER);
    }

    #[test]
    fn dispatch_output_is_made_host_visible() {
        let barrier = host_read_barrier();
        assert_eq!(barrier.src_access_mask, vk::AccessFlags::SHADER_WRITE);
        assert_eq!(barrier.dst_access_mask, vk::AccessFlags::HOST_READ);
    }

    #[test]
    fn memory_flags_map() {
        let flags = memory_flags(vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT);
        assert_eq!(flags, MemoryFlags::HOST_VISIBLE | MemoryFlags::HOST_COHERENT);
        assert!(memory_flags(vk::MemoryPropertyFlags::empty()).is_empty());
    }
}
