//! Vulkan-compute runtime (§4.5): buffer allocation, shader registration,
//! and the one-queue recorded-then-flushed command stream. Pure bookkeeping
//! that does not need a device handle — workgroup tiling, buffer-flag
//! resolution, barrier tracking, device priority ordering, and the
//! specialization-constant blob layout — lives in the sibling modules and
//! is unit-tested directly; this module is the thin `ash` shell around it
//! and is exercised only against a real Vulkan loader (see the `#[ignore]`
//! tests at the bottom).

pub mod device;
pub mod flags;
pub mod layer;
pub mod network;
pub mod recorder;
pub mod shaders;
pub mod tiling;
pub mod training;

use std::collections::HashMap;
use std::ffi::CStr;
use std::path::{Path, PathBuf};

use ash::vk;
use gpu_alloc::{GpuAllocator, MemoryBlock, Request, UsageFlags};
use gpu_descriptor::{DescriptorAllocator, DescriptorTotalCount};

use crate::error::{Result, RichardError};

pub use flags::{BufferPlan, GpuBufferFlags, MemoryKind};
pub use layer::GpuLayer;
pub use network::GpuNetwork;
pub use recorder::{BarrierTracker, BufferHandle};
pub use shaders::{BufferBinding, SpecConstantValue};

/// Opaque handle returned by `add_shader`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShaderHandle(u32);

struct Shader {
    pipeline: vk::Pipeline,
    pipeline_layout: vk::PipelineLayout,
    descriptor_set_layout: vk::DescriptorSetLayout,
    bindings: Vec<BufferBinding>,
    num_workgroups: [u32; 3],
}

struct AllocatedBuffer {
    buffer: vk::Buffer,
    memory: MemoryBlock<vk::DeviceMemory>,
    size: u64,
    plan: BufferPlan,
}

/// A lazily-created wrapper around the runtime's one live command buffer,
/// per Design Note "GPU command buffer ownership": `queue_shader` cannot be
/// called without one, and `flush_queue` consumes it. Every descriptor set
/// allocated by a `queue_shader` call against this recorder is held here and
/// freed once the corresponding fence wait in `flush_queue` completes, so a
/// set is never returned to the pool while the GPU might still be reading
/// through it.
struct Recorder {
    command_buffer: vk::CommandBuffer,
    tracker: BarrierTracker,
    descriptor_sets: Vec<gpu_descriptor::DescriptorSet<vk::DescriptorSet>>,
}

pub struct GpuRuntime {
    entry: ash::Entry,
    instance: ash::Instance,
    physical_device: vk::PhysicalDevice,
    device: ash::Device,
    queue: vk::Queue,
    queue_family_index: u32,
    command_pool: vk::CommandPool,
    command_buffer: vk::CommandBuffer,
    fence: vk::Fence,
    allocator: GpuAllocator<vk::DeviceMemory>,
    descriptor_allocator: DescriptorAllocator<vk::DescriptorPool, vk::DescriptorSet>,
    recorder: Option<Recorder>,
    buffers: HashMap<BufferHandle, AllocatedBuffer>,
    next_buffer_handle: usize,
    shaders: HashMap<ShaderHandle, Shader>,
    next_shader_id: u32,
    shader_dir: PathBuf,
    max_workgroup_invocations: u32,
    max_workgroup_dims: [u32; 3],
}

impl GpuRuntime {
    /// Enumerates physical devices, picks one by §4.5's priority order,
    /// opens a compute queue, and prepares the allocators. `shader_dir` is
    /// where `load_shader_set` resolves `.spv` filenames from.
    /// `max_workgroup_size_override` tightens (never loosens) the device's
    /// reported invocation cap.
    pub fn new(shader_dir: impl AsRef<Path>, max_workgroup_size_override: Option<u32>) -> Result<Self> {
        let entry = unsafe { ash::Entry::load() }.map_err(|e| RichardError::device(format!("failed to load Vulkan loader: {e}")))?;

        let app_info = vk::ApplicationInfo::default().api_version(vk::API_VERSION_1_1);
        let instance_info = vk::InstanceCreateInfo::default().application_info(&app_info);
        let instance = unsafe { entry.create_instance(&instance_info, None) }
            .map_err(|e| RichardError::device(format!("vkCreateInstance failed: {e:?}")))?;

        let physical_devices = unsafe { instance.enumerate_physical_devices() }
            .map_err(|e| RichardError::device(format!("vkEnumeratePhysicalDevices failed: {e:?}")))?;
        if physical_devices.is_empty() {
            return Err(RichardError::device("no Vulkan physical devices available"));
        }

        let candidates: Vec<(vk::PhysicalDevice, device::DeviceKind)> = physical_devices
            .iter()
            .map(|&pd| {
                let props = unsafe { instance.get_physical_device_properties(pd) };
                (pd, device_kind(props.device_type))
            })
            .collect();
        let physical_device = device::pick_best(candidates).expect("non-empty enumeration yields a device");

        let properties = unsafe { instance.get_physical_device_properties(physical_device) };
        let limits = properties.limits;
        let max_workgroup_invocations =
            device::apply_workgroup_cap_override(limits.max_compute_work_group_invocations, max_workgroup_size_override);
        let max_workgroup_dims = limits.max_compute_work_group_size;

        let queue_family_index = unsafe { instance.get_physical_device_queue_family_properties(physical_device) }
            .iter()
            .enumerate()
            .find(|(_, props)| props.queue_flags.contains(vk::QueueFlags::COMPUTE))
            .map(|(index, _)| index as u32)
            .ok_or_else(|| RichardError::device("no queue family exposes VK_QUEUE_COMPUTE_BIT"))?;

        let queue_priorities = [1.0f32];
        let queue_info = vk::DeviceQueueCreateInfo::default()
            .queue_family_index(queue_family_index)
            .queue_priorities(&queue_priorities);
        let queue_infos = [queue_info];
        let device_info = vk::DeviceCreateInfo::default().queue_create_infos(&queue_infos);
        let device = unsafe { instance.create_device(physical_device, &device_info, None) }
            .map_err(|e| RichardError::device(format!("vkCreateDevice failed: {e:?}")))?;
        let queue = unsafe { device.get_device_queue(queue_family_index, 0) };

        let pool_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(queue_family_index)
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);
        let command_pool = unsafe { device.create_command_pool(&pool_info, None) }
            .map_err(|e| RichardError::device(format!("vkCreateCommandPool failed: {e:?}")))?;

        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);
        let command_buffer = unsafe { device.allocate_command_buffers(&alloc_info) }
            .map_err(|e| RichardError::device(format!("vkAllocateCommandBuffers failed: {e:?}")))?[0];

        let fence = unsafe { device.create_fence(&vk::FenceCreateInfo::default(), None) }
            .map_err(|e| RichardError::device(format!("vkCreateFence failed: {e:?}")))?;

        let device_props = unsafe { gpu_alloc_ash::device_properties(&instance, vk::API_VERSION_1_1, physical_device) }
            .map_err(|e| RichardError::device(format!("failed to read allocator device properties: {e:?}")))?;
        let allocator = GpuAllocator::new(gpu_alloc::Config::i_am_prototyping(), device_props);

        let descriptor_allocator = DescriptorAllocator::new(0);

        Ok(GpuRuntime {
            entry,
            instance,
            physical_device,
            device,
            queue,
            queue_family_index,
            command_pool,
            command_buffer,
            fence,
            allocator,
            descriptor_allocator,
            recorder: None,
            buffers: HashMap::new(),
            next_buffer_handle: 0,
            shaders: HashMap::new(),
            next_shader_id: 0,
            shader_dir: shader_dir.as_ref().to_path_buf(),
            max_workgroup_invocations,
            max_workgroup_dims: [max_workgroup_dims[0], max_workgroup_dims[1], max_workgroup_dims[2]],
        })
    }

    pub fn allocate_buffer(&mut self, size: u64, flags: GpuBufferFlags) -> Result<BufferHandle> {
        let plan = flags::resolve(flags);
        let usage = vk::BufferUsageFlags::TRANSFER_SRC
            | vk::BufferUsageFlags::TRANSFER_DST
            | match plan.memory_kind {
                MemoryKind::HostVisibleUniform => vk::BufferUsageFlags::UNIFORM_BUFFER,
                MemoryKind::DeviceLocal | MemoryKind::DeviceLocalHostVisible => vk::BufferUsageFlags::STORAGE_BUFFER,
            };
        let buffer_info = vk::BufferCreateInfo::default().size(size).usage(usage).sharing_mode(vk::SharingMode::EXCLUSIVE);
        let buffer = unsafe { self.device.create_buffer(&buffer_info, None) }
            .map_err(|e| RichardError::device(format!("vkCreateBuffer failed: {e:?}")))?;
        let requirements = unsafe { self.device.get_buffer_memory_requirements(buffer) };

        let usage_flags = match plan.memory_kind {
            MemoryKind::HostVisibleUniform => UsageFlags::UPLOAD | UsageFlags::HOST_ACCESS,
            MemoryKind::DeviceLocalHostVisible => UsageFlags::FAST_DEVICE_ACCESS | UsageFlags::HOST_ACCESS,
            MemoryKind::DeviceLocal => UsageFlags::FAST_DEVICE_ACCESS,
        };
        let request = Request {
            size: requirements.size,
            align_mask: requirements.alignment - 1,
            usage: usage_flags,
            memory_types: requirements.memory_type_bits,
        };
        let memory = unsafe { self.allocator.alloc(gpu_alloc_ash::AshMemoryDevice::wrap(&self.device), request) }
            .map_err(|e| RichardError::device(format!("device memory allocation failed: {e:?}")))?;
        unsafe {
            self.device
                .bind_buffer_memory(buffer, *memory.memory(), memory.offset())
                .map_err(|e| RichardError::device(format!("vkBindBufferMemory failed: {e:?}")))?;
        }

        let handle: BufferHandle = self.next_buffer_handle;
        self.next_buffer_handle += 1;
        self.buffers.insert(handle, AllocatedBuffer { buffer, memory, size, plan });
        Ok(handle)
    }

    /// Uploads `src` into the buffer identified by `handle`. Host-mapped
    /// buffers are memcpy'd directly; device-local-only buffers go through
    /// a transient staging buffer per §4.5 "Staging path".
    pub fn submit_buffer_data(&mut self, handle: BufferHandle, src: &[f32]) -> Result<()> {
        let byte_len = std::mem::size_of_val(src);
        let allocated = self
            .buffers
            .get_mut(&handle)
            .ok_or_else(|| RichardError::precondition("submit_buffer_data: unknown buffer handle"))?;
        if allocated.plan.host_mapped {
            unsafe {
                let mut mapped = allocated
                    .memory
                    .map(gpu_alloc_ash::AshMemoryDevice::wrap(&self.device), 0, byte_len)
                    .map_err(|e| RichardError::device(format!("failed to map buffer: {e:?}")))?;
                std::ptr::copy_nonoverlapping(src.as_ptr() as *const u8, mapped.as_mut().as_mut_ptr(), byte_len);
                allocated.memory.unmap(gpu_alloc_ash::AshMemoryDevice::wrap(&self.device));
            }
            return Ok(());
        }
        self.stage_copy_to_device(handle, src)
    }

    /// Downloads `dst.len()` floats from the buffer identified by `handle`.
    pub fn retrieve_buffer(&mut self, handle: BufferHandle, dst: &mut [f32]) -> Result<()> {
        let byte_len = std::mem::size_of_val(dst);
        let allocated = self
            .buffers
            .get_mut(&handle)
            .ok_or_else(|| RichardError::precondition("retrieve_buffer: unknown buffer handle"))?;
        if allocated.plan.host_mapped {
            unsafe {
                let mut mapped = allocated
                    .memory
                    .map(gpu_alloc_ash::AshMemoryDevice::wrap(&self.device), 0, byte_len)
                    .map_err(|e| RichardError::device(format!("failed to map buffer: {e:?}")))?;
                std::ptr::copy_nonoverlapping(mapped.as_mut().as_ptr(), dst.as_mut_ptr() as *mut u8, byte_len);
                allocated.memory.unmap(gpu_alloc_ash::AshMemoryDevice::wrap(&self.device));
            }
            return Ok(());
        }
        self.stage_copy_from_device(handle, dst)
    }

    fn stage_copy_to_device(&mut self, handle: BufferHandle, src: &[f32]) -> Result<()> {
        let byte_len = std::mem::size_of_val(src) as u64;
        let staging = self.allocate_buffer(byte_len, GpuBufferFlags::FREQUENT_HOST_ACCESS)?;
        self.submit_buffer_data(staging, src)?;
        self.copy_buffer(staging, handle, byte_len)?;
        self.free_buffer(staging)
    }

    fn stage_copy_from_device(&mut self, handle: BufferHandle, dst: &mut [f32]) -> Result<()> {
        let byte_len = std::mem::size_of_val(dst) as u64;
        let staging = self.allocate_buffer(byte_len, GpuBufferFlags::FREQUENT_HOST_ACCESS)?;
        self.copy_buffer(handle, staging, byte_len)?;
        self.retrieve_buffer(staging, dst)?;
        self.free_buffer(staging)
    }

    /// Copies through a dedicated short-lived command buffer with its own
    /// fence, independent of the long-lived recorded queue.
    fn copy_buffer(&mut self, src: BufferHandle, dst: BufferHandle, byte_len: u64) -> Result<()> {
        let src_buffer = self.buffers[&src].buffer;
        let dst_buffer = self.buffers[&dst].buffer;

        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(self.command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);
        let cmd = unsafe { self.device.allocate_command_buffers(&alloc_info) }
            .map_err(|e| RichardError::device(format!("vkAllocateCommandBuffers failed: {e:?}")))?[0];
        let fence = unsafe { self.device.create_fence(&vk::FenceCreateInfo::default(), None) }
            .map_err(|e| RichardError::device(format!("vkCreateFence failed: {e:?}")))?;

        unsafe {
            self.device
                .begin_command_buffer(cmd, &vk::CommandBufferBeginInfo::default().flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT))
                .map_err(|e| RichardError::device(format!("vkBeginCommandBuffer failed: {e:?}")))?;
            let region = vk::BufferCopy::default().size(byte_len);
            self.device.cmd_copy_buffer(cmd, src_buffer, dst_buffer, std::slice::from_ref(&region));
            self.device.end_command_buffer(cmd).map_err(|e| RichardError::device(format!("vkEndCommandBuffer failed: {e:?}")))?;

            let submit = vk::SubmitInfo::default().command_buffers(std::slice::from_ref(&cmd));
            self.device
                .queue_submit(self.queue, std::slice::from_ref(&submit), fence)
                .map_err(|e| RichardError::device(format!("vkQueueSubmit failed: {e:?}")))?;
            self.device
                .wait_for_fences(std::slice::from_ref(&fence), true, u64::MAX)
                .map_err(|e| RichardError::device(format!("vkWaitForFences failed: {e:?}")))?;
            self.device.destroy_fence(fence, None);
            self.device.free_command_buffers(self.command_pool, std::slice::from_ref(&cmd));
        }
        Ok(())
    }

    fn free_buffer(&mut self, handle: BufferHandle) -> Result<()> {
        if let Some(allocated) = self.buffers.remove(&handle) {
            unsafe {
                self.allocator.dealloc(gpu_alloc_ash::AshMemoryDevice::wrap(&self.device), allocated.memory);
                self.device.destroy_buffer(allocated.buffer, None);
            }
        }
        Ok(())
    }

    /// Convenience over `load_shader_set` using the directory passed to
    /// `GpuRuntime::new`.
    pub fn load_default_shader_set(&self) -> Result<HashMap<String, Vec<u32>>> {
        self.load_shader_set(&self.shader_dir)
    }

    /// Reads every `.spv` file named in the stable shader set (§4.5
    /// "Shader set") from `dir`, decoding each into SPIR-V words. Does not
    /// build pipelines yet: specialization constants (and so the pipeline
    /// itself) are per-layer, decided when a layer calls `add_shader`.
    pub fn load_shader_set(&self, dir: impl AsRef<Path>) -> Result<HashMap<String, Vec<u32>>> {
        let dir = dir.as_ref();
        let mut modules = HashMap::new();
        for name in shaders::all_shader_names() {
            let path = dir.join(format!("{name}.spv"));
            let bytes = std::fs::read(&path).map_err(|e| RichardError::io(path.display().to_string(), e))?;
            let mut cursor = std::io::Cursor::new(&bytes);
            let words = ash::util::read_spv(&mut cursor).map_err(|e| RichardError::device(format!("malformed SPIR-V in {name}: {e}")))?;
            modules.insert(name.to_string(), words);
        }
        Ok(modules)
    }

    /// Builds a compute pipeline from already-decoded SPIR-V `words`
    /// (typically from `load_shader_set`), picking a workgroup tiling for
    /// `work_size` and packing the specialization data blob. The shader
    /// module is destroyed immediately once the pipeline owns its own copy,
    /// per the scoped acquisition rule for transient Vulkan objects.
    pub fn add_shader(
        &mut self,
        name: &str,
        words: &[u32],
        bindings: &[BufferBinding],
        spec_constants: &[SpecConstantValue],
        push_constant_size: u32,
        work_size: [u32; 3],
    ) -> Result<ShaderHandle> {
        let (workgroup_size, num_workgroups) = tiling::tile_workgroups(work_size, self.max_workgroup_invocations, self.max_workgroup_dims);
        let (spec_data, spec_entries) = shaders::pack_specialization_data(workgroup_size, spec_constants);
        let map_entries: Vec<vk::SpecializationMapEntry> = spec_entries
            .iter()
            .map(|e| vk::SpecializationMapEntry::default().constant_id(e.constant_id).offset(e.offset).size(e.size as usize))
            .collect();
        let specialization_info = vk::SpecializationInfo::default().map_entries(&map_entries).data(&spec_data);

        let module_info = vk::ShaderModuleCreateInfo::default().code(words);
        let module = unsafe { self.device.create_shader_module(&module_info, None) }
            .map_err(|e| RichardError::device(format!("vkCreateShaderModule failed for {name}: {e:?}")))?;

        let layout_bindings: Vec<vk::DescriptorSetLayoutBinding> = bindings
            .iter()
            .map(|b| {
                vk::DescriptorSetLayoutBinding::default()
                    .binding(b.slot)
                    .descriptor_type(if b.readonly { vk::DescriptorType::UNIFORM_BUFFER } else { vk::DescriptorType::STORAGE_BUFFER })
                    .descriptor_count(1)
                    .stage_flags(vk::ShaderStageFlags::COMPUTE)
            })
            .collect();
        let layout_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(&layout_bindings);
        let descriptor_set_layout = unsafe { self.device.create_descriptor_set_layout(&layout_info, None) }
            .map_err(|e| RichardError::device(format!("vkCreateDescriptorSetLayout failed for {name}: {e:?}")))?;

        let push_constant_ranges = if push_constant_size > 0 {
            vec![vk::PushConstantRange::default().stage_flags(vk::ShaderStageFlags::COMPUTE).offset(0).size(push_constant_size)]
        } else {
            Vec::new()
        };
        let set_layouts = [descriptor_set_layout];
        let pipeline_layout_info = vk::PipelineLayoutCreateInfo::default().set_layouts(&set_layouts).push_constant_ranges(&push_constant_ranges);
        let pipeline_layout = unsafe { self.device.create_pipeline_layout(&pipeline_layout_info, None) }
            .map_err(|e| RichardError::device(format!("vkCreatePipelineLayout failed for {name}: {e:?}")))?;

        let entry_point = CStr::from_bytes_with_nul(b"main\0").expect("literal is nul-terminated");
        let stage = vk::PipelineShaderStageCreateInfo::default()
            .stage(vk::ShaderStageFlags::COMPUTE)
            .module(module)
            .name(entry_point)
            .specialization_info(&specialization_info);
        let pipeline_info = vk::ComputePipelineCreateInfo::default().stage(stage).layout(pipeline_layout);
        let pipelines = unsafe { self.device.create_compute_pipelines(vk::PipelineCache::null(), std::slice::from_ref(&pipeline_info), None) }
            .map_err(|(_, e)| RichardError::device(format!("vkCreateComputePipelines failed for {name}: {e:?}")))?;
        let pipeline = pipelines[0];

        unsafe { self.device.destroy_shader_module(module, None) };

        let handle = ShaderHandle(self.next_shader_id);
        self.next_shader_id += 1;
        self.shaders.insert(
            handle,
            Shader { pipeline, pipeline_layout, descriptor_set_layout, bindings: bindings.to_vec(), num_workgroups },
        );
        Ok(handle)
    }

    /// Records a dispatch of `handle` against `buffer_bindings` (in binding
    /// order), inserting barriers for any buffer still in the active-writes
    /// set, per §4.5 "Command stream".
    pub fn queue_shader(&mut self, handle: ShaderHandle, buffer_bindings: &[(BufferHandle, bool)], push_constants: Option<&[u8]>) -> Result<()> {
        let shader = self
            .shaders
            .get(&handle)
            .ok_or_else(|| RichardError::precondition("queue_shader: unknown shader handle"))?;

        let reads: Vec<BufferHandle> = buffer_bindings.iter().filter(|(_, writes)| !writes).map(|(h, _)| *h).collect();
        let writes: Vec<BufferHandle> = buffer_bindings.iter().filter(|(_, writes)| *writes).map(|(h, _)| *h).collect();

        let total_count = DescriptorTotalCount {
            storage_buffer: shader.bindings.iter().filter(|b| !b.readonly).count() as u32,
            uniform_buffer: shader.bindings.iter().filter(|b| b.readonly).count() as u32,
            ..Default::default()
        };
        let descriptor_set = unsafe {
            self.descriptor_allocator.allocate(
                gpu_descriptor_ash::AshDescriptorDevice::wrap(&self.device),
                &shader.descriptor_set_layout,
                gpu_descriptor::DescriptorSetLayoutCreateFlags::empty(),
                &total_count,
                1,
            )
        }
        .map_err(|e| RichardError::device(format!("descriptor set allocation failed: {e:?}")))?
        .remove(0);
        let raw_descriptor_set = *descriptor_set.raw();

        let buffer_infos: Vec<vk::DescriptorBufferInfo> = buffer_bindings
            .iter()
            .map(|(handle, _)| {
                let buf = self.buffers[handle].buffer;
                vk::DescriptorBufferInfo::default().buffer(buf).offset(0).range(vk::WHOLE_SIZE)
            })
            .collect();
        let writes_desc: Vec<vk::WriteDescriptorSet> = shader
            .bindings
            .iter()
            .zip(buffer_infos.iter())
            .map(|(binding, info)| {
                vk::WriteDescriptorSet::default()
                    .dst_set(raw_descriptor_set)
                    .dst_binding(binding.slot)
                    .descriptor_type(if binding.readonly { vk::DescriptorType::UNIFORM_BUFFER } else { vk::DescriptorType::STORAGE_BUFFER })
                    .buffer_info(std::slice::from_ref(info))
            })
            .collect();
        unsafe { self.device.update_descriptor_sets(&writes_desc, &[]) };

        let pipeline = shader.pipeline;
        let pipeline_layout = shader.pipeline_layout;
        let num_workgroups = shader.num_workgroups;

        let recorder = self.begin_recording()?;
        recorder.descriptor_sets.push(descriptor_set);
        let pending = recorder.tracker.queue_shader(&reads, &writes);
        for buffer in pending {
            let vk_buffer = self.buffers[&buffer].buffer;
            let is_uniform = self.buffers[&buffer].plan.memory_kind == MemoryKind::HostVisibleUniform;
            let barrier = vk::BufferMemoryBarrier::default()
                .src_access_mask(vk::AccessFlags::SHADER_WRITE)
                .dst_access_mask(if is_uniform { vk::AccessFlags::UNIFORM_READ } else { vk::AccessFlags::SHADER_READ })
                .buffer(vk_buffer)
                .offset(0)
                .size(vk::WHOLE_SIZE);
            unsafe {
                self.device.cmd_pipeline_barrier(
                    recorder.command_buffer,
                    vk::PipelineStageFlags::COMPUTE_SHADER,
                    vk::PipelineStageFlags::COMPUTE_SHADER,
                    vk::DependencyFlags::BY_REGION,
                    &[],
                    std::slice::from_ref(&barrier),
                    &[],
                );
            }
        }

        unsafe {
            self.device.cmd_bind_pipeline(recorder.command_buffer, vk::PipelineBindPoint::COMPUTE, pipeline);
            self.device
                .cmd_bind_descriptor_sets(recorder.command_buffer, vk::PipelineBindPoint::COMPUTE, pipeline_layout, 0, &[raw_descriptor_set], &[]);
            if let Some(bytes) = push_constants {
                self.device.cmd_push_constants(recorder.command_buffer, pipeline_layout, vk::ShaderStageFlags::COMPUTE, 0, bytes);
            }
            self.device.cmd_dispatch(recorder.command_buffer, num_workgroups[0], num_workgroups[1], num_workgroups[2]);
        }
        Ok(())
    }

    fn begin_recording(&mut self) -> Result<&mut Recorder> {
        if self.recorder.is_none() {
            unsafe {
                self.device
                    .begin_command_buffer(self.command_buffer, &vk::CommandBufferBeginInfo::default())
                    .map_err(|e| RichardError::device(format!("vkBeginCommandBuffer failed: {e:?}")))?;
            }
            self.recorder = Some(Recorder { command_buffer: self.command_buffer, tracker: BarrierTracker::new(), descriptor_sets: Vec::new() });
        }
        Ok(self.recorder.as_mut().expect("just inserted"))
    }

    /// Ends, submits, and fence-waits the recorded command buffer, then
    /// resets it and clears the active-writes set. No-op if nothing was
    /// recorded since the last flush. Every descriptor set the recorder
    /// accumulated is returned to the allocator right after the fence wait,
    /// once nothing on the device can still be reading through it.
    pub fn flush_queue(&mut self) -> Result<()> {
        let Some(recorder) = self.recorder.take() else {
            return Ok(());
        };
        unsafe {
            self.device
                .end_command_buffer(self.command_buffer)
                .map_err(|e| RichardError::device(format!("vkEndCommandBuffer failed: {e:?}")))?;
            let submit = vk::SubmitInfo::default().command_buffers(std::slice::from_ref(&self.command_buffer));
            self.device
                .queue_submit(self.queue, std::slice::from_ref(&submit), self.fence)
                .map_err(|e| RichardError::device(format!("vkQueueSubmit failed: {e:?}")))?;
            self.device
                .wait_for_fences(std::slice::from_ref(&self.fence), true, u64::MAX)
                .map_err(|e| RichardError::device(format!("vkWaitForFences failed: {e:?}")))?;
            self.device
                .reset_fences(std::slice::from_ref(&self.fence))
                .map_err(|e| RichardError::device(format!("vkResetFences failed: {e:?}")))?;
            self.device
                .reset_command_buffer(self.command_buffer, vk::CommandBufferResetFlags::empty())
                .map_err(|e| RichardError::device(format!("vkResetCommandBuffer failed: {e:?}")))?;
            self.descriptor_allocator.free(gpu_descriptor_ash::AshDescriptorDevice::wrap(&self.device), recorder.descriptor_sets);
        }
        Ok(())
    }
}

fn device_kind(device_type: vk::PhysicalDeviceType) -> device::DeviceKind {
    match device_type {
        vk::PhysicalDeviceType::DISCRETE_GPU => device::DeviceKind::Discrete,
        vk::PhysicalDeviceType::INTEGRATED_GPU => device::DeviceKind::Integrated,
        vk::PhysicalDeviceType::VIRTUAL_GPU => device::DeviceKind::Virtual,
        vk::PhysicalDeviceType::CPU => device::DeviceKind::Cpu,
        _ => device::DeviceKind::Other,
    }
}

impl Drop for GpuRuntime {
    fn drop(&mut self) {
        unsafe {
            let _ = self.device.device_wait_idle();
            for shader in self.shaders.values() {
                self.device.destroy_pipeline(shader.pipeline, None);
                self.device.destroy_pipeline_layout(shader.pipeline_layout, None);
                self.device.destroy_descriptor_set_layout(shader.descriptor_set_layout, None);
            }
            for handle in self.buffers.keys().copied().collect::<Vec<_>>() {
                if let Some(allocated) = self.buffers.remove(&handle) {
                    self.allocator.dealloc(gpu_alloc_ash::AshMemoryDevice::wrap(&self.device), allocated.memory);
                    self.device.destroy_buffer(allocated.buffer, None);
                }
            }
            self.device.destroy_fence(self.fence, None);
            self.device.destroy_command_pool(self.command_pool, None);
            self.device.destroy_device(None);
            self.instance.destroy_instance(None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Requires `VK_ICD_FILENAMES`/a loadable Vulkan ICD; not run in
    /// environments without a GPU or software rasterizer installed.
    #[test]
    #[ignore]
    fn runtime_initializes_against_a_real_vulkan_loader() {
        let runtime = GpuRuntime::new("shaders", None);
        assert!(runtime.is_ok());
    }
}
