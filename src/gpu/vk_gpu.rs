use std::{
    ffi::CString,
    ptr,
    sync::{Arc, Mutex, MutexGuard},
};

use log::{debug, info};
use vulkanalia::{
    Device, Entry, Instance,
    loader::{LIBRARY, LibloadingLoader},
    vk::{self, DeviceV1_0, InstanceV1_0},
};

use crate::{
    config::GpuConfig,
    device::{DeviceContext, MemFlags},
    error::VKVec3Error,
    memory_tracker::MemoryTracker,
};

use super::{allocation_error, gpu_memory::GPUMemory, info::GpuInfo, queue::GpuQueue};

// Vulkan does not allow zero sized buffers
const MIN_BUFFER_BYTES: vk::DeviceSize = 4;

/// One opened physical device with a single compute queue.
///
/// Shared as `Arc<Gpu>`: every [`GPUMemory`] and [`GpuQueue`] keeps it alive, so
/// the device is destroyed only after all of them are gone.
pub struct Gpu {
    _entry: Entry,
    instance: Instance,
    device: Device,
    physical_device: vk::PhysicalDevice,
    queue_family_index: u32,
    queue: Mutex<vk::Queue>,
    info: GpuInfo,
    config: GpuConfig,
    memory_tracker: MemoryTracker,
}

impl Gpu {
    pub fn new(config: &GpuConfig) -> Result<Arc<Self>, VKVec3Error> {
        config.validate()?;

        let entry = Self::load_entry()?;
        let instance = Self::create_instance(&entry)?;

        let opened = Self::select_physical_device(&instance, config.device_index).and_then(
            |(physical_device, info)| {
                Self::create_logical_device(&instance, physical_device)
                    .map(|(device, family)| (physical_device, info, device, family))
            },
        );

        let (physical_device, info, device, queue_family_index) = match opened {
            Ok(opened) => opened,
            Err(err) => {
                unsafe { instance.destroy_instance(None) };
                return Err(err);
            }
        };

        let queue = unsafe { device.get_device_queue(queue_family_index, 0) };
        let budget = (info.total_memory() as f64 * config.memory_fraction as f64) as u64;

        info!(
            "Opened GPU {}: {} ({:?}), budget {} of {} bytes",
            info.index(),
            info.name(),
            info.device_type(),
            budget,
            info.total_memory()
        );

        Ok(Arc::new(Self {
            _entry: entry,
            instance,
            device,
            physical_device,
            queue_family_index,
            queue: Mutex::new(queue),
            info,
            config: config.clone(),
            memory_tracker: MemoryTracker::new(budget),
        }))
    }

    pub fn available_gpus() -> Result<Vec<GpuInfo>, VKVec3Error> {
        let entry = Self::load_entry()?;
        let instance = Self::create_instance(&entry)?;

        let result = Self::compute_gpus(&instance);

        unsafe { instance.destroy_instance(None) };
        result
    }

    fn load_entry() -> Result<Entry, VKVec3Error> {
        unsafe {
            let loader = LibloadingLoader::new(LIBRARY)
                .map_err(|e| VKVec3Error::VulkanLoad(e.to_string()))?;
            Entry::new(loader).map_err(|e| VKVec3Error::VulkanLoad(e.to_string()))
        }
    }

    fn create_instance(entry: &Entry) -> Result<Instance, VKVec3Error> {
        let aname = CString::new("vkvec3").map_err(|e| VKVec3Error::Vulkan(e.to_string()))?;

        let appinfo = vk::ApplicationInfo {
            s_type: vk::StructureType::APPLICATION_INFO,
            next: ptr::null(),
            application_name: aname.as_ptr(),
            application_version: vk::make_version(1, 0, 0),
            engine_name: aname.as_ptr(),
            engine_version: vk::make_version(1, 0, 0),
            api_version: vk::make_version(1, 0, 0),
        };

        let create_info = vk::InstanceCreateInfo {
            s_type: vk::StructureType::INSTANCE_CREATE_INFO,
            next: ptr::null(),
            flags: vk::InstanceCreateFlags::empty(),
            application_info: &appinfo,
            enabled_layer_count: 0,
            enabled_layer_names: ptr::null(),
            enabled_extension_count: 0,
            enabled_extension_names: ptr::null(),
        };

        Ok(unsafe { entry.create_instance(&create_info, None) }?)
    }

    /// Compute capable devices, best first.
    fn compute_gpus(instance: &Instance) -> Result<Vec<GpuInfo>, VKVec3Error> {
        let physical_devices = unsafe { instance.enumerate_physical_devices() }?;

        let mut gpu_infos: Vec<GpuInfo> = physical_devices
            .iter()
            .enumerate()
            .map(|(idx, &device)| GpuInfo::new(instance, device, idx))
            .filter(|info| info.has_compute())
            .collect();

        gpu_infos.sort_by_key(|gpu| gpu.sort_key());
        Ok(gpu_infos)
    }

    fn select_physical_device(
        instance: &Instance,
        device_index: Option<usize>,
    ) -> Result<(vk::PhysicalDevice, GpuInfo), VKVec3Error> {
        let physical_devices = unsafe { instance.enumerate_physical_devices() }?;

        let info = match device_index {
            Some(idx) => {
                let device = *physical_devices.get(idx).ok_or_else(|| {
                    VKVec3Error::Config(format!(
                        "GPU index {} out of range, {} devices found",
                        idx,
                        physical_devices.len()
                    ))
                })?;

                let info = GpuInfo::new(instance, device, idx);
                if !info.has_compute() {
                    return Err(VKVec3Error::Config(format!(
                        "GPU {} ({}) has no compute queue",
                        idx,
                        info.name()
                    )));
                }
                info
            }
            None => Self::compute_gpus(instance)?
                .into_iter()
                .next()
                .ok_or_else(|| VKVec3Error::Vulkan("No compute capable GPU found".to_string()))?,
        };

        Ok((physical_devices[info.index()], info))
    }

    fn create_logical_device(
        instance: &Instance,
        physical_device: vk::PhysicalDevice,
    ) -> Result<(Device, u32), VKVec3Error> {
        unsafe {
            let queue_family_index = instance
                .get_physical_device_queue_family_properties(physical_device)
                .iter()
                .position(|properties| properties.queue_flags.contains(vk::QueueFlags::COMPUTE))
                .map(|index| index as u32)
                .ok_or_else(|| VKVec3Error::Vulkan("No compute queue family found".to_string()))?;

            let queue_priorities = [1.0f32];

            let queue_info = vk::DeviceQueueCreateInfo {
                s_type: vk::StructureType::DEVICE_QUEUE_CREATE_INFO,
                next: ptr::null(),
                flags: vk::DeviceQueueCreateFlags::empty(),
                queue_family_index,
                queue_count: 1,
                queue_priorities: queue_priorities.as_ptr(),
            };

            let device_features = vk::PhysicalDeviceFeatures::default();

            let device_create_info = vk::DeviceCreateInfo {
                s_type: vk::StructureType::DEVICE_CREATE_INFO,
                next: ptr::null(),
                flags: vk::DeviceCreateFlags::empty(),
                queue_create_info_count: 1,
                queue_create_infos: &queue_info,
                enabled_layer_count: 0,
                enabled_layer_names: ptr::null(),
                enabled_extension_count: 0,
                enabled_extension_names: ptr::null(),
                enabled_features: &device_features,
            };

            let device = instance.create_device(physical_device, &device_create_info, None)?;

            Ok((device, queue_family_index))
        }
    }

    /// Opens a command queue on this device.
    pub fn create_queue(self: &Arc<Self>) -> Result<GpuQueue, VKVec3Error> {
        GpuQueue::new(self)
    }

    /// Creates a buffer bound to fresh memory of the first property set in
    /// `candidates` the device offers.
    pub(crate) fn allocate_buffer(
        self: &Arc<Self>,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        candidates: &[vk::MemoryPropertyFlags],
    ) -> Result<GPUMemory, VKVec3Error> {
        self.memory_tracker.allocate(size)?;

        match self.create_bound_buffer(size, usage, candidates) {
            Ok((buffer, memory, properties)) => {
                debug!("GPU buffer of {} bytes in {:?} memory", size, properties);
                Ok(GPUMemory::new(buffer, memory, size, properties, self))
            }
            Err(err) => {
                self.memory_tracker.deallocate(size);
                Err(err)
            }
        }
    }

    fn create_bound_buffer(
        &self,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        candidates: &[vk::MemoryPropertyFlags],
    ) -> Result<(vk::Buffer, vk::DeviceMemory, vk::MemoryPropertyFlags), VKVec3Error> {
        unsafe {
            let buffer_info = vk::BufferCreateInfo {
                s_type: vk::StructureType::BUFFER_CREATE_INFO,
                next: ptr::null(),
                flags: vk::BufferCreateFlags::empty(),
                size: size.max(MIN_BUFFER_BYTES),
                usage,
                sharing_mode: vk::SharingMode::EXCLUSIVE,
                queue_family_index_count: 0,
                queue_family_indices: ptr::null(),
            };

            let buffer = self
                .device
                .create_buffer(&buffer_info, None)
                .map_err(allocation_error("Failed to create buffer"))?;
            let mem_requirements = self.device.get_buffer_memory_requirements(buffer);

            let Some((memory_type, properties)) = candidates
                .iter()
                .find_map(|&props| self.find_memory_type(mem_requirements.memory_type_bits, props))
            else {
                self.device.destroy_buffer(buffer, None);
                return Err(VKVec3Error::Allocation(format!(
                    "No memory type matches any of {:?}",
                    candidates
                )));
            };

            let alloc_info = vk::MemoryAllocateInfo {
                s_type: vk::StructureType::MEMORY_ALLOCATE_INFO,
                next: ptr::null(),
                allocation_size: mem_requirements.size,
                memory_type_index: memory_type,
            };

            let memory = match self.device.allocate_memory(&alloc_info, None) {
                Ok(memory) => memory,
                Err(err) => {
                    self.device.destroy_buffer(buffer, None);
                    return Err(allocation_error("Failed to allocate memory")(err));
                }
            };

            if let Err(err) = self.device.bind_buffer_memory(buffer, memory, 0) {
                self.device.destroy_buffer(buffer, None);
                self.device.free_memory(memory, None);
                return Err(allocation_error("Failed to bind buffer memory")(err));
            }

            Ok((buffer, memory, properties))
        }
    }

    /// Index and actual property flags of the first memory type allowed by
    /// `type_filter` that has all of `properties`.
    pub fn find_memory_type(
        &self,
        type_filter: u32,
        properties: vk::MemoryPropertyFlags,
    ) -> Option<(u32, vk::MemoryPropertyFlags)> {
        let mem_properties = unsafe {
            self.instance
                .get_physical_device_memory_properties(self.physical_device)
        };

        (0..mem_properties.memory_type_count)
            .filter(|&i| (type_filter & (1 << i)) != 0)
            .map(|i| (i, mem_properties.memory_types[i as usize].property_flags))
            .find(|(_, flags)| flags.contains(properties))
    }

    pub fn memory_deallocate_usage(&self, size: u64) {
        self.memory_tracker.deallocate(size)
    }

    pub fn memory_allocated(&self) -> u64 {
        self.memory_tracker.get_current()
    }

    pub fn available_memory(&self) -> u64 {
        self.memory_tracker.get_available()
    }

    pub fn get_device(&self) -> &Device {
        &self.device
    }

    pub fn get_info(&self) -> &GpuInfo {
        &self.info
    }

    pub fn config(&self) -> &GpuConfig {
        &self.config
    }

    pub fn queue_family_index(&self) -> u32 {
        self.queue_family_index
    }

    /// The hardware queue. Submissions must hold the guard.
    pub(super) fn lock_queue(&self) -> Result<MutexGuard<'_, vk::Queue>, VKVec3Error> {
        self.queue
            .lock()
            .map_err(|_| VKVec3Error::Transfer("GPU queue lock poisoned".to_string()))
    }
}

impl DeviceContext for Arc<Gpu> {
    type Memory = GPUMemory;

    fn create_buffer(&self, flags: MemFlags, size: u64) -> Result<GPUMemory, VKVec3Error> {
        let usage = vk::BufferUsageFlags::STORAGE_BUFFER
            | vk::BufferUsageFlags::TRANSFER_SRC
            | vk::BufferUsageFlags::TRANSFER_DST;

        let host_visible = vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT;

        if flags.contains(MemFlags::HOST_VISIBLE) {
            self.allocate_buffer(
                size,
                usage,
                &[host_visible | vk::MemoryPropertyFlags::DEVICE_LOCAL, host_visible],
            )
        } else {
            self.allocate_buffer(
                size,
                usage,
                &[vk::MemoryPropertyFlags::DEVICE_LOCAL, vk::MemoryPropertyFlags::empty()],
            )
        }
    }
}

impl Drop for Gpu {
    fn drop(&mut self) {
        unsafe {
            let _ = self.device.device_wait_idle();
            self.device.destroy_device(None);
            self.instance.destroy_instance(None);
        }
    }
}
