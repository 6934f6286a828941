use vulkanalia::{
    Instance,
    vk::{self, InstanceV1_0},
};

#[derive(Clone, Debug)]
pub struct GpuInfo {
    index: usize,
    name: String,
    device_type: vk::PhysicalDeviceType,
    has_compute: bool,
    compute_queue_count: u32,
    total_memory: u64,
    api_version: u32,
}

impl GpuInfo {
    pub fn new(instance: &Instance, device: vk::PhysicalDevice, index: usize) -> GpuInfo {
        unsafe {
            let properties = instance.get_physical_device_properties(device);
            let queue_families = instance.get_physical_device_queue_family_properties(device);
            let memory_properties = instance.get_physical_device_memory_properties(device);

            let name = String::from_utf8_lossy(
                &properties
                    .device_name
                    .iter()
                    .take_while(|&&c| c != 0)
                    .map(|&c| c as u8)
                    .collect::<Vec<u8>>(),
            )
            .to_string();

            let (has_compute, compute_queue_count) = queue_families
                .iter()
                .find(|props| props.queue_flags.contains(vk::QueueFlags::COMPUTE))
                .map(|props| (true, props.queue_count))
                .unwrap_or((false, 0));

            let device_local_heap_index = (0..memory_properties.memory_type_count)
                .find(|&i| {
                    memory_properties.memory_types[i as usize]
                        .property_flags
                        .contains(vk::MemoryPropertyFlags::DEVICE_LOCAL)
                })
                .map(|i| memory_properties.memory_types[i as usize].heap_index)
                .unwrap_or(0);

            GpuInfo {
                index,
                name,
                device_type: properties.device_type,
                has_compute,
                compute_queue_count,
                total_memory: memory_properties.memory_heaps[device_local_heap_index as usize].size,
                api_version: properties.api_version,
            }
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn device_type(&self) -> vk::PhysicalDeviceType {
        self.device_type
    }

    pub fn has_compute(&self) -> bool {
        self.has_compute
    }

    pub fn compute_queue_count(&self) -> u32 {
        self.compute_queue_count
    }

    /// Size of the device-local heap in bytes.
    pub fn total_memory(&self) -> u64 {
        self.total_memory
    }

    pub fn api_version(&self) -> (u32, u32, u32) {
        let v = self.api_version;
        ((v >> 22) & 0x7f, (v >> 12) & 0x3ff, v & 0xfff)
    }

    /// Discrete GPUs first, then by memory, largest first.
    pub(crate) fn sort_key(&self) -> (bool, std::cmp::Reverse<u64>) {
        (
            self.device_type != vk::PhysicalDeviceType::DISCRETE_GPU,
            std::cmp::Reverse(self.total_memory),
        )
    }
}
