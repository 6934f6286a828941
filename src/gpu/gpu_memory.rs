use std::sync::Arc;

use vulkanalia::vk::{self, DeviceV1_0};

use crate::{
    device::{DeviceMemory, check_range},
    error::VKVec3Error,
};

use super::{transfer_error, vk_gpu::Gpu};

pub struct GPUMemory {
    pub buffer: vk::Buffer,
    pub memory: vk::DeviceMemory,
    pub size: vk::DeviceSize,
    pub properties: vk::MemoryPropertyFlags,
    gpu: Arc<Gpu>,
}

impl GPUMemory {
    pub(super) fn new(
        buffer: vk::Buffer,
        memory: vk::DeviceMemory,
        size: vk::DeviceSize,
        properties: vk::MemoryPropertyFlags,
        gpu: &Arc<Gpu>,
    ) -> Self {
        Self {
            buffer,
            memory,
            size,
            properties,
            gpu: Arc::clone(gpu),
        }
    }

    /// Whether the host can map this memory without explicit flushes.
    pub fn is_host_visible(&self) -> bool {
        self.properties
            .contains(vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT)
    }

    pub(super) fn belongs_to(&self, gpu: &Arc<Gpu>) -> bool {
        Arc::ptr_eq(&self.gpu, gpu)
    }

    /// Copy raw bytes into mapped memory at `offset`.
    pub fn copy_into(&self, offset: vk::DeviceSize, data: &[u8]) -> Result<(), VKVec3Error> {
        check_range("Mapped write", offset, data.len() as u64, self.size)?;
        if data.is_empty() {
            return Ok(());
        }

        let device = self.gpu.get_device();
        unsafe {
            let data_ptr = device
                .map_memory(
                    self.memory,
                    offset,
                    data.len() as vk::DeviceSize,
                    vk::MemoryMapFlags::empty(),
                )
                .map_err(transfer_error("Failed to map memory for write"))?
                as *mut u8;

            std::ptr::copy_nonoverlapping(data.as_ptr(), data_ptr, data.len());

            device.unmap_memory(self.memory);
        }

        Ok(())
    }

    /// Read raw bytes from mapped memory at `offset` into `out`.
    pub fn read_into(&self, offset: vk::DeviceSize, out: &mut [u8]) -> Result<(), VKVec3Error> {
        check_range("Mapped read", offset, out.len() as u64, self.size)?;
        if out.is_empty() {
            return Ok(());
        }

        let device = self.gpu.get_device();
        unsafe {
            let data_ptr = device
                .map_memory(
                    self.memory,
                    offset,
                    out.len() as vk::DeviceSize,
                    vk::MemoryMapFlags::empty(),
                )
                .map_err(transfer_error("Failed to map memory for read"))?
                as *const u8;

            std::ptr::copy_nonoverlapping(data_ptr, out.as_mut_ptr(), out.len());

            device.unmap_memory(self.memory);
        }

        Ok(())
    }
}

impl DeviceMemory for GPUMemory {
    fn size(&self) -> u64 {
        self.size
    }
}

impl Drop for GPUMemory {
    fn drop(&mut self) {
        unsafe {
            let device = self.gpu.get_device();
            device.destroy_buffer(self.buffer, None);
            device.free_memory(self.memory, None);
        }
        self.gpu.memory_deallocate_usage(self.size);
    }
}

impl std::fmt::Debug for GPUMemory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GPUMemory")
            .field("buffer", &self.buffer)
            .field("size", &self.size)
            .field("properties", &self.properties)
            .finish()
    }
}
