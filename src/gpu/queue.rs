use std::{
    ptr,
    sync::{Arc, Mutex, MutexGuard},
};

use log::debug;
use vulkanalia::{
    Device,
    vk::{self, DeviceV1_0},
};

use crate::{
    device::{CommandQueue, check_range},
    error::VKVec3Error,
};

use super::{gpu_memory::GPUMemory, transfer_error, vk_gpu::Gpu};

struct QueueState {
    // created on the first transfer that needs it, then reused
    staging: Option<GPUMemory>,
}

/// Command submission on a [`Gpu`]'s compute queue.
///
/// Every command is recorded into one reusable command buffer, submitted and
/// waited on with a fence before the call returns. Device-local memory is
/// written and read through a host-visible staging buffer in chunks of
/// `GpuConfig::staging_bytes`.
pub struct GpuQueue {
    gpu: Arc<Gpu>,
    command_pool: vk::CommandPool,
    command_buffer: vk::CommandBuffer,
    fence: vk::Fence,
    state: Mutex<QueueState>,
}

impl GpuQueue {
    pub fn new(gpu: &Arc<Gpu>) -> Result<Self, VKVec3Error> {
        let device = gpu.get_device();

        unsafe {
            let command_pool_info = vk::CommandPoolCreateInfo {
                s_type: vk::StructureType::COMMAND_POOL_CREATE_INFO,
                next: ptr::null(),
                flags: vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
                queue_family_index: gpu.queue_family_index(),
            };

            let command_pool = device.create_command_pool(&command_pool_info, None)?;

            let command_buffer_info = vk::CommandBufferAllocateInfo {
                s_type: vk::StructureType::COMMAND_BUFFER_ALLOCATE_INFO,
                next: ptr::null(),
                command_pool,
                level: vk::CommandBufferLevel::PRIMARY,
                command_buffer_count: 1,
            };

            let command_buffer = match device.allocate_command_buffers(&command_buffer_info) {
                Ok(buffers) if !buffers.is_empty() => buffers[0],
                Ok(_) => {
                    device.destroy_command_pool(command_pool, None);
                    return Err(VKVec3Error::Vulkan("No command buffer returned".to_string()));
                }
                Err(err) => {
                    device.destroy_command_pool(command_pool, None);
                    return Err(err.into());
                }
            };

            let fence_info = vk::FenceCreateInfo {
                s_type: vk::StructureType::FENCE_CREATE_INFO,
                next: ptr::null(),
                flags: vk::FenceCreateFlags::empty(),
            };

            let fence = match device.create_fence(&fence_info, None) {
                Ok(fence) => fence,
                Err(err) => {
                    // freeing the pool frees its command buffers
                    device.destroy_command_pool(command_pool, None);
                    return Err(err.into());
                }
            };

            Ok(Self {
                gpu: Arc::clone(gpu),
                command_pool,
                command_buffer,
                fence,
                state: Mutex::new(QueueState { staging: None }),
            })
        }
    }

    pub fn gpu(&self) -> &Arc<Gpu> {
        &self.gpu
    }

    fn lock_state(&self) -> Result<MutexGuard<'_, QueueState>, VKVec3Error> {
        self.state
            .lock()
            .map_err(|_| VKVec3Error::Transfer("GPU queue state lock poisoned".to_string()))
    }

    fn check_device(&self, memory: &GPUMemory) -> Result<(), VKVec3Error> {
        if memory.belongs_to(&self.gpu) {
            Ok(())
        } else {
            Err(VKVec3Error::Transfer(
                "Buffer was allocated on a different GPU".to_string(),
            ))
        }
    }

    fn staging<'a>(&self, state: &'a mut QueueState) -> Result<&'a GPUMemory, VKVec3Error> {
        if state.staging.is_none() {
            let size = self.gpu.config().staging_bytes;
            let staging = self.gpu.allocate_buffer(
                size,
                vk::BufferUsageFlags::TRANSFER_SRC | vk::BufferUsageFlags::TRANSFER_DST,
                &[vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT],
            )?;

            debug!("Created {} byte staging buffer", size);
            state.staging = Some(staging);
        }

        state
            .staging
            .as_ref()
            .ok_or_else(|| VKVec3Error::Allocation("Staging buffer unavailable".to_string()))
    }

    /// Records one batch of commands, submits it and waits for the fence.
    /// The caller holds the state lock so the command buffer is not shared.
    fn submit_and_wait<F>(&self, _state: &QueueState, record: F) -> Result<(), VKVec3Error>
    where
        F: FnOnce(&Device, vk::CommandBuffer),
    {
        let device = self.gpu.get_device();

        unsafe {
            device
                .reset_command_buffer(self.command_buffer, vk::CommandBufferResetFlags::empty())
                .map_err(transfer_error("Failed to reset command buffer"))?;

            let begin_info = vk::CommandBufferBeginInfo {
                flags: vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT,
                ..Default::default()
            };

            device
                .begin_command_buffer(self.command_buffer, &begin_info)
                .map_err(transfer_error("Failed to begin command buffer"))?;

            record(device, self.command_buffer);

            device
                .end_command_buffer(self.command_buffer)
                .map_err(transfer_error("Failed to end command buffer"))?;

            let submit_info = vk::SubmitInfo {
                s_type: vk::StructureType::SUBMIT_INFO,
                next: ptr::null(),
                wait_semaphore_count: 0,
                wait_semaphores: ptr::null(),
                wait_dst_stage_mask: ptr::null(),
                command_buffer_count: 1,
                command_buffers: &self.command_buffer,
                signal_semaphore_count: 0,
                signal_semaphores: ptr::null(),
            };

            {
                let queue = self.gpu.lock_queue()?;
                device
                    .queue_submit(*queue, &[submit_info], self.fence)
                    .map_err(transfer_error("Failed to submit command buffer"))?;
            }

            device
                .wait_for_fences(&[self.fence], true, u64::MAX)
                .map_err(transfer_error("Failed waiting for fence"))?;
            device
                .reset_fences(&[self.fence])
                .map_err(transfer_error("Failed to reset fence"))?;
        }

        Ok(())
    }

    fn copy_region(
        &self,
        state: &QueueState,
        src: vk::Buffer,
        dst: vk::Buffer,
        region: vk::BufferCopy,
    ) -> Result<(), VKVec3Error> {
        self.submit_and_wait(state, |device, command_buffer| unsafe {
            device.cmd_copy_buffer(command_buffer, src, dst, &[region]);
        })
    }

    /// Like `copy_region`, followed by a barrier making the transfer writes
    /// visible to host reads of `dst`.
    fn copy_region_for_host(
        &self,
        state: &QueueState,
        src: vk::Buffer,
        dst: vk::Buffer,
        region: vk::BufferCopy,
    ) -> Result<(), VKVec3Error> {
        self.submit_and_wait(state, |device, command_buffer| unsafe {
            device.cmd_copy_buffer(command_buffer, src, dst, &[region]);
            device.cmd_pipeline_barrier(
                command_buffer,
                vk::PipelineStageFlags::TRANSFER,
                vk::PipelineStageFlags::HOST,
                vk::DependencyFlags::empty(),
                &[host_read_barrier()],
                &[] as &[vk::BufferMemoryBarrier],
                &[] as &[vk::ImageMemoryBarrier],
            );
        })
    }
}

fn host_read_barrier() -> vk::MemoryBarrier {
    vk::MemoryBarrier {
        s_type: vk::StructureType::MEMORY_BARRIER,
        next: ptr::null(),
        src_access_mask: vk::AccessFlags::TRANSFER_WRITE,
        dst_access_mask: vk::AccessFlags::HOST_READ,
    }
}

/// The 32-bit word `vkCmdFillBuffer` can repeat to produce `pattern` over
/// `offset..offset + size`, if there is one.
fn fill_word(pattern: &[u8], offset: u64, size: u64) -> Option<u32> {
    if pattern.len() < 4 || pattern.len() % 4 != 0 || offset % 4 != 0 || size % 4 != 0 {
        return None;
    }

    let word = &pattern[..4];
    if pattern.chunks_exact(4).any(|chunk| chunk != word) {
        return None;
    }

    Some(u32::from_ne_bytes([word[0], word[1], word[2], word[3]]))
}

impl CommandQueue for GpuQueue {
    type Memory = GPUMemory;

    // Every submission is waited on, so writes block whatever `blocking` says.
    fn write_buffer(
        &self,
        dst: &GPUMemory,
        _blocking: bool,
        offset: u64,
        data: &[u8],
    ) -> Result<(), VKVec3Error> {
        self.check_device(dst)?;
        check_range("Write", offset, data.len() as u64, dst.size)?;

        if data.is_empty() {
            return Ok(());
        }

        if dst.is_host_visible() {
            return dst.copy_into(offset, data);
        }

        let mut state = self.lock_state()?;
        let (staging_handle, chunk_size) = {
            let staging = self.staging(&mut state)?;
            (staging.buffer, staging.size as usize)
        };

        let mut chunk_offset = offset;
        for chunk in data.chunks(chunk_size) {
            self.staging(&mut state)?.copy_into(0, chunk)?;

            let region = vk::BufferCopy {
                src_offset: 0,
                dst_offset: chunk_offset,
                size: chunk.len() as vk::DeviceSize,
            };
            self.copy_region(&state, staging_handle, dst.buffer, region)?;

            chunk_offset += chunk.len() as u64;
        }

        Ok(())
    }

    fn read_buffer(&self, src: &GPUMemory, offset: u64, out: &mut [u8]) -> Result<(), VKVec3Error> {
        self.check_device(src)?;
        check_range("Read", offset, out.len() as u64, src.size)?;

        if out.is_empty() {
            return Ok(());
        }

        if src.is_host_visible() {
            return src.read_into(offset, out);
        }

        let mut state = self.lock_state()?;
        let (staging_handle, chunk_size) = {
            let staging = self.staging(&mut state)?;
            (staging.buffer, staging.size as usize)
        };

        let mut chunk_offset = offset;
        for chunk in out.chunks_mut(chunk_size) {
            let region = vk::BufferCopy {
                src_offset: chunk_offset,
                dst_offset: 0,
                size: chunk.len() as vk::DeviceSize,
            };
            self.copy_region_for_host(&state, src.buffer, staging_handle, region)?;

            self.staging(&mut state)?.read_into(0, chunk)?;

            chunk_offset += chunk.len() as u64;
        }

        Ok(())
    }

    fn copy_buffer(
        &self,
        src: &GPUMemory,
        dst: &GPUMemory,
        src_offset: u64,
        dst_offset: u64,
        size: u64,
    ) -> Result<(), VKVec3Error> {
        self.check_device(src)?;
        self.check_device(dst)?;
        check_range("Copy source", src_offset, size, src.size)?;
        check_range("Copy destination", dst_offset, size, dst.size)?;

        if size == 0 {
            return Ok(());
        }

        let state = self.lock_state()?;
        let region = vk::BufferCopy {
            src_offset,
            dst_offset,
            size,
        };
        self.copy_region(&state, src.buffer, dst.buffer, region)
    }

    /// `vkCmdFillBuffer` writes one 32-bit word, so other patterns report
    /// `CapabilityUnavailable`.
    fn fill_buffer(
        &self,
        dst: &GPUMemory,
        pattern: &[u8],
        offset: u64,
        size: u64,
    ) -> Result<(), VKVec3Error> {
        if !self.gpu.config().native_fill {
            return Err(VKVec3Error::CapabilityUnavailable("fill_buffer"));
        }

        let word = fill_word(pattern, offset, size)
            .ok_or(VKVec3Error::CapabilityUnavailable("fill_buffer pattern"))?;

        self.check_device(dst)?;
        check_range("Fill", offset, size, dst.size)?;

        if size == 0 {
            return Ok(());
        }

        let state = self.lock_state()?;
        self.submit_and_wait(&state, |device, command_buffer| unsafe {
            device.cmd_fill_buffer(command_buffer, dst.buffer, offset, size, word);
        })
    }

    fn finish(&self) -> Result<(), VKVec3Error> {
        let _state = self.lock_state()?;
        let queue = self.gpu.lock_queue()?;

        unsafe { self.gpu.get_device().queue_wait_idle(*queue) }
            .map_err(transfer_error("Failed waiting for queue idle"))
    }
}

impl Drop for GpuQueue {
    fn drop(&mut self) {
        let device = self.gpu.get_device();
        unsafe {
            if let Ok(queue) = self.gpu.lock_queue() {
                let _ = device.queue_wait_idle(*queue);
            }
            device.destroy_fence(self.fence, None);
            device.free_command_buffers(self.command_pool, &[self.command_buffer]);
            device.destroy_command_pool(self.command_pool, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::real::{Double3, Float3};

    #[test]
    fn zero_vectors_fill_with_a_zero_word() {
        let float3 = Float3::default();
        let double3 = Double3::default();

        assert_eq!(fill_word(bytemuck::bytes_of(&float3), 0, 64), Some(0));
        assert_eq!(fill_word(bytemuck::bytes_of(&double3), 0, 128), Some(0));
        assert_eq!(fill_word(bytemuck::bytes_of(&0.0f32), 0, 12), Some(0));
        assert_eq!(fill_word(bytemuck::bytes_of(&0.0f64), 0, 24), Some(0));
    }

    #[test]
    fn repeated_word_is_recovered() {
        let pattern = [0xdeu8, 0xad, 0xbe, 0xef, 0xde, 0xad, 0xbe, 0xef];
        assert_eq!(
            fill_word(&pattern, 4, 16),
            Some(u32::from_ne_bytes([0xde, 0xad, 0xbe, 0xef]))
        );
    }

    #[test]
    fn irregular_patterns_need_the_fallback() {
        let one = Float3 { s: [1.0, 1.0, 1.0, 0.0] };
        assert_eq!(fill_word(bytemuck::bytes_of(&one), 0, 16), None);
        assert_eq!(fill_word(&[1, 2, 3, 4, 5, 6, 7, 8], 0, 8), None);
        assert_eq!(fill_word(&[0, 0], 0, 8), None);
        assert_eq!(fill_word(&[0, 0, 0, 0, 0, 0], 0, 12), None);
    }

    #[test]
    fn unaligned_ranges_need_the_fallback() {
        assert_eq!(fill_word(&[0; 4], 2, 8), None);
        assert_eq!(fill_word(&[0; 4], 0, 6), None);
    }

    #[test]
    fn staging_readback_waits_for_transfer_writes() {
        let barrier = host_read_barrier();
        assert_eq!(barrier.s_type, vk::StructureType::MEMORY_BARRIER);
        assert_eq!(barrier.src_access_mask, vk::AccessFlags::TRANSFER_WRITE);
        assert_eq!(barrier.dst_access_mask, vk::AccessFlags::HOST_READ);
    }
}
