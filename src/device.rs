//! What a buffer needs from the execution context and command queue it runs on.

use crate::error::VKVec3Error;

bitflags::bitflags! {
    /// Allocation hints passed through to the backend.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct MemFlags: u32 {
        /// Kernels read and write the buffer
        const READ_WRITE = 1 << 0;
        /// Kernels only read the buffer
        const READ_ONLY = 1 << 1;
        /// Kernels only write the buffer
        const WRITE_ONLY = 1 << 2;
        /// Back the buffer with memory the host can map directly
        const HOST_VISIBLE = 1 << 3;
    }
}

impl Default for MemFlags {
    fn default() -> Self {
        MemFlags::READ_WRITE
    }
}

/// One block of device memory. Dropping it frees the allocation.
pub trait DeviceMemory {
    /// Size in bytes the allocation was requested with.
    fn size(&self) -> u64;
}

pub trait DeviceContext {
    type Memory: DeviceMemory;

    fn create_buffer(&self, flags: MemFlags, size: u64) -> Result<Self::Memory, VKVec3Error>;
}

/// Ordered submission channel to the device.
///
/// Reads are always blocking. Writes may be enqueued without blocking, in which
/// case the data has been consumed once `finish` returns.
pub trait CommandQueue {
    type Memory: DeviceMemory;

    fn write_buffer(
        &self,
        dst: &Self::Memory,
        blocking: bool,
        offset: u64,
        data: &[u8],
    ) -> Result<(), VKVec3Error>;

    fn read_buffer(&self, src: &Self::Memory, offset: u64, out: &mut [u8])
    -> Result<(), VKVec3Error>;

    fn copy_buffer(
        &self,
        src: &Self::Memory,
        dst: &Self::Memory,
        src_offset: u64,
        dst_offset: u64,
        size: u64,
    ) -> Result<(), VKVec3Error>;

    /// Repeats `pattern` over `size` bytes of `dst` starting at `offset`.
    /// Queues without a native fill keep the default.
    fn fill_buffer(
        &self,
        _dst: &Self::Memory,
        _pattern: &[u8],
        _offset: u64,
        _size: u64,
    ) -> Result<(), VKVec3Error> {
        Err(VKVec3Error::CapabilityUnavailable("fill_buffer"))
    }

    /// Blocks until everything previously submitted has completed.
    fn finish(&self) -> Result<(), VKVec3Error>;
}

/// Checks `offset + len` stays inside an allocation of `size` bytes.
pub(crate) fn check_range(what: &str, offset: u64, len: u64, size: u64) -> Result<(), VKVec3Error> {
    match offset.checked_add(len) {
        Some(end) if end <= size => Ok(()),
        _ => Err(VKVec3Error::Transfer(format!(
            "{} of {} bytes at offset {} exceeds buffer size {}",
            what, len, offset, size
        ))),
    }
}
