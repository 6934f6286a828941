use std::sync::atomic::{AtomicUsize, Ordering};

use crate::{
    device::{CommandQueue, DeviceMemory, check_range},
    error::VKVec3Error,
};

use super::memory::HostMemory;

/// Commands a [`HostQueue`] has executed, by kind.
#[derive(Default, Debug)]
pub struct QueueStats {
    writes: AtomicUsize,
    reads: AtomicUsize,
    copies: AtomicUsize,
    fills: AtomicUsize,
    finishes: AtomicUsize,
}

impl QueueStats {
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::Relaxed)
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::Relaxed)
    }

    pub fn copies(&self) -> usize {
        self.copies.load(Ordering::Relaxed)
    }

    pub fn fills(&self) -> usize {
        self.fills.load(Ordering::Relaxed)
    }

    pub fn finishes(&self) -> usize {
        self.finishes.load(Ordering::Relaxed)
    }

    fn bump(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Executes every command immediately on host memory.
pub struct HostQueue {
    native_fill: bool,
    stats: QueueStats,
}

impl HostQueue {
    pub fn new() -> Self {
        Self {
            native_fill: true,
            stats: QueueStats::default(),
        }
    }

    /// A queue without a fill primitive, like an OpenCL 1.1 runtime.
    pub fn without_fill() -> Self {
        Self {
            native_fill: false,
            stats: QueueStats::default(),
        }
    }

    pub fn supports_fill(&self) -> bool {
        self.native_fill
    }

    pub fn stats(&self) -> &QueueStats {
        &self.stats
    }
}

impl Default for HostQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandQueue for HostQueue {
    type Memory = HostMemory;

    fn write_buffer(
        &self,
        dst: &HostMemory,
        _blocking: bool,
        offset: u64,
        data: &[u8],
    ) -> Result<(), VKVec3Error> {
        check_range("Write", offset, data.len() as u64, dst.size())?;

        let mut guard = dst.write_data()?;
        let start = offset as usize;
        guard[start..start + data.len()].copy_from_slice(data);

        QueueStats::bump(&self.stats.writes);
        Ok(())
    }

    fn read_buffer(&self, src: &HostMemory, offset: u64, out: &mut [u8]) -> Result<(), VKVec3Error> {
        check_range("Read", offset, out.len() as u64, src.size())?;

        let guard = src.read_data()?;
        let start = offset as usize;
        out.copy_from_slice(&guard[start..start + out.len()]);

        QueueStats::bump(&self.stats.reads);
        Ok(())
    }

    fn copy_buffer(
        &self,
        src: &HostMemory,
        dst: &HostMemory,
        src_offset: u64,
        dst_offset: u64,
        size: u64,
    ) -> Result<(), VKVec3Error> {
        check_range("Copy source", src_offset, size, src.size())?;
        check_range("Copy destination", dst_offset, size, dst.size())?;

        let (src_start, dst_start, len) = (src_offset as usize, dst_offset as usize, size as usize);

        // taking both locks on the same buffer would deadlock
        if std::ptr::eq(src, dst) {
            let mut guard = dst.write_data()?;
            guard.copy_within(src_start..src_start + len, dst_start);
        } else {
            let src_guard = src.read_data()?;
            let mut dst_guard = dst.write_data()?;
            dst_guard[dst_start..dst_start + len]
                .copy_from_slice(&src_guard[src_start..src_start + len]);
        }

        QueueStats::bump(&self.stats.copies);
        Ok(())
    }

    fn fill_buffer(
        &self,
        dst: &HostMemory,
        pattern: &[u8],
        offset: u64,
        size: u64,
    ) -> Result<(), VKVec3Error> {
        if !self.native_fill {
            return Err(VKVec3Error::CapabilityUnavailable("fill_buffer"));
        }

        if pattern.is_empty() || size % pattern.len() as u64 != 0 {
            return Err(VKVec3Error::Transfer(format!(
                "Fill size {} is not a multiple of the {} byte pattern",
                size,
                pattern.len()
            )));
        }
        check_range("Fill", offset, size, dst.size())?;

        let mut guard = dst.write_data()?;
        let start = offset as usize;
        for chunk in guard[start..start + size as usize].chunks_exact_mut(pattern.len()) {
            chunk.copy_from_slice(pattern);
        }

        QueueStats::bump(&self.stats.fills);
        Ok(())
    }

    fn finish(&self) -> Result<(), VKVec3Error> {
        QueueStats::bump(&self.stats.finishes);
        Ok(())
    }
}
