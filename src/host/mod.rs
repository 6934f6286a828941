//! Device memory kept in host RAM, for machines without a usable Vulkan driver.

mod memory;
mod queue;

pub use memory::HostMemory;
pub use queue::{HostQueue, QueueStats};

use std::sync::Arc;

use log::debug;

use crate::{
    device::{DeviceContext, MemFlags},
    error::VKVec3Error,
    memory_tracker::MemoryTracker,
};

pub struct HostContext {
    memory_tracker: Arc<MemoryTracker>,
}

impl HostContext {
    /// Budget of 60% of system RAM, or unlimited if it cannot be queried.
    pub fn new() -> Self {
        let tracker = match sys_info::mem_info() {
            Ok(info) => MemoryTracker::new((info.total as f64 * 1024.0 * 0.6) as u64),
            Err(err) => {
                debug!("Could not read system memory ({}), host budget unlimited", err);
                MemoryTracker::unlimited()
            }
        };

        debug!("Host memory budget {} bytes", tracker.get_maximum());

        Self {
            memory_tracker: Arc::new(tracker),
        }
    }

    pub fn with_limit(bytes: u64) -> Self {
        Self {
            memory_tracker: Arc::new(MemoryTracker::new(bytes)),
        }
    }

    pub fn unlimited() -> Self {
        Self {
            memory_tracker: Arc::new(MemoryTracker::unlimited()),
        }
    }

    pub fn allocated_bytes(&self) -> u64 {
        self.memory_tracker.get_current()
    }

    pub fn available_memory(&self) -> u64 {
        self.memory_tracker.get_available()
    }

    pub fn memory_limit(&self) -> u64 {
        self.memory_tracker.get_maximum()
    }
}

impl Default for HostContext {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceContext for HostContext {
    type Memory = HostMemory;

    fn create_buffer(&self, flags: MemFlags, size: u64) -> Result<HostMemory, VKVec3Error> {
        HostMemory::new(size, flags, Arc::clone(&self.memory_tracker))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DeviceMemory;

    #[test]
    fn dropping_memory_returns_budget() {
        let ctx = HostContext::with_limit(64);
        let mem = ctx.create_buffer(MemFlags::READ_ONLY, 48).unwrap();
        assert_eq!(mem.size(), 48);
        assert_eq!(mem.flags(), MemFlags::READ_ONLY);
        assert_eq!(ctx.allocated_bytes(), 48);

        assert!(matches!(
            ctx.create_buffer(MemFlags::READ_WRITE, 32),
            Err(VKVec3Error::Allocation(_))
        ));

        drop(mem);
        assert_eq!(ctx.available_memory(), 64);
    }

    #[test]
    fn unreservable_size_is_an_allocation_error() {
        let ctx = HostContext::unlimited();

        assert!(matches!(
            ctx.create_buffer(MemFlags::READ_WRITE, u64::MAX),
            Err(VKVec3Error::Allocation(_))
        ));
        assert_eq!(ctx.allocated_bytes(), 0);
    }

    #[test]
    fn budget_is_reported() {
        let ctx = HostContext::with_limit(1024);
        assert_eq!(ctx.memory_limit(), 1024);
        assert_eq!(ctx.available_memory(), 1024);
    }
}
