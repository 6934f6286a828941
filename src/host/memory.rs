use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::{
    device::{DeviceMemory, MemFlags},
    error::VKVec3Error,
    memory_tracker::MemoryTracker,
};

pub struct HostMemory {
    data: RwLock<Vec<u8>>,
    size: u64,
    flags: MemFlags,
    tracker: Arc<MemoryTracker>,
}

impl HostMemory {
    /// Reserves `size` bytes from `tracker` and allocates them zeroed.
    pub(super) fn new(
        size: u64,
        flags: MemFlags,
        tracker: Arc<MemoryTracker>,
    ) -> Result<Self, VKVec3Error> {
        let len = usize::try_from(size).map_err(|_| {
            VKVec3Error::Allocation(format!("{} bytes exceed the host address space", size))
        })?;

        tracker.allocate(size)?;

        let mut data = Vec::new();
        if let Err(err) = data.try_reserve_exact(len) {
            tracker.deallocate(size);
            return Err(VKVec3Error::Allocation(format!(
                "Host allocation of {} bytes failed: {}",
                size, err
            )));
        }
        data.resize(len, 0u8);

        Ok(Self {
            data: RwLock::new(data),
            size,
            flags,
            tracker,
        })
    }

    pub fn flags(&self) -> MemFlags {
        self.flags
    }

    pub(super) fn read_data(&self) -> Result<RwLockReadGuard<'_, Vec<u8>>, VKVec3Error> {
        self.data
            .read()
            .map_err(|_| VKVec3Error::Transfer("Host buffer lock poisoned".to_string()))
    }

    pub(super) fn write_data(&self) -> Result<RwLockWriteGuard<'_, Vec<u8>>, VKVec3Error> {
        self.data
            .write()
            .map_err(|_| VKVec3Error::Transfer("Host buffer lock poisoned".to_string()))
    }
}

impl DeviceMemory for HostMemory {
    fn size(&self) -> u64 {
        self.size
    }
}

impl Drop for HostMemory {
    fn drop(&mut self) {
        self.tracker.deallocate(self.size);
    }
}

impl std::fmt::Debug for HostMemory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostMemory")
            .field("size", &self.size)
            .field("flags", &self.flags)
            .finish()
    }
}
