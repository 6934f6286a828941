use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::VKVec3Error;

pub struct MemoryTracker {
    maximum: u64,
    current: AtomicU64,
}

// Reservations go through a single compare-exchange, so a failed allocation
// never leaves the counter above the maximum.

impl MemoryTracker {
    pub fn new(maximum: u64) -> Self {
        Self {
            maximum,
            current: AtomicU64::new(0),
        }
    }

    pub fn unlimited() -> Self {
        Self::new(u64::MAX)
    }

    pub fn allocate(&self, size: u64) -> Result<(), VKVec3Error> {
        self.current
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |prev| {
                prev.checked_add(size).filter(|&new| new <= self.maximum)
            })
            .map(|_| ())
            .map_err(|prev| {
                VKVec3Error::Allocation(format!(
                    "Memory limit exceeded: tried to allocate {} bytes when {} of {} bytes are used",
                    size, prev, self.maximum
                ))
            })
    }

    pub fn deallocate(&self, size: u64) {
        self.current.fetch_sub(size, Ordering::AcqRel);
    }

    pub fn get_current(&self) -> u64 {
        self.current.load(Ordering::Acquire)
    }

    pub fn get_available(&self) -> u64 {
        self.maximum - self.get_current()
    }

    pub fn get_maximum(&self) -> u64 {
        self.maximum
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracks_allocations_and_releases() {
        let tracker = MemoryTracker::new(100);
        tracker.allocate(60).unwrap();
        assert_eq!(tracker.get_current(), 60);
        assert_eq!(tracker.get_available(), 40);

        tracker.deallocate(60);
        assert_eq!(tracker.get_current(), 0);
        assert_eq!(tracker.get_maximum(), 100);
    }

    #[test]
    fn over_limit_fails_without_reserving() {
        let tracker = MemoryTracker::new(100);
        tracker.allocate(80).unwrap();

        let err = tracker.allocate(21).unwrap_err();
        assert!(matches!(err, VKVec3Error::Allocation(_)));
        assert_eq!(tracker.get_current(), 80);

        tracker.allocate(20).unwrap();
        assert_eq!(tracker.get_available(), 0);
    }

    #[test]
    fn overflow_is_an_allocation_error() {
        let tracker = MemoryTracker::unlimited();
        tracker.allocate(u64::MAX - 1).unwrap();
        assert!(tracker.allocate(2).is_err());
    }
}
