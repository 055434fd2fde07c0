//! Allocation accounting.
//!
//! The crate installs [`CountingAllocator`] as the global allocator. It
//! forwards to mimalloc and keeps process-wide running totals of allocation
//! calls and requested bytes, which the bencher samples around measured
//! regions.

use std::alloc::{GlobalAlloc, Layout};
use std::sync::atomic::{AtomicU64, Ordering};

/// Global allocator that counts allocations before delegating.
pub struct CountingAllocator<A> {
    inner: A,
    allocs: AtomicU64,
    bytes: AtomicU64,
}

impl<A> CountingAllocator<A> {
    pub const fn new(inner: A) -> Self {
        Self {
            inner,
            allocs: AtomicU64::new(0),
            bytes: AtomicU64::new(0),
        }
    }

    /// Current totals.
    pub fn snapshot(&self) -> AllocSnapshot {
        AllocSnapshot {
            allocs: self.allocs.load(Ordering::Relaxed),
            bytes: self.bytes.load(Ordering::Relaxed),
        }
    }

    #[inline]
    fn record(&self, size: usize) {
        self.allocs.fetch_add(1, Ordering::Relaxed);
        self.bytes.fetch_add(size as u64, Ordering::Relaxed);
    }
}

// SAFETY: every call is forwarded unchanged to the wrapped allocator.
unsafe impl<A: GlobalAlloc> GlobalAlloc for CountingAllocator<A> {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        self.record(layout.size());
        self.inner.alloc(layout)
    }

    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        self.record(layout.size());
        self.inner.alloc_zeroed(layout)
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        self.inner.dealloc(ptr, layout)
    }

    // A growing realloc counts as a fresh allocation of the new size.
    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        self.record(new_size);
        self.inner.realloc(ptr, layout, new_size)
    }
}

/// Point-in-time allocation totals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AllocSnapshot {
    pub allocs: u64,
    pub bytes: u64,
}

impl AllocSnapshot {
    /// Totals accumulated since `earlier`.
    pub fn since(self, earlier: AllocSnapshot) -> AllocSnapshot {
        AllocSnapshot {
            allocs: self.allocs.saturating_sub(earlier.allocs),
            bytes: self.bytes.saturating_sub(earlier.bytes),
        }
    }
}

#[global_allocator]
static GLOBAL: CountingAllocator<mimalloc::MiMalloc> = CountingAllocator::new(mimalloc::MiMalloc);

/// Read the global allocator's totals.
pub fn snapshot() -> AllocSnapshot {
    GLOBAL.snapshot()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_allocations() {
        let before = snapshot();
        let data: Vec<u64> = std::hint::black_box(Vec::with_capacity(1024));
        let delta = snapshot().since(before);
        drop(data);

        // Other test threads allocate too, so only a lower bound holds.
        assert!(delta.allocs >= 1);
        assert!(delta.bytes >= 1024 * 8);
    }

    #[test]
    fn test_since_saturates() {
        let later = AllocSnapshot { allocs: 1, bytes: 10 };
        let earlier = AllocSnapshot { allocs: 5, bytes: 50 };
        assert_eq!(later.since(earlier), AllocSnapshot::default());
    }
}
