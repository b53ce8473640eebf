//! The process-wide pooled heap.
//!
//! One singleton `SmallObjAllocator`, created in place inside static
//! storage on first use and guarded by a scoped lock around every
//! public call. The lifetime policy is Phoenix (an access after the
//! scheduled teardown transparently rebuilds the pool) except when the
//! crate owns the process heap via the `global-allocator` feature: then
//! the pool must never release chunks that could outlive `main`, so
//! destruction is not scheduled at all.

use std::ptr::NonNull;

use crate::config::PoolConfig;
use crate::pool::SmallObjAllocator;
use crate::singleton::{InPlaceCreation, Lockable, SingletonHolder};

#[cfg(not(feature = "global-allocator"))]
type HeapLifetime = crate::singleton::Phoenix;
#[cfg(feature = "global-allocator")]
type HeapLifetime = crate::singleton::NoDestroy;

/// The singleton pool, sized from [`PoolConfig::from_env`].
pub struct PooledHeap {
    pool: SmallObjAllocator,
}

impl Default for PooledHeap {
    fn default() -> Self {
        PooledHeap {
            pool: SmallObjAllocator::with_config(PoolConfig::from_env()),
        }
    }
}

type HeapHolder = SingletonHolder<PooledHeap, InPlaceCreation, HeapLifetime, Lockable>;

static HEAP: HeapHolder = HeapHolder::new();

/// Allocate `size` bytes from the process-wide heap. `None` means the
/// system heap is exhausted.
pub fn allocate(size: usize) -> Option<NonNull<u8>> {
    // the configured lifetime policies never deny revival
    HEAP.with(|heap| heap.pool.allocate(size)).ok().flatten()
}

/// Return a block to the process-wide heap.
///
/// # Safety
/// `ptr` must come from [`allocate`] with the identical `size` and must
/// not have been deallocated already.
pub unsafe fn deallocate(ptr: NonNull<u8>, size: usize) {
    let _ = HEAP.with(|heap| unsafe { heap.pool.deallocate(ptr, size) });
}

/// Ownership-checked deallocation for callers that cannot prove where a
/// pointer came from. Returns `false`, leaving the pool untouched, when
/// no chunk owns `ptr`.
///
/// # Safety
/// Same contract as [`SmallObjAllocator::deallocate_if_owned`].
#[cfg(feature = "global-allocator")]
pub(crate) unsafe fn deallocate_if_owned(ptr: NonNull<u8>, size: usize) -> bool {
    HEAP.with(|heap| unsafe { heap.pool.deallocate_if_owned(ptr, size) })
        .unwrap_or(false)
}

/// The threshold the process-wide heap routes around.
pub fn max_object_size() -> usize {
    PoolConfig::from_env().max_object_size
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn process_heap_round_trip() {
        let a = allocate(24).expect("system heap exhausted");
        let b = allocate(24).expect("system heap exhausted");
        assert_ne!(a, b);
        unsafe {
            a.as_ptr().write_bytes(0xA5, 24);
            b.as_ptr().write_bytes(0x5A, 24);
            assert_eq!(a.as_ptr().read(), 0xA5);
            assert_eq!(b.as_ptr().read(), 0x5A);
            deallocate(b, 24);
            deallocate(a, 24);
        }
    }

    #[test]
    fn process_heap_serves_large_requests() {
        let big = allocate(1 << 20).expect("system heap exhausted");
        unsafe {
            big.as_ptr().write_bytes(0xEE, 1 << 20);
            deallocate(big, 1 << 20);
        }
    }
}
