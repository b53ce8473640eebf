//! The sorted pool of fixed allocators and the small/large routing.

use std::ptr::NonNull;

use log::debug;

use crate::config::PoolConfig;
use crate::fixed::FixedAllocator;
use crate::system;

/// Routes a request of size `s` to the fixed allocator whose block size
/// is exactly `s`, creating one on first sight, or to the system heap
/// when `s` exceeds the small-object threshold.
///
/// The pool is kept sorted by block size so lookups are a binary
/// search; last-used caches turn bursty same-size traffic into a single
/// comparison. Once a fixed allocator enters the pool it is never
/// removed; its chunks come and go underneath it.
pub struct SmallObjAllocator {
    pool: Vec<FixedAllocator>,
    /// Pool index that served the last allocation.
    last_alloc: Option<usize>,
    /// Pool index that served the last deallocation.
    last_dealloc: Option<usize>,
    chunk_size: usize,
    max_object_size: usize,
}

impl SmallObjAllocator {
    /// `chunk_size` is the slab footprint target handed to every fixed
    /// allocator; `max_object_size` is the threshold above which the
    /// system heap serves the request directly.
    pub fn new(chunk_size: usize, max_object_size: usize) -> SmallObjAllocator {
        SmallObjAllocator {
            pool: Vec::new(),
            last_alloc: None,
            last_dealloc: None,
            chunk_size,
            max_object_size,
        }
    }

    pub fn with_config(config: PoolConfig) -> SmallObjAllocator {
        SmallObjAllocator::new(config.chunk_size, config.max_object_size)
    }

    #[inline]
    pub fn max_object_size(&self) -> usize {
        self.max_object_size
    }

    #[inline]
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Number of distinct block sizes the pool has seen.
    pub fn pool_len(&self) -> usize {
        self.pool.len()
    }

    /// Block sizes in pool order (ascending by construction).
    pub fn block_sizes(&self) -> impl Iterator<Item = usize> + '_ {
        self.pool.iter().map(FixedAllocator::block_size)
    }

    /// The fixed allocator serving `size`, if one exists yet.
    pub fn fixed_for(&self, size: usize) -> Option<&FixedAllocator> {
        let idx = self.lower_bound(size);
        self.pool
            .get(idx)
            .filter(|fixed| fixed.block_size() == size)
    }

    /// Allocate `size` bytes. Sizes above the threshold go straight to
    /// the system heap; everything else is served by the matching fixed
    /// allocator. Returns `None` only when the system heap is
    /// exhausted.
    pub fn allocate(&mut self, size: usize) -> Option<NonNull<u8>> {
        let size = size.max(1);
        if size > self.max_object_size {
            return system::alloc_large(size);
        }

        if let Some(idx) = self.last_alloc {
            if self.pool[idx].block_size() == size {
                return self.pool[idx].allocate();
            }
        }

        let idx = self.lower_bound(size);
        if idx == self.pool.len() || self.pool[idx].block_size() != size {
            debug!(
                "pool grows: block_size={} entries={}",
                size,
                self.pool.len() + 1
            );
            self.pool
                .insert(idx, FixedAllocator::new(size, self.chunk_size));
            // The insertion shifted every entry from `idx` on; re-seed
            // the dealloc cache rather than chase the old position.
            self.last_dealloc = Some(0);
        }
        self.last_alloc = Some(idx);
        self.pool[idx].allocate()
    }

    /// Return a block obtained from [`Self::allocate`] with the same
    /// `size`.
    ///
    /// # Safety
    /// `ptr` must come from `allocate(size)` on this allocator with the
    /// identical `size`, and must not have been deallocated already.
    pub unsafe fn deallocate(&mut self, ptr: NonNull<u8>, size: usize) {
        let size = size.max(1);
        if size > self.max_object_size {
            return system::dealloc_large(ptr, size);
        }

        if let Some(idx) = self.last_dealloc {
            if self.pool[idx].block_size() == size {
                return self.pool[idx].deallocate(ptr);
            }
        }

        let idx = self.lower_bound(size);
        debug_assert!(
            idx < self.pool.len(),
            "deallocate of size {} never allocated",
            size
        );
        debug_assert_eq!(
            self.pool[idx].block_size(),
            size,
            "deallocate size does not match any pool entry"
        );
        self.last_dealloc = Some(idx);
        self.pool[idx].deallocate(ptr);
    }

    /// Like [`Self::deallocate`], but verifies ownership first and
    /// reports a miss instead of treating it as misuse. Used by callers
    /// that cannot prove where a pointer came from (the global-allocator
    /// adapter); a miss leaves the pool untouched.
    ///
    /// # Safety
    /// If any chunk of the `size`-class allocator covers `ptr`, then
    /// `ptr` must be a live block allocated with this `size`.
    pub unsafe fn deallocate_if_owned(&mut self, ptr: NonNull<u8>, size: usize) -> bool {
        let size = size.max(1);
        if size > self.max_object_size {
            return false;
        }
        let idx = self.lower_bound(size);
        match self.pool.get(idx) {
            Some(fixed) if fixed.block_size() == size && fixed.owns(ptr) => {
                self.last_dealloc = Some(idx);
                self.pool[idx].deallocate(ptr);
                true
            }
            _ => false,
        }
    }

    /// First pool index whose block size is not less than `size`.
    #[inline]
    fn lower_bound(&self, size: usize) -> usize {
        self.pool
            .partition_point(|fixed| fixed.block_size() < size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_stays_sorted_under_out_of_order_sizes() {
        let mut pool = SmallObjAllocator::new(4096, 64);
        let a = pool.allocate(8).unwrap();
        let b = pool.allocate(24).unwrap();
        let c = pool.allocate(16).unwrap();
        assert_eq!(pool.block_sizes().collect::<Vec<_>>(), vec![8, 16, 24]);
        unsafe {
            pool.deallocate(a, 8);
            pool.deallocate(b, 24);
            pool.deallocate(c, 16);
        }
        // entries survive a full drain
        assert_eq!(pool.pool_len(), 3);
    }

    #[test]
    fn large_requests_bypass_the_pool() {
        let mut pool = SmallObjAllocator::new(4096, 64);
        let big = pool.allocate(1024).unwrap();
        assert_eq!(pool.pool_len(), 0);
        unsafe { pool.deallocate(big, 1024) };
        assert_eq!(pool.pool_len(), 0);
    }

    #[test]
    fn threshold_boundary_sizes() {
        let mut pool = SmallObjAllocator::new(4096, 64);
        let at = pool.allocate(64).unwrap();
        assert_eq!(pool.pool_len(), 1);
        let over = pool.allocate(65).unwrap();
        assert_eq!(pool.pool_len(), 1);
        unsafe {
            pool.deallocate(at, 64);
            pool.deallocate(over, 65);
        }
    }

    #[test]
    fn same_size_traffic_reuses_the_cached_entry() {
        let mut pool = SmallObjAllocator::new(4096, 64);
        let blocks: Vec<_> = (0..32).map(|_| pool.allocate(48).unwrap()).collect();
        assert_eq!(pool.pool_len(), 1);
        assert_eq!(pool.fixed_for(48).unwrap().chunk_count(), 1);
        for block in blocks.into_iter().rev() {
            unsafe { pool.deallocate(block, 48) };
        }
    }

    #[test]
    fn zero_sized_requests_are_clamped() {
        let mut pool = SmallObjAllocator::new(4096, 64);
        let p = pool.allocate(0).unwrap();
        assert_eq!(pool.block_sizes().collect::<Vec<_>>(), vec![1]);
        unsafe { pool.deallocate(p, 0) };
    }

    #[test]
    fn deallocate_if_owned_rejects_foreign_pointers() {
        let mut pool = SmallObjAllocator::new(4096, 64);
        let p = pool.allocate(16).unwrap();
        let mut foreign = 0u8;
        unsafe {
            assert!(!pool.deallocate_if_owned(NonNull::from(&mut foreign), 16));
            // wrong size class sees a different allocator: also a miss
            assert!(!pool.deallocate_if_owned(p, 32));
            assert!(pool.deallocate_if_owned(p, 16));
        }
    }

    #[test]
    fn distinct_sizes_hand_out_disjoint_blocks() {
        let mut pool = SmallObjAllocator::new(4096, 64);
        let mut spans: Vec<(usize, usize)> = Vec::new();
        for size in [8usize, 16, 24, 40, 64] {
            for _ in 0..20 {
                let p = pool.allocate(size).unwrap();
                spans.push((p.as_ptr() as usize, size));
            }
        }
        spans.sort_unstable();
        for pair in spans.windows(2) {
            assert!(
                pair[0].0 + pair[0].1 <= pair[1].0,
                "blocks overlap: {:#x}+{} and {:#x}",
                pair[0].0,
                pair[0].1,
                pair[1].0
            );
        }
        for (addr, size) in spans {
            unsafe { pool.deallocate(NonNull::new(addr as *mut u8).unwrap(), size) };
        }
    }
}
