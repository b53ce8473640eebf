//! Per-block-size pool of chunks.

use std::ptr::NonNull;

use log::{error, trace};

use crate::chunk::{Chunk, MAX_BLOCKS};

/// A growable ordered collection of chunks that all share one block
/// geometry. Allocation prefers the chunk that last had room;
/// deallocation discovers the owning chunk with a bidirectional search
/// seeded at the chunk that last took a free.
///
/// At most one empty chunk stays resident: the moment a second chunk
/// drains, one of them is released back to the system heap.
pub struct FixedAllocator {
    block_size: usize,
    num_blocks: u8,
    chunks: Vec<Chunk>,
    /// Chunk preferred for the next allocation.
    alloc_chunk: Option<usize>,
    /// Chunk preferred for deallocation; seed of the vicinity search.
    dealloc_chunk: Option<usize>,
}

impl FixedAllocator {
    /// Derive the per-chunk block count from the slab footprint target:
    /// `chunk_size / block_size`, clamped to `[1, 255]`. A block larger
    /// than the target gets a slab of eight blocks instead (clamped the
    /// same way).
    pub fn new(block_size: usize, chunk_size: usize) -> FixedAllocator {
        debug_assert!(block_size >= 1);
        let mut num_blocks = chunk_size / block_size;
        if num_blocks == 0 {
            num_blocks = 8 * block_size;
        }
        let num_blocks = num_blocks.clamp(1, MAX_BLOCKS) as u8;
        FixedAllocator {
            block_size,
            num_blocks,
            chunks: Vec::new(),
            alloc_chunk: None,
            dealloc_chunk: None,
        }
    }

    #[inline]
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    #[inline]
    pub fn num_blocks(&self) -> u8 {
        self.num_blocks
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    pub fn empty_chunk_count(&self) -> usize {
        self.chunks
            .iter()
            .filter(|c| c.is_empty(self.num_blocks))
            .count()
    }

    pub fn free_blocks(&self) -> usize {
        self.chunks.iter().map(Chunk::free_blocks).sum()
    }

    /// Whether any chunk of this allocator owns `ptr`. Linear over the
    /// chunk vector; used when the caller cannot assert ownership.
    pub fn owns(&self, ptr: NonNull<u8>) -> bool {
        let chunk_len = self.chunk_len();
        self.chunks.iter().any(|c| c.contains(ptr, chunk_len))
    }

    /// Hand out one block. Fast path: the cached chunk still has room.
    /// Slow path: scan for a chunk with spare capacity, appending a
    /// freshly initialized chunk when every one is full. Returns `None`
    /// only when the system heap refuses a new chunk buffer.
    pub fn allocate(&mut self) -> Option<NonNull<u8>> {
        let idx = match self.alloc_chunk {
            Some(idx) if !self.chunks[idx].is_full() => idx,
            _ => {
                let idx = match self.chunks.iter().position(|c| !c.is_full()) {
                    Some(idx) => idx,
                    None => self.grow()?,
                };
                self.alloc_chunk = Some(idx);
                idx
            }
        };
        let block = self.chunks[idx].allocate(self.block_size);
        debug_assert!(block.is_some(), "selected chunk had no free block");
        block
    }

    /// Return a block. Locates the owning chunk via the vicinity search,
    /// delegates the free, then applies the empty-chunk release policy.
    ///
    /// # Safety
    /// `ptr` must be a block previously returned by [`Self::allocate`]
    /// on this allocator and not yet deallocated.
    pub unsafe fn deallocate(&mut self, ptr: NonNull<u8>) {
        debug_assert!(!self.chunks.is_empty());
        let idx = self.vicinity_find(ptr);
        self.dealloc_chunk = Some(idx);
        self.do_deallocate(ptr, idx);
    }

    fn chunk_len(&self) -> usize {
        self.block_size * self.num_blocks as usize
    }

    fn grow(&mut self) -> Option<usize> {
        let chunk = Chunk::new(self.block_size, self.num_blocks)?;
        self.chunks.push(chunk);
        trace!(
            "chunk created: block_size={} num_blocks={} chunks={}",
            self.block_size,
            self.num_blocks,
            self.chunks.len()
        );
        self.dealloc_chunk = Some(0);
        Some(self.chunks.len() - 1)
    }

    /// Walk outward from the dealloc cache in both directions at once,
    /// lower side first, until a chunk's buffer covers `ptr`. Locality
    /// of reference makes this typically O(1); a pointer this allocator
    /// never handed out ends in a panic once both walkers run off their
    /// end of the vector.
    fn vicinity_find(&self, ptr: NonNull<u8>) -> usize {
        debug_assert!(!self.chunks.is_empty());
        let chunk_len = self.chunk_len();
        let start = self.dealloc_chunk.unwrap_or(0);
        let mut lo = Some(start);
        let mut hi = if start + 1 < self.chunks.len() {
            Some(start + 1)
        } else {
            None
        };

        while lo.is_some() || hi.is_some() {
            if let Some(i) = lo {
                if self.chunks[i].contains(ptr, chunk_len) {
                    return i;
                }
                lo = i.checked_sub(1);
            }
            if let Some(i) = hi {
                if self.chunks[i].contains(ptr, chunk_len) {
                    return i;
                }
                hi = if i + 1 < self.chunks.len() {
                    Some(i + 1)
                } else {
                    None
                };
            }
        }
        error!(
            "deallocate of foreign pointer {:p} (block_size={})",
            ptr, self.block_size
        );
        panic!("deallocate: pointer was not allocated by this allocator");
    }

    /// # Safety
    /// `idx` must be the chunk owning `ptr`.
    unsafe fn do_deallocate(&mut self, ptr: NonNull<u8>, idx: usize) {
        self.chunks[idx].deallocate(ptr, self.block_size);

        if !self.chunks[idx].is_empty(self.num_blocks) {
            return;
        }

        // The owning chunk just drained; decide whether a chunk can go
        // back to the system heap. Invariant: at most one empty chunk
        // stays resident.
        let last = self.chunks.len() - 1;
        if idx == last {
            if idx > 0 && self.chunks[idx - 1].is_empty(self.num_blocks) {
                // Two trailing empty chunks: drop the tail one.
                self.release_last();
                self.alloc_chunk = Some(0);
                self.dealloc_chunk = Some(0);
            }
        } else if self.chunks[last].is_empty(self.num_blocks) {
            // An empty chunk already sits at the tail: release it and
            // keep the freshly drained one.
            self.release_last();
            self.alloc_chunk = Some(idx);
        } else {
            // Move the empty chunk to the tail so allocation scans stay
            // short, and prefer it for the next allocation.
            self.chunks.swap(idx, last);
            self.alloc_chunk = Some(last);
        }
    }

    fn release_last(&mut self) {
        if let Some(mut chunk) = self.chunks.pop() {
            chunk.release(self.block_size, self.num_blocks);
            trace!(
                "chunk released: block_size={} chunks={}",
                self.block_size,
                self.chunks.len()
            );
        }
    }
}

impl Drop for FixedAllocator {
    fn drop(&mut self) {
        for chunk in &mut self.chunks {
            debug_assert!(
                chunk.is_empty(self.num_blocks),
                "dropping a FixedAllocator with live blocks of size {}",
                self.block_size
            );
            chunk.release(self.block_size, self.num_blocks);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_count_derivation() {
        // 4096 / 16 = 256, clamped to the one-byte ceiling
        assert_eq!(FixedAllocator::new(16, 4096).num_blocks(), 255);
        // exact fit
        assert_eq!(FixedAllocator::new(4096, 4096).num_blocks(), 1);
        // truncation to zero: eight blocks instead, clamped
        assert_eq!(FixedAllocator::new(8192, 4096).num_blocks(), 255);
        assert_eq!(FixedAllocator::new(10, 4096).num_blocks(), 255);
        assert_eq!(FixedAllocator::new(100, 4096).num_blocks(), 40);
        // runtime chunk size flows through
        assert_eq!(FixedAllocator::new(3, 100).num_blocks(), 33);
    }

    #[test]
    fn allocate_spills_into_a_second_chunk() {
        let mut fixed = FixedAllocator::new(32, 1024); // 32 blocks per chunk
        let blocks: Vec<_> = (0..40).map(|_| fixed.allocate().unwrap()).collect();
        assert_eq!(fixed.chunk_count(), 2);
        for block in blocks.into_iter().rev() {
            unsafe { fixed.deallocate(block) };
        }
        assert_eq!(fixed.chunk_count(), 1);
        assert_eq!(fixed.free_blocks(), 32);
    }

    #[test]
    fn reverse_drain_leaves_one_empty_chunk() {
        let mut fixed = FixedAllocator::new(8, 64); // 8 blocks per chunk
        let blocks: Vec<_> = (0..64).map(|_| fixed.allocate().unwrap()).collect();
        assert_eq!(fixed.chunk_count(), 8);
        for block in blocks.into_iter().rev() {
            unsafe { fixed.deallocate(block) };
        }
        assert_eq!(fixed.empty_chunk_count(), 1);
        assert_eq!(fixed.chunk_count(), 1);
    }

    #[test]
    fn hysteresis_keeps_one_chunk_on_alternation() {
        let mut fixed = FixedAllocator::new(16, 32); // 2 blocks per chunk
        let a = fixed.allocate().unwrap();
        let b = fixed.allocate().unwrap();
        let c = fixed.allocate().unwrap(); // second chunk
        assert_eq!(fixed.chunk_count(), 2);

        // drain the second chunk; the first is still live, so the empty
        // one is retained
        unsafe { fixed.deallocate(c) };
        assert_eq!(fixed.chunk_count(), 2);
        assert_eq!(fixed.empty_chunk_count(), 1);

        // an allocation reuses the retained chunk instead of growing
        let c2 = fixed.allocate().unwrap();
        assert_eq!(fixed.chunk_count(), 2);

        unsafe {
            fixed.deallocate(a);
            fixed.deallocate(b);
            fixed.deallocate(c2);
        }
        assert_eq!(fixed.chunk_count(), 1);
    }

    #[test]
    fn vicinity_search_finds_far_chunks() {
        let mut fixed = FixedAllocator::new(8, 32); // 4 blocks per chunk
        let blocks: Vec<_> = (0..20).map(|_| fixed.allocate().unwrap()).collect();
        assert_eq!(fixed.chunk_count(), 5);

        // free one block from each chunk, jumping across the vector so
        // every search starts far from its target
        for &i in &[2, 18, 6, 14, 10] {
            unsafe { fixed.deallocate(blocks[i]) };
        }
        assert_eq!(fixed.free_blocks(), 5);

        for (i, block) in blocks.into_iter().enumerate() {
            if ![2, 18, 6, 14, 10].contains(&i) {
                unsafe { fixed.deallocate(block) };
            }
        }
        // fully drained: every resident chunk is empty
        assert_eq!(fixed.empty_chunk_count(), fixed.chunk_count());
    }

    #[test]
    #[should_panic(expected = "not allocated by this allocator")]
    fn foreign_pointer_panics() {
        let mut fixed = FixedAllocator::new(8, 64);
        let block = fixed.allocate().unwrap();
        unsafe { fixed.deallocate(block) };
        let mut foreign = 0u8;
        unsafe { fixed.deallocate(NonNull::from(&mut foreign)) };
    }
}
