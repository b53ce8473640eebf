//! System-heap entry points.
//!
//! Every byte the pool manages comes from here: chunk buffers for the
//! small path and whole objects for the large path. Layout construction
//! lives in one place so allocation and deallocation cannot disagree.

use std::alloc::{self, Layout};
use std::ptr::NonNull;

/// Alignment requested for chunk buffers and large objects. Matches what
/// the system malloc guarantees for any size (max_align_t on 64-bit).
pub const SYSTEM_ALIGN: usize = 16;

#[inline]
fn chunk_layout(block_size: usize, num_blocks: usize) -> Option<Layout> {
    let size = block_size.checked_mul(num_blocks)?;
    Layout::from_size_align(size, SYSTEM_ALIGN).ok()
}

/// Allocate a chunk buffer of `block_size * num_blocks` bytes.
/// Returns `None` when the system heap is exhausted.
pub fn alloc_chunk(block_size: usize, num_blocks: usize) -> Option<NonNull<u8>> {
    debug_assert!(block_size >= 1 && num_blocks >= 1);
    let layout = chunk_layout(block_size, num_blocks)?;
    // SAFETY: the layout has non-zero size (both factors are >= 1).
    NonNull::new(unsafe { alloc::alloc(layout) })
}

/// Return a chunk buffer to the system heap.
///
/// # Safety
/// `ptr` must come from a successful `alloc_chunk(block_size, num_blocks)`
/// call with the same geometry, and must not be used afterwards.
pub unsafe fn dealloc_chunk(ptr: NonNull<u8>, block_size: usize, num_blocks: usize) {
    let layout = Layout::from_size_align_unchecked(block_size * num_blocks, SYSTEM_ALIGN);
    alloc::dealloc(ptr.as_ptr(), layout);
}

/// Large-path allocation: objects above the small-object threshold go to
/// the system heap directly and never touch the pool.
pub fn alloc_large(size: usize) -> Option<NonNull<u8>> {
    debug_assert!(size >= 1);
    let layout = Layout::from_size_align(size, SYSTEM_ALIGN).ok()?;
    // SAFETY: non-zero size checked above.
    NonNull::new(unsafe { alloc::alloc(layout) })
}

/// Large-path deallocation.
///
/// # Safety
/// `ptr` must come from `alloc_large(size)` with the same `size`, and
/// must not be used afterwards.
pub unsafe fn dealloc_large(ptr: NonNull<u8>, size: usize) {
    let layout = Layout::from_size_align_unchecked(size, SYSTEM_ALIGN);
    alloc::dealloc(ptr.as_ptr(), layout);
}
