//! `#[global_allocator]` support.
//!
//! ```rust,ignore
//! use smallpool::SmallPool;
//!
//! #[global_allocator]
//! static GLOBAL: SmallPool = SmallPool;
//! ```
//!
//! Small, pool-shaped layouts go through the process-wide heap; large
//! or over-aligned layouts and reentrant calls go to
//! [`std::alloc::System`]. Deallocation re-derives the same routing
//! from the layout, with an ownership check covering the one case the
//! layout cannot decide (a pool-shaped allocation that was served by
//! the system because it happened while the pool lock was held on this
//! thread).

use core::alloc::{GlobalAlloc, Layout};
use std::alloc::System;
use std::cell::Cell;
use std::ptr::{self, NonNull};

use crate::global;
use crate::system::SYSTEM_ALIGN;

/// A zero-sized unit struct that implements [`GlobalAlloc`] by
/// delegating to the process-wide pooled heap.
pub struct SmallPool;

std::thread_local! {
    /// Set while this thread is inside the pool. An allocation made in
    /// that window (the pool's own bookkeeping vectors, a logger
    /// formatting a message) must not re-enter the pool lock.
    static IN_POOL: Cell<bool> = const { Cell::new(false) };
}

/// Treat a dead thread-local (thread teardown) as "inside": route to
/// the system allocator rather than touch the pool.
fn entered() -> bool {
    IN_POOL.try_with(Cell::get).unwrap_or(true)
}

fn enter<R>(f: impl FnOnce() -> R) -> R {
    IN_POOL.with(|flag| {
        flag.set(true);
        let result = f();
        flag.set(false);
        result
    })
}

/// Largest power-of-two alignment every block of `size` bytes
/// guarantees: chunk bases are `SYSTEM_ALIGN`-aligned and block `k`
/// sits at `k * size`.
fn block_align(size: usize) -> usize {
    let bits = SYSTEM_ALIGN
        .trailing_zeros()
        .min(size.trailing_zeros());
    1 << bits
}

/// A layout the block grid can honor.
fn pool_eligible(layout: Layout) -> bool {
    layout.size() <= global::max_object_size() && layout.align() <= block_align(layout.size())
}

unsafe impl GlobalAlloc for SmallPool {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        let size = layout.size();
        // Zero-size types: a well-aligned dangling pointer, the pattern
        // the standard library uses.
        if size == 0 {
            return layout.align() as *mut u8;
        }
        if !pool_eligible(layout) || entered() {
            return System.alloc(layout);
        }
        match enter(|| global::allocate(size)) {
            Some(block) => block.as_ptr(),
            None => ptr::null_mut(),
        }
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        if layout.size() == 0 {
            return;
        }
        if !pool_eligible(layout) || entered() {
            return System.dealloc(ptr, layout);
        }
        let Some(block) = NonNull::new(ptr) else {
            return;
        };
        let owned = enter(|| unsafe { global::deallocate_if_owned(block, layout.size()) });
        if !owned {
            // pool-shaped but served by the system (reentrant window)
            System.dealloc(ptr, layout);
        }
    }
}
