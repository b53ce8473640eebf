//! Pool-based small-object allocator: fixed-size blocks carved from
//! contiguous chunks, one allocator per observed block size, and a
//! policy-driven process-wide instance.

pub mod chunk;
pub mod config;
pub mod error;
pub mod fixed;
pub mod global;
#[cfg(feature = "global-allocator")]
pub mod global_alloc;
pub mod pool;
pub mod singleton;
pub mod system;

pub use config::{PoolConfig, DEFAULT_CHUNK_SIZE, MAX_SMALL_OBJECT_SIZE};
pub use error::SingletonError;
pub use pool::SmallObjAllocator;

#[cfg(feature = "global-allocator")]
pub use global_alloc::SmallPool;
