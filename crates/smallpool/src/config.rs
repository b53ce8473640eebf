//! Compile-time defaults and environment overrides.

use std::sync::OnceLock;

/// Target slab footprint in bytes: a fixed allocator divides this by its
/// block size to derive the per-chunk block count.
pub const DEFAULT_CHUNK_SIZE: usize = 4096;

/// Requests above this many bytes bypass the pool and go to the system
/// heap.
pub const MAX_SMALL_OBJECT_SIZE: usize = 64;

/// Sizes the process-wide heap is built with. Read from the environment
/// once; explicit construction via
/// [`SmallObjAllocator::new`](crate::pool::SmallObjAllocator::new)
/// ignores this entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    pub chunk_size: usize,
    pub max_object_size: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        PoolConfig {
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_object_size: MAX_SMALL_OBJECT_SIZE,
        }
    }
}

impl PoolConfig {
    /// The defaults overridden by `SMALLPOOL_CHUNK_SIZE` and
    /// `SMALLPOOL_MAX_OBJECT_SIZE`. Read once per process; later
    /// environment changes are not observed.
    pub fn from_env() -> PoolConfig {
        static CONFIG: OnceLock<PoolConfig> = OnceLock::new();
        *CONFIG.get_or_init(|| {
            let mut config = PoolConfig::default();
            if let Some(value) = env_usize("SMALLPOOL_CHUNK_SIZE") {
                config.chunk_size = value;
            }
            if let Some(value) = env_usize("SMALLPOOL_MAX_OBJECT_SIZE") {
                config.max_object_size = value;
            }
            config
        })
    }
}

fn env_usize(key: &str) -> Option<usize> {
    let value: usize = std::env::var(key).ok()?.parse().ok()?;
    if value == 0 {
        return None;
    }
    Some(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_constants() {
        let config = PoolConfig::default();
        assert_eq!(config.chunk_size, DEFAULT_CHUNK_SIZE);
        assert_eq!(config.max_object_size, MAX_SMALL_OBJECT_SIZE);
    }

    #[test]
    fn absent_variables_parse_to_none() {
        assert_eq!(env_usize("SMALLPOOL_TEST_UNSET_VARIABLE"), None);
    }
}
