//! Errors surfaced at the singleton-harness boundary.
//!
//! Ordinary allocation failure is not an error value: the small path
//! reports exhaustion as `None`, mirroring a null return.

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SingletonError {
    /// The instance was accessed after its scheduled destruction and
    /// the lifetime policy denied revival.
    #[error("dead reference: singleton accessed after scheduled destruction")]
    DeadReference,
}
