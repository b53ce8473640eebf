//! Scoped-lock threading policies.

use parking_lot::{Mutex, MutexGuard};

/// How a holder serializes its public calls. The guard is held for the
/// whole call, so one policy value gives class-level locking in the
/// original sense: every access through the same holder contends on the
/// same lock.
pub trait ThreadingPolicy: Sized + Send + Sync + 'static {
    /// Guard held for the duration of one public call.
    type Guard<'a>
    where
        Self: 'a;

    /// Const initializer so holders can live in `static`s.
    const INIT: Self;

    fn lock(&self) -> Self::Guard<'_>;
}

/// No synchronization at all: the caller promises single-threaded use.
pub struct SingleThreaded;

impl ThreadingPolicy for SingleThreaded {
    type Guard<'a>
        = ()
    where
        Self: 'a;

    const INIT: Self = SingleThreaded;

    #[inline]
    fn lock(&self) {}
}

/// Mutex-backed policy: one lock admits one thread per public call.
pub struct Lockable {
    mutex: Mutex<()>,
}

impl ThreadingPolicy for Lockable {
    type Guard<'a>
        = MutexGuard<'a, ()>
    where
        Self: 'a;

    const INIT: Self = Lockable {
        mutex: Mutex::new(()),
    };

    #[inline]
    fn lock(&self) -> MutexGuard<'_, ()> {
        self.mutex.lock()
    }
}
