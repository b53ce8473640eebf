//! Lifetime policies and the longevity-ordered destruction registry.

use parking_lot::Mutex;

use super::exit::{self, Handler};
use crate::error::SingletonError;

/// When the instance dies and what happens if it is used afterwards.
pub trait LifetimePolicy: 'static {
    /// Register `destroy` to run at the policy's chosen teardown
    /// moment. Called once per (re)creation.
    fn schedule_destruction(destroy: Handler);

    /// Invoked on access after destruction. `Ok(())` consents to
    /// recreation; `Err` denies it.
    fn on_dead_reference() -> Result<(), SingletonError>;
}

/// Destroy with the process-exit chain; deny revival.
pub struct DefaultLifetime;

impl LifetimePolicy for DefaultLifetime {
    fn schedule_destruction(destroy: Handler) {
        exit::at_exit(destroy);
    }

    fn on_dead_reference() -> Result<(), SingletonError> {
        Err(SingletonError::DeadReference)
    }
}

/// Destroy with the process-exit chain; silently recreate on
/// post-destruction access. The recreated instance re-arms its own
/// teardown, so revival during the exit sequence still gets cleaned up.
pub struct Phoenix;

impl LifetimePolicy for Phoenix {
    fn schedule_destruction(destroy: Handler) {
        exit::at_exit(destroy);
    }

    fn on_dead_reference() -> Result<(), SingletonError> {
        Ok(())
    }
}

/// Never destroyed: the operating system reclaims the memory when the
/// process ends. Resources beyond memory are the instance's problem.
pub struct NoDestroy;

impl LifetimePolicy for NoDestroy {
    fn schedule_destruction(destroy: Handler) {
        drop(destroy);
    }

    fn on_dead_reference() -> Result<(), SingletonError> {
        // destruction is never scheduled, so a dead reference cannot
        // occur through this policy's own doing
        Ok(())
    }
}

/// Destroy in longevity order: higher longevity dies later.
pub struct WithLongevity<const LONGEVITY: u32>;

impl<const LONGEVITY: u32> LifetimePolicy for WithLongevity<LONGEVITY> {
    fn schedule_destruction(destroy: Handler) {
        set_longevity(LONGEVITY, destroy);
    }

    fn on_dead_reference() -> Result<(), SingletonError> {
        Err(SingletonError::DeadReference)
    }
}

struct Tracker {
    longevity: u32,
    destroy: Handler,
}

/// Trackers ordered stably by ascending longevity and popped from the
/// tail, so the highest longevity is destroyed last. Insertion is
/// O(n); registration happens only at instance creation, never on the
/// allocation path.
pub struct LongevityRegistry {
    trackers: Mutex<Vec<Tracker>>,
}

#[allow(clippy::new_without_default)]
impl LongevityRegistry {
    pub const fn new() -> LongevityRegistry {
        LongevityRegistry {
            trackers: Mutex::new(Vec::new()),
        }
    }

    /// Insert behind every tracker of equal or lower longevity, keeping
    /// registration order among equals.
    pub fn register(&self, longevity: u32, destroy: Handler) {
        let mut trackers = self.trackers.lock();
        let at = trackers.partition_point(|t| t.longevity <= longevity);
        trackers.insert(
            at,
            Tracker {
                longevity,
                destroy,
            },
        );
    }

    /// Pop and run the highest-longevity tracker still registered.
    pub fn destroy_one(&self) {
        let tracker = self.trackers.lock().pop();
        if let Some(tracker) = tracker {
            (tracker.destroy)();
        }
    }

    /// Run every tracker, highest longevity first.
    pub fn destroy_all(&self) {
        loop {
            let tracker = self.trackers.lock().pop();
            match tracker {
                Some(tracker) => (tracker.destroy)(),
                None => break,
            }
        }
    }

    pub fn len(&self) -> usize {
        self.trackers.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

static REGISTRY: LongevityRegistry = LongevityRegistry::new();

/// Assign `destroy` a place in the process-wide destruction order and
/// arm the exit chain to pop one tracker per registration, the way the
/// original pairs each registration with one atexit entry.
pub fn set_longevity(longevity: u32, destroy: Handler) {
    REGISTRY.register(longevity, destroy);
    exit::at_exit(Box::new(|| REGISTRY.destroy_one()));
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn recording(order: &Arc<Mutex<Vec<u32>>>, tag: u32) -> Handler {
        let order = Arc::clone(order);
        Box::new(move || order.lock().push(tag))
    }

    #[test]
    fn higher_longevity_destroyed_later() {
        let registry = LongevityRegistry::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        registry.register(10, recording(&order, 10));
        registry.register(30, recording(&order, 30));
        registry.register(20, recording(&order, 20));
        registry.destroy_all();
        assert_eq!(*order.lock(), vec![30, 20, 10]);
    }

    #[test]
    fn equal_longevities_keep_registration_order() {
        let registry = LongevityRegistry::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        registry.register(5, recording(&order, 1));
        registry.register(5, recording(&order, 2));
        registry.register(5, recording(&order, 3));
        registry.destroy_all();
        // popped from the tail: the latest registration of the tied
        // longevity dies first
        assert_eq!(*order.lock(), vec![3, 2, 1]);
    }

    #[test]
    fn with_longevity_feeds_the_process_registry() {
        let before = REGISTRY.len();
        WithLongevity::<7>::schedule_destruction(Box::new(|| {}));
        assert_eq!(REGISTRY.len(), before + 1);
        // the paired exit-chain entry pops it at process teardown
    }

    #[test]
    fn destroy_one_pops_a_single_tracker() {
        let registry = LongevityRegistry::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        registry.register(1, recording(&order, 1));
        registry.register(2, recording(&order, 2));
        registry.destroy_one();
        assert_eq!(*order.lock(), vec![2]);
        assert_eq!(registry.len(), 1);
    }
}
