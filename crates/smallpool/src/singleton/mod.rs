//! Process-wide instance holder composed from three orthogonal
//! policies: where the instance lives (creation), when it dies and what
//! a post-mortem access means (lifetime), and how calls are serialized
//! (threading). Policies bind at the type level; the access path pays
//! no dynamic dispatch.

pub mod creation;
pub mod exit;
pub mod lifetime;
pub mod threading;

pub use creation::{BoxedCreation, CreationPolicy, InPlaceCreation};
pub use exit::ExitChain;
pub use lifetime::{
    set_longevity, DefaultLifetime, LifetimePolicy, LongevityRegistry, NoDestroy, Phoenix,
    WithLongevity,
};
pub use threading::{Lockable, SingleThreaded, ThreadingPolicy};

use std::marker::PhantomData;

use parking_lot::Mutex;

use crate::error::SingletonError;

enum Slot<S> {
    Uninit,
    Live(S),
    Destroyed,
}

struct SlotState<S> {
    slot: Slot<S>,
    /// Whether a destruction handler is currently pending, so repeated
    /// revival does not pile up handlers.
    armed: bool,
}

/// Singleton amenities for a `T`: lazy creation on first access,
/// policy-scheduled destruction, dead-reference handling, and a scoped
/// lock around every public call.
///
/// The holder is meant to live in a `static`; the slot uses interior
/// mutability so the instance can be created, destroyed, and (when the
/// lifetime policy consents) recreated behind a shared reference.
pub struct SingletonHolder<T, C, L, M>
where
    C: CreationPolicy<T>,
    M: ThreadingPolicy,
{
    state: Mutex<SlotState<C::Storage>>,
    scope: M,
    _marker: PhantomData<(fn() -> T, fn() -> L)>,
}

#[allow(clippy::new_without_default)]
impl<T, C, L, M> SingletonHolder<T, C, L, M>
where
    T: 'static,
    C: CreationPolicy<T>,
    C::Storage: Send,
    L: LifetimePolicy,
    M: ThreadingPolicy,
{
    pub const fn new() -> Self {
        SingletonHolder {
            state: Mutex::new(SlotState {
                slot: Slot::Uninit,
                armed: false,
            }),
            scope: M::INIT,
            _marker: PhantomData,
        }
    }

    /// Run `f` against the instance under the scoped lock. The first
    /// access creates the instance and schedules its destruction; an
    /// access after destruction consults the lifetime policy, which
    /// either revives the instance or reports a dead reference.
    pub fn with<R>(&'static self, f: impl FnOnce(&mut T) -> R) -> Result<R, SingletonError> {
        let _scope = self.scope.lock();
        let mut state = self.state.lock();

        if matches!(state.slot, Slot::Destroyed) {
            L::on_dead_reference()?;
            state.slot = Slot::Uninit;
        }
        if matches!(state.slot, Slot::Uninit) {
            state.slot = Slot::Live(C::create());
            if !state.armed {
                L::schedule_destruction(Box::new(move || self.destroy()));
                state.armed = true;
            }
        }

        match &mut state.slot {
            Slot::Live(storage) => Ok(f(&mut **storage)),
            _ => unreachable!("slot is live after creation"),
        }
    }

    /// Tear the instance down, dropping its storage. Invoked by the
    /// scheduled exit handler; may also be driven directly. Destroying
    /// an already-destroyed or never-created instance is a no-op, which
    /// keeps a stale handler from tripping over a revived-and-destroyed
    /// slot.
    pub fn destroy(&'static self) {
        let _scope = self.scope.lock();
        let mut state = self.state.lock();
        if matches!(state.slot, Slot::Live(_)) {
            state.slot = Slot::Destroyed;
        }
        state.armed = false;
    }

    /// Whether the instance currently exists.
    pub fn is_live(&self) -> bool {
        matches!(self.state.lock().slot, Slot::Live(_))
    }
}
