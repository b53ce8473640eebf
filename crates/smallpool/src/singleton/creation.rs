//! Creation policies: where the instance lives.
//!
//! Above the system allocator the original's `new`- and `malloc`-based
//! variants are indistinguishable; they collapse into [`BoxedCreation`].
//! The static-storage-plus-placement variant becomes an in-slot value.

use std::ops::{Deref, DerefMut};

pub trait CreationPolicy<T>: 'static {
    /// Owning storage for the created instance; dropping it destroys
    /// the instance.
    type Storage: Deref<Target = T> + DerefMut;

    fn create() -> Self::Storage;
}

/// Builds the instance on the system heap.
pub struct BoxedCreation;

impl<T: Default + 'static> CreationPolicy<T> for BoxedCreation {
    type Storage = Box<T>;

    fn create() -> Box<T> {
        Box::default()
    }
}

/// Builds the instance directly inside the holder's static slot.
pub struct InPlaceCreation;

impl<T: Default + 'static> CreationPolicy<T> for InPlaceCreation {
    type Storage = InPlace<T>;

    fn create() -> InPlace<T> {
        InPlace(T::default())
    }
}

/// Transparent in-slot storage.
pub struct InPlace<T>(T);

impl<T> Deref for InPlace<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.0
    }
}

impl<T> DerefMut for InPlace<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.0
    }
}
