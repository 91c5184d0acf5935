use std::{fmt, sync::Arc};

use parking_lot::{Mutex, MutexGuard};

/// Shared mutable state threaded through every work item of an iterator.
///
/// Cloning a `Context` clones the handle, not the state: all clones observe the same value.
/// The lock is taken by the iterator only for the synchronous part of an invocation, work items
/// that defer their completion can keep a clone and lock it later.
pub struct Context<C>(Arc<Mutex<C>>);

impl<C> Context<C> {
    pub fn new(value: C) -> Self {
        Self(Arc::new(Mutex::new(value)))
    }

    /// Lock the context. Do not call this from inside a synchronous work item call, the iterator
    /// already holds the lock there; use [`crate::Call::context`] instead.
    pub fn lock(&self) -> MutexGuard<'_, C> {
        self.0.lock()
    }

    /// Run `f` with the context locked.
    pub fn with<R>(&self, f: impl FnOnce(&mut C) -> R) -> R {
        f(&mut self.0.lock())
    }

    /// Whether both handles point at the same state.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl<C: Clone> Context<C> {
    /// Clone the current state out of the handle.
    pub fn snapshot(&self) -> C {
        self.0.lock().clone()
    }
}

impl<C> Clone for Context<C> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<C: Default> Default for Context<C> {
    fn default() -> Self {
        Self::new(C::default())
    }
}

impl<C> From<C> for Context<C> {
    fn from(value: C) -> Self {
        Self::new(value)
    }
}

impl<C: fmt::Debug> fmt::Debug for Context<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.try_lock() {
            Some(value) => f.debug_tuple("Context").field(&*value).finish(),
            None => f.debug_tuple("Context").field(&"<locked>").finish(),
        }
    }
}
