//! Configuration lock with per-thread ownership tracking
//!
//! `parking_lot::Mutex` does not know which thread owns it, so every
//! acquisition records the lock's id in a thread-local list. Entry points that
//! must not run under the lock (callback dispatch, event registration) check
//! that list and panic instead of deadlocking.

use parking_lot::{Mutex, MutexGuard};
use std::cell::RefCell;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_LOCK_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static HELD_LOCKS: RefCell<Vec<LockId>> = const { RefCell::new(Vec::new()) };
}

/// Process-unique identity of a [`ConfigLock`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LockId(u64);

impl LockId {
    fn next() -> Self {
        Self(NEXT_LOCK_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Whether the current thread holds this lock
    pub fn is_held(self) -> bool {
        HELD_LOCKS.with(|held| held.borrow().contains(&self))
    }

    pub fn requires_held(self) {
        assert!(
            self.is_held(),
            "configuration lock must be held by the current thread"
        );
    }

    pub fn requires_not_held(self) {
        assert!(
            !self.is_held(),
            "configuration lock must not be held by the current thread"
        );
    }
}

/// Mutex whose guards mark the owning thread
#[derive(Debug)]
pub struct ConfigLock<T> {
    id: LockId,
    inner: Mutex<T>,
}

impl<T> ConfigLock<T> {
    pub fn new(value: T) -> Self {
        Self {
            id: LockId::next(),
            inner: Mutex::new(value),
        }
    }

    pub fn id(&self) -> LockId {
        self.id
    }

    /// Block until the lock is available.
    ///
    /// Panics if the current thread already holds it.
    pub fn lock(&self) -> LockGuard<'_, T> {
        self.id.requires_not_held();
        let guard = self.inner.lock();
        HELD_LOCKS.with(|held| held.borrow_mut().push(self.id));
        LockGuard { id: self.id, guard }
    }
}

pub struct LockGuard<'a, T> {
    id: LockId,
    guard: MutexGuard<'a, T>,
}

impl<T> LockGuard<'_, T> {
    pub fn id(&self) -> LockId {
        self.id
    }
}

impl<T> Deref for LockGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<T> DerefMut for LockGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.guard
    }
}

impl<T> Drop for LockGuard<'_, T> {
    fn drop(&mut self) {
        HELD_LOCKS.with(|held| {
            let mut held = held.borrow_mut();
            if let Some(pos) = held.iter().rposition(|id| *id == self.id) {
                held.swap_remove(pos);
            }
        });
    }
}
