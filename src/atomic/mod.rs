//! A lock-guarded cell holding one [`Object`], shareable between threads.
//!
//! The lock word is kept next to the value rather than packed into the
//! pointer, and drives the same state machine: unlocked, locked, locked with
//! parked waiters, and suspended in a condition wait. Contended lockers spin
//! briefly and then park on the slot's address.
mod guard;

pub use guard::SlotGuard;

use crate::object::Object;
use parking_lot_core::{SpinWait, DEFAULT_PARK_TOKEN, DEFAULT_UNPARK_TOKEN};
use std::cell::UnsafeCell;
use std::fmt;
use std::mem;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};

const LOCKED: u8 = 1;
const PARKED: u8 = 2;

/// Snapshot of a slot's lock state, see [`AtomicObject::state`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    Unlocked,
    Locked,
    /// Locked, with at least one thread parked waiting for the lock.
    Waiting,
    /// At least one lock holder is suspended in [`SlotGuard::wait`].
    Condition,
}

/// Returned by a failed compare-exchange.
#[derive(Debug)]
pub struct CompareExchangeError {
    /// What the slot held instead of the expected object.
    pub current: Object,
    /// The object that was not stored, handed back to the caller.
    pub new: Object,
}

/// An [`Object`] that many threads can read and replace.
///
/// Every operation takes the slot's lock, so a `load` always observes the
/// latest `store`, `exchange` or successful `compare_exchange`, and a value
/// built before a `store` is fully visible to whoever loads it. The lock is
/// also exposed directly through [`lock`](AtomicObject::lock), together with
/// a condition variable, so the slot can guard state beyond the object it
/// holds.
///
/// ```
/// use erased_object::{AtomicObject, Object};
///
/// let slot = AtomicObject::new(Object::new(1u32));
/// let previous = slot.exchange(Object::new(2u32));
/// assert_eq!(previous.get::<u32>(), Some(&1));
/// assert_eq!(slot.load().get::<u32>(), Some(&2));
/// ```
pub struct AtomicObject {
    state: AtomicU8,
    /// Lock holders currently suspended in a condition wait.
    waiters: AtomicUsize,
    value: UnsafeCell<Object>,
}

// SAFETY: the value is only reached through the lock.
unsafe impl Send for AtomicObject {}
unsafe impl Sync for AtomicObject {}

impl AtomicObject {
    pub const fn new(object: Object) -> AtomicObject {
        AtomicObject {
            state: AtomicU8::new(0),
            waiters: AtomicUsize::new(0),
            value: UnsafeCell::new(object),
        }
    }

    pub const fn null() -> AtomicObject {
        AtomicObject::new(Object::null())
    }

    /// Takes the lock, blocking while another thread holds it.
    pub fn lock(&self) -> SlotGuard<'_> {
        self.raw_lock();
        SlotGuard::new(self)
    }

    /// Takes the lock if it is free.
    pub fn try_lock(&self) -> Option<SlotGuard<'_>> {
        let mut state = self.state.load(Ordering::Relaxed);
        loop {
            if state & LOCKED != 0 {
                return None;
            }
            match self.state.compare_exchange_weak(
                state,
                state | LOCKED,
                Ordering::Acquire,
                Ordering::Relaxed,
            ) {
                Ok(_) => return Some(SlotGuard::new(self)),
                Err(observed) => state = observed,
            }
        }
    }

    /// A new strong reference to the stored object.
    pub fn load(&self) -> Object {
        self.lock().clone()
    }

    /// Replaces the stored object. The previous one is released after the
    /// lock is dropped.
    pub fn store(&self, object: Object) {
        drop(self.exchange(object));
    }

    /// Stores a new object holding `value`.
    pub fn set<T: Send + Sync + 'static>(&self, value: T) {
        self.store(Object::new(value))
    }

    /// Replaces the stored object and returns the previous one.
    pub fn exchange(&self, object: Object) -> Object {
        let mut guard = self.lock();
        mem::replace(&mut *guard, object)
    }

    /// Stores `new` if the slot holds the same holder as `current`.
    ///
    /// Identity is compared, never values. On success the previous object
    /// is returned. On failure the slot is left alone and both the object it
    /// holds and `new` come back in the error.
    pub fn compare_exchange(
        &self,
        current: &Object,
        new: Object,
    ) -> Result<Object, CompareExchangeError> {
        let mut guard = self.lock();
        if *guard == *current {
            Ok(mem::replace(&mut *guard, new))
        } else {
            Err(CompareExchangeError {
                current: guard.clone(),
                new,
            })
        }
    }

    /// Same as [`compare_exchange`](AtomicObject::compare_exchange). Being lock
    /// based, it never fails spuriously.
    pub fn compare_exchange_weak(
        &self,
        current: &Object,
        new: Object,
    ) -> Result<Object, CompareExchangeError> {
        self.compare_exchange(current, new)
    }

    pub fn into_inner(self) -> Object {
        self.value.into_inner()
    }

    pub fn get_mut(&mut self) -> &mut Object {
        self.value.get_mut()
    }

    pub fn state(&self) -> SlotState {
        let state = self.state.load(Ordering::Relaxed);
        if state & PARKED != 0 {
            SlotState::Waiting
        } else if state & LOCKED != 0 {
            SlotState::Locked
        } else if self.waiters.load(Ordering::Relaxed) != 0 {
            SlotState::Condition
        } else {
            SlotState::Unlocked
        }
    }

    fn lock_key(&self) -> usize {
        &self.state as *const AtomicU8 as usize
    }

    fn condition_key(&self) -> usize {
        &self.waiters as *const AtomicUsize as usize
    }

    fn raw_lock(&self) {
        if self
            .state
            .compare_exchange_weak(0, LOCKED, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            self.lock_slow();
        }
    }

    #[cold]
    fn lock_slow(&self) {
        let mut spin = SpinWait::new();
        let mut state = self.state.load(Ordering::Relaxed);
        loop {
            if state & LOCKED == 0 {
                match self.state.compare_exchange_weak(
                    state,
                    state | LOCKED,
                    Ordering::Acquire,
                    Ordering::Relaxed,
                ) {
                    Ok(_) => return,
                    Err(observed) => state = observed,
                }
                continue;
            }

            if state & PARKED == 0 && spin.spin() {
                state = self.state.load(Ordering::Relaxed);
                continue;
            }

            if state & PARKED == 0 {
                if let Err(observed) = self.state.compare_exchange_weak(
                    state,
                    state | PARKED,
                    Ordering::Relaxed,
                    Ordering::Relaxed,
                ) {
                    state = observed;
                    continue;
                }
            }

            tracing::trace!(slot = self.lock_key(), "slot contended, parking");
            // SAFETY: the key is this slot's address and the callbacks do
            // not call back into the parking lot.
            unsafe {
                parking_lot_core::park(
                    self.lock_key(),
                    || self.state.load(Ordering::Relaxed) == LOCKED | PARKED,
                    || {},
                    |_, _| {},
                    DEFAULT_PARK_TOKEN,
                    None,
                );
            }
            spin.reset();
            state = self.state.load(Ordering::Relaxed);
        }
    }

    /// # Safety
    /// The lock must be held; the caller gives it up.
    unsafe fn raw_unlock(&self) {
        if self
            .state
            .compare_exchange(LOCKED, 0, Ordering::Release, Ordering::Relaxed)
            .is_ok()
        {
            return;
        }
        self.unlock_slow();
    }

    #[cold]
    fn unlock_slow(&self) {
        // SAFETY: the callback only touches the lock word.
        unsafe {
            parking_lot_core::unpark_one(self.lock_key(), |result| {
                let state = if result.have_more_threads { PARKED } else { 0 };
                self.state.store(state, Ordering::Release);
                DEFAULT_UNPARK_TOKEN
            });
        }
    }

    /// Releases the lock, sleeps until notified, then takes the lock again.
    ///
    /// # Safety
    /// The lock must be held by the caller.
    unsafe fn raw_wait(&self) {
        self.waiters.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(slot = self.lock_key(), "waiting on slot condition");
        // The waiter is queued before the lock is released, so a notifier
        // that takes the lock afterwards always finds it.
        parking_lot_core::park(
            self.condition_key(),
            || true,
            || self.raw_unlock(),
            |_, _| {},
            DEFAULT_PARK_TOKEN,
            None,
        );
        self.raw_lock();
        self.waiters.fetch_sub(1, Ordering::Relaxed);
    }

    fn raw_notify_one(&self) -> bool {
        if self.waiters.load(Ordering::Relaxed) == 0 {
            return false;
        }
        // SAFETY: no callback re-enters the parking lot.
        let result =
            unsafe { parking_lot_core::unpark_one(self.condition_key(), |_| DEFAULT_UNPARK_TOKEN) };
        tracing::trace!(woken = result.unparked_threads, "slot notify_one");
        result.unparked_threads != 0
    }

    fn raw_notify_all(&self) -> usize {
        if self.waiters.load(Ordering::Relaxed) == 0 {
            return 0;
        }
        // SAFETY: as above.
        let woken = unsafe { parking_lot_core::unpark_all(self.condition_key(), DEFAULT_UNPARK_TOKEN) };
        tracing::trace!(woken, "slot notify_all");
        woken
    }
}

impl Default for AtomicObject {
    fn default() -> AtomicObject {
        AtomicObject::null()
    }
}

impl From<Object> for AtomicObject {
    fn from(object: Object) -> AtomicObject {
        AtomicObject::new(object)
    }
}

impl fmt::Debug for AtomicObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("AtomicObject");
        match self.try_lock() {
            Some(guard) => debug.field("value", &*guard),
            None => debug.field("value", &format_args!("<locked>")),
        };
        debug.field("state", &self.state()).finish()
    }
}

#[cfg(test)]
mod test {
    use super::{AtomicObject, SlotState};
    use crate::Object;

    #[test]
    fn lock_state_transitions() {
        let slot = AtomicObject::null();
        assert_eq!(slot.state(), SlotState::Unlocked);
        let guard = slot.lock();
        assert_eq!(slot.state(), SlotState::Locked);
        assert!(slot.try_lock().is_none());
        guard.unlock();
        assert_eq!(slot.state(), SlotState::Unlocked);
        assert!(slot.try_lock().is_some());
    }

    #[test]
    fn compare_exchange_by_identity() {
        let first = Object::new(1);
        let slot = AtomicObject::new(first.clone());

        let lookalike = Object::new(1);
        let err = slot.compare_exchange(&lookalike, Object::new(2)).unwrap_err();
        assert_eq!(err.current, first);
        assert_eq!(err.new.get::<i32>(), Some(&2));

        let previous = slot.compare_exchange_weak(&first, lookalike.clone()).unwrap();
        assert_eq!(previous, first);
        assert_eq!(slot.load(), lookalike);
    }

    #[test]
    fn store_releases_previous() {
        let first = Object::new(String::from("first"));
        let slot = AtomicObject::new(first.clone());
        assert_eq!(first.strong_count(), 2);
        slot.set(5u8);
        assert_eq!(first.strong_count(), 1);
        assert_eq!(slot.into_inner().get::<u8>(), Some(&5));
    }

    #[test]
    fn debug_does_not_block() {
        let slot = AtomicObject::new(Object::new(3u16));
        let _guard = slot.lock();
        assert!(format!("{:?}", slot).contains("<locked>"));
    }
}
