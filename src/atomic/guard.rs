use super::AtomicObject;
use crate::object::Object;
use std::fmt;
use std::ops::{Deref, DerefMut};

/// Exclusive access to the object in an [`AtomicObject`].
///
/// Dropping the guard unlocks the slot. Guards may be sent to another
/// thread, which then owns the lock and releases it.
#[must_use = "the slot unlocks as soon as the guard is dropped"]
pub struct SlotGuard<'a> {
    slot: &'a AtomicObject,
}

impl<'a> SlotGuard<'a> {
    pub(super) fn new(slot: &'a AtomicObject) -> Self {
        SlotGuard { slot }
    }

    pub fn unlock(self) {
        drop(self)
    }

    /// Unlocks the slot, sleeps until notified and locks it again.
    ///
    /// Wakeups may be spurious; use [`wait_while`](SlotGuard::wait_while) to
    /// wait for a condition.
    pub fn wait(&mut self) {
        // SAFETY: the guard proves the lock is held.
        unsafe { self.slot.raw_wait() }
    }

    /// Waits for as long as `condition` returns true for the stored object.
    pub fn wait_while<F>(&mut self, mut condition: F)
    where
        F: FnMut(&mut Object) -> bool,
    {
        while condition(&mut **self) {
            self.wait();
        }
    }

    /// Wakes one thread waiting on this slot. Returns whether one was woken.
    pub fn notify_one(&self) -> bool {
        self.slot.raw_notify_one()
    }

    /// Wakes every thread waiting on this slot and returns how many.
    pub fn notify_all(&self) -> usize {
        self.slot.raw_notify_all()
    }
}

impl Deref for SlotGuard<'_> {
    type Target = Object;

    fn deref(&self) -> &Object {
        // SAFETY: the lock is held for the guard's lifetime.
        unsafe { &*self.slot.value.get() }
    }
}

impl DerefMut for SlotGuard<'_> {
    fn deref_mut(&mut self) -> &mut Object {
        // SAFETY: as above, and the guard is borrowed mutably.
        unsafe { &mut *self.slot.value.get() }
    }
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        // SAFETY: the guard owns the lock.
        unsafe { self.slot.raw_unlock() }
    }
}

impl fmt::Debug for SlotGuard<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SlotGuard").field(&**self).finish()
    }
}

#[cfg(test)]
mod test {
    use crate::{AtomicObject, Object, SlotState};
    use std::thread;
    use std::time::Duration;

    #[test]
    fn guard_unlocks_on_another_thread() {
        let slot = AtomicObject::new(Object::new(0u32));
        let guard = slot.lock();
        thread::scope(|scope| {
            scope.spawn(move || {
                assert_eq!(guard.get::<u32>(), Some(&0));
                guard.unlock();
            });
        });
        assert!(slot.try_lock().is_some());
    }

    #[test]
    fn mutation_through_guard() {
        let slot = AtomicObject::null();
        {
            let mut guard = slot.lock();
            guard.emplace(String::from("set under lock"));
        }
        assert_eq!(
            slot.load().get::<String>().map(String::as_str),
            Some("set under lock")
        );
    }

    #[test]
    fn wait_releases_lock_until_notified() {
        let slot = AtomicObject::new(Object::new(false));
        thread::scope(|scope| {
            let waiter = scope.spawn(|| {
                let mut guard = slot.lock();
                guard.wait_while(|ready| ready.get::<bool>() != Some(&true));
                assert_eq!(guard.get::<bool>(), Some(&true));
            });

            while slot.state() != SlotState::Condition {
                thread::sleep(Duration::from_millis(1));
            }
            let mut guard = slot.lock();
            *guard = Object::new(true);
            assert!(guard.notify_one());
            drop(guard);
            waiter.join().unwrap();
        });
        assert_eq!(slot.state(), SlotState::Unlocked);
    }

    #[test]
    fn notify_without_waiters() {
        let slot = AtomicObject::null();
        let guard = slot.lock();
        assert!(!guard.notify_one());
        assert_eq!(guard.notify_all(), 0);
    }
}
