use crate::error::ObjectError;
use crate::holder::RawHolder;
use crate::object::Object;
use std::convert::TryFrom;
use std::fmt;

/// A non-owning reference to the value of an [`Object`].
///
/// A weak reference keeps the holder's memory alive but not the value. It
/// can be turned back into an `Object` only while some strong reference
/// still exists.
pub struct WeakObject {
    raw: Option<RawHolder>,
}

// SAFETY: see `Object`.
unsafe impl Send for WeakObject {}
unsafe impl Sync for WeakObject {}

impl WeakObject {
    /// A weak reference that never upgrades.
    pub const fn new() -> WeakObject {
        WeakObject { raw: None }
    }

    /// Whether the value is gone. Always true for an empty reference.
    pub fn expired(&self) -> bool {
        self.strong_count() == 0
    }

    /// A strong reference to the value, or an empty object once it expired.
    pub fn lock(&self) -> Object {
        match self.raw {
            Some(raw) if raw.try_retain() => Object { raw: Some(raw) },
            _ => Object::null(),
        }
    }

    /// Like [`lock`](WeakObject::lock), failing with
    /// [`ObjectError::DeadWeakReference`] once the value expired.
    pub fn upgrade(&self) -> Result<Object, ObjectError> {
        let object = self.lock();
        if object.is_null() {
            tracing::trace!(holder = self.raw.is_some(), "weak promotion refused");
            Err(ObjectError::DeadWeakReference)
        } else {
            Ok(object)
        }
    }

    pub fn strong_count(&self) -> usize {
        self.raw.map_or(0, RawHolder::strong_count)
    }

    pub fn weak_count(&self) -> usize {
        self.raw.map_or(0, RawHolder::weak_count)
    }

    /// Blocks the calling thread until the last strong reference is released.
    ///
    /// Returns at once for an empty or already expired reference. The value's
    /// destructor may still be running on the releasing thread.
    pub fn wait_expired(&self) {
        if let Some(raw) = self.raw {
            // SAFETY: `self` holds a weak reference for the duration.
            unsafe { raw.wait_expired() }
        }
    }

    /// Whether both references point to the same holder.
    pub fn ptr_eq(&self, other: &WeakObject) -> bool {
        self.raw == other.raw
    }
}

impl Object {
    /// A weak reference to this object's value.
    pub fn downgrade(&self) -> WeakObject {
        if let Some(raw) = self.raw {
            // SAFETY: `self` owns a strong reference.
            unsafe { raw.retain_weak() };
        }
        WeakObject { raw: self.raw }
    }
}

impl TryFrom<&WeakObject> for Object {
    type Error = ObjectError;

    fn try_from(weak: &WeakObject) -> Result<Object, ObjectError> {
        weak.upgrade()
    }
}

impl From<&Object> for WeakObject {
    fn from(object: &Object) -> WeakObject {
        object.downgrade()
    }
}

impl Clone for WeakObject {
    fn clone(&self) -> WeakObject {
        if let Some(raw) = self.raw {
            // SAFETY: `self` owns a weak reference.
            unsafe { raw.retain_weak() };
        }
        WeakObject { raw: self.raw }
    }
}

impl Drop for WeakObject {
    fn drop(&mut self) {
        if let Some(raw) = self.raw.take() {
            // SAFETY: this reference owned the weak count.
            unsafe { raw.release_weak() };
        }
    }
}

impl Default for WeakObject {
    fn default() -> WeakObject {
        WeakObject::new()
    }
}

impl fmt::Debug for WeakObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.raw {
            None => f.write_str("WeakObject(null)"),
            Some(raw) => f
                .debug_struct("WeakObject")
                .field("type", &raw.token())
                .field("expired", &self.expired())
                .finish(),
        }
    }
}
