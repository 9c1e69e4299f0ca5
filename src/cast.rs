//! Exact, unchecked and polymorphic recovery of the value inside an [`Object`].
//!
//! Pointer-like forms (`get*`) return `Option` and never fail hard. Reference
//! forms (`cast*`) report an [`ObjectError::BadCast`] when the object is empty
//! or holds something else.
use crate::error::ObjectError;
use crate::object::Object;
use crate::token::TypeToken;
use std::any::Any;
use std::marker::PhantomData;
use std::ptr::NonNull;
use std::slice;

/// A request for a reference of some type the asker names.
///
/// Passed to [`Polymorphic::provide`]; the implementor offers references to
/// itself under every type it wants to be recoverable as. Only the first offer
/// of the requested type is kept.
pub struct Demand<'a, 'v> {
    slot: &'a mut dyn Any,
    _value: PhantomData<fn(&'v ()) -> &'v ()>,
}

impl<'a, 'v> Demand<'a, 'v> {
    pub(crate) fn new<B: ?Sized + 'static>(slot: &'a mut Option<*const B>) -> Self {
        Demand {
            slot,
            _value: PhantomData,
        }
    }

    /// Offers `value` as a `T`.
    ///
    /// Objects are shared across threads, so only `Sync` views can be offered.
    ///
    /// ```compile_fail
    /// use erased_object::{Demand, Polymorphic};
    /// use std::cell::Cell;
    ///
    /// struct Leaky;
    ///
    /// impl Polymorphic for Leaky {
    ///     fn provide<'v>(&'v self, demand: &mut Demand<'_, 'v>) {
    ///         let counter: &'static Cell<u32> = Box::leak(Box::new(Cell::new(0)));
    ///         demand.provide::<Cell<u32>>(counter);
    ///     }
    /// }
    /// ```
    pub fn provide<T: ?Sized + Sync + 'static>(&mut self, value: &'v T) -> &mut Self {
        if let Some(slot) = self.slot.downcast_mut::<Option<*const T>>() {
            if slot.is_none() {
                *slot = Some(value as *const T);
            }
        }
        self
    }

    /// Whether the asker wants a `T`.
    pub fn wants<T: ?Sized + 'static>(&self) -> bool {
        self.slot.is::<Option<*const T>>()
    }
}

/// Values that can be recovered through types other than their own.
///
/// This is the declared base/derived relationship used by
/// [`Object::polymorphic_cast`]: a value lists the views it supports, usually
/// a trait object it implements or a field it embeds.
///
/// ```
/// use erased_object::{Demand, Object, Polymorphic};
///
/// trait Shape: Send + Sync {
///     fn area(&self) -> f64;
/// }
///
/// struct Square(f64);
///
/// impl Shape for Square {
///     fn area(&self) -> f64 {
///         self.0 * self.0
///     }
/// }
///
/// impl Polymorphic for Square {
///     fn provide<'v>(&'v self, demand: &mut Demand<'_, 'v>) {
///         demand.provide::<dyn Shape>(self);
///     }
/// }
///
/// let object = Object::polymorphic(Square(3.0));
/// assert_eq!(object.cast::<Square>().unwrap().0, 3.0);
/// let shape = object.polymorphic_cast::<dyn Shape>().unwrap();
/// assert_eq!(shape.area(), 9.0);
/// ```
pub trait Polymorphic: Send + Sync + 'static {
    fn provide<'v>(&'v self, demand: &mut Demand<'_, 'v>);
}

impl Object {
    /// Whether the stored value is exactly a `T`.
    pub fn is<T: ?Sized + 'static>(&self) -> bool {
        self.type_token() == TypeToken::of::<T>()
    }

    /// Exact cast, pointer form: `None` when empty or not a `T`.
    pub fn get<T: 'static>(&self) -> Option<&T> {
        if self.is::<T>() {
            // SAFETY: the token matched.
            Some(unsafe { self.get_unchecked::<T>() })
        } else {
            None
        }
    }

    /// Exact cast, reference form.
    pub fn cast<T: ?Sized + 'static>(&self) -> Result<&T, ObjectError> {
        if self.is::<T>() {
            if let Some(value) = self.polymorphic_get::<T>() {
                return Ok(value);
            }
        }
        Err(ObjectError::bad_cast::<T>(self.type_token()))
    }

    /// Exact cast to a mutable reference. Only succeeds while this object is
    /// the sole reference, strong or weak, to its value.
    pub fn get_mut<T: 'static>(&mut self) -> Option<&mut T> {
        match self.raw {
            Some(raw) if raw.is_unique() && self.is::<T>() => {
                // SAFETY: unique and of type T.
                Some(unsafe { &mut *raw.value_ptr().cast::<T>().as_ptr() })
            }
            _ => None,
        }
    }

    /// Exact cast to a mutable reference, reference form.
    pub fn cast_mut<T: 'static>(&mut self) -> Result<&mut T, ObjectError> {
        let found = self.type_token();
        self.get_mut::<T>()
            .ok_or_else(|| ObjectError::bad_cast::<T>(found))
    }

    /// Unchecked cast.
    ///
    /// # Safety
    /// The object must be non-empty and hold exactly a `T`.
    pub unsafe fn get_unchecked<T: 'static>(&self) -> &T {
        debug_assert!(self.is::<T>());
        match self.raw {
            Some(raw) => &*raw.value_ptr().cast::<T>().as_ptr(),
            None => std::hint::unreachable_unchecked(),
        }
    }

    /// Polymorphic cast, pointer form.
    ///
    /// Succeeds when the stored value is a `B`, or declared itself
    /// recoverable as a `B` through [`Polymorphic`]. Arrays answer for their
    /// slice type, callables for `dyn Invoke<S>`.
    pub fn polymorphic_get<B: ?Sized + 'static>(&self) -> Option<&B> {
        let raw = self.raw?;
        let mut found: Option<*const B> = None;
        // SAFETY: the value is alive while `self` is borrowed.
        unsafe {
            (raw.vtable().provide)(raw, &mut Demand::new(&mut found));
            found.map(|value| &*value)
        }
    }

    /// Polymorphic cast, reference form.
    pub fn polymorphic_cast<B: ?Sized + 'static>(&self) -> Result<&B, ObjectError> {
        self.polymorphic_get::<B>()
            .ok_or_else(|| ObjectError::bad_cast::<B>(self.type_token()))
    }

    /// Address of the stored value, whatever its type.
    pub fn value_ptr(&self) -> Option<NonNull<()>> {
        // SAFETY: a non-empty object keeps its value alive.
        self.raw.map(|raw| unsafe { raw.value_ptr().cast() })
    }

    /// Elements of a `[T]` or `[T; N]` holder.
    pub fn get_slice<T: 'static>(&self) -> Option<&[T]> {
        let raw = self.raw?;
        if raw.vtable().element.map(|token| token()) != Some(TypeToken::of::<T>()) {
            return None;
        }
        // SAFETY: element type matched, the holder owns `len` initialized items.
        Some(unsafe { slice::from_raw_parts(raw.value_ptr().cast::<T>().as_ptr(), raw.len()) })
    }

    /// Mutable elements of a `[T]` or `[T; N]` holder, while unique.
    pub fn get_slice_mut<T: 'static>(&mut self) -> Option<&mut [T]> {
        let raw = self.raw?;
        if !raw.is_unique() || raw.vtable().element.map(|token| token()) != Some(TypeToken::of::<T>()) {
            return None;
        }
        // SAFETY: as `get_slice`, plus exclusive access.
        Some(unsafe {
            slice::from_raw_parts_mut(raw.value_ptr().cast::<T>().as_ptr(), raw.len())
        })
    }

    /// Elements of a slice holder, reference form.
    pub fn cast_slice<T: 'static>(&self) -> Result<&[T], ObjectError> {
        self.get_slice::<T>()
            .ok_or_else(|| ObjectError::bad_cast::<[T]>(self.type_token()))
    }

    /// Text of a string holder.
    pub fn as_str(&self) -> Option<&str> {
        if self.is::<str>() {
            self.polymorphic_get::<str>()
        } else {
            None
        }
    }
}
