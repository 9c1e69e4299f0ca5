use crate::error::ObjectError;
use crate::object::Object;
use std::fmt;
use std::iter::FromIterator;
use std::marker::PhantomData;
use std::ops::Deref;
use std::slice;

/// A shared, fixed-length sequence of `T` behind an [`Object`].
///
/// Works over any holder whose elements are `T`: `[T]` built by
/// [`Object::slice`] and friends, or `[T; N]` built by [`Object::from_array`].
pub struct ObjectVec<T> {
    object: Object,
    _element: PhantomData<T>,
}

impl<T: Send + Sync + 'static> ObjectVec<T> {
    pub fn new() -> Self {
        ObjectVec {
            object: Object::null(),
            _element: PhantomData,
        }
    }

    /// `len` default values.
    pub fn with_len(len: usize) -> Self
    where
        T: Default,
    {
        ObjectVec {
            object: Object::slice::<T>(len),
            _element: PhantomData,
        }
    }

    pub fn from_vec(values: Vec<T>) -> Self {
        ObjectVec {
            object: Object::from_vec(values),
            _element: PhantomData,
        }
    }

    /// Views `object` as a sequence of `T`. An empty object views as an empty
    /// sequence.
    pub fn try_from_object(object: Object) -> Result<Self, ObjectError> {
        if object.is_null() || object.get_slice::<T>().is_some() {
            Ok(ObjectVec {
                object,
                _element: PhantomData,
            })
        } else {
            Err(ObjectError::bad_cast::<[T]>(object.type_token()))
        }
    }

    pub fn as_slice(&self) -> &[T] {
        self.object.get_slice::<T>().unwrap_or(&[])
    }

    /// Mutable elements while no other reference to the storage exists.
    pub fn get_mut(&mut self) -> Option<&mut [T]> {
        if self.object.is_null() {
            return Some(&mut []);
        }
        self.object.get_slice_mut::<T>()
    }

    pub fn object(&self) -> &Object {
        &self.object
    }

    pub fn into_object(self) -> Object {
        self.object
    }
}

impl<T: Send + Sync + 'static> Deref for ObjectVec<T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        self.as_slice()
    }
}

impl<T> Clone for ObjectVec<T> {
    fn clone(&self) -> Self {
        ObjectVec {
            object: self.object.clone(),
            _element: PhantomData,
        }
    }
}

impl<T: Send + Sync + 'static> Default for ObjectVec<T> {
    fn default() -> Self {
        ObjectVec::new()
    }
}

impl<T: Send + Sync + 'static> From<Vec<T>> for ObjectVec<T> {
    fn from(values: Vec<T>) -> Self {
        ObjectVec::from_vec(values)
    }
}

impl<T: Send + Sync + 'static> FromIterator<T> for ObjectVec<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        ObjectVec::from_vec(iter.into_iter().collect())
    }
}

impl<'a, T: Send + Sync + 'static> IntoIterator for &'a ObjectVec<T> {
    type Item = &'a T;
    type IntoIter = slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.as_slice().iter()
    }
}

impl<T: fmt::Debug + Send + Sync + 'static> fmt::Debug for ObjectVec<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}
