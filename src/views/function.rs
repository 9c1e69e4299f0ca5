use super::{Invoke, Signature};
use crate::error::ObjectError;
use crate::object::Object;
use crate::token::TypeToken;
use std::fmt;
use std::marker::PhantomData;

/// A shared, type-erased callable with signature `S`.
///
/// ```
/// use erased_object::ObjectFn;
///
/// let add = ObjectFn::<fn(i32, i32) -> i32>::new(|a: i32, b: i32| a + b);
/// let shared = add.clone();
/// assert_eq!(shared.call((2, 3)), Ok(5));
/// assert!(ObjectFn::<fn(i32, i32) -> i32>::empty().call((2, 3)).is_err());
/// ```
pub struct ObjectFn<S: Signature> {
    object: Object,
    _signature: PhantomData<S>,
}

impl<S: Signature> ObjectFn<S> {
    pub fn new<F: Invoke<S> + 'static>(function: F) -> Self {
        ObjectFn {
            object: Object::function::<S, F>(function),
            _signature: PhantomData,
        }
    }

    /// A wrapper holding nothing. Calling it fails with `NotInvocable`.
    pub fn empty() -> Self {
        ObjectFn {
            object: Object::null(),
            _signature: PhantomData,
        }
    }

    /// Wraps `object` if it is empty or holds a callable for `S`.
    pub fn from_object(object: Object) -> Result<Self, ObjectError> {
        if object.is_null() || object.signature() == Some(TypeToken::of::<S>()) {
            Ok(ObjectFn {
                object,
                _signature: PhantomData,
            })
        } else {
            Err(ObjectError::NotInvocable {
                expected: TypeToken::of::<S>(),
                found: object.type_token(),
            })
        }
    }

    /// Replaces the callable. Other clones keep the previous one.
    pub fn set<F: Invoke<S> + 'static>(&mut self, function: F) {
        self.object = Object::function::<S, F>(function);
    }

    pub fn call(&self, args: S::Args) -> Result<S::Output, ObjectError> {
        match self.object.polymorphic_get::<dyn Invoke<S>>() {
            Some(function) => Ok(function.invoke(args)),
            None => Err(ObjectError::NotInvocable {
                expected: TypeToken::of::<S>(),
                found: self.object.type_token(),
            }),
        }
    }

    pub fn is_invocable(&self) -> bool {
        !self.object.is_null()
    }

    pub fn signature(&self) -> TypeToken {
        TypeToken::of::<S>()
    }

    pub fn object(&self) -> &Object {
        &self.object
    }

    pub fn into_object(self) -> Object {
        self.object
    }
}

impl<S: Signature> Clone for ObjectFn<S> {
    fn clone(&self) -> Self {
        ObjectFn {
            object: self.object.clone(),
            _signature: PhantomData,
        }
    }
}

impl<S: Signature> Default for ObjectFn<S> {
    fn default() -> Self {
        ObjectFn::empty()
    }
}

impl<S: Signature> PartialEq<Object> for ObjectFn<S> {
    fn eq(&self, other: &Object) -> bool {
        self.object == *other
    }
}

impl<S: Signature> From<ObjectFn<S>> for Object {
    fn from(function: ObjectFn<S>) -> Object {
        function.object
    }
}

impl<S: Signature> fmt::Debug for ObjectFn<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectFn")
            .field("signature", &TypeToken::of::<S>())
            .field("object", &self.object)
            .finish()
    }
}

#[cfg(test)]
mod test {
    use super::ObjectFn;
    use crate::{Object, ObjectError, TypeToken};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn clones_share_one_callable() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let f = ObjectFn::<fn() -> usize>::new(move || counter.fetch_add(1, Ordering::SeqCst) + 1);
        let g = f.clone();
        assert_eq!(f.call(()), Ok(1));
        assert_eq!(g.call(()), Ok(2));
        assert_eq!(g, *f.object());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn set_detaches_from_clones() {
        let mut f = ObjectFn::<fn(i32) -> i32>::new(|x: i32| x + 1);
        let g = f.clone();
        f.set(|x: i32| x * 10);
        assert_eq!(f.call((3,)), Ok(30));
        assert_eq!(g.call((3,)), Ok(4));
    }

    #[test]
    fn wrong_signature_is_not_invocable() {
        let object = Object::function::<fn(i32) -> i32, _>(|x: i32| x);
        assert!(ObjectFn::<fn(i32) -> i32>::from_object(object.clone()).is_ok());
        match ObjectFn::<fn(u8) -> u8>::from_object(object) {
            Err(ObjectError::NotInvocable { expected, .. }) => {
                assert_eq!(expected, TypeToken::of::<fn(u8) -> u8>())
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(ObjectFn::<fn(u8) -> u8>::from_object(Object::new(1u8)).is_err());
    }

    #[test]
    fn empty_wrapper() {
        let f = ObjectFn::<fn()>::default();
        assert!(!f.is_invocable());
        assert_eq!(
            f.call(()),
            Err(ObjectError::NotInvocable {
                expected: TypeToken::of::<fn()>(),
                found: TypeToken::null(),
            })
        );
    }
}
