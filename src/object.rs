use crate::error::ObjectError;
use crate::holder::kinds::{Array, Callable, Erase, FlexArray, Poly, Scalar, Slice, Text};
use crate::holder::{Block, RawHolder};
use crate::token::TypeToken;
use crate::views::{Invoke, Signature};
use crate::Polymorphic;
use std::alloc;
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::mem::{self, ManuallyDrop};
use std::ptr::{self, NonNull};

/// A shared, type-erased value.
///
/// An `Object` is either empty or one strong reference to a heap holder.
/// Cloning adds a reference to the same holder; the value is dropped when the
/// last strong reference goes away. Equality and ordering compare holder
/// identity, never the values.
///
/// Only `Send + Sync` values can be stored, so an `Object` can be handed to
/// any thread. Reference count updates carry no ordering for the value
/// itself: publish objects to other threads through an
/// [`AtomicObject`](crate::AtomicObject) or another synchronizing channel.
pub struct Object {
    pub(crate) raw: Option<RawHolder>,
}

// SAFETY: every holder stores a `Send + Sync` value and its counts are atomic.
unsafe impl Send for Object {}
unsafe impl Sync for Object {}

fn or_alloc_error(result: Result<Object, ObjectError>) -> Object {
    match result {
        Ok(object) => object,
        Err(ObjectError::Alloc {
            layout: Some(layout),
            ..
        }) => alloc::handle_alloc_error(layout),
        Err(ObjectError::Alloc { len, layout: None }) => {
            panic!("holder capacity overflow: {} elements", len)
        }
        Err(other) => unreachable!("holder construction failed: {}", other),
    }
}

impl Object {
    /// An empty object.
    pub const fn null() -> Object {
        Object { raw: None }
    }

    fn build<K, H, E, F, G>(len: usize, head: F, tail: G) -> Result<Object, ObjectError>
    where
        K: Erase,
        F: FnOnce() -> H,
        G: FnMut(usize) -> E,
    {
        Block::<H, E>::try_new(K::VTABLE, len, false, head, tail)
            .map(|raw| Object { raw: Some(raw) })
    }

    /// Stores `value`.
    pub fn new<T: Send + Sync + 'static>(value: T) -> Object {
        Object::with(|| value)
    }

    /// Stores `value`, reporting allocation failure instead of aborting.
    pub fn try_new<T: Send + Sync + 'static>(value: T) -> Result<Object, ObjectError> {
        Object::build::<Scalar<T>, T, (), _, _>(0, || value, |_| ())
    }

    /// Builds the value directly inside the holder.
    pub fn with<T, F>(init: F) -> Object
    where
        T: Send + Sync + 'static,
        F: FnOnce() -> T,
    {
        or_alloc_error(Object::build::<Scalar<T>, T, (), _, _>(0, init, |_| ()))
    }

    /// Stores a value that answers [`polymorphic_cast`](Object::polymorphic_cast)
    /// for every type it provides.
    pub fn polymorphic<T: Polymorphic>(value: T) -> Object {
        or_alloc_error(Object::build::<Poly<T>, T, (), _, _>(0, || value, |_| ()))
    }

    /// Stores a callable invocable with signature `S`.
    pub fn function<S, F>(function: F) -> Object
    where
        S: Signature,
        F: Invoke<S> + 'static,
    {
        or_alloc_error(Object::build::<Callable<F, S>, F, (), _, _>(
            0,
            || function,
            |_| (),
        ))
    }

    /// Stores all elements of an array. Elements are dropped last to first.
    pub fn from_array<T: Send + Sync + 'static, const N: usize>(values: [T; N]) -> Object {
        let values = ManuallyDrop::new(values);
        let src = values.as_ptr();
        // SAFETY: each element is read exactly once, and only on success are
        // the originals forgotten.
        let result = Object::build::<Array<T, N>, (), T, _, _>(N, || (), |i| unsafe {
            ptr::read(src.add(i))
        });
        if result.is_err() {
            drop(ManuallyDrop::into_inner(values));
        }
        or_alloc_error(result)
    }

    /// Builds `[T; N]` from up to `N` sources, in index order. Slots left
    /// over once `sources` runs out hold `T::default()`.
    pub fn array_from_iter<T, I, const N: usize>(sources: I) -> Object
    where
        T: Default + Send + Sync + 'static,
        I: IntoIterator<Item = T>,
    {
        let mut sources = sources.into_iter();
        or_alloc_error(Object::build::<Array<T, N>, (), T, _, _>(N, || (), |_| {
            sources.next().unwrap_or_default()
        }))
    }

    /// `[T]` of `len` default values. The stored length is positive.
    pub fn slice<T: Default + Send + Sync + 'static>(len: usize) -> Object {
        or_alloc_error(Object::try_slice::<T>(len))
    }

    pub fn try_slice<T: Default + Send + Sync + 'static>(len: usize) -> Result<Object, ObjectError> {
        Object::build::<Slice<T>, (), T, _, _>(len, || (), |_| T::default())
    }

    /// `[T]` of `len` values produced by `init(index)`, in index order. The
    /// stored length is negative to record that the caller chose the values.
    pub fn slice_with<T, F>(len: usize, init: F) -> Object
    where
        T: Send + Sync + 'static,
        F: FnMut(usize) -> T,
    {
        or_alloc_error(Object::try_slice_with(len, init))
    }

    pub fn try_slice_with<T, F>(len: usize, init: F) -> Result<Object, ObjectError>
    where
        T: Send + Sync + 'static,
        F: FnMut(usize) -> T,
    {
        Block::<(), T>::try_new(<Slice<T> as Erase>::VTABLE, len, true, || (), init)
            .map(|raw| Object { raw: Some(raw) })
    }

    /// `[T]` taking over the elements of `values`.
    pub fn from_vec<T: Send + Sync + 'static>(values: Vec<T>) -> Object {
        let mut values = ManuallyDrop::new(values);
        let len = values.len();
        let src = values.as_ptr();
        // SAFETY: each element is read exactly once.
        let result = Object::build::<Slice<T>, (), T, _, _>(len, || (), |i| unsafe {
            ptr::read(src.add(i))
        });
        // SAFETY: on success the elements moved into the holder and only the
        // buffer is freed; on failure the vector is dropped whole.
        unsafe {
            if result.is_ok() {
                values.set_len(0);
            }
            ManuallyDrop::drop(&mut values);
        }
        or_alloc_error(result)
    }

    /// A copy of `text`, recoverable as `str`.
    pub fn string(text: &str) -> Object {
        let bytes = text.as_bytes();
        or_alloc_error(Object::build::<Text, (), u8, _, _>(bytes.len(), || (), |i| {
            bytes[i]
        }))
    }

    /// One `head` followed by `len` elements from `tail(index)`, in a single
    /// allocation. The head is built first and dropped last.
    pub fn flex<H, E, F>(head: H, len: usize, tail: F) -> Object
    where
        H: Send + Sync + 'static,
        E: Send + Sync + 'static,
        F: FnMut(usize) -> E,
    {
        or_alloc_error(Object::build::<FlexArray<H, E>, H, E, _, _>(len, || head, tail))
    }

    /// Replaces the held value with a new `T` and returns it.
    ///
    /// The previous holder is released after the new one is built.
    pub fn emplace<T: Send + Sync + 'static>(&mut self, value: T) -> &mut T {
        self.emplace_with(|| value)
    }

    pub fn emplace_with<T, F>(&mut self, init: F) -> &mut T
    where
        T: Send + Sync + 'static,
        F: FnOnce() -> T,
    {
        let previous = mem::replace(self, Object::with(init));
        drop(previous);
        match self.raw {
            // SAFETY: freshly built holder of type T; no other reference exists.
            Some(raw) => unsafe { &mut *raw.value_ptr().cast::<T>().as_ptr() },
            None => unreachable!(),
        }
    }

    pub fn is_null(&self) -> bool {
        self.raw.is_none()
    }

    /// Token of the stored type, or the null token when empty.
    pub fn type_token(&self) -> TypeToken {
        self.raw.map_or(TypeToken::null(), RawHolder::token)
    }

    /// Token of the call signature for objects built by [`Object::function`].
    pub fn signature(&self) -> Option<TypeToken> {
        self.raw
            .and_then(|raw| raw.vtable().signature)
            .map(|signature| signature())
    }

    /// Element count of array and flexible array holders, 0 otherwise.
    pub fn len(&self) -> usize {
        self.raw.map_or(0, RawHolder::len)
    }

    /// Element count with its construction sign, see [`Object::slice_with`].
    pub fn len_signed(&self) -> isize {
        self.raw.map_or(0, RawHolder::len_signed)
    }

    pub fn strong_count(&self) -> usize {
        self.raw.map_or(0, RawHolder::strong_count)
    }

    pub fn weak_count(&self) -> usize {
        self.raw.map_or(0, RawHolder::weak_count)
    }

    pub fn ptr_eq(&self, other: &Object) -> bool {
        self.raw == other.raw
    }

    pub fn swap(&mut self, other: &mut Object) {
        mem::swap(&mut self.raw, &mut other.raw)
    }

    /// Leaves this object empty and returns what it held.
    pub fn take(&mut self) -> Object {
        Object {
            raw: self.raw.take(),
        }
    }

    /// Gives up this strong reference as an opaque pointer, null when empty.
    ///
    /// The pointer must be passed back to [`Object::from_raw`] exactly once,
    /// or the value leaks.
    pub fn into_raw(self) -> *const () {
        let this = ManuallyDrop::new(self);
        this.raw.map_or(ptr::null(), |raw| raw.as_ptr() as *const ())
    }

    /// Re-adopts a strong reference given up by [`Object::into_raw`].
    ///
    /// # Safety
    /// `ptr` must come from `into_raw` and not have been re-adopted before.
    pub unsafe fn from_raw(ptr: *const ()) -> Object {
        Object {
            raw: NonNull::new(ptr as *mut ()).map(RawHolder::from_ptr),
        }
    }

    /// Head and elements of a holder built by [`Object::flex`].
    pub fn get_flex<H: 'static, E: 'static>(&self) -> Option<(&H, &[E])> {
        let raw = self.raw?;
        if raw.token() != TypeToken::of::<crate::Flex<H, E>>() {
            return None;
        }
        // SAFETY: token matched, head and `len` elements are initialized.
        unsafe {
            let head = &*Block::<H, E>::head(raw);
            let tail = std::slice::from_raw_parts(Block::<H, E>::tail(raw), raw.len());
            Some((head, tail))
        }
    }

    fn addr(&self) -> usize {
        self.raw.map_or(0, RawHolder::addr)
    }
}

impl Clone for Object {
    fn clone(&self) -> Object {
        if let Some(raw) = self.raw {
            // SAFETY: `self` owns a strong reference.
            unsafe { raw.retain() };
        }
        Object { raw: self.raw }
    }
}

impl Drop for Object {
    fn drop(&mut self) {
        if let Some(raw) = self.raw.take() {
            // SAFETY: this object owned the reference.
            unsafe { raw.release() };
        }
    }
}

impl Default for Object {
    fn default() -> Object {
        Object::null()
    }
}

impl PartialEq for Object {
    fn eq(&self, other: &Object) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for Object {}

impl PartialOrd for Object {
    fn partial_cmp(&self, other: &Object) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Object {
    fn cmp(&self, other: &Object) -> Ordering {
        self.addr().cmp(&other.addr())
    }
}

impl Hash for Object {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.addr().hash(state)
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.raw {
            None => f.write_str("Object(null)"),
            Some(raw) => f
                .debug_struct("Object")
                .field("type", &raw.token())
                .field("strong", &raw.strong_count())
                .finish(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::Object;
    use crate::{ObjectError, TypeToken};
    use std::panic::{self, AssertUnwindSafe};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    struct Witness {
        id: usize,
        live: Arc<AtomicUsize>,
        dropped: Arc<Mutex<Vec<usize>>>,
    }

    impl Drop for Witness {
        fn drop(&mut self) {
            self.live.fetch_sub(1, Ordering::SeqCst);
            self.dropped.lock().unwrap().push(self.id);
        }
    }

    #[derive(Default, Clone)]
    struct Witnesses {
        live: Arc<AtomicUsize>,
        dropped: Arc<Mutex<Vec<usize>>>,
    }

    impl Witnesses {
        fn make(&self, id: usize) -> Witness {
            self.live.fetch_add(1, Ordering::SeqCst);
            Witness {
                id,
                live: self.live.clone(),
                dropped: self.dropped.clone(),
            }
        }

        fn live(&self) -> usize {
            self.live.load(Ordering::SeqCst)
        }

        fn dropped(&self) -> Vec<usize> {
            self.dropped.lock().unwrap().clone()
        }
    }

    #[test]
    fn default_object_is_null() {
        let object = Object::default();
        assert!(object.is_null());
        assert_eq!(object.type_token(), TypeToken::null());
        assert_eq!(object.strong_count(), 0);
        assert_eq!(object, Object::null());
    }

    #[test]
    fn clone_shares_and_drop_releases() {
        let witnesses = Witnesses::default();
        let first = Object::new(witnesses.make(0));
        let second = first.clone();
        assert_eq!(first, second);
        assert_eq!(first.strong_count(), 2);
        assert_eq!(witnesses.live(), 1);

        drop(first);
        assert_eq!(second.strong_count(), 1);
        assert_eq!(witnesses.live(), 1);

        drop(second);
        assert_eq!(witnesses.live(), 0);
    }

    #[test]
    fn n_clones_destroy_once() {
        let witnesses = Witnesses::default();
        let object = Object::new(witnesses.make(7));
        let clones: Vec<Object> = (0..16).map(|_| object.clone()).collect();
        assert_eq!(object.strong_count(), 17);
        drop(clones);
        assert_eq!(witnesses.live(), 1);
        drop(object);
        assert_eq!(witnesses.dropped(), vec![7]);
    }

    #[test]
    fn emplace_releases_previous_value() {
        let witnesses = Witnesses::default();
        let mut object = Object::new(witnesses.make(1));
        let value = object.emplace(5u32);
        *value += 1;
        assert_eq!(witnesses.live(), 0);
        assert_eq!(object.get::<u32>(), Some(&6));
    }

    #[test]
    fn array_drops_back_to_front() {
        let witnesses = Witnesses::default();
        let object = Object::from_array([witnesses.make(0), witnesses.make(1), witnesses.make(2)]);
        assert_eq!(object.len(), 3);
        assert_eq!(witnesses.live(), 3);
        drop(object);
        assert_eq!(witnesses.dropped(), vec![2, 1, 0]);
    }

    #[test]
    fn panicking_element_rolls_back() {
        let witnesses = Witnesses::default();
        let inner = witnesses.clone();
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            Object::slice_with(4, |i| {
                if i == 2 {
                    panic!("element {} refused", i);
                }
                inner.make(i)
            })
        }));
        assert!(result.is_err());
        assert_eq!(witnesses.live(), 0);
        assert_eq!(witnesses.dropped(), vec![1, 0]);
    }

    #[test]
    fn flex_builds_head_first_and_drops_it_last() {
        let witnesses = Witnesses::default();
        let object = Object::flex(witnesses.make(100), 2, |i| witnesses.make(i));
        let (head, tail) = object.get_flex::<Witness, Witness>().unwrap();
        assert_eq!(head.id, 100);
        assert_eq!(tail.iter().map(|p| p.id).collect::<Vec<_>>(), vec![0, 1]);
        drop(object);
        assert_eq!(witnesses.dropped(), vec![1, 0, 100]);
    }

    #[test]
    fn raw_round_trip_keeps_the_reference() {
        let object = Object::new(3i64);
        let witness = object.clone();
        let raw = object.into_raw();
        assert_eq!(witness.strong_count(), 2);
        let object = unsafe { Object::from_raw(raw) };
        assert_eq!(object, witness);
        assert!(unsafe { Object::from_raw(Object::null().into_raw()) }.is_null());
    }

    #[test]
    fn identity_ordering() {
        let a = Object::new(1);
        let b = Object::new(1);
        assert_ne!(a, b);
        assert_eq!(a.cmp(&a.clone()), std::cmp::Ordering::Equal);
        assert!(Object::null() < a);
    }

    #[test]
    fn oversized_slice_lengths_are_refused() {
        let built = AtomicUsize::new(0);
        let lens = [usize::MAX, usize::MAX - 1, isize::MAX as usize + 1];
        for &len in lens.iter() {
            assert!(matches!(
                Object::try_slice::<u8>(len),
                Err(ObjectError::Alloc { len: refused, layout: None }) if refused == len
            ));
            assert!(matches!(
                Object::try_slice::<()>(len),
                Err(ObjectError::Alloc { layout: None, .. })
            ));
            let result = Object::try_slice_with(len, |_| {
                built.fetch_add(1, Ordering::SeqCst);
                0u8
            });
            assert!(matches!(result, Err(ObjectError::Alloc { layout: None, .. })));
        }
        assert_eq!(built.load(Ordering::SeqCst), 0);

        let result = panic::catch_unwind(|| Object::slice_with(usize::MAX - 1, |_| 0u8));
        assert!(result.is_err());
    }
}
