//! Vtables for the closed set of holder kinds.
use super::{Block, RawHolder, VTable};
use crate::cast::{Demand, Polymorphic};
use crate::token::TypeToken;
use crate::views::{Flex, Invoke, Signature};
use std::marker::PhantomData;
use std::ptr::NonNull;
use std::{slice, str};

pub(crate) trait Erase {
    const VTABLE: &'static VTable;
}

/// A single value.
pub(crate) struct Scalar<T>(PhantomData<T>);
/// A single value that answers polymorphic casts through [`Polymorphic`].
pub(crate) struct Poly<T>(PhantomData<T>);
/// A callable value invocable with signature `S`.
pub(crate) struct Callable<F, S>(PhantomData<(F, S)>);
/// `[T; N]`, stored as a tail so it drops back to front.
pub(crate) struct Array<T, const N: usize>(PhantomData<T>);
/// `[T]` with its length fixed at creation.
pub(crate) struct Slice<T>(PhantomData<T>);
/// UTF-8 bytes.
pub(crate) struct Text;
/// One `H` followed by a run of `E`.
pub(crate) struct FlexArray<H, E>(PhantomData<(H, E)>);

unsafe fn head_of<H, E>(raw: RawHolder) -> NonNull<u8> {
    NonNull::new_unchecked(Block::<H, E>::head(raw) as *mut u8)
}

unsafe fn tail_of<E>(raw: RawHolder) -> NonNull<u8> {
    NonNull::new_unchecked(Block::<(), E>::tail(raw) as *mut u8)
}

unsafe fn elements<'a, E>(raw: RawHolder) -> &'a [E] {
    slice::from_raw_parts(Block::<(), E>::tail(raw), raw.len())
}

unsafe fn provide_scalar<T: Sync + 'static>(raw: RawHolder, demand: &mut Demand<'_, '_>) {
    demand.provide::<T>(&*Block::<T, ()>::head(raw));
}

unsafe fn provide_poly<T: Polymorphic>(raw: RawHolder, demand: &mut Demand<'_, '_>) {
    let value = &*Block::<T, ()>::head(raw);
    demand.provide::<T>(value);
    value.provide(demand);
}

unsafe fn provide_callable<F, S>(raw: RawHolder, demand: &mut Demand<'_, '_>)
where
    F: Invoke<S> + 'static,
    S: Signature,
{
    let value = &*Block::<F, ()>::head(raw);
    demand.provide::<F>(value);
    demand.provide::<dyn Invoke<S>>(value);
}

unsafe fn provide_array<T: Sync + 'static, const N: usize>(raw: RawHolder, demand: &mut Demand<'_, '_>) {
    let items = elements::<T>(raw);
    demand.provide::<[T; N]>(&*(items.as_ptr() as *const [T; N]));
    demand.provide::<[T]>(items);
}

unsafe fn provide_slice<T: Sync + 'static>(raw: RawHolder, demand: &mut Demand<'_, '_>) {
    demand.provide::<[T]>(elements::<T>(raw));
}

unsafe fn provide_text(raw: RawHolder, demand: &mut Demand<'_, '_>) {
    let bytes = elements::<u8>(raw);
    demand.provide::<str>(str::from_utf8_unchecked(bytes));
    demand.provide::<[u8]>(bytes);
}

unsafe fn provide_flex<H: Sync + 'static, E>(raw: RawHolder, demand: &mut Demand<'_, '_>) {
    demand.provide::<H>(&*Block::<H, E>::head(raw));
}

impl<T: Send + Sync + 'static> Erase for Scalar<T> {
    const VTABLE: &'static VTable = &VTable {
        token: TypeToken::of::<T>,
        signature: None,
        element: None,
        value: head_of::<T, ()>,
        destroy: Block::<T, ()>::destroy,
        dealloc: Block::<T, ()>::dealloc,
        provide: provide_scalar::<T>,
    };
}

impl<T: Polymorphic> Erase for Poly<T> {
    const VTABLE: &'static VTable = &VTable {
        token: TypeToken::of::<T>,
        signature: None,
        element: None,
        value: head_of::<T, ()>,
        destroy: Block::<T, ()>::destroy,
        dealloc: Block::<T, ()>::dealloc,
        provide: provide_poly::<T>,
    };
}

impl<F, S> Erase for Callable<F, S>
where
    F: Invoke<S> + 'static,
    S: Signature,
{
    const VTABLE: &'static VTable = &VTable {
        token: TypeToken::of::<F>,
        signature: Some(TypeToken::of::<S>),
        element: None,
        value: head_of::<F, ()>,
        destroy: Block::<F, ()>::destroy,
        dealloc: Block::<F, ()>::dealloc,
        provide: provide_callable::<F, S>,
    };
}

impl<T: Send + Sync + 'static, const N: usize> Erase for Array<T, N> {
    const VTABLE: &'static VTable = &VTable {
        token: TypeToken::of::<[T; N]>,
        signature: None,
        element: Some(TypeToken::of::<T>),
        value: tail_of::<T>,
        destroy: Block::<(), T>::destroy,
        dealloc: Block::<(), T>::dealloc,
        provide: provide_array::<T, N>,
    };
}

impl<T: Send + Sync + 'static> Erase for Slice<T> {
    const VTABLE: &'static VTable = &VTable {
        token: TypeToken::of::<[T]>,
        signature: None,
        element: Some(TypeToken::of::<T>),
        value: tail_of::<T>,
        destroy: Block::<(), T>::destroy,
        dealloc: Block::<(), T>::dealloc,
        provide: provide_slice::<T>,
    };
}

impl Erase for Text {
    const VTABLE: &'static VTable = &VTable {
        token: TypeToken::of::<str>,
        signature: None,
        element: None,
        value: tail_of::<u8>,
        destroy: Block::<(), u8>::destroy,
        dealloc: Block::<(), u8>::dealloc,
        provide: provide_text,
    };
}

impl<H, E> Erase for FlexArray<H, E>
where
    H: Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    const VTABLE: &'static VTable = &VTable {
        token: TypeToken::of::<Flex<H, E>>,
        signature: None,
        element: None,
        value: head_of::<H, E>,
        destroy: Block::<H, E>::destroy,
        dealloc: Block::<H, E>::dealloc,
        provide: provide_flex::<H, E>,
    };
}
