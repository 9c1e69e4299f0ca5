//! Type-erased storage shared by every object flavor.
//!
//! A holder is one heap block laid out as `Header | head | tail[..]`. The
//! header carries the strong and weak counts and a pointer to a static
//! vtable that knows the concrete type hidden behind the block.
mod block;
pub(crate) mod kinds;

pub(crate) use block::Block;

use crate::cast::Demand;
use crate::token::TypeToken;
use parking_lot_core::DEFAULT_UNPARK_TOKEN;
use std::mem;
use std::process;
use std::ptr::NonNull;
use std::sync::atomic::{self, AtomicUsize, Ordering};

/// Counts above this are treated as a leak and abort, like `std::sync::Arc`.
const MAX_REFCOUNT: usize = isize::MAX as usize;

#[repr(C)]
pub(crate) struct Header {
    /// Owning references. The value is dropped when this reaches zero.
    strong: AtomicUsize,
    /// Weak references plus one shared by all strong owners while strong > 0.
    weak: AtomicUsize,
    /// Threads blocked in `WeakObject::wait_expired`.
    sleepers: AtomicUsize,
    /// Signed tail length. Negative when the tail was built by a caller closure.
    len: isize,
    vtable: &'static VTable,
}

// The low two bits of a holder address are always free.
const _: () = assert!(mem::align_of::<Header>() >= 4);

impl Header {
    fn new(len: isize, vtable: &'static VTable) -> Self {
        Header {
            strong: AtomicUsize::new(1),
            weak: AtomicUsize::new(1),
            sleepers: AtomicUsize::new(0),
            len,
            vtable,
        }
    }
}

/// Per-kind dispatch table. One static instance exists per erased kind.
pub(crate) struct VTable {
    pub(crate) token: fn() -> TypeToken,
    /// Token of the call signature, for callable holders.
    pub(crate) signature: Option<fn() -> TypeToken>,
    /// Token of the element type, for array holders.
    pub(crate) element: Option<fn() -> TypeToken>,
    /// Address of the value: the head, or the first element for arrays.
    pub(crate) value: unsafe fn(RawHolder) -> NonNull<u8>,
    pub(crate) destroy: unsafe fn(RawHolder),
    pub(crate) dealloc: unsafe fn(RawHolder),
    pub(crate) provide: unsafe fn(RawHolder, &mut Demand<'_, '_>),
}

/// Untyped handle to a live holder. Copying it does not touch the counts.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub(crate) struct RawHolder(NonNull<Header>);

impl RawHolder {
    pub(crate) fn from_ptr(ptr: NonNull<()>) -> Self {
        RawHolder(ptr.cast())
    }

    pub(crate) fn as_ptr(self) -> *mut () {
        self.0.as_ptr() as *mut ()
    }

    pub(crate) fn addr(self) -> usize {
        self.0.as_ptr() as usize
    }

    #[inline]
    fn header<'a>(self) -> &'a Header {
        // SAFETY: a RawHolder only exists while its allocation is live.
        unsafe { self.0.as_ref() }
    }

    #[inline]
    pub(crate) fn vtable(self) -> &'static VTable {
        self.header().vtable
    }

    pub(crate) fn token(self) -> TypeToken {
        (self.vtable().token)()
    }

    pub(crate) fn len_signed(self) -> isize {
        self.header().len
    }

    pub(crate) fn len(self) -> usize {
        self.header().len.unsigned_abs()
    }

    /// # Safety
    /// The value must not have been destroyed yet.
    pub(crate) unsafe fn value_ptr(self) -> NonNull<u8> {
        (self.vtable().value)(self)
    }

    pub(crate) fn strong_count(self) -> usize {
        self.header().strong.load(Ordering::Acquire)
    }

    pub(crate) fn weak_count(self) -> usize {
        let header = self.header();
        let weak = header.weak.load(Ordering::Acquire);
        if header.strong.load(Ordering::Acquire) == 0 {
            weak
        } else {
            weak - 1
        }
    }

    /// True when the caller's strong reference is the only reference of any kind.
    pub(crate) fn is_unique(self) -> bool {
        let header = self.header();
        header.weak.load(Ordering::Acquire) == 1 && header.strong.load(Ordering::Acquire) == 1
    }

    /// Adds a strong reference.
    ///
    /// # Safety
    /// The caller must already own a strong reference.
    pub(crate) unsafe fn retain(self) {
        if self.header().strong.fetch_add(1, Ordering::Relaxed) > MAX_REFCOUNT {
            process::abort();
        }
    }

    /// Adds a strong reference unless the value is already gone.
    ///
    /// Strong never climbs back from zero: this is the only path from a weak
    /// reference to a strong one and it refuses zero.
    pub(crate) fn try_retain(self) -> bool {
        let strong = &self.header().strong;
        let mut current = strong.load(Ordering::Relaxed);
        loop {
            if current == 0 {
                return false;
            }
            if current > MAX_REFCOUNT {
                process::abort();
            }
            match strong.compare_exchange_weak(
                current,
                current + 1,
                Ordering::Acquire,
                Ordering::Relaxed,
            ) {
                Ok(_) => return true,
                Err(observed) => current = observed,
            }
        }
    }

    /// Drops a strong reference, destroying the value on the last one.
    ///
    /// # Safety
    /// The caller must own the strong reference being released.
    pub(crate) unsafe fn release(self) {
        {
            let header = self.header();
            if header.strong.fetch_sub(1, Ordering::Release) != 1 {
                return;
            }
            // Pairs with the Release decrements of the other owners and with
            // the sleeper registration in `wait_expired`.
            atomic::fence(Ordering::SeqCst);
            (header.vtable.destroy)(self);
            if header.sleepers.load(Ordering::Relaxed) != 0 {
                let woken = parking_lot_core::unpark_all(self.expiry_key(), DEFAULT_UNPARK_TOKEN);
                tracing::trace!(woken, "value destroyed, waking expiry waiters");
            }
        }
        self.release_weak();
    }

    /// # Safety
    /// The caller must own a strong or weak reference.
    pub(crate) unsafe fn retain_weak(self) {
        if self.header().weak.fetch_add(1, Ordering::Relaxed) > MAX_REFCOUNT {
            process::abort();
        }
    }

    /// Drops a weak reference, freeing the block on the last one.
    ///
    /// # Safety
    /// The caller must own the weak reference being released.
    pub(crate) unsafe fn release_weak(self) {
        let dealloc = {
            let header = self.header();
            if header.weak.fetch_sub(1, Ordering::Release) != 1 {
                return;
            }
            header.vtable.dealloc
        };
        atomic::fence(Ordering::Acquire);
        dealloc(self);
    }

    fn expiry_key(self) -> usize {
        &self.header().strong as *const AtomicUsize as usize
    }

    /// Blocks until the strong count is zero.
    ///
    /// # Safety
    /// The caller must own a weak reference for the whole call.
    pub(crate) unsafe fn wait_expired(self) {
        let header = self.header();
        header.sleepers.fetch_add(1, Ordering::SeqCst);
        while header.strong.load(Ordering::SeqCst) != 0 {
            tracing::trace!("parking until value expires");
            parking_lot_core::park(
                self.expiry_key(),
                || header.strong.load(Ordering::SeqCst) != 0,
                || {},
                |_, _| {},
                parking_lot_core::DEFAULT_PARK_TOKEN,
                None,
            );
        }
        header.sleepers.fetch_sub(1, Ordering::Relaxed);
    }
}
