use super::{Header, RawHolder, VTable};
use crate::error::ObjectError;
use std::alloc::{self, Layout};
use std::convert::TryFrom;
use std::marker::PhantomData;
use std::mem;
use std::ptr::{self, NonNull};

const fn align_up(offset: usize, align: usize) -> usize {
    (offset + align - 1) & !(align - 1)
}

const fn max(a: usize, b: usize) -> usize {
    if a > b {
        a
    } else {
        b
    }
}

/// Allocation shape `Header | head: H | tail: [E; n]`.
///
/// Scalars use `Block<T, ()>` with an empty tail, arrays `Block<(), T>`, and
/// flexible array members the general form. The block is aligned to the
/// strictest of the three parts, so the header can always be recovered from
/// the head or tail address by a fixed offset.
pub(crate) struct Block<H, E>(PhantomData<(H, E)>);

impl<H, E> Block<H, E> {
    const HEAD: usize = align_up(mem::size_of::<Header>(), mem::align_of::<H>());
    const TAIL: usize = align_up(Self::HEAD + mem::size_of::<H>(), mem::align_of::<E>());
    const ALIGN: usize = max(
        mem::align_of::<Header>(),
        max(mem::align_of::<H>(), mem::align_of::<E>()),
    );

    fn layout(len: usize) -> Option<Layout> {
        let size = mem::size_of::<E>()
            .checked_mul(len)?
            .checked_add(Self::TAIL)?;
        Layout::from_size_align(size, Self::ALIGN)
            .ok()
            .map(|layout| layout.pad_to_align())
    }

    #[inline]
    pub(crate) fn head(raw: RawHolder) -> *mut H {
        (raw.as_ptr() as *mut u8).wrapping_add(Self::HEAD) as *mut H
    }

    #[inline]
    pub(crate) fn tail(raw: RawHolder) -> *mut E {
        (raw.as_ptr() as *mut u8).wrapping_add(Self::TAIL) as *mut E
    }

    /// Allocates a block for `len` tail elements and builds it in place:
    /// head first, then the tail in index order. The stored length is
    /// negated when `caller_built` is set. A panic while building drops what
    /// was built, in reverse, and frees the block before unwinding further.
    pub(crate) fn try_new<F, G>(
        vtable: &'static VTable,
        len: usize,
        caller_built: bool,
        head: F,
        mut tail: G,
    ) -> Result<RawHolder, ObjectError>
    where
        F: FnOnce() -> H,
        G: FnMut(usize) -> E,
    {
        let (signed, layout) = match (isize::try_from(len), Self::layout(len)) {
            (Ok(signed), Some(layout)) => (signed, layout),
            _ => {
                tracing::debug!(len, "holder size overflows");
                return Err(ObjectError::Alloc { len, layout: None });
            }
        };
        let signed = if caller_built { -signed } else { signed };
        // SAFETY: the layout is never zero sized, it always holds a header.
        let ptr = match NonNull::new(unsafe { alloc::alloc(layout) } as *mut Header) {
            Some(ptr) => ptr,
            None => {
                tracing::debug!(size = layout.size(), align = layout.align(), "holder allocation failed");
                return Err(ObjectError::Alloc {
                    len,
                    layout: Some(layout),
                });
            }
        };
        // SAFETY: freshly allocated and suitably aligned for the header.
        unsafe { ptr.as_ptr().write(Header::new(signed, vtable)) };
        let raw = RawHolder(ptr);

        let mut rollback = Rollback::<H, E> {
            raw,
            layout,
            head: false,
            built: 0,
            _marker: PhantomData,
        };
        // SAFETY: every write targets a distinct, in-bounds, aligned slot.
        unsafe {
            Self::head(raw).write(head());
            rollback.head = true;
            let base = Self::tail(raw);
            for i in 0..len {
                base.add(i).write(tail(i));
                rollback.built += 1;
            }
        }
        mem::forget(rollback);
        Ok(raw)
    }

    /// Drops the tail in reverse order, then the head.
    ///
    /// # Safety
    /// Called once, when the strong count reaches zero.
    pub(crate) unsafe fn destroy(raw: RawHolder) {
        let base = Self::tail(raw);
        for i in (0..raw.len()).rev() {
            ptr::drop_in_place(base.add(i));
        }
        ptr::drop_in_place(Self::head(raw));
    }

    /// # Safety
    /// Called once, when the weak count reaches zero.
    pub(crate) unsafe fn dealloc(raw: RawHolder) {
        if let Some(layout) = Self::layout(raw.len()) {
            alloc::dealloc(raw.as_ptr() as *mut u8, layout);
        }
    }
}

struct Rollback<H, E> {
    raw: RawHolder,
    layout: Layout,
    head: bool,
    built: usize,
    _marker: PhantomData<(H, E)>,
}

impl<H, E> Drop for Rollback<H, E> {
    fn drop(&mut self) {
        tracing::debug!(built = self.built, head = self.head, "holder construction unwound");
        // SAFETY: only the parts recorded as built are dropped.
        unsafe {
            let base = Block::<H, E>::tail(self.raw);
            for i in (0..self.built).rev() {
                ptr::drop_in_place(base.add(i));
            }
            if self.head {
                ptr::drop_in_place(Block::<H, E>::head(self.raw));
            }
            alloc::dealloc(self.raw.as_ptr() as *mut u8, self.layout);
        }
    }
}
