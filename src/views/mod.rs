//! Typed wrappers over [`Object`](crate::Object) for the derived storage kinds.
mod function;
mod string;
mod vec;

pub use function::ObjectFn;
pub use string::ObjectStr;
pub use vec::ObjectVec;

use parking_lot::{Mutex, MutexGuard};
use std::marker::PhantomData;

/// A call signature, written as a function pointer type: `fn(A, B) -> R`.
///
/// Implemented for functions of up to four arguments.
pub trait Signature: Sized + 'static {
    /// Arguments as a tuple.
    type Args;
    type Output;
}

/// A value callable with signature `S`.
///
/// Every `Fn + Send + Sync` closure or function implements the matching
/// `Invoke`, and so does a [`Stateful`] wrapping an `FnMut + Send` one.
pub trait Invoke<S: Signature>: Send + Sync {
    fn invoke(&self, args: S::Args) -> S::Output;
}

/// A callable whose state changes from call to call.
///
/// Calls through shared references are serialized by a lock, so every clone
/// of the holding object observes the same state. A callable that calls
/// itself again deadlocks.
///
/// ```
/// use erased_object::{ObjectFn, Stateful};
///
/// let mut seed = 0;
/// let next = ObjectFn::<fn() -> i32>::new(Stateful::new(move || {
///     seed += 1;
///     seed
/// }));
/// let shared = next.clone();
/// assert_eq!(next.call(()), Ok(1));
/// assert_eq!(shared.call(()), Ok(2));
/// ```
pub struct Stateful<F> {
    function: Mutex<F>,
}

impl<F> Stateful<F> {
    pub fn new(function: F) -> Self {
        Stateful {
            function: Mutex::new(function),
        }
    }

    /// Exclusive access to the callable and its state between calls.
    pub fn lock(&self) -> MutexGuard<'_, F> {
        self.function.lock()
    }

    pub fn into_inner(self) -> F {
        self.function.into_inner()
    }
}

macro_rules! signature {
    ($($arg:ident),*) => {
        impl<R: 'static, $($arg: 'static),*> Signature for fn($($arg),*) -> R {
            type Args = ($($arg,)*);
            type Output = R;
        }

        impl<Func, R: 'static, $($arg: 'static),*> Invoke<fn($($arg),*) -> R> for Func
        where
            Func: Fn($($arg),*) -> R + Send + Sync,
        {
            #[allow(non_snake_case)]
            fn invoke(&self, ($($arg,)*): ($($arg,)*)) -> R {
                self($($arg),*)
            }
        }

        impl<Func, R: 'static, $($arg: 'static),*> Invoke<fn($($arg),*) -> R> for Stateful<Func>
        where
            Func: FnMut($($arg),*) -> R + Send,
        {
            #[allow(non_snake_case)]
            fn invoke(&self, ($($arg,)*): ($($arg,)*)) -> R {
                let mut function = self.function.lock();
                (*function)($($arg),*)
            }
        }
    };
}

signature!();
signature!(A);
signature!(A, B);
signature!(A, B, C);
signature!(A, B, C, D);

/// Type tag for holders built by [`Object::flex`](crate::Object::flex): one `H`
/// followed by a run of `E` in the same allocation.
pub struct Flex<H, E>(PhantomData<(H, E)>);

#[cfg(test)]
mod test {
    use super::{Invoke, Signature, Stateful};

    fn call<S: Signature, F: Invoke<S>>(f: &F, args: S::Args) -> S::Output {
        f.invoke(args)
    }

    #[test]
    fn closures_invoke_through_tuples() {
        let zero = || 7;
        let two = |a: i32, b: i32| a * b;
        let four = |a: u8, b: u8, c: u8, d: u8| [a, b, c, d];
        assert_eq!(call::<fn() -> i32, _>(&zero, ()), 7);
        assert_eq!(call::<fn(i32, i32) -> i32, _>(&two, (6, 7)), 42);
        assert_eq!(
            call::<fn(u8, u8, u8, u8) -> [u8; 4], _>(&four, (1, 2, 3, 4)),
            [1, 2, 3, 4]
        );
    }

    #[test]
    fn stateful_closures_advance_between_calls() {
        let mut seed = 10;
        let counter = Stateful::new(move |step: i32| {
            seed += step;
            seed
        });
        assert_eq!(call::<fn(i32) -> i32, _>(&counter, (1,)), 11);
        assert_eq!(call::<fn(i32) -> i32, _>(&counter, (5,)), 16);
    }

    #[test]
    fn stateful_state_is_reachable_between_calls() {
        struct Ticker {
            ticks: u32,
        }

        let ticker = Stateful::new(Ticker { ticks: 0 });
        ticker.lock().ticks = 3;
        assert_eq!(ticker.into_inner().ticks, 3);
    }
}
