//! # Shared Type-Erased Objects
//!
//!  An [`Object`] holds one value of any `Send + Sync` type behind a reference
//!  counted heap block, together with a token that identifies the stored type.
//!  Copies share the value; the last strong owner drops it. The type is
//!  recovered at runtime by exact cast, by unchecked cast, or by polymorphic
//!  cast through the views a value declares for itself.
//!
//! ## Features
//!  * Single allocation - the counts, the type's vtable and the value live in one block,
//!    including arrays and a value followed by a trailing array.
//!  * Weak references - [`WeakObject`] observes a value without keeping it alive and
//!    promotes back to a strong reference only while the value exists.
//!  * Atomic slot - [`AtomicObject`] lets many threads load, store and compare-exchange
//!    one object, and doubles as a lock with a condition variable.
//!  * Views - [`ObjectFn`], [`ObjectVec`] and [`ObjectStr`] type the common derived kinds.
//!
//! ## Errors
//!
//! Casts come in pairs. The `get*` forms return an **Option** and never fail
//! hard; the `cast*` forms return a **Result** carrying an [`ObjectError`]
//! that names the requested and the stored type.
//!
//! # Examples
//!
//! ## Exact and polymorphic casts
//!
//! ```rust
//! use erased_object::{Demand, Object, Polymorphic};
//!
//! let number = Object::new(2i32);
//! assert_eq!(number.get::<i32>(), Some(&2));
//! assert!(number.cast::<f32>().is_err());
//!
//! trait Named: Send + Sync {
//!     fn name(&self) -> &str;
//! }
//!
//! struct Dog;
//!
//! impl Named for Dog {
//!     fn name(&self) -> &str {
//!         "dog"
//!     }
//! }
//!
//! impl Polymorphic for Dog {
//!     fn provide<'v>(&'v self, demand: &mut Demand<'_, 'v>) {
//!         demand.provide::<dyn Named>(self);
//!     }
//! }
//!
//! let pet = Object::polymorphic(Dog);
//! assert_eq!(pet.polymorphic_cast::<dyn Named>().unwrap().name(), "dog");
//! ```
//!
//! ## Sharing and weak references
//!
//! ```rust
//! use erased_object::Object;
//!
//! let first = Object::new(vec![1, 2, 3]);
//! let second = first.clone();
//! let weak = first.downgrade();
//! assert_eq!(first, second);
//! assert_eq!(first.strong_count(), 2);
//!
//! drop(first);
//! assert_eq!(weak.lock(), second);
//! drop(second);
//! assert!(weak.expired());
//! assert!(weak.upgrade().is_err());
//! ```

mod cast;
mod error;
mod holder;
mod object;
mod token;
mod weak;

pub mod atomic;
pub mod views;

pub use atomic::{AtomicObject, CompareExchangeError, SlotGuard, SlotState};
pub use cast::{Demand, Polymorphic};
pub use error::ObjectError;
pub use object::Object;
pub use token::{type_of, TypeToken};
pub use views::{Flex, Invoke, ObjectFn, ObjectStr, ObjectVec, Signature, Stateful};
pub use weak::WeakObject;
