use crate::token::TypeToken;
use std::alloc::Layout;
use std::fmt;

/// Errors reported by casts, invocation, weak promotion and allocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObjectError {
    /// The stored value is not of the requested type, or there is no value.
    BadCast {
        expected: TypeToken,
        found: TypeToken,
    },
    /// A function wrapper was called while empty or holding another signature.
    NotInvocable {
        expected: TypeToken,
        found: TypeToken,
    },
    /// A weak reference was promoted after its value was destroyed.
    DeadWeakReference,
    /// A holder for `len` elements could not be allocated. `layout` is
    /// `None` when the requested size does not fit the address space.
    Alloc { len: usize, layout: Option<Layout> },
}

impl ObjectError {
    pub(crate) fn bad_cast<T: ?Sized + 'static>(found: TypeToken) -> Self {
        ObjectError::BadCast {
            expected: TypeToken::of::<T>(),
            found,
        }
    }
}

impl fmt::Display for ObjectError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ObjectError::BadCast { expected, found } if found.is_null() => {
                write!(f, "bad object cast: expected {}, object is empty", expected)
            }
            ObjectError::BadCast { expected, found } => {
                write!(f, "bad object cast: expected {}, found {}", expected, found)
            }
            ObjectError::NotInvocable { expected, found } => write!(
                f,
                "object is not invocable as {} (holds {})",
                expected, found
            ),
            ObjectError::DeadWeakReference => write!(f, "dead weak reference"),
            ObjectError::Alloc {
                len,
                layout: Some(layout),
            } => write!(
                f,
                "failed to allocate {} bytes aligned to {} for {} elements",
                layout.size(),
                layout.align(),
                len
            ),
            ObjectError::Alloc { len, layout: None } => {
                write!(f, "holder for {} elements exceeds the address space", len)
            }
        }
    }
}

impl std::error::Error for ObjectError {}

#[cfg(test)]
mod test {
    use super::ObjectError;
    use crate::token::TypeToken;

    #[test]
    fn display_mentions_both_types() {
        let e = ObjectError::bad_cast::<f32>(TypeToken::of::<i32>());
        assert_eq!(e.to_string(), "bad object cast: expected f32, found i32");
    }

    #[test]
    fn display_empty_object() {
        let e = ObjectError::bad_cast::<i32>(TypeToken::null());
        assert_eq!(e.to_string(), "bad object cast: expected i32, object is empty");
    }

    #[test]
    fn display_oversized_request() {
        let e = ObjectError::Alloc {
            len: usize::MAX,
            layout: None,
        };
        assert_eq!(
            e.to_string(),
            format!("holder for {} elements exceeds the address space", usize::MAX)
        );
    }
}
