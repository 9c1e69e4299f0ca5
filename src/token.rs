use std::any::{type_name, TypeId};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Process-stable identity of an erased type.
///
/// Two tokens compare equal iff they were produced for the same type. The
/// null token stands for "no value" and is what an empty [`Object`] reports.
///
/// [`Object`]: crate::Object
#[derive(Clone, Copy)]
pub struct TypeToken {
    id: Option<TypeId>,
    name: &'static str,
}

impl TypeToken {
    /// Token of `T`.
    #[inline]
    pub fn of<T: ?Sized + 'static>() -> Self {
        TypeToken {
            id: Some(TypeId::of::<T>()),
            name: type_name::<T>(),
        }
    }

    /// Token of the empty object.
    #[inline]
    pub const fn null() -> Self {
        TypeToken {
            id: None,
            name: "()",
        }
    }

    pub fn is_null(&self) -> bool {
        self.id.is_none()
    }

    /// Human readable type name, for diagnostics only.
    pub fn name(&self) -> &'static str {
        self.name
    }
}

/// Shorthand for [`TypeToken::of`].
#[inline]
pub fn type_of<T: ?Sized + 'static>() -> TypeToken {
    TypeToken::of::<T>()
}

impl Default for TypeToken {
    fn default() -> Self {
        TypeToken::null()
    }
}

impl PartialEq for TypeToken {
    fn eq(&self, other: &TypeToken) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeToken {}

impl PartialOrd for TypeToken {
    fn partial_cmp(&self, other: &TypeToken) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TypeToken {
    fn cmp(&self, other: &TypeToken) -> Ordering {
        self.id.cmp(&other.id)
    }
}

impl Hash for TypeToken {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state)
    }
}

impl fmt::Debug for TypeToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            f.write_str("TypeToken(null)")
        } else {
            write!(f, "TypeToken({})", self.name)
        }
    }
}

impl fmt::Display for TypeToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

#[cfg(test)]
mod test {
    use super::{type_of, TypeToken};

    #[test]
    fn same_type_same_token() {
        assert_eq!(type_of::<i32>(), type_of::<i32>());
        assert_eq!(type_of::<[u8]>(), TypeToken::of::<[u8]>());
    }

    #[test]
    fn distinct_types_distinct_tokens() {
        assert_ne!(type_of::<i32>(), type_of::<f32>());
        assert_ne!(type_of::<[i32; 2]>(), type_of::<[i32]>());
        assert_ne!(type_of::<i32>(), TypeToken::null());
    }

    #[test]
    fn null_token() {
        assert!(TypeToken::null().is_null());
        assert!(TypeToken::default().is_null());
        assert!(!type_of::<()>().is_null());
        assert_eq!(format!("{:?}", TypeToken::null()), "TypeToken(null)");
    }
}
