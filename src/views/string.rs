use crate::error::ObjectError;
use crate::object::Object;
use std::fmt;
use std::ops::Deref;

/// A shared, immutable string behind an [`Object`].
#[derive(Clone, Default)]
pub struct ObjectStr {
    object: Object,
}

impl ObjectStr {
    pub fn new(text: &str) -> Self {
        ObjectStr {
            object: Object::string(text),
        }
    }

    /// Views `object` as text. An empty object views as `""`.
    pub fn try_from_object(object: Object) -> Result<Self, ObjectError> {
        if object.is_null() || object.as_str().is_some() {
            Ok(ObjectStr { object })
        } else {
            Err(ObjectError::bad_cast::<str>(object.type_token()))
        }
    }

    pub fn as_str(&self) -> &str {
        self.object.as_str().unwrap_or("")
    }

    pub fn object(&self) -> &Object {
        &self.object
    }

    pub fn into_object(self) -> Object {
        self.object
    }
}

impl Deref for ObjectStr {
    type Target = str;

    fn deref(&self) -> &str {
        self.as_str()
    }
}

impl From<&str> for ObjectStr {
    fn from(text: &str) -> Self {
        ObjectStr::new(text)
    }
}

impl From<String> for ObjectStr {
    fn from(text: String) -> Self {
        ObjectStr::new(&text)
    }
}

impl PartialEq<str> for ObjectStr {
    fn eq(&self, other: &str) -> bool {
        self.as_str() == other
    }
}

impl PartialEq<&str> for ObjectStr {
    fn eq(&self, other: &&str) -> bool {
        self.as_str() == *other
    }
}

impl fmt::Display for ObjectStr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Debug for ObjectStr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self.as_str(), f)
    }
}

#[cfg(test)]
mod test {
    use super::ObjectStr;
    use crate::Object;

    #[test]
    fn shares_text() {
        let hello = ObjectStr::from("hello");
        let again = hello.clone();
        assert_eq!(again, "hello");
        assert_eq!(hello.object(), again.object());
        assert_eq!(hello.len(), 5);
        assert_eq!(format!("{} {:?}", hello, again), "hello \"hello\"");
    }

    #[test]
    fn rejects_non_text() {
        assert!(ObjectStr::try_from_object(Object::new(String::from("no"))).is_err());
        assert!(ObjectStr::try_from_object(Object::from_vec(b"no".to_vec())).is_err());
        assert_eq!(ObjectStr::try_from_object(Object::null()).unwrap(), "");
        assert_eq!(ObjectStr::try_from_object(Object::string("ok")).unwrap().as_str(), "ok");
    }
}
