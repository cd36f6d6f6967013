//! Structured cache keys.
//!
//! A [`QueryKey`] is an ordered tuple of primitive [`KeyPart`]s such as
//! `["search", "rust", null]`. Two keys address the same cache entry exactly when
//! their parts are equal by value, and invalidation works on key prefixes.

use std::fmt;

/// A single primitive component of a [`QueryKey`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum KeyPart {
    /// An absent optional parameter.
    Null,
    Bool(bool),
    Int(i64),
    Str(String),
}

impl From<&str> for KeyPart {
    fn from(value: &str) -> Self {
        Self::Str(value.to_owned())
    }
}

impl From<String> for KeyPart {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<&String> for KeyPart {
    fn from(value: &String) -> Self {
        Self::Str(value.clone())
    }
}

impl From<i64> for KeyPart {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for KeyPart {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<u32> for KeyPart {
    fn from(value: u32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<bool> for KeyPart {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl<T: Into<Self>> From<Option<T>> for KeyPart {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

impl fmt::Display for KeyPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(n) => write!(f, "{n}"),
            Self::Str(s) => write!(f, "{s:?}"),
        }
    }
}

/// Identifies one cached read.
///
/// # Example
///
/// ```
/// use recall::subscription::http::QueryKey;
///
/// let key = QueryKey::new("search").with("rust").with(None::<&str>);
/// assert!(key.starts_with(&QueryKey::new("search")));
/// assert_eq!(key.to_string(), r#"["search", "rust", null]"#);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QueryKey {
    parts: Vec<KeyPart>,
}

impl QueryKey {
    /// Creates a key with a single root part, usually a resource name or path.
    pub fn new(root: impl Into<KeyPart>) -> Self {
        Self {
            parts: vec![root.into()],
        }
    }

    /// Creates a key from already-built parts.
    #[must_use]
    pub const fn from_parts(parts: Vec<KeyPart>) -> Self {
        Self { parts }
    }

    /// Appends a part, returning the extended key.
    #[must_use]
    pub fn with(mut self, part: impl Into<KeyPart>) -> Self {
        self.parts.push(part.into());
        self
    }

    #[must_use]
    pub fn parts(&self) -> &[KeyPart] {
        &self.parts
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.parts.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    /// Returns `true` if `prefix` matches the leading parts of this key.
    ///
    /// Every key starts with itself and with the empty key.
    #[must_use]
    pub fn starts_with(&self, prefix: &Self) -> bool {
        self.parts.starts_with(&prefix.parts)
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, part) in self.parts.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{part}")?;
        }
        f.write_str("]")
    }
}

/// Builds a [`QueryKey`] from a list of values convertible into [`KeyPart`].
///
/// ```
/// use recall::query_key;
///
/// let key = query_key!["search", "rust", None::<&str>];
/// assert_eq!(key.len(), 3);
/// ```
#[macro_export]
macro_rules! query_key {
    ($($part:expr),+ $(,)?) => {
        $crate::subscription::http::QueryKey::from_parts(vec![
            $($crate::subscription::http::KeyPart::from($part)),+
        ])
    };
}
