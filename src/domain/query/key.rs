//! Composite query keys

use std::fmt;

use serde::{Deserialize, Serialize};

/// One element of a query key
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KeySegment {
    Bool(bool),
    Int(i64),
    Str(String),
}

impl From<&str> for KeySegment {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for KeySegment {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<&String> for KeySegment {
    fn from(value: &String) -> Self {
        Self::Str(value.clone())
    }
}

impl From<i64> for KeySegment {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<u32> for KeySegment {
    fn from(value: u32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<bool> for KeySegment {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl fmt::Display for KeySegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{}", v),
            Self::Int(v) => write!(f, "{}", v),
            Self::Str(v) => write!(f, "{:?}", v),
        }
    }
}

/// Ordered sequence of segments identifying one cached result set
///
/// Two keys are equal iff their segments are element-wise equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueryKey(Vec<KeySegment>);

impl QueryKey {
    /// Creates a key from a leading tag
    pub fn new(tag: impl Into<KeySegment>) -> Self {
        Self(vec![tag.into()])
    }

    /// Appends a qualifier (entity id, search term, ...)
    pub fn with(mut self, segment: impl Into<KeySegment>) -> Self {
        self.0.push(segment.into());
        self
    }

    pub fn segments(&self) -> &[KeySegment] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether this key begins with every segment of `prefix`
    ///
    /// A key is a prefix of itself; the empty key is a prefix of every key.
    pub fn starts_with(&self, prefix: &QueryKey) -> bool {
        self.0.starts_with(&prefix.0)
    }
}

impl<S: Into<KeySegment>> FromIterator<S> for QueryKey {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;

        for (i, segment) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{}", segment)?;
        }

        write!(f, "]")
    }
}

/// Builds a [`QueryKey`] from a list of segments
#[macro_export]
macro_rules! query_key {
    ($($segment:expr),+ $(,)?) => {
        $crate::domain::query::QueryKey::from_iter([
            $($crate::domain::query::KeySegment::from($segment)),+
        ])
    };
}

/// Which cached entries an invalidation applies to
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum InvalidationTarget {
    /// Only the entry stored under exactly this key
    Exact(QueryKey),
    /// Every entry whose key starts with this prefix
    Prefix(QueryKey),
}

impl InvalidationTarget {
    pub fn matches(&self, key: &QueryKey) -> bool {
        match self {
            Self::Exact(target) => target == key,
            Self::Prefix(prefix) => key.starts_with(prefix),
        }
    }

    pub fn key(&self) -> &QueryKey {
        match self {
            Self::Exact(key) | Self::Prefix(key) => key,
        }
    }
}

/// Keys are matched as prefixes unless stated otherwise
impl From<QueryKey> for InvalidationTarget {
    fn from(key: QueryKey) -> Self {
        Self::Prefix(key)
    }
}

impl fmt::Display for InvalidationTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact(key) => write!(f, "exact:{}", key),
            Self::Prefix(key) => write!(f, "prefix:{}", key),
        }
    }
}
