//! Shared immutable strings.

use std::borrow::Borrow;
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

/// An immutable string shared by reference count.
///
/// Values like tags, Call-IDs and queue names travel between tasks
/// constantly; cloning one of these bumps a counter instead of copying
/// bytes. The content is fixed at construction, so equality, ordering and
/// hashing all behave exactly like `str`, and a `HashMap` keyed by
/// `ArcStr` can be probed with a plain `&str`.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct ArcStr(Arc<str>);

impl ArcStr {
    /// Views the content as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` if both handles point at the same allocation.
    ///
    /// Content equality is covered by `PartialEq`; this is the cheaper
    /// identity check used to verify that re-recording an identical value
    /// did not allocate.
    pub fn ptr_eq(a: &ArcStr, b: &ArcStr) -> bool {
        Arc::ptr_eq(&a.0, &b.0)
    }
}

impl Deref for ArcStr {
    type Target = str;

    fn deref(&self) -> &str {
        self.as_str()
    }
}

impl AsRef<str> for ArcStr {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl Borrow<str> for ArcStr {
    fn borrow(&self) -> &str {
        self.as_str()
    }
}

impl Default for ArcStr {
    fn default() -> Self {
        ArcStr(Arc::from(""))
    }
}

impl PartialEq<str> for ArcStr {
    fn eq(&self, other: &str) -> bool {
        self.as_str() == other
    }
}

impl PartialEq<&str> for ArcStr {
    fn eq(&self, other: &&str) -> bool {
        self.as_str() == *other
    }
}

// Logs print the content alone, debug output keeps the quoting.
impl fmt::Display for ArcStr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Debug for ArcStr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self.as_str(), f)
    }
}

impl From<&str> for ArcStr {
    fn from(s: &str) -> Self {
        ArcStr(Arc::from(s))
    }
}

impl From<String> for ArcStr {
    fn from(s: String) -> Self {
        ArcStr(Arc::from(s.as_str()))
    }
}
