#![forbid(unsafe_code)]

//! Ordered property segment names describing a path through nested objects.
//!
//! A [`ChainPath`] is built from a dotted string, an array of segments, the
//! [`then`](ChainPath::then) builder, or the [`chain!`](crate::chain) macro:
//!
//! ```
//! use chainwatch_core::{ChainPath, chain};
//!
//! let a = ChainPath::parse("Address.City").unwrap();
//! let b = ChainPath::from(["Address", "City"]);
//! let c = ChainPath::root().then("Address").then("City");
//! let d = chain!(Address.City);
//! assert!(a == b && b == c && c == d);
//! ```

use std::fmt;
use std::str::FromStr;

use smallvec::SmallVec;

use crate::error::{ChainError, Result};

/// An ordered sequence of property names. The empty path addresses the
/// observed root itself.
#[derive(Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChainPath {
    segments: SmallVec<[String; 4]>,
}

impl ChainPath {
    /// The empty path.
    #[must_use]
    pub fn root() -> Self {
        Self::default()
    }

    /// Parse a dotted path such as `"Address.City"`.
    pub fn parse(input: &str) -> Result<Self> {
        if input.is_empty() {
            return Err(ChainError::invalid_path(input, "path is empty"));
        }
        let path: Self = input.split('.').collect();
        path.validate().map_err(|_| ChainError::invalid_path(input, "empty segment"))?;
        Ok(path)
    }

    /// Build a path from any sequence of segment names.
    pub fn from_segments<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            segments: segments.into_iter().map(Into::into).collect(),
        }
    }

    /// Append a segment (builder style).
    #[must_use]
    pub fn then(mut self, segment: impl Into<String>) -> Self {
        self.segments.push(segment.into());
        self
    }

    /// Check that the path can be observed: non-empty, no empty segment.
    pub fn validate(&self) -> Result<()> {
        if self.segments.is_empty() {
            return Err(ChainError::invalid_path(self.to_string(), "path is empty"));
        }
        if self.segments.iter().any(String::is_empty) {
            return Err(ChainError::invalid_path(self.to_string(), "empty segment"));
        }
        Ok(())
    }

    #[must_use]
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    #[must_use]
    pub fn first(&self) -> Option<&str> {
        self.segments.first().map(String::as_str)
    }

    #[must_use]
    pub fn last(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    /// First segment and the remaining suffix.
    #[must_use]
    pub fn split_first(&self) -> Option<(&str, ChainPath)> {
        let (first, rest) = self.segments.split_first()?;
        Some((first.as_str(), Self::from_segments(rest.iter().cloned())))
    }

    /// The suffix starting at `depth` (empty when `depth >= len`).
    #[must_use]
    pub fn suffix(&self, depth: usize) -> ChainPath {
        Self::from_segments(self.segments.iter().skip(depth).cloned())
    }

    /// The first `len` segments.
    #[must_use]
    pub fn prefix(&self, len: usize) -> ChainPath {
        Self::from_segments(self.segments.iter().take(len).cloned())
    }

    /// Whether `prefix` is a leading subsequence of this path.
    #[must_use]
    pub fn starts_with(&self, prefix: &ChainPath) -> bool {
        self.segments.starts_with(&prefix.segments)
    }

    /// Whether the two paths agree segment by segment up to the shorter
    /// length. Empty paths are compatible with nothing.
    #[must_use]
    pub fn prefix_compatible(&self, other: &ChainPath) -> bool {
        if self.is_empty() || other.is_empty() {
            return false;
        }
        self.segments
            .iter()
            .zip(other.segments.iter())
            .all(|(a, b)| a == b)
    }
}

impl fmt::Display for ChainPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            f.write_str(segment)?;
        }
        Ok(())
    }
}

impl fmt::Debug for ChainPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChainPath({self})")
    }
}

impl FromStr for ChainPath {
    type Err = ChainError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl<S: Into<String>> FromIterator<S> for ChainPath {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self::from_segments(iter)
    }
}

impl<const N: usize> From<[&str; N]> for ChainPath {
    fn from(segments: [&str; N]) -> Self {
        Self::from_segments(segments)
    }
}

impl From<&[&str]> for ChainPath {
    fn from(segments: &[&str]) -> Self {
        Self::from_segments(segments.iter().copied())
    }
}

impl From<Vec<String>> for ChainPath {
    fn from(segments: Vec<String>) -> Self {
        Self::from_segments(segments)
    }
}

impl From<&ChainPath> for ChainPath {
    fn from(path: &ChainPath) -> Self {
        path.clone()
    }
}

/// Build a [`ChainPath`] from member-access syntax: `chain!(Address.City)`.
#[macro_export]
macro_rules! chain {
    ($($segment:ident).+) => {
        $crate::ChainPath::from_segments([$(stringify!($segment)),+])
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn parse_dotted() {
        let path = ChainPath::parse("a.b.c").unwrap();
        assert_eq!(path.segments(), &["a", "b", "c"]);
        assert_eq!(path.to_string(), "a.b.c");
    }

    #[test]
    fn parse_rejects_empty_segments() {
        assert!(ChainPath::parse("").is_err());
        assert!(ChainPath::parse("a..b").is_err());
        assert!(ChainPath::parse(".a").is_err());
    }

    #[test]
    fn macro_matches_builder() {
        assert_eq!(chain!(Address.City), ChainPath::root().then("Address").then("City"));
        assert_eq!(chain!(Name).len(), 1);
    }

    #[test]
    fn split_first_and_suffix() {
        let path = ChainPath::from(["a", "b", "c"]);
        let (first, rest) = path.split_first().unwrap();
        assert_eq!(first, "a");
        assert_eq!(rest, ChainPath::from(["b", "c"]));
        assert_eq!(path.suffix(2), ChainPath::from(["c"]));
        assert!(path.suffix(3).is_empty());
        assert_eq!(path.prefix(1), ChainPath::from(["a"]));
        assert!(ChainPath::root().split_first().is_none());
    }

    #[test]
    fn prefix_compatibility() {
        let ab = ChainPath::from(["a", "b"]);
        let abc = ChainPath::from(["a", "b", "c"]);
        let ax = ChainPath::from(["a", "x"]);
        assert!(ab.prefix_compatible(&abc));
        assert!(abc.prefix_compatible(&ab));
        assert!(!ab.prefix_compatible(&ax));
        assert!(!ab.prefix_compatible(&ChainPath::root()));
        assert!(abc.starts_with(&ab));
        assert!(!ab.starts_with(&abc));
    }

    #[test]
    fn validate_empty_path() {
        assert!(ChainPath::root().validate().is_err());
        assert!(ChainPath::from(["a", ""]).validate().is_err());
        assert!(chain!(a.b).validate().is_ok());
    }

    proptest! {
        #[test]
        fn display_parse_roundtrip(segments in proptest::collection::vec("[A-Za-z][A-Za-z0-9_]{0,6}", 1..6)) {
            let path = ChainPath::from_segments(segments);
            let parsed: ChainPath = path.to_string().parse().unwrap();
            prop_assert_eq!(parsed, path);
        }

        #[test]
        fn prefix_is_compatible(segments in proptest::collection::vec("[a-c]", 1..6), cut in 1usize..6) {
            let path = ChainPath::from_segments(segments);
            let cut = cut.min(path.len());
            let prefix = path.prefix(cut);
            prop_assert!(path.starts_with(&prefix));
            prop_assert!(path.prefix_compatible(&prefix));
        }
    }
}
