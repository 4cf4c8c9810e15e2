//! Materialized path keys
//!
//! A [`PathKey`] is the sortable string form of an organization's ancestry,
//! root first and ending with the organization itself. Each segment is the
//! 32-character lowercase hex form of a UUID and segments are joined with `.`:
//!
//! ```text
//! 0190c4e2....a1                      headquarters (depth 0)
//! 0190c4e2....a1.0190c4e3....b7       subsidiary   (depth 1)
//! ```
//!
//! Segments have a fixed width, so concatenation is never ambiguous and the
//! encoding is monotone under extension: every subtree occupies one contiguous
//! range of keys, which is what the directory relies on for prefix scans.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;
use thiserror::Error;
use uuid::Uuid;

/// Separator between two path segments.
pub const SEGMENT_SEPARATOR: char = '.';

/// Width of a single encoded segment.
pub const SEGMENT_WIDTH: usize = 32;

/// The character sorting immediately after [`SEGMENT_SEPARATOR`].
const RANGE_END: char = '/';

/// Errors raised while decoding (or building) a path key.
///
/// A decode failure on a stored key means the stored data is corrupt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// The key (or id sequence) has no segments
    #[error("Path key is empty")]
    Empty,

    /// A segment is not 32 lowercase hex characters
    #[error("Invalid path segment at position {position}: {segment:?}")]
    InvalidSegment {
        /// Zero-based segment index
        position: usize,
        /// The offending segment text
        segment: String,
    },

    /// The same id appears twice in one path
    #[error("Path repeats organization {0}")]
    RepeatedId(Uuid),
}

/// Encoded materialized path of an organization.
///
/// Ordering is plain byte ordering of the encoded string, which places a
/// parent immediately before its subtree.
///
/// # Examples
///
/// ```
/// use platform_org::PathKey;
/// use uuid::Uuid;
///
/// let hq = Uuid::now_v7();
/// let branch = Uuid::now_v7();
///
/// let root = PathKey::root(hq);
/// let child = root.child(branch);
///
/// assert!(root.is_prefix_of(&child));
/// assert_eq!(child.depth(), 1);
/// assert_eq!(child.decode().unwrap(), vec![hq, branch]);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PathKey(String);

impl PathKey {
    /// Path of a root organization.
    pub fn root(id: Uuid) -> Self {
        Self(segment(id))
    }

    /// Encode an id sequence, root first.
    ///
    /// # Errors
    ///
    /// Fails with [`DecodeError::Empty`] for an empty sequence and
    /// [`DecodeError::RepeatedId`] when an id appears twice.
    pub fn encode(ids: &[Uuid]) -> Result<Self, DecodeError> {
        if ids.is_empty() {
            return Err(DecodeError::Empty);
        }
        for (i, id) in ids.iter().enumerate() {
            if ids[..i].contains(id) {
                return Err(DecodeError::RepeatedId(*id));
            }
        }

        let encoded = ids
            .iter()
            .map(|id| segment(*id))
            .collect::<Vec<_>>()
            .join(&SEGMENT_SEPARATOR.to_string());
        Ok(Self(encoded))
    }

    /// Parse and validate an encoded key, e.g. one read back from storage.
    pub fn parse(encoded: &str) -> Result<Self, DecodeError> {
        let key = Self(encoded.to_string());
        key.decode()?;
        Ok(key)
    }

    /// Decode the key back into its id sequence, root first.
    pub fn decode(&self) -> Result<Vec<Uuid>, DecodeError> {
        if self.0.is_empty() {
            return Err(DecodeError::Empty);
        }

        let mut ids: Vec<Uuid> = Vec::with_capacity(self.depth() as usize + 1);
        for (position, text) in self.segments().enumerate() {
            let id = decode_segment(text).ok_or_else(|| DecodeError::InvalidSegment {
                position,
                segment: text.to_string(),
            })?;
            if ids.contains(&id) {
                return Err(DecodeError::RepeatedId(id));
            }
            ids.push(id);
        }
        Ok(ids)
    }

    /// Path of a direct child of this node.
    pub fn child(&self, id: Uuid) -> Self {
        Self(format!("{}{}{}", self.0, SEGMENT_SEPARATOR, segment(id)))
    }

    /// Path of the parent node, `None` for a root.
    pub fn parent(&self) -> Option<Self> {
        self.0
            .rsplit_once(SEGMENT_SEPARATOR)
            .map(|(parent, _)| Self(parent.to_string()))
    }

    /// The id this path ends with (the node itself).
    pub fn last_id(&self) -> Result<Uuid, DecodeError> {
        let (position, text) = match self.0.rsplit_once(SEGMENT_SEPARATOR) {
            Some((_, last)) => (self.depth() as usize, last),
            None if self.0.is_empty() => return Err(DecodeError::Empty),
            None => (0, self.0.as_str()),
        };
        decode_segment(text).ok_or_else(|| DecodeError::InvalidSegment {
            position,
            segment: text.to_string(),
        })
    }

    /// Iterate over the raw encoded segments.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split(SEGMENT_SEPARATOR)
    }

    /// Number of ancestors above the node (0 for a root).
    pub fn depth(&self) -> u32 {
        self.0.matches(SEGMENT_SEPARATOR).count() as u32
    }

    /// True iff `other` extends this path by one or more whole segments.
    ///
    /// A path is never a prefix of itself.
    pub fn is_prefix_of(&self, other: &PathKey) -> bool {
        other.0.len() > self.0.len()
            && other.0.starts_with(&self.0)
            && other.0[self.0.len()..].starts_with(SEGMENT_SEPARATOR)
    }

    /// True iff `other` is this path or lies inside its subtree.
    pub fn covers(&self, other: &PathKey) -> bool {
        self == other || self.is_prefix_of(other)
    }

    /// Substitute the `from` prefix with `to`, keeping the relative suffix.
    ///
    /// Returns `None` when this path is not inside the `from` subtree.
    ///
    /// ```
    /// use platform_org::PathKey;
    /// use uuid::Uuid;
    ///
    /// let (a, b, c, d) = (Uuid::now_v7(), Uuid::now_v7(), Uuid::now_v7(), Uuid::now_v7());
    /// let old = PathKey::encode(&[a, b, c]).unwrap();
    /// let moved = old.rebase(&PathKey::encode(&[a, b]).unwrap(), &PathKey::encode(&[d, b]).unwrap());
    /// assert_eq!(moved.unwrap().decode().unwrap(), vec![d, b, c]);
    /// ```
    pub fn rebase(&self, from: &PathKey, to: &PathKey) -> Option<PathKey> {
        if self == from {
            Some(to.clone())
        } else if from.is_prefix_of(self) {
            Some(Self(format!("{}{}", to.0, &self.0[from.0.len()..])))
        } else {
            None
        }
    }

    /// Half-open key range holding exactly the strict descendants.
    ///
    /// The bounds are scan sentinels, not valid keys themselves.
    pub fn descendant_range(&self) -> Range<PathKey> {
        Self(format!("{}{}", self.0, SEGMENT_SEPARATOR))..Self(format!("{}{}", self.0, RANGE_END))
    }

    /// The encoded form.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PathKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for PathKey {
    type Error = DecodeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        let key = Self(value);
        key.decode()?;
        Ok(key)
    }
}

impl From<PathKey> for String {
    fn from(key: PathKey) -> Self {
        key.0
    }
}

/// Encode an id sequence into a path key.
pub fn encode(ids: &[Uuid]) -> Result<PathKey, DecodeError> {
    PathKey::encode(ids)
}

/// Decode a path key into its id sequence.
pub fn decode(key: &PathKey) -> Result<Vec<Uuid>, DecodeError> {
    key.decode()
}

/// Strict-descendant test: `b` is `a` extended by at least one segment.
pub fn is_prefix_of(a: &PathKey, b: &PathKey) -> bool {
    a.is_prefix_of(b)
}

fn segment(id: Uuid) -> String {
    id.simple().to_string()
}

fn decode_segment(text: &str) -> Option<Uuid> {
    let canonical = text.len() == SEGMENT_WIDTH
        && text
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
    if !canonical {
        return None;
    }
    Uuid::parse_str(text).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(n: u128) -> Uuid {
        Uuid::from_u128(n)
    }

    #[test]
    fn test_encode_decode() {
        let ids = vec![id(1), id(2), id(3)];
        let key = PathKey::encode(&ids).unwrap();

        assert_eq!(key.depth(), 2);
        assert_eq!(key.decode().unwrap(), ids);
        assert_eq!(key.last_id().unwrap(), id(3));
        assert_eq!(key.as_str().len(), 3 * SEGMENT_WIDTH + 2);
    }

    #[test]
    fn test_encode_rejects_empty_and_repeated() {
        assert_eq!(PathKey::encode(&[]), Err(DecodeError::Empty));
        assert_eq!(
            PathKey::encode(&[id(1), id(2), id(1)]),
            Err(DecodeError::RepeatedId(id(1)))
        );
    }

    #[test]
    fn test_child_and_parent() {
        let root = PathKey::root(id(10));
        let child = root.child(id(11));

        assert_eq!(child.parent(), Some(root.clone()));
        assert_eq!(root.parent(), None);
        assert_eq!(child, PathKey::encode(&[id(10), id(11)]).unwrap());
    }

    #[test]
    fn test_is_prefix_of_is_strict() {
        let a = PathKey::root(id(1));
        let ab = a.child(id(2));
        let abc = ab.child(id(3));
        let other = PathKey::root(id(4));

        assert!(a.is_prefix_of(&ab));
        assert!(a.is_prefix_of(&abc));
        assert!(!a.is_prefix_of(&a));
        assert!(!ab.is_prefix_of(&a));
        assert!(!other.is_prefix_of(&abc));
        assert!(a.covers(&a));
        assert!(is_prefix_of(&ab, &abc));
    }

    #[test]
    fn test_prefix_requires_whole_segment() {
        let a = PathKey::root(id(1));
        // Same text prefix but not on a segment boundary.
        let glued = PathKey(format!("{}0", a.as_str()));
        assert!(!a.is_prefix_of(&glued));
    }

    #[test]
    fn test_subtree_is_contiguous_in_sort_order() {
        let a = PathKey::root(id(5));
        let b = PathKey::root(id(6));
        let a1 = a.child(id(1));
        let a9 = a.child(id(9));
        let a1x = a1.child(id(u128::MAX));

        let mut keys = vec![b.clone(), a9.clone(), a1x.clone(), a.clone(), a1.clone()];
        keys.sort();
        assert_eq!(keys, vec![a.clone(), a1, a1x, a9, b]);

        let range = a.descendant_range();
        let inside: Vec<_> = keys.iter().filter(|k| range.contains(*k)).collect();
        assert_eq!(inside.len(), 3);
        assert!(!range.contains(&a));
    }

    #[test]
    fn test_rebase() {
        let a = PathKey::root(id(1));
        let b = a.child(id(2));
        let c = b.child(id(3));
        let new_b = PathKey::root(id(2));

        assert_eq!(c.rebase(&b, &new_b), Some(new_b.child(id(3))));
        assert_eq!(b.rebase(&b, &new_b), Some(new_b.clone()));
        assert_eq!(a.rebase(&b, &new_b), None);
    }

    #[test]
    fn test_parse_rejects_malformed_keys() {
        assert_eq!(PathKey::parse(""), Err(DecodeError::Empty));
        assert!(matches!(
            PathKey::parse("not-a-uuid"),
            Err(DecodeError::InvalidSegment { position: 0, .. })
        ));

        let upper = id(0xABC).simple().to_string().to_uppercase();
        assert!(PathKey::parse(&upper).is_err());

        let good = PathKey::root(id(1));
        let trailing = format!("{}.", good);
        assert!(matches!(
            PathKey::parse(&trailing),
            Err(DecodeError::InvalidSegment { position: 1, .. })
        ));
    }

    #[test]
    fn test_serde_validates() {
        let key = PathKey::encode(&[id(1), id(2)]).unwrap();
        let json = serde_json::to_string(&key).unwrap();
        let back: PathKey = serde_json::from_str(&json).unwrap();
        assert_eq!(back, key);

        assert!(serde_json::from_str::<PathKey>("\"bogus\"").is_err());
    }
}
