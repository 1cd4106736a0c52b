// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Immutable byte values shared between caches, sinks, and peers.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::{Bound, RangeBounds};
use std::sync::Arc;

use bytes::Bytes;

/// An immutable view over a byte sequence.
///
/// A `ByteView` wraps either a byte buffer or a string, whichever the producer
/// had at hand, without re-encoding. The two representations are
/// indistinguishable through the public API: length, indexing, slicing,
/// equality, and hashing all operate on the byte contents.
///
/// Views are what the cache stores and what peers exchange, so they are built
/// to be shared: cloning is a reference-count bump, and the contents can never
/// change after construction. Methods that hand out owned buffers
/// ([`to_vec`](Self::to_vec)) copy, so no caller can reach another caller's
/// allocation.
#[derive(Clone, Default)]
pub struct ByteView {
    repr: Repr,
}

#[derive(Clone)]
enum Repr {
    Buffer(Bytes),
    Text(Arc<str>),
}

impl Default for Repr {
    fn default() -> Self {
        Self::Buffer(Bytes::new())
    }
}

impl ByteView {
    /// Creates a view over a byte buffer.
    ///
    /// `Vec<u8>` and `Bytes` are taken without copying; `&[u8]` is copied.
    pub fn from_bytes(bytes: impl Into<Bytes>) -> Self {
        Self {
            repr: Repr::Buffer(bytes.into()),
        }
    }

    /// Creates a view over a string.
    ///
    /// The string is stored as-is; no byte-buffer conversion takes place.
    pub fn from_text(text: impl Into<Arc<str>>) -> Self {
        Self {
            repr: Repr::Text(text.into()),
        }
    }

    /// The number of bytes in the view.
    #[must_use]
    pub fn len(&self) -> usize {
        self.as_slice().len()
    }

    /// Returns true for a zero-length view.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.as_slice().is_empty()
    }

    /// Returns the byte at position `i`.
    ///
    /// # Panics
    ///
    /// Panics if `i` is out of bounds.
    #[must_use]
    pub fn at(&self, i: usize) -> u8 {
        self.as_slice()[i]
    }

    /// Borrows the contents as a byte slice.
    ///
    /// The borrow is safe to hand around freely; the backing store is
    /// immutable for the life of the view.
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        match &self.repr {
            Repr::Buffer(bytes) => bytes,
            Repr::Text(text) => text.as_bytes(),
        }
    }

    /// Borrows the contents as a string when the view was built from one.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match &self.repr {
            Repr::Buffer(_) => None,
            Repr::Text(text) => Some(text),
        }
    }

    /// Copies the contents into a fresh `Vec<u8>`.
    ///
    /// Every call returns a new allocation, so mutating the result cannot
    /// affect the view or any earlier copy.
    #[must_use]
    pub fn to_vec(&self) -> Vec<u8> {
        self.as_slice().to_vec()
    }

    /// Returns the contents as a shared byte buffer.
    ///
    /// Cheap when the view is buffer-backed; copies once when it is
    /// string-backed.
    #[must_use]
    pub fn to_bytes(&self) -> Bytes {
        match &self.repr {
            Repr::Buffer(bytes) => bytes.clone(),
            Repr::Text(text) => Bytes::copy_from_slice(text.as_bytes()),
        }
    }

    /// Returns a view over a sub-range of this view.
    ///
    /// Buffer-backed views share storage with the parent; string-backed views
    /// copy the selected range.
    ///
    /// # Panics
    ///
    /// Panics if the range is out of bounds.
    #[must_use]
    pub fn slice(&self, range: impl RangeBounds<usize>) -> Self {
        let len = self.len();
        let start = match range.start_bound() {
            Bound::Included(&n) => n,
            Bound::Excluded(&n) => n + 1,
            Bound::Unbounded => 0,
        };
        let end = match range.end_bound() {
            Bound::Included(&n) => n + 1,
            Bound::Excluded(&n) => n,
            Bound::Unbounded => len,
        };
        assert!(start <= end && end <= len, "range {start}..{end} out of bounds for view of {len} bytes");

        match &self.repr {
            Repr::Buffer(bytes) => Self::from_bytes(bytes.slice(start..end)),
            Repr::Text(text) => Self::from_text(&text[start..end]),
        }
    }
}

impl PartialEq for ByteView {
    fn eq(&self, other: &Self) -> bool {
        self.as_slice() == other.as_slice()
    }
}

impl Eq for ByteView {}

impl PartialEq<[u8]> for ByteView {
    fn eq(&self, other: &[u8]) -> bool {
        self.as_slice() == other
    }
}

impl PartialEq<&[u8]> for ByteView {
    fn eq(&self, other: &&[u8]) -> bool {
        self.as_slice() == *other
    }
}

impl PartialEq<str> for ByteView {
    fn eq(&self, other: &str) -> bool {
        self.as_slice() == other.as_bytes()
    }
}

impl PartialEq<&str> for ByteView {
    fn eq(&self, other: &&str) -> bool {
        self.as_slice() == other.as_bytes()
    }
}

impl Hash for ByteView {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.as_slice().hash(state);
    }
}

impl fmt::Display for ByteView {
    /// Renders the contents as text, replacing invalid UTF-8 sequences.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        String::from_utf8_lossy(self.as_slice()).fmt(f)
    }
}

impl fmt::Debug for ByteView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ByteView")
            .field(&String::from_utf8_lossy(self.as_slice()))
            .finish()
    }
}

impl From<Vec<u8>> for ByteView {
    fn from(bytes: Vec<u8>) -> Self {
        Self::from_bytes(bytes)
    }
}

impl From<Bytes> for ByteView {
    fn from(bytes: Bytes) -> Self {
        Self::from_bytes(bytes)
    }
}

impl From<&[u8]> for ByteView {
    fn from(bytes: &[u8]) -> Self {
        Self::from_bytes(Bytes::copy_from_slice(bytes))
    }
}

impl From<String> for ByteView {
    fn from(text: String) -> Self {
        Self::from_text(text)
    }
}

impl From<&str> for ByteView {
    fn from(text: &str) -> Self {
        Self::from_text(text)
    }
}
