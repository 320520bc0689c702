//! Views into the header buffer of a [`RequestBuffers`](crate::pool::RequestBuffers).
//!
//! The parser never allocates per header. Keys, values, the `Host` value and cookie parts are
//! recorded as a [`Span`] (an offset and a length) into the store's header buffer. A span
//! only means something together with the store that produced it, and it is resolved into a
//! borrowed [`SpanRef`] through that store. Once the store goes back to the pool nothing can
//! resolve the span any more.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Range;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Span {
    offset: u32,
    len: u32,
}

impl Span {
    #[allow(clippy::cast_possible_truncation, reason = "buffer capacities are far below u32::MAX")]
    pub(crate) fn new(offset: usize, len: usize) -> Self {
        Self { offset: offset as u32, len: len as u32 }
    }

    pub(crate) fn from_range(range: Range<usize>) -> Self {
        Self::new(range.start, range.end - range.start)
    }

    #[inline]
    pub fn offset(&self) -> usize {
        self.offset as usize
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len as usize
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub(crate) fn range(&self) -> Range<usize> {
        self.offset()..self.offset() + self.len()
    }
}

/// A resolved span. Comparison and hashing ignore ASCII case, which is what header names need.
///
/// The bytes are Latin-1: every byte is one char, so [`fmt::Display`] never fails.
#[derive(Clone, Copy)]
pub struct SpanRef<'a>(&'a [u8]);

impl<'a> SpanRef<'a> {
    #[inline]
    pub(crate) fn new(bytes: &'a [u8]) -> Self {
        Self(bytes)
    }

    #[inline]
    pub fn as_bytes(&self) -> &'a [u8] {
        self.0
    }

    /// The bytes as `&str` when they are valid UTF-8.
    pub fn as_str(&self) -> Option<&'a str> {
        std::str::from_utf8(self.0).ok()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[inline]
    pub fn eq_ignore_case(&self, other: &[u8]) -> bool {
        self.0.eq_ignore_ascii_case(other)
    }
}

impl PartialEq for SpanRef<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.eq_ignore_case(other.0)
    }
}

impl Eq for SpanRef<'_> {}

impl PartialEq<str> for SpanRef<'_> {
    fn eq(&self, other: &str) -> bool {
        self.eq_ignore_case(other.as_bytes())
    }
}

impl PartialEq<&str> for SpanRef<'_> {
    fn eq(&self, other: &&str) -> bool {
        self.eq_ignore_case(other.as_bytes())
    }
}

impl PartialEq<[u8]> for SpanRef<'_> {
    fn eq(&self, other: &[u8]) -> bool {
        self.eq_ignore_case(other)
    }
}

impl Hash for SpanRef<'_> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_usize(self.0.len());
        for b in self.0 {
            state.write_u8(b.to_ascii_lowercase());
        }
    }
}

impl fmt::Display for SpanRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use fmt::Write;
        for b in self.0 {
            f.write_char(char::from(*b))?;
        }
        Ok(())
    }
}

impl fmt::Debug for SpanRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{self}\"")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_span_ref_ignores_case() {
        let a = SpanRef::new(b"Content-Type");
        let b = SpanRef::new(b"content-type");
        assert_eq!(a, b);
        assert_eq!(a, "CONTENT-TYPE");

        let mut set = HashSet::new();
        set.insert(a);
        assert!(set.contains(&b));
    }

    #[test]
    fn test_span_ref_display_latin1() {
        let value = SpanRef::new(&[b'c', 0xE9]);
        assert_eq!(value.to_string(), "c\u{e9}");
        assert_eq!(value.as_str(), None);
    }

    #[test]
    fn test_span_range() {
        let span = Span::from_range(4..10);
        assert_eq!(span.offset(), 4);
        assert_eq!(span.len(), 6);
        assert_eq!(span.range(), 4..10);
        assert!(!span.is_empty());
    }
}
