//! Positions and bounded ranges within a logical file.
//!
//! `StreamOffset` is the byte-position vocabulary used throughout the crate:
//! every positioned read or write, every directory location, and every
//! next-directory link is expressed as a `StreamOffset`. Offset zero doubles
//! as the chain-terminator sentinel in directory links (a directory can never
//! legally start at offset zero because the container header lives there),
//! while still being a perfectly valid position to *read* from.

use std::fmt;

use crate::error::SourceError;

// =============================================================================
// StreamOffset
// =============================================================================

/// A 64-bit byte position within a logical file.
///
/// Immutable, ordered, and freely convertible to and from `u64`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StreamOffset(u64);

impl StreamOffset {
    /// Offset zero. In a directory link position this means "no next
    /// directory"; as a read position it addresses the container header.
    pub const ZERO: StreamOffset = StreamOffset(0);

    /// Create an offset from a raw byte position.
    #[inline]
    pub const fn new(position: u64) -> Self {
        StreamOffset(position)
    }

    /// The raw byte position.
    #[inline]
    pub const fn get(self) -> u64 {
        self.0
    }

    /// Whether this offset is the directory-chain terminator sentinel.
    #[inline]
    pub const fn is_chain_end(self) -> bool {
        self.0 == 0
    }

    /// Offset advanced by `delta` bytes, or `None` on overflow.
    #[inline]
    pub const fn checked_add(self, delta: u64) -> Option<Self> {
        match self.0.checked_add(delta) {
            Some(position) => Some(StreamOffset(position)),
            None => None,
        }
    }
}

impl From<u64> for StreamOffset {
    fn from(position: u64) -> Self {
        StreamOffset(position)
    }
}

impl From<StreamOffset> for u64 {
    fn from(offset: StreamOffset) -> Self {
        offset.0
    }
}

impl fmt::Display for StreamOffset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// =============================================================================
// StreamRegion
// =============================================================================

/// A contiguous byte range: an offset plus a non-negative length.
///
/// Used to express sub-ranges of a source, e.g. a slice of a memory buffer.
/// The range `[offset, offset + length)` is validated against `u64` overflow
/// at construction, so `end()` can never wrap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StreamRegion {
    offset: StreamOffset,
    length: u64,
}

impl StreamRegion {
    /// Create a region starting at `offset` spanning `length` bytes.
    ///
    /// Fails with [`SourceError::InvalidRegion`] if `offset + length`
    /// overflows.
    pub fn new(offset: StreamOffset, length: u64) -> Result<Self, SourceError> {
        if offset.get().checked_add(length).is_none() {
            return Err(SourceError::InvalidRegion {
                offset: offset.get(),
                length,
                size: u64::MAX,
            });
        }
        Ok(StreamRegion { offset, length })
    }

    /// Start of the region.
    #[inline]
    pub const fn offset(&self) -> StreamOffset {
        self.offset
    }

    /// Length of the region in bytes.
    #[inline]
    pub const fn length(&self) -> u64 {
        self.length
    }

    /// One past the last byte of the region.
    #[inline]
    pub const fn end(&self) -> u64 {
        self.offset.get() + self.length
    }

    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Whether `position` falls inside the region.
    #[inline]
    pub const fn contains(&self, position: StreamOffset) -> bool {
        position.get() >= self.offset.get() && position.get() < self.end()
    }
}

impl fmt::Display for StreamRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.offset, self.end())
    }
}

// =============================================================================
// Tests
// =============================================================================
