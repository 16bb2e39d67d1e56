// src/data/line.rs

//! Implement [`Line`], the byte span of one line of a file.
//!
//! [`Line`]: crate::data::line::Line

use crate::common::{FileOffset, FileSz};

use std::fmt;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The byte offsets of one line, `[start, end)`, without the line
/// terminator.
///
/// A `Line` holds no bytes; the bytes stay in the page buffer of the
/// [`WindowedByteSource`] that found the line and are read with
/// [`WindowedByteSource::read`].
///
/// [`WindowedByteSource`]: crate::readers::windowedsource::WindowedByteSource
/// [`WindowedByteSource::read`]: crate::readers::windowedsource::WindowedByteSource::read
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Line {
    /// file offset of the first byte of the line (inclusive)
    pub start: FileOffset,
    /// file offset one past the last byte of the line (exclusive),
    /// before any `"\r\n"` or `"\n"`
    pub end: FileOffset,
}

impl Line {
    pub const fn new(
        start: FileOffset,
        end: FileOffset,
    ) -> Line {
        debug_assert!(start <= end);
        Line { start, end }
    }

    /// Length of the line in bytes, terminator excluded.
    #[inline(always)]
    pub const fn len(&self) -> FileSz {
        self.end - self.start
    }

    #[inline(always)]
    pub const fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

impl fmt::Debug for Line {
    fn fmt(
        &self,
        f: &mut fmt::Formatter,
    ) -> fmt::Result {
        write!(f, "Line[{}‥{})", self.start, self.end)
    }
}
