// src/readers/contenthash.rs

//! Implements [`ContentHash`], a cheap file identity check that tells
//! appending to a file apart from rewriting it.

use crate::common::FileSz;

use std::cmp::min;
use std::fmt;
use std::num::ParseIntError;
use std::str::FromStr;

use ::flate2::Crc;

/// Count of bytes at the start of a file covered by a [`ContentHash`].
pub const HASH_PREFIX_MAX: usize = 255;

/// CRC32 of the first `min(size, 255)` bytes of a file, with the count of
/// hashed bytes folded into bits `48..56`.
///
/// Appending to a file of at least 255 bytes keeps the hash. Truncating,
/// rotating or rewriting the start of the file changes it.
///
/// Printed and parsed as lowercase hex, e.g. `"ff00002e8c72f0"`.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ContentHash(u64);

impl ContentHash {
    /// Count of bytes hashed for a file of `size` bytes.
    #[inline(always)]
    pub fn prefix_len_for(size: FileSz) -> usize {
        min(size, HASH_PREFIX_MAX as FileSz) as usize
    }

    /// Hash of `prefix`, the first bytes of a file.
    pub fn compute(prefix: &[u8]) -> ContentHash {
        debug_assert!(prefix.len() <= HASH_PREFIX_MAX, "prefix too long {}", prefix.len());
        let mut crc = Crc::new();
        crc.update(prefix);

        ContentHash(((prefix.len() as u64) << 48) | crc.sum() as u64)
    }

    /// Count of bytes this hash covers.
    #[inline(always)]
    pub const fn prefix_len(&self) -> usize {
        ((self.0 >> 48) & 0xFF) as usize
    }

    #[inline(always)]
    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ContentHash {
    fn fmt(
        &self,
        f: &mut fmt::Formatter,
    ) -> fmt::Result {
        write!(f, "{:x}", self.0)
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(
        &self,
        f: &mut fmt::Formatter,
    ) -> fmt::Result {
        write!(f, "ContentHash({:x})", self.0)
    }
}

impl FromStr for ContentHash {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        u64::from_str_radix(s, 16).map(ContentHash)
    }
}
