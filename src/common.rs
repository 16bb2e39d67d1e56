// src/common.rs
//
// common imports, type aliases, and other globals (avoids circular imports)

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// file-handling
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub use std::fs::File;
pub use std::path::Path;

// TODO: use `std::path::PathBuf` for `FPath`
/// `F`ake `Path` or `F`ile `Path`
pub type FPath = String;
pub type FileMetadata = std::fs::Metadata;

/// Offset into a file in bytes
pub type FileOffset = u64;

/// File size in bytes
pub type FileSz = u64;

/// General purpose counting type, typically used for internal statistics
pub type Count = u64;

/// Sequence of Bytes
pub type Bytes = Vec<u8>;

/// Identifier of a log file, unique per path.
pub type LogId = String;

/// Nanoseconds since the Unix epoch. A value of `0` means "no timestamp".
pub type TimeNanos = i64;

/// The "no timestamp" value of a [`TimeNanos`].
pub const TIME_NONE: TimeNanos = 0;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Lines
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Single-byte newLine char as u8
#[allow(non_upper_case_globals)]
pub const NLu8: u8 = 10;
/// Single-byte carriage return char as u8
#[allow(non_upper_case_globals)]
pub const CRu8: u8 = 13;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// custom Results enums for scanning functions
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// How a scan over bytes or records finished.
///
/// Pagination logic upstream needs to know whether a scan ran out of input
/// or was halted by the consumer callback, so the two are kept distinct.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProcessResult {
    /// All input in the scan direction was handed to the consumer.
    Exhausted,
    /// The consumer returned [`ControlFlow::Break`].
    ///
    /// [`ControlFlow::Break`]: std::ops::ControlFlow::Break
    Stopped,
}

impl ProcessResult {
    /// Returns `true` if the result is [`Exhausted`].
    ///
    /// [`Exhausted`]: ProcessResult::Exhausted
    #[inline(always)]
    pub const fn is_exhausted(&self) -> bool {
        matches!(*self, ProcessResult::Exhausted)
    }

    /// Returns `true` if the result is [`Stopped`].
    ///
    /// [`Stopped`]: ProcessResult::Stopped
    #[inline(always)]
    pub const fn is_stopped(&self) -> bool {
        matches!(*self, ProcessResult::Stopped)
    }
}

impl std::fmt::Display for ProcessResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProcessResult::Exhausted => write!(f, "ProcessResult::Exhausted"),
            ProcessResult::Stopped => write!(f, "ProcessResult::Stopped"),
        }
    }
}
