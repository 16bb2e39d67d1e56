// src/error.rs

//! Error types for reading log files.

use crate::common::{FPath, FileOffset};

use std::io;

use ::thiserror::Error;

/// Result type for log reading operations.
pub type Result<T> = std::result::Result<T, LogError>;

/// Errors that can occur while opening and enumerating a log file.
#[derive(Debug, Error)]
pub enum LogError {
    /// The file does not exist or the path is not absolute.
    #[error("file not found: {path}")]
    NotFound {
        /// The requested path.
        path: FPath,
    },

    /// The path exists but is not a regular file.
    #[error("not a file: {path}")]
    NotRegularFile {
        /// The requested path.
        path: FPath,
    },

    /// The access policy refused the path.
    #[error("{reason}")]
    NotVisible {
        /// The requested path.
        path: FPath,
        /// Message from the access policy.
        reason: String,
    },

    /// A span of the file could not be interpreted by the selected format
    /// and is larger than the unparsable block limit.
    #[error("Failed to parse file. Probably, the wrong log format is specified: {path} (bytes {block_start}..{block_end}, expected {format})")]
    FormatMismatch {
        /// The file.
        path: FPath,
        /// First byte of the unparsable span.
        block_start: FileOffset,
        /// One past the last byte of the unparsable span.
        block_end: FileOffset,
        /// Human readable description of the expected format.
        format: String,
    },

    /// Record timestamps are not non-decreasing.
    #[error("Incorrect record order in {path}: {earlier:?} > {later:?}")]
    OrderingViolation {
        /// The file.
        path: FPath,
        /// Text of the record found earlier in the file.
        earlier: String,
        /// Text of the record found later in the file.
        later: String,
    },

    /// The file shrank or was rewritten while it was being read, or a
    /// caller-supplied content hash no longer matches the file.
    #[error("log file was rewritten or truncated while reading")]
    Crashed,

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl LogError {
    /// Returns `true` for errors that are expected under concurrent writers
    /// and go away when a new snapshot is taken.
    pub const fn is_retryable(&self) -> bool {
        matches!(self, LogError::Crashed)
    }

    /// Returns `true` for errors meaning the file cannot be shown at all.
    pub const fn is_not_found(&self) -> bool {
        matches!(self, LogError::NotFound { .. } | LogError::NotRegularFile { .. } | LogError::NotVisible { .. })
    }
}

/// A failed snapshot hands its open error to every later call, so the error
/// must be duplicable. `io::Error` is re-created from its kind and message.
impl Clone for LogError {
    fn clone(&self) -> Self {
        match self {
            LogError::NotFound { path } => LogError::NotFound { path: path.clone() },
            LogError::NotRegularFile { path } => LogError::NotRegularFile { path: path.clone() },
            LogError::NotVisible { path, reason } => LogError::NotVisible {
                path: path.clone(),
                reason: reason.clone(),
            },
            LogError::FormatMismatch {
                path,
                block_start,
                block_end,
                format,
            } => LogError::FormatMismatch {
                path: path.clone(),
                block_start: *block_start,
                block_end: *block_end,
                format: format.clone(),
            },
            LogError::OrderingViolation { path, earlier, later } => LogError::OrderingViolation {
                path: path.clone(),
                earlier: earlier.clone(),
                later: later.clone(),
            },
            LogError::Crashed => LogError::Crashed,
            LogError::Io(err) => LogError::Io(io::Error::new(err.kind(), err.to_string())),
        }
    }
}

/// Convert an error from reading the pages of an already opened file.
///
/// The snapshot pinned the file size when it opened; running into end of
/// file below that size means the file shrank underneath the reader.
pub fn crash_on_eof(err: io::Error) -> LogError {
    match err.kind() {
        io::ErrorKind::UnexpectedEof => LogError::Crashed,
        _ => LogError::Io(err),
    }
}
