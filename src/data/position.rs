// src/data/position.rs

//! Implement [`Position`], a resumable cursor into a log.

use crate::common::{FileOffset, LogId, TimeNanos};
use crate::data::record::Record;

use std::cmp::Ordering;
use std::fmt;

/// A cursor `(log_id, time, offset)` that a caller keeps between requests
/// to continue enumerating records where the last request stopped.
///
/// The offset is local to the log named by `log_id`. A `Position` is still
/// usable after the log was truncated or rotated; readers then fall back to
/// `time` to find the place to continue from.
///
/// `Position`s order by `(time, log_id, offset)`, the same order as
/// [`Record`]s.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Position {
    log_id: LogId,
    time: TimeNanos,
    offset: FileOffset,
}

impl Position {
    pub fn new(
        log_id: &str,
        time: TimeNanos,
        offset: FileOffset,
    ) -> Position {
        debug_assert!(time >= 0, "negative timestamp {}", time);
        Position {
            log_id: LogId::from(log_id),
            time,
            offset,
        }
    }

    /// Position at the first byte of `record`.
    pub fn record_start(record: &Record) -> Position {
        Position::new(record.log_id(), record.time(), record.start())
    }

    /// Position one past the last byte of `record`.
    pub fn record_end(record: &Record) -> Position {
        Position::new(record.log_id(), record.time(), record.end())
    }

    pub fn log_id(&self) -> &str {
        &self.log_id
    }

    #[inline(always)]
    pub const fn time(&self) -> TimeNanos {
        self.time
    }

    /// Byte offset within the log named by [`log_id`](Position::log_id).
    #[inline(always)]
    pub const fn offset(&self) -> FileOffset {
        self.offset
    }
}

impl Ord for Position {
    fn cmp(
        &self,
        other: &Self,
    ) -> Ordering {
        self.time
            .cmp(&other.time)
            .then_with(|| self.log_id.cmp(&other.log_id))
            .then_with(|| self.offset.cmp(&other.offset))
    }
}

impl PartialOrd for Position {
    fn partial_cmp(
        &self,
        other: &Self,
    ) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Debug for Position {
    fn fmt(
        &self,
        f: &mut fmt::Formatter,
    ) -> fmt::Result {
        write!(f, "Position{{{} @{} t={}}}", self.log_id, self.offset, self.time)
    }
}
