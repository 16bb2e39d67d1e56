// src/data/mod.rs

//! The `data` module is the value types handed between readers and their
//! callers: [`Line`]s, [`Record`]s, and [`Position`]s.
//!
//! ## Definitions of data
//!
//! #### Line
//!
//! A "line" is a sequence of bytes in a file that:
//!
//! * begins after a prior "line" (and its `'\n'`) or at the beginning of
//!   the file.
//! * ends before a newline character `'\n'` or at the end of the file.
//!   One `'\r'` before the `'\n'` is not part of the line.
//!
//! A "line" is represented by a [`Line`] and found by a
//! [`WindowedByteSource`].
//!
//! #### Record
//!
//! A "record" is one logical log entry: the first "line" matches the record
//! grammar of the log format, and following "lines" that do not match it
//! may be folded into the record as its "tail".
//! Byte spans the format cannot interpret are handed out as "unparsed"
//! records.
//!
//! A "record" is represented by a [`Record`] and found by a
//! [`LogSnapshot`].
//!
//! #### Position
//!
//! A resumable cursor into a log, see [`Position`].
//!
//! [`Line`]: crate::data::line::Line
//! [`Record`]: crate::data::record::Record
//! [`Position`]: crate::data::position::Position
//! [`WindowedByteSource`]: crate::readers::windowedsource::WindowedByteSource
//! [`LogSnapshot`]: crate::readers::logsnapshot::LogSnapshot

pub mod line;
pub mod position;
pub mod record;
