// src/readers/mod.rs

//! "Readers" for _logsnaplib_.
//!
//! ## Overview of readers
//!
//! * A [`Log`] creates a [`LogSnapshot`] per request.
//! * A `LogSnapshot` drives [`RecordParser`s] over a [`WindowedByteSource`]
//!   to derive [`Record`s].
//! * A `WindowedByteSource` drives a [`File`] to derive [`Line`s].
//! * A [`TimestampIndex`] drives a `LogSnapshot` to find `Record`s by
//!   timestamp.
//!
//! <br/>
//!
//! * A `WindowedByteSource` only handles `u8` bytes, through at most two
//!   resident pages.
//! * A `RecordParser` decodes bytes with the charset of its format; the
//!   text of a `Record` is a `String`.
//!
//! <br/>
//!
//! Also see [_Definitions of data_].
//!
//! <br/>
//!
//! ---
//!
//! The _logsnap_ binary program reads one `LogSnapshot` for its first
//! page, then with `--follow` uses [`load_records`] on a [`WorkerPool`].
//!
//! <br/>
//!
//! _These are not rust "Readers"; these structs do not implement the trait
//! [`Read`]. These are "readers" in an informal sense._
//!
//! [_Definitions of data_]: crate::data
//! [`Read`]: std::io::Read
//! [`File`]: std::fs::File
//! [`Line`s]: crate::data::line::Line
//! [`Record`s]: crate::data::record::Record
//! [`Log`]: crate::readers::log::Log
//! [`LogSnapshot`]: crate::readers::logsnapshot::LogSnapshot
//! [`RecordParser`s]: crate::readers::recordparser::RecordParser
//! [`WindowedByteSource`]: crate::readers::windowedsource::WindowedByteSource
//! [`TimestampIndex`]: crate::readers::timestampindex::TimestampIndex
//! [`load_records`]: crate::readers::recordloader::load_records
//! [`WorkerPool`]: crate::readers::workerpool::WorkerPool

pub mod accesspolicy;
pub mod contenthash;
pub mod filewatch;
pub mod helpers;
pub mod log;
pub mod logsnapshot;
pub mod recordloader;
pub mod recordparser;
pub mod timestampindex;
pub mod windowedsource;
pub mod workerpool;
