// src/lib.rs

//! Read, tail, and seek-by-time arbitrarily large, actively-growing log
//! files without loading them into memory, _logsnaplib_.
//!
//! * [_Definitions of data_]: lines, records, positions.
//! * [_Formats_]: how lines become records.
//! * [_Readers_]: windowed file access, snapshots, the timestamp index,
//!   and record loading.
//!
//! [_Definitions of data_]: crate::data
//! [_Formats_]: crate::formats
//! [_Readers_]: crate::readers

pub mod common;
pub mod data;
pub mod debug;
pub mod error;
pub mod formats;
pub mod readers;
#[cfg(test)]
pub mod tests;
