// src/readers/recordparser.rs

//! The [`RecordParser`] contract, turning lines of bytes into [`Record`]s,
//! and [`CompoundRecordParser`], which tries several parsers per line.
//!
//! A `RecordParser` is a small state machine:
//!
//! ```text
//!            parse_record(line) == true
//!   EMPTY ─────────────────────────────▶ PARSED ──┐ append_tail(bytes)
//!     ▲                                    │  ▲   │
//!     │   clear(), build_record(),         │  └───┘
//!     └─ parse_record(line) == false ◀─────┘
//! ```
//!
//! [`Record`]: crate::data::record::Record

use crate::common::{FileOffset, FileSz};
use crate::data::record::Record;

use std::fmt;

#[allow(unused_imports)]
use ::si_trace_print::{defn, defo, defx, defñ};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// RecordParser
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A pluggable parser of one log grammar.
///
/// A parser holds at most one in-flight record. It is fed one line at a
/// time by a [`LogSnapshot`]; lines are never longer than the snapshot's
/// maximum line length, so `data` may be a prefix of the line at
/// `[start, end)`.
///
/// [`LogSnapshot`]: crate::readers::logsnapshot::LogSnapshot
pub trait RecordParser: Send {
    /// Try to parse `data`, the bytes of the line at `[start, end)`, as the
    /// first line of a record.
    ///
    /// On `true` the parser holds the new record, replacing any record it
    /// held before. On `false` the parser holds no record.
    fn parse_record(
        &mut self,
        data: &[u8],
        start: FileOffset,
        end: FileOffset,
    ) -> bool;

    /// The held record can absorb following lines that are not records of
    /// their own, e.g. the lines of a stack trace.
    fn can_append_tail(&self) -> bool;

    /// Extend the held record with `data`, the first bytes of the
    /// `full_len` bytes that follow it in the file. The held record then
    /// ends `full_len` bytes later.
    ///
    /// Only called while [`can_append_tail`] is `true`.
    ///
    /// [`can_append_tail`]: RecordParser::can_append_tail
    fn append_tail(
        &mut self,
        data: &[u8],
        full_len: FileSz,
    );

    fn has_parsed_record(&self) -> bool;

    /// Drop the held record.
    fn clear(&mut self);

    /// Hand out the held record, leaving the parser empty.
    /// `None` if there was no record.
    fn build_record(&mut self) -> Option<Record>;
}

impl fmt::Debug for dyn RecordParser {
    fn fmt(
        &self,
        f: &mut fmt::Formatter,
    ) -> fmt::Result {
        f.debug_struct("RecordParser")
            .field("has_parsed_record", &self.has_parsed_record())
            .finish()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// CompoundRecordParser
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Applied to every [`Record`] built by a [`CompoundRecordParser`], with the
/// index of the member parser that built it.
pub type RecordTransform = Box<dyn Fn(Record, usize) -> Record + Send + Sync>;

/// Which member of a [`CompoundRecordParser`] holds the in-flight record.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ActiveParser {
    /// No member holds a record.
    #[default]
    Unselected,
    /// The member at this index parsed the last line.
    Selected(usize),
}

/// Tries several [`RecordParser`]s on each line, in order. The first
/// member that parses the line becomes the [`ActiveParser`] and handles
/// tails and record building until the next line is parsed.
pub struct CompoundRecordParser {
    parsers: Vec<Box<dyn RecordParser>>,
    transform: RecordTransform,
    active: ActiveParser,
}

impl fmt::Debug for CompoundRecordParser {
    fn fmt(
        &self,
        f: &mut fmt::Formatter,
    ) -> fmt::Result {
        f.debug_struct("CompoundRecordParser")
            .field("parsers", &self.parsers.len())
            .field("active", &self.active)
            .finish()
    }
}

impl CompoundRecordParser {
    /// With no `parsers`, no line ever parses.
    pub fn new(
        parsers: Vec<Box<dyn RecordParser>>,
        transform: RecordTransform,
    ) -> CompoundRecordParser {
        CompoundRecordParser {
            parsers,
            transform,
            active: ActiveParser::Unselected,
        }
    }

    pub const fn active(&self) -> ActiveParser {
        self.active
    }

    fn active_parser(&self) -> Option<&dyn RecordParser> {
        match self.active {
            ActiveParser::Selected(index) => Some(self.parsers[index].as_ref()),
            ActiveParser::Unselected => None,
        }
    }
}

impl RecordParser for CompoundRecordParser {
    fn parse_record(
        &mut self,
        data: &[u8],
        start: FileOffset,
        end: FileOffset,
    ) -> bool {
        if let ActiveParser::Selected(index) = self.active {
            self.parsers[index].clear();
        }
        self.active = ActiveParser::Unselected;
        for (index, parser) in self.parsers.iter_mut().enumerate() {
            if parser.parse_record(data, start, end) {
                defñ!("[{}, {}) parsed by member {}", start, end, index);
                self.active = ActiveParser::Selected(index);
                return true;
            }
        }

        false
    }

    fn can_append_tail(&self) -> bool {
        match self.active_parser() {
            Some(parser) => parser.can_append_tail(),
            None => false,
        }
    }

    fn append_tail(
        &mut self,
        data: &[u8],
        full_len: FileSz,
    ) {
        if let ActiveParser::Selected(index) = self.active {
            self.parsers[index].append_tail(data, full_len);
        }
    }

    fn has_parsed_record(&self) -> bool {
        match self.active_parser() {
            Some(parser) => parser.has_parsed_record(),
            None => false,
        }
    }

    fn clear(&mut self) {
        if let ActiveParser::Selected(index) = self.active {
            self.parsers[index].clear();
            self.active = ActiveParser::Unselected;
        }
    }

    fn build_record(&mut self) -> Option<Record> {
        let index = match self.active {
            ActiveParser::Selected(index) => index,
            ActiveParser::Unselected => return None,
        };
        self.active = ActiveParser::Unselected;
        let record = self.parsers[index].build_record()?;

        Some((self.transform)(record, index))
    }
}
