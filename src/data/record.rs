// src/data/record.rs

//! Implement [`Record`], one parsed log entry.

use crate::common::{FileOffset, FileSz, LogId, TimeNanos, TIME_NONE};

use std::cmp::Ordering;
use std::fmt;
use std::ops::Range;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Byte span of a field within [`Record::text`], or `None` if the field is
/// absent from this record.
pub type FieldSpan = Option<Range<usize>>;

/// One logical log entry, possibly spanning several lines, or one
/// "unparsed" block of bytes the log format could not interpret.
///
/// A `Record` is built by a [`RecordParser`] and is not changed afterwards,
/// except to be stamped with the id of the log it came from.
///
/// `Record`s order by `(time, log_id, start)`, then by their other fields
/// so that the order agrees with `==`.
///
/// [`RecordParser`]: crate::readers::recordparser::RecordParser
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Record {
    log_id: LogId,
    text: String,
    time: TimeNanos,
    start: FileOffset,
    end: FileOffset,
    /// `text` holds less than the bytes at `[start, end)`
    truncated: bool,
    fields: Vec<FieldSpan>,
    /// index of the member format of a compound format that built this record
    format_index: Option<usize>,
    unparsed: bool,
}

impl Record {
    pub fn new(
        text: String,
        time: TimeNanos,
        start: FileOffset,
        end: FileOffset,
        truncated: bool,
        fields: Vec<FieldSpan>,
    ) -> Record {
        debug_assert!(start <= end, "start {} > end {}", start, end);
        debug_assert!(
            fields.iter().flatten().all(|span| span.end <= text.len()),
            "field span beyond text length {}",
            text.len()
        );
        Record {
            log_id: LogId::new(),
            text,
            time,
            start,
            end,
            truncated,
            fields,
            format_index: None,
            unparsed: false,
        }
    }

    /// A record for bytes that the log format could not interpret.
    /// No timestamp and all `field_count` fields absent.
    pub fn unparsed(
        text: String,
        start: FileOffset,
        end: FileOffset,
        truncated: bool,
        field_count: usize,
    ) -> Record {
        let mut record = Record::new(text, TIME_NONE, start, end, truncated, vec![None; field_count]);
        record.unparsed = true;
        record
    }

    /// Stamp the record with the id of the log it was read from.
    pub fn with_log_id(
        mut self,
        log_id: &str,
    ) -> Record {
        self.log_id.clear();
        self.log_id.push_str(log_id);
        self
    }

    /// Tag the record with the member format of a compound format that
    /// parsed it.
    pub fn with_format_index(
        mut self,
        index: usize,
    ) -> Record {
        self.format_index = Some(index);
        self
    }

    /// Replace the field spans, e.g. to renumber fields.
    pub fn with_fields(
        mut self,
        fields: Vec<FieldSpan>,
    ) -> Record {
        debug_assert!(fields.iter().flatten().all(|span| span.end <= self.text.len()));
        self.fields = fields;
        self
    }

    pub fn log_id(&self) -> &str {
        &self.log_id
    }

    /// Record text, decoded with the charset of the log format.
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn into_text(self) -> String {
        self.text
    }

    /// Nanoseconds since the Unix epoch, `0` if the record has no timestamp.
    #[inline(always)]
    pub const fn time(&self) -> TimeNanos {
        self.time
    }

    #[inline(always)]
    pub const fn has_time(&self) -> bool {
        self.time > TIME_NONE
    }

    /// File offset of the first byte of the record.
    #[inline(always)]
    pub const fn start(&self) -> FileOffset {
        self.start
    }

    /// File offset one past the last byte of the record, line terminator
    /// excluded.
    #[inline(always)]
    pub const fn end(&self) -> FileOffset {
        self.end
    }

    /// Count of file bytes covered by the record.
    #[inline(always)]
    pub const fn len(&self) -> FileSz {
        self.end - self.start
    }

    #[inline(always)]
    pub const fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// The record text was cut short by the maximum line length.
    #[inline(always)]
    pub const fn truncated(&self) -> bool {
        self.truncated
    }

    /// The record was not recognized by the log format.
    #[inline(always)]
    pub const fn is_unparsed(&self) -> bool {
        self.unparsed
    }

    pub const fn format_index(&self) -> Option<usize> {
        self.format_index
    }

    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    /// Byte span of field `index` within [`text`](Record::text).
    pub fn field_span(
        &self,
        index: usize,
    ) -> Option<Range<usize>> {
        self.fields.get(index).cloned().flatten()
    }

    /// Text of field `index`, `None` if out of range or absent.
    pub fn field_text(
        &self,
        index: usize,
    ) -> Option<&str> {
        self.field_span(index)
            .and_then(|span| self.text.get(span))
    }
}

impl Ord for Record {
    fn cmp(
        &self,
        other: &Self,
    ) -> Ordering {
        self.time
            .cmp(&other.time)
            .then_with(|| self.log_id.cmp(&other.log_id))
            .then_with(|| self.start.cmp(&other.start))
            // the rest only separates records that are not equal
            .then_with(|| self.end.cmp(&other.end))
            .then_with(|| self.text.cmp(&other.text))
            .then_with(|| self.truncated.cmp(&other.truncated))
            .then_with(|| self.unparsed.cmp(&other.unparsed))
            .then_with(|| self.format_index.cmp(&other.format_index))
            .then_with(|| {
                let key = |span: &FieldSpan| span.as_ref().map(|span| (span.start, span.end));
                self.fields
                    .iter()
                    .map(key)
                    .cmp(other.fields.iter().map(key))
            })
    }
}

impl PartialOrd for Record {
    fn partial_cmp(
        &self,
        other: &Self,
    ) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Debug for Record {
    fn fmt(
        &self,
        f: &mut fmt::Formatter,
    ) -> fmt::Result {
        f.debug_struct("Record")
            .field("log_id", &self.log_id)
            .field("start", &self.start)
            .field("end", &self.end)
            .field("time", &self.time)
            .field("truncated", &self.truncated)
            .field("format_index", &self.format_index)
            .field("unparsed", &self.unparsed)
            .field("text", &self.text)
            .finish()
    }
}

impl fmt::Display for Record {
    fn fmt(
        &self,
        f: &mut fmt::Formatter,
    ) -> fmt::Result {
        f.write_str(&self.text)
    }
}
