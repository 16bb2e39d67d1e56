// src/formats/regexformat.rs

//! Implements [`RegexLogFormat`], records whose first line matches a
//! regular expression.

use crate::common::{FileOffset, FileSz, TimeNanos, TIME_NONE};
use crate::data::record::{FieldSpan, Record};
use crate::formats::{decode_text, is_identifier, FieldDescriptor, FormatError, LogFormat};
use crate::readers::recordparser::RecordParser;

use std::fmt::Write;
use std::sync::Arc;

use ::chrono::format::{Item, StrftimeItems};
use ::chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, Offset, TimeZone, Utc};
use ::encoding_rs::{Encoding, UTF_8};
use ::regex::Regex;
#[allow(unused_imports)]
use ::si_trace_print::{defn, defo, defx, defñ};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A field of a [`RegexLogFormat`], bound to a regex group by name or by
/// index.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RegexField {
    name: String,
    group: Option<usize>,
    field_type: Option<String>,
}

impl RegexField {
    /// Field bound to the named group `(?P<name>…)` of the same name.
    pub fn named(name: &str) -> RegexField {
        RegexField {
            name: String::from(name),
            group: None,
            field_type: None,
        }
    }

    /// Field bound to group `index`, counting from `1`.
    pub fn group(
        name: &str,
        index: usize,
    ) -> RegexField {
        RegexField {
            name: String::from(name),
            group: Some(index),
            field_type: None,
        }
    }

    pub fn with_type(
        mut self,
        field_type: &str,
    ) -> RegexField {
        self.field_type = Some(String::from(field_type));
        self
    }
}

/// Everything a parser needs, shared by the format and its parsers.
#[derive(Clone, Debug)]
struct Grammar {
    source: String,
    regex: Regex,
    /// regex group index of each field
    groups: Vec<usize>,
    /// field index and `chrono` strftime pattern of the timestamp field
    date: Option<(usize, String)>,
    /// offset of timestamps that do not carry one
    offset: FixedOffset,
    charset: &'static Encoding,
    append_unmatched: bool,
}

/// Records start with a line that the regular expression matches in full.
///
/// Lines that do not match are the tail of the record before them and are
/// appended to its last field, unless
/// [`dont_append_unmatched_text`](RegexLogFormat::dont_append_unmatched_text)
/// is set.
#[derive(Clone, Debug)]
pub struct RegexLogFormat {
    grammar: Arc<Grammar>,
    fields: Vec<FieldDescriptor>,
}

impl RegexLogFormat {
    /// Compile `pattern` and bind `fields` to its groups.
    ///
    /// Fails if the pattern does not compile, a field name is not an
    /// identifier, a field refers to a missing group, or two fields share a
    /// group.
    pub fn new(
        pattern: &str,
        fields: Vec<RegexField>,
    ) -> Result<RegexLogFormat, FormatError> {
        defn!("({:?}, {} fields)", pattern, fields.len());
        if pattern.is_empty() {
            return Err(FormatError::InvalidRegex {
                pattern: String::from(pattern),
                message: String::from("pattern is empty"),
            });
        }
        let regex = match Regex::new(&format!("^(?:{})$", pattern)) {
            Ok(regex) => regex,
            Err(err) => {
                defx!("{}", err);
                return Err(FormatError::InvalidRegex {
                    pattern: String::from(pattern),
                    message: err.to_string(),
                });
            }
        };
        let group_count = regex.captures_len() - 1;
        let mut groups: Vec<usize> = Vec::with_capacity(fields.len());
        for field in fields.iter() {
            if field.name.is_empty() {
                return Err(FormatError::EmptyFieldName);
            }
            if !is_identifier(&field.name) {
                return Err(FormatError::InvalidFieldName(field.name.clone()));
            }
            let group = match field.group {
                Some(0) => return Err(FormatError::GroupIndexZero),
                Some(index) if index > group_count => {
                    return Err(FormatError::GroupIndexOutOfRange {
                        index,
                        count: group_count,
                    });
                }
                Some(index) => index,
                None => match regex
                    .capture_names()
                    .position(|name| name == Some(field.name.as_str()))
                {
                    Some(index) => index,
                    None => return Err(FormatError::GroupNameNotFound(field.name.clone())),
                },
            };
            if groups.contains(&group) {
                return Err(FormatError::DuplicateGroup(field.name.clone()));
            }
            groups.push(group);
        }
        let descriptors = fields
            .iter()
            .map(|field| FieldDescriptor::new(&field.name, field.field_type.as_deref()))
            .collect();
        defx!("groups {:?}", groups);

        Ok(RegexLogFormat {
            grammar: Arc::new(Grammar {
                source: String::from(pattern),
                regex,
                groups,
                date: None,
                offset: Utc.fix(),
                charset: UTF_8,
                append_unmatched: true,
            }),
            fields: descriptors,
        })
    }

    /// Parse the timestamp of records from field `field_name` with the
    /// `chrono` strftime `pattern`, which must hold a date and a time.
    pub fn with_date(
        mut self,
        field_name: &str,
        pattern: &str,
    ) -> Result<RegexLogFormat, FormatError> {
        let index = match self.field_index(field_name) {
            Some(index) => index,
            None => return Err(FormatError::DateFieldNotFound(String::from(field_name))),
        };
        if !is_full_date_pattern(pattern) {
            return Err(FormatError::InvalidDatePattern(String::from(pattern)));
        }
        Arc::make_mut(&mut self.grammar).date = Some((index, String::from(pattern)));

        Ok(self)
    }

    /// Offset for timestamps without one of their own, default UTC.
    pub fn with_offset(
        mut self,
        offset: FixedOffset,
    ) -> RegexLogFormat {
        Arc::make_mut(&mut self.grammar).offset = offset;
        self
    }

    pub fn with_charset(
        mut self,
        charset: &'static Encoding,
    ) -> RegexLogFormat {
        Arc::make_mut(&mut self.grammar).charset = charset;
        self
    }

    /// Lines that do not match are not folded into the record before them;
    /// they are left as unparsed blocks.
    pub fn dont_append_unmatched_text(
        mut self,
        dont_append: bool,
    ) -> RegexLogFormat {
        Arc::make_mut(&mut self.grammar).append_unmatched = !dont_append;
        self
    }

    /// The strftime pattern of the timestamp field, if any.
    pub fn date_pattern(&self) -> Option<&str> {
        self.grammar
            .date
            .as_ref()
            .map(|(_, pattern)| pattern.as_str())
    }
}

/// `pattern` can print and then read back a complete date and time.
fn is_full_date_pattern(pattern: &str) -> bool {
    let items: Vec<Item> = StrftimeItems::new(pattern).collect();
    if items
        .iter()
        .any(|item| matches!(item, Item::Error))
    {
        return false;
    }
    let sample: DateTime<FixedOffset> = match NaiveDate::from_ymd_opt(2021, 3, 14).and_then(|d| d.and_hms_opt(15, 9, 26)) {
        Some(naive) => Utc.fix().from_utc_datetime(&naive),
        None => return false,
    };
    let mut text = String::new();
    if write!(text, "{}", sample.format_with_items(items.iter())).is_err() {
        return false;
    }

    DateTime::parse_from_str(&text, pattern).is_ok() || NaiveDateTime::parse_from_str(&text, pattern).is_ok()
}

/// Nanoseconds since the epoch of `text` in `pattern`, `TIME_NONE` if it
/// does not parse or is not after the epoch.
fn parse_time(
    text: &str,
    pattern: &str,
    offset: &FixedOffset,
) -> TimeNanos {
    let datetime: Option<DateTime<FixedOffset>> = match DateTime::parse_from_str(text, pattern) {
        Ok(datetime) => Some(datetime),
        Err(_) => match NaiveDateTime::parse_from_str(text, pattern) {
            Ok(naive) => offset.from_local_datetime(&naive).single(),
            Err(_) => None,
        },
    };
    match datetime.and_then(|dt| dt.timestamp_nanos_opt()) {
        Some(nanos) if nanos > TIME_NONE => nanos,
        _ => TIME_NONE,
    }
}

impl LogFormat for RegexLogFormat {
    fn create_parser(&self) -> Box<dyn RecordParser> {
        Box::new(RegexRecordParser {
            grammar: self.grammar.clone(),
            held: None,
        })
    }

    fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    fn charset(&self) -> &'static Encoding {
        self.grammar.charset
    }

    fn has_full_date(&self) -> bool {
        self.grammar.date.is_some()
    }

    fn human_readable(&self) -> String {
        format!("regexp: {}", self.grammar.source)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// RegexRecordParser
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// In-flight record of a [`RegexRecordParser`].
struct HeldRecord {
    text: String,
    start: FileOffset,
    end: FileOffset,
    truncated: bool,
    fields: Vec<FieldSpan>,
}

struct RegexRecordParser {
    grammar: Arc<Grammar>,
    held: Option<HeldRecord>,
}

impl RecordParser for RegexRecordParser {
    fn parse_record(
        &mut self,
        data: &[u8],
        start: FileOffset,
        end: FileOffset,
    ) -> bool {
        let text = decode_text(self.grammar.charset, data);
        let fields: Vec<FieldSpan> = match self.grammar.regex.captures(&text) {
            Some(captures) => self
                .grammar
                .groups
                .iter()
                .map(|group| {
                    captures
                        .get(*group)
                        .map(|m| m.range())
                })
                .collect(),
            None => {
                self.held = None;
                return false;
            }
        };
        self.held = Some(HeldRecord {
            text,
            start,
            end,
            truncated: (data.len() as FileSz) < end - start,
            fields,
        });

        true
    }

    fn can_append_tail(&self) -> bool {
        self.grammar.append_unmatched && !self.grammar.groups.is_empty()
    }

    fn append_tail(
        &mut self,
        data: &[u8],
        full_len: FileSz,
    ) {
        debug_assert!(self.can_append_tail());
        let held: &mut HeldRecord = match self.held.as_mut() {
            Some(held) => held,
            None => return,
        };
        held.end += full_len;
        if data.is_empty() || held.truncated {
            return;
        }
        if (data.len() as FileSz) < full_len {
            held.truncated = true;
        }
        let tail = decode_text(self.grammar.charset, data);
        let text_len = held.text.len();
        // the tail extends the last field only if that field ends the line
        if let Some(last) = held.fields.last_mut() {
            match last {
                None => *last = Some(text_len..text_len + tail.len()),
                Some(span) if span.end == text_len => span.end += tail.len(),
                Some(_) => {}
            }
        }
        held.text.push_str(&tail);
    }

    fn has_parsed_record(&self) -> bool {
        self.held.is_some()
    }

    fn clear(&mut self) {
        self.held = None;
    }

    fn build_record(&mut self) -> Option<Record> {
        let held = self.held.take()?;
        let time: TimeNanos = match &self.grammar.date {
            Some((index, pattern)) => match &held.fields[*index] {
                Some(span) => parse_time(&held.text[span.clone()], pattern, &self.grammar.offset),
                None => TIME_NONE,
            },
            None => TIME_NONE,
        };

        Some(Record::new(held.text, time, held.start, held.end, held.truncated, held.fields))
    }
}
