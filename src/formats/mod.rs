// src/formats/mod.rs

//! Log formats: how a file's lines become [`Record`]s.
//!
//! A [`LogFormat`] describes a grammar and its fields, and creates fresh
//! [`RecordParser`]s for readers.
//!
//! * [`SimpleLogFormat`]: every line is a record.
//! * [`RegexLogFormat`]: records start with a line matching a regular
//!   expression; fields are regex groups; one field may hold a timestamp.
//! * [`CompoundLogFormat`]: several formats mixed in one file, the first
//!   format that matches a line wins.
//!
//! [`Record`]: crate::data::record::Record
//! [`RecordParser`]: crate::readers::recordparser::RecordParser
//! [`SimpleLogFormat`]: crate::formats::simpleformat::SimpleLogFormat
//! [`RegexLogFormat`]: crate::formats::regexformat::RegexLogFormat
//! [`CompoundLogFormat`]: crate::formats::compoundformat::CompoundLogFormat

use crate::readers::recordparser::RecordParser;

use std::borrow::Cow;
use std::fmt;

use ::encoding_rs::{Encoding, UTF_8};
use ::lazy_static::lazy_static;
use ::regex::Regex;
use ::thiserror::Error;

pub mod compoundformat;
pub mod regexformat;
pub mod simpleformat;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Name and optional type tag of one field of a format.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FieldDescriptor {
    name: String,
    field_type: Option<String>,
}

impl FieldDescriptor {
    pub fn new(
        name: &str,
        field_type: Option<&str>,
    ) -> FieldDescriptor {
        FieldDescriptor {
            name: String::from(name),
            field_type: field_type.map(String::from),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Free-form type tag, e.g. `"date"` or `"level"`.
    pub fn field_type(&self) -> Option<&str> {
        self.field_type.as_deref()
    }
}

/// A log grammar. Readers treat formats as opaque factories of
/// [`RecordParser`]s.
pub trait LogFormat: Send + Sync + fmt::Debug {
    /// A new parser in its empty state.
    fn create_parser(&self) -> Box<dyn RecordParser>;

    fn fields(&self) -> &[FieldDescriptor];

    fn field_index(
        &self,
        name: &str,
    ) -> Option<usize> {
        self.fields()
            .iter()
            .position(|field| field.name() == name)
    }

    /// Charset of the file bytes.
    fn charset(&self) -> &'static Encoding {
        UTF_8
    }

    /// Records of this format carry a complete timestamp, so records can
    /// be found by time.
    fn has_full_date(&self) -> bool;

    /// Short description shown to users, e.g. in "wrong format" errors.
    fn human_readable(&self) -> String;
}

/// Errors in the definition of a log format.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FormatError {
    #[error("Invalid pattern [{pattern}] {message}")]
    InvalidRegex { pattern: String, message: String },
    #[error("Field name can not be empty string")]
    EmptyFieldName,
    #[error("Invalid field name '{0}'. Field names can contain only letters, digits and '_'")]
    InvalidFieldName(String),
    #[error("Invalid group index in regex format, group index must be greater than 0")]
    GroupIndexZero,
    #[error("Invalid group index in regex format, group index is greater than regex group count ({index} > {count})")]
    GroupIndexOutOfRange { index: usize, count: usize },
    #[error("No regex group named '{0}'")]
    GroupNameNotFound(String),
    #[error("Two fields reference the same regex group: {0}")]
    DuplicateGroup(String),
    #[error("Invalid date field: no field with name \"{0}\"")]
    DateFieldNotFound(String),
    #[error("Invalid date pattern \"{0}\", the pattern must include date and time")]
    InvalidDatePattern(String),
    #[error("A compound format needs at least one member format")]
    NoFormats,
}

/// Field names are identifiers: letters, digits, and `'_'`, not starting
/// with a digit.
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' => {}
        _ => return false,
    }

    chars.all(|c| c.is_alphanumeric() || c == '_')
}

lazy_static! {
    /// ANSI SGR color sequences, e.g. `"\x1b[31m"`.
    static ref REGEX_ANSI_COLOR: Regex = Regex::new(r"\x1b\[[0-9;]*m").unwrap();
}

/// Decode `data` with `charset` and remove ANSI color sequences.
/// Malformed sequences become `U+FFFD`.
pub fn decode_text(
    charset: &'static Encoding,
    data: &[u8],
) -> String {
    let (text, _had_errors): (Cow<str>, bool) = charset.decode_without_bom_handling(data);
    if !REGEX_ANSI_COLOR.is_match(&text) {
        return text.into_owned();
    }

    REGEX_ANSI_COLOR
        .replace_all(&text, "")
        .into_owned()
}
