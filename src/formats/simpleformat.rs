// src/formats/simpleformat.rs

//! Implements [`SimpleLogFormat`], one record per line.

use crate::common::{FileOffset, FileSz, TIME_NONE};
use crate::data::record::Record;
use crate::formats::{decode_text, FieldDescriptor, LogFormat};
use crate::readers::recordparser::RecordParser;

use ::encoding_rs::{Encoding, UTF_8};

/// Every line is a record without a timestamp or fields. Never appends
/// tails, never rejects a line.
#[derive(Clone, Copy, Debug)]
pub struct SimpleLogFormat {
    charset: &'static Encoding,
}

impl Default for SimpleLogFormat {
    fn default() -> Self {
        SimpleLogFormat { charset: UTF_8 }
    }
}

impl SimpleLogFormat {
    pub fn new() -> SimpleLogFormat {
        SimpleLogFormat::default()
    }

    pub fn with_charset(
        mut self,
        charset: &'static Encoding,
    ) -> SimpleLogFormat {
        self.charset = charset;
        self
    }
}

impl LogFormat for SimpleLogFormat {
    fn create_parser(&self) -> Box<dyn RecordParser> {
        Box::new(SimpleRecordParser {
            charset: self.charset,
            held: None,
        })
    }

    fn fields(&self) -> &[FieldDescriptor] {
        &[]
    }

    fn charset(&self) -> &'static Encoding {
        self.charset
    }

    fn has_full_date(&self) -> bool {
        false
    }

    fn human_readable(&self) -> String {
        String::from("simple format: each line is an event")
    }
}

struct SimpleRecordParser {
    charset: &'static Encoding,
    held: Option<Record>,
}

impl RecordParser for SimpleRecordParser {
    fn parse_record(
        &mut self,
        data: &[u8],
        start: FileOffset,
        end: FileOffset,
    ) -> bool {
        let truncated = (data.len() as FileSz) < end - start;
        let text = decode_text(self.charset, data);
        self.held = Some(Record::new(text, TIME_NONE, start, end, truncated, Vec::new()));

        true
    }

    fn can_append_tail(&self) -> bool {
        false
    }

    fn append_tail(
        &mut self,
        _data: &[u8],
        _full_len: FileSz,
    ) {
        debug_assert!(false, "SimpleRecordParser does not append tails");
    }

    fn has_parsed_record(&self) -> bool {
        self.held.is_some()
    }

    fn clear(&mut self) {
        self.held = None;
    }

    fn build_record(&mut self) -> Option<Record> {
        self.held.take()
    }
}
