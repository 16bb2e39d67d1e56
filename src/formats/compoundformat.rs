// src/formats/compoundformat.rs

//! Implements [`CompoundLogFormat`], several formats mixed in one log.

use crate::data::record::{FieldSpan, Record};
use crate::formats::{FieldDescriptor, FormatError, LogFormat};
use crate::readers::recordparser::{CompoundRecordParser, RecordParser};

use std::sync::Arc;

use ::encoding_rs::Encoding;

/// Tries member formats in order on each line; the first format that
/// matches parses the record.
///
/// The fields of the members are merged: member fields with the same name
/// and type share one merged field, other name clashes get a suffix
/// (`"msg_1"`). Built records carry their fields in merged order and are
/// tagged with [`Record::format_index`], the index of the member format
/// that parsed them.
#[derive(Clone, Debug)]
pub struct CompoundLogFormat {
    formats: Vec<Arc<dyn LogFormat>>,
    fields: Vec<FieldDescriptor>,
    /// per member format, the merged index of each of its fields
    merged_indexes: Arc<Vec<Vec<usize>>>,
}

impl CompoundLogFormat {
    pub fn new(formats: Vec<Arc<dyn LogFormat>>) -> Result<CompoundLogFormat, FormatError> {
        if formats.is_empty() {
            return Err(FormatError::NoFormats);
        }
        let mut fields: Vec<FieldDescriptor> = Vec::new();
        let mut merged_indexes: Vec<Vec<usize>> = Vec::with_capacity(formats.len());
        for format in formats.iter() {
            let mut used: Vec<usize> = Vec::with_capacity(format.fields().len());
            for field in format.fields() {
                let shared = fields
                    .iter()
                    .enumerate()
                    .position(|(index, merged)| merged == field && !used.contains(&index));
                let index = match shared {
                    Some(index) => index,
                    None => {
                        let name = unique_name(&fields, field.name());
                        fields.push(FieldDescriptor::new(&name, field.field_type()));
                        fields.len() - 1
                    }
                };
                used.push(index);
            }
            merged_indexes.push(used);
        }

        Ok(CompoundLogFormat {
            formats,
            fields,
            merged_indexes: Arc::new(merged_indexes),
        })
    }

    pub fn formats(&self) -> &[Arc<dyn LogFormat>] {
        &self.formats
    }
}

fn unique_name(
    fields: &[FieldDescriptor],
    base: &str,
) -> String {
    let taken = |name: &str| fields.iter().any(|field| field.name() == name);
    if !taken(base) {
        return String::from(base);
    }

    (1_usize..)
        .map(|i| format!("{}_{}", base, i))
        .find(|name| !taken(name))
        .unwrap_or_else(|| String::from(base))
}

impl LogFormat for CompoundLogFormat {
    fn create_parser(&self) -> Box<dyn RecordParser> {
        let parsers: Vec<Box<dyn RecordParser>> = self
            .formats
            .iter()
            .map(|format| format.create_parser())
            .collect();
        let merged_indexes = self.merged_indexes.clone();
        let field_count = self.fields.len();

        Box::new(CompoundRecordParser::new(
            parsers,
            Box::new(move |record: Record, format_index: usize| {
                let mut fields: Vec<FieldSpan> = vec![None; field_count];
                for (field, merged) in merged_indexes[format_index].iter().enumerate() {
                    fields[*merged] = record.field_span(field);
                }
                record
                    .with_fields(fields)
                    .with_format_index(format_index)
            }),
        ))
    }

    fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    /// Charset of the first member format.
    fn charset(&self) -> &'static Encoding {
        self.formats[0].charset()
    }

    fn has_full_date(&self) -> bool {
        self.formats
            .iter()
            .all(|format| format.has_full_date())
    }

    fn human_readable(&self) -> String {
        let members: Vec<String> = self
            .formats
            .iter()
            .map(|format| format.human_readable())
            .collect();

        format!("one of [{}]", members.join("; "))
    }
}
