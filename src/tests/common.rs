// src/tests/common.rs

//! Fixtures and helpers shared by tests.

#![allow(non_upper_case_globals)]

use crate::common::{FPath, FileOffset, ProcessResult, TimeNanos};
use crate::data::record::Record;
use crate::debug::helpers::{create_temp_file, ntf_fpath, NamedTempFile};
use crate::formats::regexformat::{RegexField, RegexLogFormat};
use crate::formats::simpleformat::SimpleLogFormat;
use crate::formats::LogFormat;
use crate::readers::log::Log;
use crate::readers::logsnapshot::{LogSnapshot, RecordFlow, SnapshotConfig};

use std::sync::Arc;

use ::chrono::{DateTime, NaiveDateTime};
use ::lazy_static::lazy_static;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Record grammar of the timestamped fixtures.
pub const TS_PATTERN: &str = r"(?P<date>\d{4}-\d{2}-\d{2} \d{2}:\d{2}:\d{2}) (?P<msg>.*)";

/// strftime pattern of the `date` field of [`TS_PATTERN`].
pub const TS_DATE_PATTERN: &str = "%Y-%m-%d %H:%M:%S";

/// Seven lines, no timestamps, no trailing newline.
pub const DATA_NUMBERS: &str = "1\n2\n3\n4\n5\n6\n7";

/// A record with a stack trace of five lines, then one more record.
pub const DATA_STACK: &str = "\
2021-03-14 15:09:26 first failed
\tat a.b.C.one(C.java:1)
\tat a.b.C.two(C.java:2)
\tat a.b.C.three(C.java:3)
\tat a.b.C.four(C.java:4)
\tat a.b.C.five(C.java:5)
2021-03-14 15:09:27 second";

/// Unparsable lines before, between, and after timestamped records.
pub const DATA_GLITCHES: &str = "\
glitch at start
2021-03-14 15:09:26 one
glitch after one
2021-03-14 15:09:27 two
2021-03-14 15:09:28 three
glitch after three
another glitch after three
2021-03-14 15:09:29 four
";

lazy_static! {
    pub static ref NTF_EMPTY: NamedTempFile = create_temp_file("");
    pub static ref NTF_EMPTY_path: FPath = ntf_fpath(&NTF_EMPTY);
    pub static ref NTF_NUMBERS: NamedTempFile = create_temp_file(DATA_NUMBERS);
    pub static ref NTF_NUMBERS_path: FPath = ntf_fpath(&NTF_NUMBERS);
    pub static ref NTF_STACK: NamedTempFile = create_temp_file(DATA_STACK);
    pub static ref NTF_STACK_path: FPath = ntf_fpath(&NTF_STACK);
    pub static ref NTF_GLITCHES: NamedTempFile = create_temp_file(DATA_GLITCHES);
    pub static ref NTF_GLITCHES_path: FPath = ntf_fpath(&NTF_GLITCHES);
}

// -------------------------------------------------------------------------------------------------

pub fn format_simple() -> Arc<dyn LogFormat> {
    Arc::new(SimpleLogFormat::new())
}

/// [`TS_PATTERN`] records; unmatched lines are the tail of the record
/// before them.
pub fn format_ts() -> Arc<dyn LogFormat> {
    Arc::new(regex_format_ts(false))
}

/// [`TS_PATTERN`] records; unmatched lines are unparsed blocks.
pub fn format_ts_no_tail() -> Arc<dyn LogFormat> {
    Arc::new(regex_format_ts(true))
}

pub fn regex_format_ts(no_tail: bool) -> RegexLogFormat {
    RegexLogFormat::new(TS_PATTERN, vec![RegexField::named("date"), RegexField::named("msg")])
        .unwrap()
        .with_date("date", TS_DATE_PATTERN)
        .unwrap()
        .dont_append_unmatched_text(no_tail)
}

/// Nanoseconds of a UTC [`TS_DATE_PATTERN`] datetime.
pub fn ts(text: &str) -> TimeNanos {
    NaiveDateTime::parse_from_str(text, TS_DATE_PATTERN)
        .unwrap()
        .and_utc()
        .timestamp_nanos_opt()
        .unwrap()
}

/// [`TS_DATE_PATTERN`] text of `secs` seconds since the epoch.
pub fn ts_text(secs: i64) -> String {
    DateTime::from_timestamp(secs, 0)
        .unwrap()
        .format(TS_DATE_PATTERN)
        .to_string()
}

pub fn new_log(
    path: &FPath,
    format: Arc<dyn LogFormat>,
) -> Log {
    Log::new(path.clone(), format)
}

pub fn new_log_config(
    path: &FPath,
    format: Arc<dyn LogFormat>,
    config: SnapshotConfig,
) -> Log {
    Log::new(path.clone(), format).with_config(config)
}

/// Open a snapshot that must not fail.
pub fn open_snapshot(log: &Log) -> LogSnapshot {
    let snapshot = log.create_snapshot();
    if let Some(err) = snapshot.error() {
        panic!("create_snapshot({:?}) failed {}", log.path(), err);
    }

    snapshot
}

/// All records of `process_records(pos, from_next_line)`.
pub fn collect_records(
    snapshot: &mut LogSnapshot,
    pos: FileOffset,
    from_next_line: bool,
) -> (Vec<Record>, ProcessResult) {
    let mut records: Vec<Record> = Vec::new();
    let result = match snapshot.process_records(pos, from_next_line, |record| {
        records.push(record);
        RecordFlow::Continue(())
    }) {
        Ok(result) => result,
        Err(err) => panic!("process_records({}, {}) failed {}", pos, from_next_line, err),
    };

    (records, result)
}

/// All records of `process_records_back(pos, from_prev_line)`.
pub fn collect_records_back(
    snapshot: &mut LogSnapshot,
    pos: FileOffset,
    from_prev_line: bool,
) -> (Vec<Record>, ProcessResult) {
    let mut records: Vec<Record> = Vec::new();
    let result = match snapshot.process_records_back(pos, from_prev_line, |record| {
        records.push(record);
        RecordFlow::Continue(())
    }) {
        Ok(result) => result,
        Err(err) => panic!("process_records_back({}, {}) failed {}", pos, from_prev_line, err),
    };

    (records, result)
}

pub fn texts(records: &[Record]) -> Vec<&str> {
    records
        .iter()
        .map(|record| record.text())
        .collect()
}

/// A timestamped log of `count` records, each `step(i)` seconds after the
/// one before. Every `untimed_every`-th record has a date that does not
/// parse and every `trace_every`-th record has a two line tail.
pub fn generate_ts_log(
    count: usize,
    untimed_every: usize,
    trace_every: usize,
    step: impl Fn(usize) -> i64,
) -> String {
    let mut secs: i64 = 1_615_680_000;
    let mut data = String::new();
    for i in 0..count {
        secs += step(i);
        if i > 0 {
            data.push('\n');
        }
        if untimed_every != 0 && i % untimed_every == untimed_every - 1 {
            data.push_str(&format!("2021-13-45 99:99:99 record {:05} without a time", i));
        } else {
            data.push_str(&format!("{} record {:05} message text", ts_text(secs), i));
        }
        if trace_every != 0 && i % trace_every == trace_every - 1 {
            data.push_str(&format!("\n\tat trace.Frame.one({})\n\tat trace.Frame.two({})", i, i));
        }
    }

    data
}
