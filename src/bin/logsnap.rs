// src/bin/logsnap.rs

//! Driver program _logsnap_.
//!
//! Print the records of one log file: the tail, everything from a time,
//! or newest first. With `--follow`, keep printing records as the file
//! grows.

use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use ::anyhow::{bail, Context};
use ::chrono::{DateTime, FixedOffset, NaiveDateTime, Offset, TimeZone, Utc};
use ::clap::Parser;
use ::crossbeam_channel::unbounded;
use ::regex::Regex;
#[allow(unused_imports)]
use ::si_trace_print::{defn, defo, defx, defñ};

use ::logsnaplib::common::{ProcessResult, TimeNanos};
use ::logsnaplib::data::position::Position;
use ::logsnaplib::data::record::Record;
use ::logsnaplib::debug::printers::{e_err, e_wrn};
use ::logsnaplib::error::LogError;
use ::logsnaplib::formats::regexformat::{RegexField, RegexLogFormat};
use ::logsnaplib::formats::simpleformat::SimpleLogFormat;
use ::logsnaplib::formats::LogFormat;
use ::logsnaplib::readers::contenthash::ContentHash;
use ::logsnaplib::readers::filewatch::{DebounceTimer, PollingWatcher};
use ::logsnaplib::readers::helpers::absolute_fpath;
use ::logsnaplib::readers::log::Log;
use ::logsnaplib::readers::logsnapshot::{
    RecordFlow,
    SnapshotConfig,
    INDEX_RESIDUAL_GAP_DEFAULT,
    MAX_LINE_LENGTH_DEFAULT,
    MAX_UNPARSABLE_BLOCK_DEFAULT,
};
use ::logsnaplib::readers::recordloader::{load_records, LoadRequest};
use ::logsnaplib::readers::windowedsource::PAGE_SIZE_BITS_DEFAULT;
use ::logsnaplib::readers::workerpool::WorkerPool;

// --------------------
// command-line parsing

/// Records loaded per follow request.
const FOLLOW_BATCH: usize = 1000;

/// How often `--follow` polls the directory of the file.
const FOLLOW_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// clap command-line arguments build-time definitions.
//
// Note:
// * the `about` is taken from `Cargo.toml:[package]:description`.
#[derive(Parser, Debug)]
#[allow(non_camel_case_types)]
#[clap(
    about = env!("CARGO_PKG_DESCRIPTION"),
    author = env!("CARGO_PKG_AUTHORS"),
    name = "logsnap",
    version = env!("CARGO_PKG_VERSION"),
    verbatim_doc_comment,
)]
struct CLI_Args {
    /// Path of the log file.
    #[clap(required = true, verbatim_doc_comment)]
    path: String,

    /// Regular expression matching the first line of a record.
    /// Named groups become fields. Without it every line is a record.
    #[clap(short = 'r', long, verbatim_doc_comment)]
    regex: Option<String>,

    /// Field holding the record timestamp. Requires --regex.
    #[clap(long, verbatim_doc_comment, requires = "regex", requires = "date_pattern")]
    date_field: Option<String>,

    /// strftime pattern of the timestamp field,
    /// e.g. "%Y-%m-%d %H:%M:%S%.3f".
    #[clap(long, verbatim_doc_comment, requires = "date_field")]
    date_pattern: Option<String>,

    /// Timezone offset of timestamps without one, e.g. "+02:00".
    #[clap(
        short = 't',
        long,
        verbatim_doc_comment,
        value_parser = cli_parse_tz_offset,
        default_value = "+00:00",
    )]
    tz_offset: FixedOffset,

    /// Lines that do not match --regex are printed as unparsed blocks
    /// instead of joining the record before them.
    #[clap(long, verbatim_doc_comment, requires = "regex")]
    no_tail: bool,

    /// Print records from this time, RFC 3339 or "%Y-%m-%d %H:%M:%S"
    /// in the --tz-offset. Requires --date-field.
    #[clap(short = 'a', long, verbatim_doc_comment, requires = "date_field")]
    from: Option<String>,

    /// Print newest records first.
    #[clap(short = 'B', long, verbatim_doc_comment)]
    backward: bool,

    /// Count of records to print.
    #[clap(short = 'n', long, verbatim_doc_comment, default_value_t = 50)]
    count: usize,

    /// Keep printing records appended to the file.
    #[clap(short = 'f', long, verbatim_doc_comment, conflicts_with = "backward")]
    follow: bool,

    /// Page size of file reads as a power of two.
    /// Most useful for developers.
    #[clap(long, verbatim_doc_comment, default_value_t = PAGE_SIZE_BITS_DEFAULT)]
    page_size_bits: u32,

    /// Most bytes of one line printed.
    #[clap(long, verbatim_doc_comment, default_value_t = MAX_LINE_LENGTH_DEFAULT)]
    max_line_length: usize,

    /// Most bytes that may fail to parse before the format is reported
    /// as wrong.
    #[clap(long, verbatim_doc_comment, default_value_t = MAX_UNPARSABLE_BLOCK_DEFAULT)]
    max_unparsable_block: u64,
}

/// `clap` argument parser for `--tz-offset`.
fn cli_parse_tz_offset(data: &str) -> Result<FixedOffset, String> {
    if data == "Z" || data == "z" {
        return Ok(Utc.fix());
    }
    let sample = format!("2000-01-01T00:00:00{}", data);
    for pattern in ["%Y-%m-%dT%H:%M:%S%:z", "%Y-%m-%dT%H:%M:%S%z"] {
        if let Ok(dt) = DateTime::parse_from_str(&sample, pattern) {
            return Ok(*dt.offset());
        }
    }

    Err(format!("Unable to parse a timezone offset from {:?}", data))
}

/// Nanoseconds since the epoch of `--from`.
fn parse_from_time(
    data: &str,
    tz_offset: &FixedOffset,
) -> anyhow::Result<TimeNanos> {
    let datetime: DateTime<FixedOffset> = match DateTime::parse_from_rfc3339(data) {
        Ok(datetime) => datetime,
        Err(_) => {
            let naive = NaiveDateTime::parse_from_str(data, "%Y-%m-%d %H:%M:%S")
                .with_context(|| format!("Unable to parse a datetime from {:?}", data))?;
            match tz_offset.from_local_datetime(&naive).single() {
                Some(datetime) => datetime,
                None => bail!("Ambiguous datetime {:?}", data),
            }
        }
    };
    match datetime.timestamp_nanos_opt() {
        Some(nanos) => Ok(nanos),
        None => bail!("Datetime {:?} is out of range", data),
    }
}

fn build_format(args: &CLI_Args) -> anyhow::Result<Arc<dyn LogFormat>> {
    let pattern: &String = match &args.regex {
        Some(pattern) => pattern,
        None => return Ok(Arc::new(SimpleLogFormat::new())),
    };
    // compiled once here only to list the named groups
    let regex = Regex::new(pattern).with_context(|| format!("Invalid --regex {:?}", pattern))?;
    let fields: Vec<RegexField> = regex
        .capture_names()
        .flatten()
        .map(RegexField::named)
        .collect();
    let mut format = RegexLogFormat::new(pattern, fields)?
        .with_offset(args.tz_offset)
        .dont_append_unmatched_text(args.no_tail);
    if let (Some(field), Some(date_pattern)) = (&args.date_field, &args.date_pattern) {
        format = format.with_date(field, date_pattern)?;
    }

    Ok(Arc::new(format))
}

// -------------
// printing

fn print_record<W: Write>(
    out: &mut W,
    record: &Record,
) -> io::Result<()> {
    if record.is_unparsed() {
        write!(out, "(unparsed) ")?;
    }
    write!(out, "{}", record.text())?;
    if record.truncated() {
        write!(out, " …(truncated at {} bytes)", record.len())?;
    }
    writeln!(out)
}

/// Print the records of the first request; return the position after the
/// newest record printed and the content hash.
fn print_initial(
    log: &Log,
    args: &CLI_Args,
) -> anyhow::Result<(Option<Position>, Option<ContentHash>)> {
    defn!();
    let from: Option<TimeNanos> = match &args.from {
        Some(from) => Some(parse_from_time(from, &args.tz_offset)?),
        None => None,
    };
    let mut snapshot = log.create_snapshot();
    let mut records: Vec<Record> = Vec::with_capacity(args.count);
    let count = args.count;
    let mut collect = |record: Record| {
        records.push(record);
        if records.len() >= count {
            return RecordFlow::Break(());
        }
        RecordFlow::Continue(())
    };
    let result: Result<ProcessResult, LogError> = match (from, args.backward) {
        (Some(time), false) => snapshot.process_from_time(time, &mut collect),
        (Some(time), true) => snapshot.process_from_time_back(time, &mut collect),
        (None, _) => {
            let size = snapshot.size();
            snapshot.process_records_back(size, false, &mut collect)
        }
    };
    let hash = snapshot.hash();
    snapshot.close();

    // the tail reads backward but prints in file order
    if from.is_none() && !args.backward {
        records.reverse();
    }
    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    for record in records.iter() {
        print_record(&mut out, record)?;
    }
    out.flush()?;
    result?;

    let newest: Option<Position> = match args.backward {
        true => records.first().map(Position::record_end),
        false => records.last().map(Position::record_end),
    };
    defx!("newest {:?}", newest);

    Ok((newest, hash))
}

/// Print records appended to the file until the process is killed.
fn follow(
    log: Arc<Log>,
    mut last: Option<Position>,
    mut hash: Option<ContentHash>,
) -> anyhow::Result<()> {
    let pool = WorkerPool::new(1)?;
    let (sender, receiver) = unbounded::<()>();
    let _registration = log.add_change_listener(move |_attributes| {
        let _ = sender.send(());
    })?;

    while receiver.recv().is_ok() {
        loop {
            let request = match &last {
                Some(position) => LoadRequest::forward_from(position.clone(), FOLLOW_BATCH),
                None => LoadRequest {
                    backward: false,
                    record_count_limit: FOLLOW_BATCH,
                    ..LoadRequest::default()
                },
            };
            let request = match hash {
                Some(hash) => request.with_hash(hash),
                None => request,
            };
            let outcome = match load_records(log.clone(), &pool, request)?.wait() {
                Ok(outcome) => outcome,
                Err(LogError::Crashed) => {
                    e_wrn!("{} was rewritten, printing from the start", log.path());
                    last = None;
                    hash = None;
                    continue;
                }
                Err(err) => return Err(err.into()),
            };
            let stdout = io::stdout();
            let mut out = BufWriter::new(stdout.lock());
            for record in outcome.records.iter() {
                print_record(&mut out, record)?;
            }
            out.flush()?;
            if let Some(record) = outcome.records.last() {
                last = Some(Position::record_end(record));
            }
            hash = outcome.hash;
            if outcome.result.is_exhausted() {
                break;
            }
        }
    }

    Ok(())
}

fn run(args: CLI_Args) -> anyhow::Result<()> {
    let path = absolute_fpath(Path::new(&args.path))?;
    let format = build_format(&args)?;
    let config = SnapshotConfig {
        page_size_bits: args.page_size_bits,
        max_line_length: args.max_line_length,
        max_unparsable_block: args.max_unparsable_block,
        index_residual_gap: INDEX_RESIDUAL_GAP_DEFAULT,
        ..SnapshotConfig::default()
    };
    let mut log = Log::new(path, format).with_config(config);
    if args.follow {
        let watcher = Arc::new(PollingWatcher::new(FOLLOW_POLL_INTERVAL));
        let timer = Arc::new(DebounceTimer::new()?);
        log = log.with_watch(watcher, timer);
    }
    log.try_read()?;

    let (last, hash) = print_initial(&log, &args)?;
    if args.follow {
        follow(Arc::new(log), last, hash)?;
    }

    Ok(())
}

pub fn main() -> ExitCode {
    let args = CLI_Args::parse();
    defñ!("{:?}", args);
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            e_err!("{:#}", err);
            ExitCode::FAILURE
        }
    }
}
