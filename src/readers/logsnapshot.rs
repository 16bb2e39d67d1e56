// src/readers/logsnapshot.rs

//! Implements [`LogSnapshot`], a point-in-time view of one log file that
//! turns its bytes into [`Record`]s, forward or backward from any file
//! offset or timestamp.
//!
//! A `LogSnapshot` owns a [`WindowedByteSource`] and drives two
//! [`RecordParser`]s over it, `current` and `lookahead`. Before a record
//! is handed to the consumer, the following lines are parsed by
//! `lookahead` to decide whether they are the tail of the record, an
//! unparsed block, or the next record. The roles are swapped after every
//! record so no line is parsed twice.
//!
//! Bytes the format cannot interpret become "unparsed" records. A span of
//! unparsable bytes longer than [`SnapshotConfig::max_unparsable_block`]
//! means the wrong format was chosen and ends the scan with
//! [`LogError::FormatMismatch`].
//!
//! [`Record`]: crate::data::record::Record
//! [`WindowedByteSource`]: crate::readers::windowedsource::WindowedByteSource
//! [`RecordParser`]: crate::readers::recordparser::RecordParser

use crate::common::{Count, FPath, File, FileOffset, FileSz, LogId, ProcessResult, TimeNanos};
use crate::data::line::Line;
use crate::data::record::Record;
use crate::error::{crash_on_eof, LogError, Result};
use crate::formats::{decode_text, LogFormat};
use crate::readers::contenthash::ContentHash;
use crate::readers::recordparser::RecordParser;
use crate::readers::timestampindex::TimestampIndex;
use crate::readers::windowedsource::{WindowedByteSource, PAGE_SIZE_BITS_DEFAULT, PAGE_SIZE_BITS_MAX, PAGE_SIZE_BITS_MIN};
#[allow(unused_imports)]
use crate::debug::printers::{buffer_to_String_noraw, de_err, de_wrn, e_err, e_wrn};

use std::cmp::{max, min};
use std::fmt;
use std::io;
use std::ops::ControlFlow;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

#[allow(unused_imports)]
use ::si_trace_print::{defn, defo, defx, defñ};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// SnapshotConfig
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Default [`SnapshotConfig::max_line_length`], 32 KiB.
pub const MAX_LINE_LENGTH_DEFAULT: usize = 32 * 1024;

/// Default [`SnapshotConfig::max_unparsable_block`], 2 MiB.
pub const MAX_UNPARSABLE_BLOCK_DEFAULT: FileSz = 2 * 1024 * 1024;

/// Default [`SnapshotConfig::index_residual_gap`], 8 KiB.
pub const INDEX_RESIDUAL_GAP_DEFAULT: FileSz = 8 * 1024;

/// Default [`SnapshotConfig::probe_cache_size`].
pub const PROBE_CACHE_SIZE_DEFAULT: usize = 64;

/// Tunables of snapshots and of the timestamp index.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SnapshotConfig {
    /// Page size of the byte window as a power of two.
    pub page_size_bits: u32,
    /// Most bytes of one line, tail, or unparsed block copied into a
    /// [`Record`]; longer spans are marked truncated. Never more than the
    /// page size.
    ///
    /// [`Record`]: crate::data::record::Record
    pub max_line_length: usize,
    /// Longest span of bytes the format may fail to parse before the scan
    /// fails with [`LogError::FormatMismatch`].
    pub max_unparsable_block: FileSz,
    /// Timestamp binary search stops when low and high probes are this
    /// close, then scans linearly.
    pub index_residual_gap: FileSz,
    /// Count of binary search probes remembered per file; `0` disables the
    /// probe cache.
    pub probe_cache_size: usize,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        SnapshotConfig {
            page_size_bits: PAGE_SIZE_BITS_DEFAULT,
            max_line_length: MAX_LINE_LENGTH_DEFAULT,
            max_unparsable_block: MAX_UNPARSABLE_BLOCK_DEFAULT,
            index_residual_gap: INDEX_RESIDUAL_GAP_DEFAULT,
            probe_cache_size: PROBE_CACHE_SIZE_DEFAULT,
        }
    }
}

impl SnapshotConfig {
    /// Copy with `page_size_bits` forced into the supported range.
    pub fn clamped(&self) -> SnapshotConfig {
        let mut config = self.clone();
        config.page_size_bits = self
            .page_size_bits
            .clamp(PAGE_SIZE_BITS_MIN, PAGE_SIZE_BITS_MAX);
        config.max_line_length = max(config.max_line_length, 1);
        config
    }

    #[inline(always)]
    pub const fn page_size(&self) -> usize {
        1 << self.page_size_bits
    }

    /// Bytes of one span materialized into a record.
    #[inline(always)]
    pub fn read_limit(&self) -> usize {
        min(self.max_line_length, self.page_size())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// LogSnapshot
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Return value of record consumers: `Continue` for more records,
/// `Break` to stop the scan.
pub type RecordFlow = ControlFlow<()>;

/// `Count` of snapshots dropped without [`LogSnapshot::close`].
static COUNT_UNCLOSED: AtomicU64 = AtomicU64::new(0);

/// `Count` of [`LogSnapshot`]s dropped while still open, over the life of
/// the process.
pub fn count_unclosed_snapshots() -> Count {
    COUNT_UNCLOSED.load(Ordering::Relaxed)
}

#[cfg(test)]
thread_local! {
    static COUNT_UNCLOSED_THREAD: std::cell::Cell<Count> = const { std::cell::Cell::new(0) };
}

/// `Count` of [`LogSnapshot`]s dropped while still open on this thread.
#[cfg(test)]
pub fn count_unclosed_snapshots_thread() -> Count {
    COUNT_UNCLOSED_THREAD.with(|count| count.get())
}

/// A log file as of the moment it was opened.
///
/// The file size, modification time and [`ContentHash`] are pinned when the
/// snapshot opens. Bytes written after that are not seen; a file that
/// shrinks underneath the snapshot fails reads with [`LogError::Crashed`].
///
/// A snapshot that failed to open holds the error and returns it from
/// every operation.
///
/// A snapshot is used by one request at a time and must be
/// [`close`]d. Dropping an open snapshot is reported as a leak.
///
/// Create snapshots with [`Log::create_snapshot`].
///
/// [`close`]: LogSnapshot::close
/// [`Log::create_snapshot`]: crate::readers::log::Log::create_snapshot
pub struct LogSnapshot {
    path: FPath,
    log_id: LogId,
    format: Arc<dyn LogFormat>,
    config: SnapshotConfig,
    size: FileSz,
    modified: SystemTime,
    hash: Option<ContentHash>,
    error: Option<LogError>,
    source: Option<WindowedByteSource<File>>,
    index: Arc<TimestampIndex>,
}

impl fmt::Debug for LogSnapshot {
    fn fmt(
        &self,
        f: &mut fmt::Formatter,
    ) -> fmt::Result {
        f.debug_struct("LogSnapshot")
            .field("path", &self.path)
            .field("log_id", &self.log_id)
            .field("size", &self.size)
            .field("hash", &self.hash)
            .field("error", &self.error)
            .field("source", &self.source)
            .finish()
    }
}

/// Emit one record to the consumer; return `Stopped` from the calling
/// function if the consumer breaks.
macro_rules! emit {
    ($consumer:ident, $record:expr) => {{
        let record: Record = $record;
        if $consumer(record).is_break() {
            defx!("stopped by consumer");
            return Ok(ProcessResult::Stopped);
        }
    }};
}

/// Hash the start of `source`, a file of `source.size()` bytes.
pub(crate) fn compute_hash(source: &mut WindowedByteSource<File>) -> Result<ContentHash> {
    let len = ContentHash::prefix_len_for(source.size());
    let prefix = source
        .read(0, len)
        .map_err(crash_on_eof)?;

    Ok(ContentHash::compute(prefix))
}

fn error_closed() -> LogError {
    LogError::Io(io::Error::new(io::ErrorKind::Other, "log snapshot is closed"))
}

impl LogSnapshot {
    /// Snapshot of an opened file.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn opened(
        path: FPath,
        log_id: LogId,
        format: Arc<dyn LogFormat>,
        config: SnapshotConfig,
        modified: SystemTime,
        hash: ContentHash,
        source: WindowedByteSource<File>,
        index: Arc<TimestampIndex>,
    ) -> LogSnapshot {
        defñ!("({:?}, size {}, hash {})", path, source.size(), hash);
        LogSnapshot {
            path,
            log_id,
            format,
            config,
            size: source.size(),
            modified,
            hash: Some(hash),
            error: None,
            source: Some(source),
            index,
        }
    }

    /// Snapshot of a file that could not be opened.
    pub(crate) fn failed(
        path: FPath,
        log_id: LogId,
        format: Arc<dyn LogFormat>,
        config: SnapshotConfig,
        error: LogError,
    ) -> LogSnapshot {
        defñ!("({:?}, {})", path, error);
        let index = Arc::new(TimestampIndex::new(&path, &config));
        LogSnapshot {
            path,
            log_id,
            format,
            config,
            size: 0,
            modified: SystemTime::UNIX_EPOCH,
            hash: None,
            error: Some(error),
            source: None,
            index,
        }
    }

    pub fn path(&self) -> &FPath {
        &self.path
    }

    pub fn log_id(&self) -> &str {
        &self.log_id
    }

    pub fn format(&self) -> &Arc<dyn LogFormat> {
        &self.format
    }

    pub const fn config(&self) -> &SnapshotConfig {
        &self.config
    }

    /// File size when the snapshot opened, `0` for a failed snapshot.
    #[inline(always)]
    pub const fn size(&self) -> FileSz {
        self.size
    }

    /// Modification time when the snapshot opened.
    pub const fn last_modified(&self) -> SystemTime {
        self.modified
    }

    /// Content hash when the snapshot opened, `None` for a failed snapshot.
    pub const fn hash(&self) -> Option<ContentHash> {
        self.hash
    }

    /// The error the snapshot failed to open with.
    pub const fn error(&self) -> Option<&LogError> {
        self.error.as_ref()
    }

    pub fn is_closed(&self) -> bool {
        self.source.is_none()
    }

    /// The timestamp index shared by the snapshots of one file content.
    pub fn index(&self) -> &Arc<TimestampIndex> {
        &self.index
    }

    /// Does `hash`, taken from an earlier snapshot, describe this file?
    ///
    /// A hash over a shorter prefix is checked against the same prefix of
    /// the current file, so a short file that grew still matches.
    pub fn is_valid_hash(
        &mut self,
        hash: ContentHash,
    ) -> bool {
        let own: ContentHash = match (self.hash, &self.error) {
            (Some(own), None) => own,
            _ => return false,
        };
        let len = hash.prefix_len();
        if len == own.prefix_len() {
            return hash == own;
        }
        let source = match self.source.as_mut() {
            Some(source) => source,
            None => return false,
        };
        if len as FileSz > source.size() {
            return false;
        }
        match source.read(0, len) {
            Ok(prefix) => ContentHash::compute(prefix) == hash,
            Err(_err) => {
                de_wrn!("{:?} read of hash prefix failed: {}", self.path, _err);
                false
            }
        }
    }

    /// Release the file handle and the page buffer.
    pub fn close(&mut self) {
        defñ!("({:?})", self.path);
        self.source = None;
    }

    fn check_error(&self) -> Result<()> {
        match &self.error {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    fn scanner(&mut self) -> Result<Scanner<'_>> {
        let source = match self.source.as_mut() {
            Some(source) => source,
            None => return Err(error_closed()),
        };

        Ok(Scanner {
            source,
            path: &self.path,
            log_id: &self.log_id,
            format: self.format.as_ref(),
            config: &self.config,
        })
    }

    /// Pass records to `consumer` in file order, starting with the record
    /// at the line that holds `position` or, if `from_next_line`, at the
    /// line after it.
    ///
    /// If the first line does not parse, the scan first looks back for
    /// the record it belongs to.
    pub fn process_records<F>(
        &mut self,
        position: FileOffset,
        from_next_line: bool,
        mut consumer: F,
    ) -> Result<ProcessResult>
    where
        F: FnMut(Record) -> RecordFlow,
    {
        defn!("({}, from_next_line {})", position, from_next_line);
        self.check_error()?;
        let size = self.size;
        if position > size || size == 0 {
            defx!("({}) return Exhausted; size {}", position, size);
            return Ok(ProcessResult::Exhausted);
        }
        let mut sc = self.scanner()?;

        let mut line: Line = if from_next_line {
            match sc.next_line(position)? {
                Some(line) => line,
                None => {
                    defx!("({}) return Exhausted; no next line", position);
                    return Ok(ProcessResult::Exhausted);
                }
            }
        } else {
            let line = sc.line_at(position)?;
            if line.start == size {
                // only a line terminator before end of file
                defx!("({}) return Exhausted; at end of file", position);
                return Ok(ProcessResult::Exhausted);
            }
            line
        };
        let mut current: Box<dyn RecordParser> = sc.format.create_parser();
        let mut lookahead: Box<dyn RecordParser> = sc.format.create_parser();

        if !sc.parse(current.as_mut(), &line)? {
            defo!("first line {:?} does not parse, look back", line);
            let selected_end = line.end;
            let mut block_start = line.start;
            'resync: loop {
                match sc.prev_line(block_start)? {
                    None => {
                        // the unparsed block starts the file
                        sc.check_block(block_start, selected_end)?;
                        let mut block_end = selected_end;
                        loop {
                            match sc.next_line(block_end)? {
                                None => {
                                    emit!(consumer, sc.unparsed_record(block_start, block_end)?);
                                    defx!("return Exhausted");
                                    return Ok(ProcessResult::Exhausted);
                                }
                                Some(next) => {
                                    if sc.parse(current.as_mut(), &next)? {
                                        emit!(consumer, sc.unparsed_record(block_start, block_end)?);
                                        line = next;
                                        break 'resync;
                                    }
                                    block_end = next.end;
                                    sc.check_block(block_start, block_end)?;
                                }
                            }
                        }
                    }
                    Some(prev) => {
                        if sc.parse(current.as_mut(), &prev)? {
                            defo!("found record line {:?} before the unparsed block", prev);
                            let mut block_end = selected_end;
                            let next: Option<Line> = loop {
                                match sc.next_line(block_end)? {
                                    None => break None,
                                    Some(next) => {
                                        if sc.parse(lookahead.as_mut(), &next)? {
                                            break Some(next);
                                        }
                                        block_end = next.end;
                                        sc.check_block(block_start, block_end)?;
                                    }
                                }
                            };
                            if current.can_append_tail() {
                                sc.append_tail(current.as_mut(), prev.end, block_end)?;
                                emit!(consumer, sc.build(current.as_mut())?);
                            } else {
                                emit!(consumer, sc.unparsed_record(block_start, block_end)?);
                            }
                            match next {
                                None => {
                                    defx!("return Exhausted");
                                    return Ok(ProcessResult::Exhausted);
                                }
                                Some(next) => {
                                    std::mem::swap(&mut current, &mut lookahead);
                                    line = next;
                                    break 'resync;
                                }
                            }
                        }
                        block_start = prev.start;
                        sc.check_block(block_start, selected_end)?;
                    }
                }
            }
        }

        loop {
            debug_assert!(current.has_parsed_record());
            let parsed_end: FileOffset = line.end;
            let mut block_start: Option<FileOffset> = None;
            let next: Option<Line> = loop {
                match sc.next_line(line.end)? {
                    None => break None,
                    Some(next) => {
                        if sc.parse(lookahead.as_mut(), &next)? {
                            break Some(next);
                        }
                        line = next;
                        let start = *block_start.get_or_insert(next.start);
                        sc.check_block(start, line.end)?;
                    }
                }
            };
            // `line` is the last line before the next record
            let block_end: FileOffset = line.end;
            match block_start {
                Some(_) if current.can_append_tail() => {
                    sc.append_tail(current.as_mut(), parsed_end, block_end)?;
                    emit!(consumer, sc.build(current.as_mut())?);
                }
                Some(start) => {
                    emit!(consumer, sc.build(current.as_mut())?);
                    emit!(consumer, sc.unparsed_record(start, block_end)?);
                }
                None => emit!(consumer, sc.build(current.as_mut())?),
            }
            match next {
                None => {
                    defx!("return Exhausted");
                    return Ok(ProcessResult::Exhausted);
                }
                Some(next) => {
                    line = next;
                    std::mem::swap(&mut current, &mut lookahead);
                }
            }
        }
    }

    /// Pass records to `consumer` in reverse file order, starting with the
    /// record at the line that holds `position` or, if `from_prev_line`,
    /// at the line before it.
    ///
    /// An unparsed block is passed before the record that precedes it in
    /// the file.
    pub fn process_records_back<F>(
        &mut self,
        position: FileOffset,
        from_prev_line: bool,
        mut consumer: F,
    ) -> Result<ProcessResult>
    where
        F: FnMut(Record) -> RecordFlow,
    {
        defn!("({}, from_prev_line {})", position, from_prev_line);
        self.check_error()?;
        let size = self.size;
        if size == 0 {
            defx!("({}) return Exhausted; empty file", position);
            return Ok(ProcessResult::Exhausted);
        }
        let position = min(position, size);
        let mut sc = self.scanner()?;

        let first: Line = if from_prev_line {
            match sc.prev_line(position)? {
                Some(line) => line,
                None => {
                    defx!("({}) return Exhausted; no previous line", position);
                    return Ok(ProcessResult::Exhausted);
                }
            }
        } else {
            let line = sc.line_at(position)?;
            if line.start != size {
                line
            } else {
                // only a line terminator before end of file, take the last line
                match sc.prev_line(size)? {
                    Some(line) => line,
                    None => return Ok(ProcessResult::Exhausted),
                }
            }
        };
        let mut current: Box<dyn RecordParser> = sc.format.create_parser();
        let mut lookahead: Box<dyn RecordParser> = sc.format.create_parser();
        let mut line_start: FileOffset;

        if sc.parse(current.as_mut(), &first)? {
            line_start = first.start;
            if current.can_append_tail() {
                let block_end = sc.find_unparsed_end(lookahead.as_mut(), first.end, None)?;
                if block_end > first.end {
                    sc.append_tail(current.as_mut(), first.end, block_end)?;
                }
            }
        } else {
            defo!("first line {:?} does not parse", first);
            let block_end = sc.find_unparsed_end(lookahead.as_mut(), first.end, Some(first.start))?;
            match sc.find_parsed_before(current.as_mut(), first.start, block_end)? {
                (block_start, None) => {
                    emit!(consumer, sc.unparsed_record(block_start, block_end)?);
                    defx!("return Exhausted");
                    return Ok(ProcessResult::Exhausted);
                }
                (block_start, Some(parsed)) => {
                    line_start = parsed.start;
                    if current.can_append_tail() {
                        sc.append_tail(current.as_mut(), parsed.end, block_end)?;
                    } else {
                        emit!(consumer, sc.unparsed_record(block_start, block_end)?);
                    }
                }
            }
        }
        emit!(consumer, sc.build(current.as_mut())?);

        loop {
            let line: Line = match sc.prev_line(line_start)? {
                Some(line) => line,
                None => {
                    defx!("return Exhausted");
                    return Ok(ProcessResult::Exhausted);
                }
            };
            if sc.parse(current.as_mut(), &line)? {
                line_start = line.start;
                emit!(consumer, sc.build(current.as_mut())?);
                continue;
            }
            let block_end = line.end;
            match sc.find_parsed_before(current.as_mut(), line.start, block_end)? {
                (block_start, None) => {
                    emit!(consumer, sc.unparsed_record(block_start, block_end)?);
                    defx!("return Exhausted");
                    return Ok(ProcessResult::Exhausted);
                }
                (block_start, Some(parsed)) => {
                    if current.can_append_tail() {
                        sc.append_tail(current.as_mut(), parsed.end, block_end)?;
                    } else {
                        emit!(consumer, sc.unparsed_record(block_start, block_end)?);
                    }
                    emit!(consumer, sc.build(current.as_mut())?);
                    line_start = parsed.start;
                }
            }
        }
    }

    /// Pass records to `consumer` in file order, starting with the first
    /// record with a timestamp at or after `time`.
    pub fn process_from_time<F>(
        &mut self,
        time: TimeNanos,
        mut consumer: F,
    ) -> Result<ProcessResult>
    where
        F: FnMut(Record) -> RecordFlow,
    {
        defn!("({})", time);
        self.check_error()?;
        let index = self.index.clone();
        let record: Record = match index.find_record_bound(time, false, self)? {
            Some(record) => record,
            None => {
                defx!("({}) return Exhausted; no record at or after", time);
                return Ok(ProcessResult::Exhausted);
            }
        };
        let end = record.end();
        emit!(consumer, record);
        let result = self.process_records(end, true, consumer);
        defx!("({}) return {:?}", time, result);

        result
    }

    /// Pass records to `consumer` in reverse file order, starting with the
    /// last record with a timestamp at or before `time`.
    pub fn process_from_time_back<F>(
        &mut self,
        time: TimeNanos,
        mut consumer: F,
    ) -> Result<ProcessResult>
    where
        F: FnMut(Record) -> RecordFlow,
    {
        defn!("({})", time);
        self.check_error()?;
        let index = self.index.clone();
        let record: Record = match index.find_record_bound(time, true, self)? {
            Some(record) => record,
            None => {
                defx!("({}) return Exhausted; no record at or before", time);
                return Ok(ProcessResult::Exhausted);
            }
        };
        let start = record.start();
        emit!(consumer, record);
        let result = self.process_records_back(start, true, consumer);
        defx!("({}) return {:?}", time, result);

        result
    }
}

impl Drop for LogSnapshot {
    fn drop(&mut self) {
        if self.source.is_some() {
            e_err!("log snapshot of {:?} was not closed", self.path);
            COUNT_UNCLOSED.fetch_add(1, Ordering::Relaxed);
            #[cfg(test)]
            COUNT_UNCLOSED_THREAD.with(|count| count.set(count.get() + 1));
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Scanner
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The parts of a [`LogSnapshot`] borrowed for one scan.
struct Scanner<'s> {
    source: &'s mut WindowedByteSource<File>,
    path: &'s FPath,
    log_id: &'s str,
    format: &'s dyn LogFormat,
    config: &'s SnapshotConfig,
}

impl Scanner<'_> {
    fn next_line(
        &mut self,
        prev_end: FileOffset,
    ) -> Result<Option<Line>> {
        self.source
            .load_next_line(prev_end)
            .map_err(crash_on_eof)
    }

    fn prev_line(
        &mut self,
        next_start: FileOffset,
    ) -> Result<Option<Line>> {
        self.source
            .load_prev_line(next_start)
            .map_err(crash_on_eof)
    }

    fn line_at(
        &mut self,
        pos: FileOffset,
    ) -> Result<Line> {
        self.source
            .load_line(pos)
            .map_err(crash_on_eof)
    }

    /// Offer `line` to `parser`.
    fn parse(
        &mut self,
        parser: &mut dyn RecordParser,
        line: &Line,
    ) -> Result<bool> {
        let data = self
            .source
            .read_line(line, self.config.read_limit())
            .map_err(crash_on_eof)?;
        defo!("{:?} '{}'", line, buffer_to_String_noraw(data));

        Ok(parser.parse_record(data, line.start, line.end))
    }

    /// Extend the record in `parser` with the bytes `[start, end)`.
    fn append_tail(
        &mut self,
        parser: &mut dyn RecordParser,
        start: FileOffset,
        end: FileOffset,
    ) -> Result<()> {
        debug_assert!(start <= end);
        let full_len: FileSz = end - start;
        let len = min(full_len, self.config.read_limit() as FileSz) as usize;
        let data = self
            .source
            .read(start, len)
            .map_err(crash_on_eof)?;
        parser.append_tail(data, full_len);

        Ok(())
    }

    fn build(
        &self,
        parser: &mut dyn RecordParser,
    ) -> Result<Record> {
        match parser.build_record() {
            Some(record) => Ok(record.with_log_id(self.log_id)),
            None => Err(LogError::Io(io::Error::new(
                io::ErrorKind::Other,
                "record parser holds no record",
            ))),
        }
    }

    fn unparsed_record(
        &mut self,
        start: FileOffset,
        end: FileOffset,
    ) -> Result<Record> {
        debug_assert!(start <= end);
        let full_len: FileSz = end - start;
        let len = min(full_len, self.config.read_limit() as FileSz) as usize;
        let data = self
            .source
            .read(start, len)
            .map_err(crash_on_eof)?;
        let text = decode_text(self.format.charset(), data);
        defñ!("unparsed block [{}, {})", start, end);

        Ok(Record::unparsed(text, start, end, (len as FileSz) < full_len, self.format.fields().len())
            .with_log_id(self.log_id))
    }

    /// Fail if the unparsable span `[block_start, block_end)` is too long
    /// to be anything but the wrong format.
    fn check_block(
        &self,
        block_start: FileOffset,
        block_end: FileOffset,
    ) -> Result<()> {
        if block_end.saturating_sub(block_start) <= self.config.max_unparsable_block {
            return Ok(());
        }
        de_wrn!("{:?} unparsable block [{}, {}) is too long", self.path, block_start, block_end);

        Err(LogError::FormatMismatch {
            path: self.path.clone(),
            block_start,
            block_end,
            format: self.format.human_readable(),
        })
    }

    /// Scan forward from `end` for the next line that `parser` accepts.
    /// Returns the end of the last line before it, or the end of the last
    /// line of the file.
    ///
    /// The skipped span is checked against the unparsable block limit. It
    /// starts at `block_start`, or at the first skipped line if `None`.
    fn find_unparsed_end(
        &mut self,
        parser: &mut dyn RecordParser,
        end: FileOffset,
        block_start: Option<FileOffset>,
    ) -> Result<FileOffset> {
        let mut block_start = block_start;
        let mut block_end = end;
        loop {
            let next: Line = match self.next_line(block_end)? {
                Some(next) => next,
                None => return Ok(block_end),
            };
            if self.parse(parser, &next)? {
                return Ok(block_end);
            }
            block_end = next.end;
            let start = *block_start.get_or_insert(next.start);
            self.check_block(start, block_end)?;
        }
    }

    /// Scan backward from the unparsed line at `line_start` for a line that
    /// `parser` accepts.
    ///
    /// Returns the start of the unparsed block and the accepted line, or
    /// `None` for the line if the block reaches back to the file start.
    fn find_parsed_before(
        &mut self,
        parser: &mut dyn RecordParser,
        line_start: FileOffset,
        block_end: FileOffset,
    ) -> Result<(FileOffset, Option<Line>)> {
        let mut block_start = line_start;
        loop {
            self.check_block(block_start, block_end)?;
            let prev: Line = match self.prev_line(block_start)? {
                Some(prev) => prev,
                None => {
                    parser.clear();
                    return Ok((block_start, None));
                }
            };
            if self.parse(parser, &prev)? {
                return Ok((block_start, Some(prev)));
            }
            debug_assert!(prev.start < block_start);
            block_start = prev.start;
        }
    }
}
