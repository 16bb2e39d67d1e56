// src/readers/recordloader.rs

//! Load a page of records from a [`Log`] on a [`WorkerPool`].
//!
//! A [`LoadRequest`] names where to start, the direction, and when to
//! stop. The load opens a snapshot, checks the caller's content hash,
//! resolves the start, and collects records until a limit is reached, the
//! file is exhausted, or the load is cancelled.
//!
//! Start resolution:
//! * no start: the tail of the file, backward from the end, or backward
//!   from [`LoadRequest::time_limit`] if set.
//! * a [`Position`] of this log: the line after (forward) or before
//!   (backward) its offset. An offset past the end of the file, left by a
//!   truncation or rotation, is resolved by the position's timestamp.
//! * a [`Position`] of another log: resolved by timestamp, with the log
//!   ids breaking ties, so that records of several logs merge in
//!   [`Position`] order.
//!
//! [`Log`]: crate::readers::log::Log
//! [`WorkerPool`]: crate::readers::workerpool::WorkerPool
//! [`Position`]: crate::data::position::Position

use crate::common::{FileSz, ProcessResult, TimeNanos};
use crate::data::position::Position;
use crate::data::record::Record;
use crate::error::{LogError, Result};
use crate::readers::contenthash::ContentHash;
use crate::readers::log::Log;
use crate::readers::logsnapshot::{LogSnapshot, RecordFlow};
use crate::readers::workerpool::WorkerPool;

use std::cmp::{min, Ordering as CmpOrdering};
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use ::crossbeam_channel::{bounded, Receiver, RecvTimeoutError};
#[allow(unused_imports)]
use ::si_trace_print::{defn, defo, defx, defñ};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// What to load.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoadRequest {
    /// Continue from this position; `None` loads the tail of the file.
    pub start: Option<Position>,
    /// Load in reverse file order.
    pub backward: bool,
    /// Stop after this many records.
    pub record_count_limit: usize,
    /// Stop after records with this many bytes of text.
    pub size_limit: usize,
    /// Content hash of the file from an earlier load; a file that no
    /// longer matches fails the load with [`LogError::Crashed`].
    pub hash: Option<ContentHash>,
    /// Newest timestamp of interest. A forward load stops at the first
    /// record after it; a backward load starts at or before it.
    pub time_limit: Option<TimeNanos>,
}

impl Default for LoadRequest {
    fn default() -> Self {
        LoadRequest {
            start: None,
            backward: true,
            record_count_limit: 100,
            size_limit: 1024 * 1024,
            hash: None,
            time_limit: None,
        }
    }
}

impl LoadRequest {
    /// The last `count` records of the file, newest first.
    pub fn tail(count: usize) -> LoadRequest {
        LoadRequest {
            record_count_limit: count,
            ..LoadRequest::default()
        }
    }

    /// Up to `count` records after `start`.
    pub fn forward_from(
        start: Position,
        count: usize,
    ) -> LoadRequest {
        LoadRequest {
            start: Some(start),
            backward: false,
            record_count_limit: count,
            ..LoadRequest::default()
        }
    }

    /// Up to `count` records before `start`, newest first.
    pub fn backward_from(
        start: Position,
        count: usize,
    ) -> LoadRequest {
        LoadRequest {
            start: Some(start),
            backward: true,
            record_count_limit: count,
            ..LoadRequest::default()
        }
    }

    pub fn with_hash(
        mut self,
        hash: ContentHash,
    ) -> LoadRequest {
        self.hash = Some(hash);
        self
    }

    pub fn with_time_limit(
        mut self,
        time: TimeNanos,
    ) -> LoadRequest {
        self.time_limit = Some(time);
        self
    }

    pub fn with_size_limit(
        mut self,
        size: usize,
    ) -> LoadRequest {
        self.size_limit = size;
        self
    }
}

/// Result of a load.
#[derive(Clone, Debug)]
pub struct LoadOutcome {
    /// Records in load order.
    pub records: Vec<Record>,
    /// [`ProcessResult::Exhausted`] if every record in the load direction
    /// was loaded, or the time limit was reached.
    pub result: ProcessResult,
    /// Content hash of the file, for the next request.
    pub hash: Option<ContentHash>,
    pub size: FileSz,
    pub last_modified: SystemTime,
}

/// A load running on a [`WorkerPool`].
#[derive(Debug)]
pub struct LoadHandle {
    cancelled: Arc<AtomicBool>,
    receiver: Receiver<Result<LoadOutcome>>,
}

impl LoadHandle {
    /// Ask the load to stop at the next record. A cancelled load finishes
    /// with [`ProcessResult::Stopped`] and the records loaded so far.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    /// Block until the load finishes.
    pub fn wait(self) -> Result<LoadOutcome> {
        match self.receiver.recv() {
            Ok(outcome) => outcome,
            Err(_) => Err(error_lost()),
        }
    }

    /// Block until the load finishes or `timeout` passes; `None` on
    /// timeout.
    pub fn wait_timeout(
        &self,
        timeout: Duration,
    ) -> Option<Result<LoadOutcome>> {
        match self.receiver.recv_timeout(timeout) {
            Ok(outcome) => Some(outcome),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => Some(Err(error_lost())),
        }
    }
}

fn error_lost() -> LogError {
    LogError::Io(io::Error::new(io::ErrorKind::Other, "record load ended without a result"))
}

/// Run `request` against `log` on `pool`.
pub fn load_records(
    log: Arc<Log>,
    pool: &WorkerPool,
    request: LoadRequest,
) -> Result<LoadHandle> {
    defñ!("({:?}, {:?})", log.path(), request);
    let cancelled = Arc::new(AtomicBool::new(false));
    let (sender, receiver) = bounded::<Result<LoadOutcome>>(1);
    let cancelled_ = cancelled.clone();
    pool.execute(move || {
        let outcome = run_load(&log, &request, &cancelled_);
        // the handle may be gone
        let _ = sender.send(outcome);
    })?;

    Ok(LoadHandle { cancelled, receiver })
}

/// Run `request` against `log` on this thread.
pub fn run_load(
    log: &Log,
    request: &LoadRequest,
    cancelled: &AtomicBool,
) -> Result<LoadOutcome> {
    defn!("({:?})", log.path());
    let mut snapshot = log.create_snapshot();
    let result = load_from_snapshot(&mut snapshot, log.id(), request, cancelled);
    snapshot.close();
    defx!("({:?}) {:?}", log.path(), result.as_ref().map(|outcome| (outcome.records.len(), outcome.result)));

    result
}

/// Collects records for one load.
struct Collector<'a> {
    request: &'a LoadRequest,
    cancelled: &'a AtomicBool,
    records: Vec<Record>,
    text_size: usize,
    /// a forward load reached a record after the time limit
    reached_time_limit: bool,
}

impl Collector<'_> {
    fn accept(
        &mut self,
        record: Record,
    ) -> RecordFlow {
        if self.cancelled.load(Ordering::Relaxed) {
            return RecordFlow::Break(());
        }
        if let Some(limit) = self.request.time_limit {
            if !self.request.backward && record.has_time() && record.time() > limit {
                self.reached_time_limit = true;
                return RecordFlow::Break(());
            }
        }
        self.text_size += record.text().len();
        self.records.push(record);
        if self.records.len() >= self.request.record_count_limit || self.text_size >= self.request.size_limit {
            return RecordFlow::Break(());
        }

        RecordFlow::Continue(())
    }

    /// Drop the records collected so far.
    fn clear(&mut self) {
        self.records.clear();
        self.text_size = 0;
    }
}

fn load_from_snapshot(
    snapshot: &mut LogSnapshot,
    log_id: &str,
    request: &LoadRequest,
    cancelled: &AtomicBool,
) -> Result<LoadOutcome> {
    if let Some(err) = snapshot.error() {
        return Err(err.clone());
    }
    if let Some(hash) = request.hash {
        if !snapshot.is_valid_hash(hash) {
            defo!("hash {} is stale", hash);
            return Err(LogError::Crashed);
        }
    }
    let mut collector = Collector {
        request,
        cancelled,
        records: Vec::new(),
        text_size: 0,
        reached_time_limit: false,
    };
    let backward = request.backward;
    let time_limit = request.time_limit;
    let size = snapshot.size();

    let result: ProcessResult = match &request.start {
        None if backward => match time_limit {
            Some(time) => snapshot.process_from_time_back(time, |r| collector.accept(r))?,
            None => snapshot.process_records_back(size, false, |r| collector.accept(r))?,
        },
        None => snapshot.process_records(0, false, |r| collector.accept(r))?,
        Some(start) if start.log_id() == log_id && start.offset() <= size => {
            if backward {
                // a start newer than the time limit restarts from the time limit
                let mut newer_than_limit = false;
                let mut first_checked = false;
                let result = snapshot.process_records_back(start.offset(), true, |r| {
                    if let Some(limit) = time_limit {
                        if !first_checked && r.has_time() {
                            first_checked = true;
                            if r.time() > limit {
                                newer_than_limit = true;
                                return RecordFlow::Break(());
                            }
                        }
                    }
                    collector.accept(r)
                })?;
                match (newer_than_limit, time_limit) {
                    (true, Some(limit)) => {
                        // untimed records before the first timed one are newer than the limit too
                        collector.clear();
                        snapshot.process_from_time_back(limit, |r| collector.accept(r))?
                    }
                    _ => result,
                }
            } else {
                snapshot.process_records(start.offset(), true, |r| collector.accept(r))?
            }
        }
        Some(start) => {
            let order: CmpOrdering = if start.log_id() == log_id {
                // the file was truncated under the position
                CmpOrdering::Equal
            } else {
                start.log_id().cmp(log_id)
            };
            if backward {
                let mut time = match order {
                    CmpOrdering::Less => start.time() - 1,
                    _ => start.time(),
                };
                if let Some(limit) = time_limit {
                    time = min(time, limit);
                }
                snapshot.process_from_time_back(time, |r| collector.accept(r))?
            } else {
                let time = match order {
                    CmpOrdering::Greater => start.time() + 1,
                    _ => start.time(),
                };
                snapshot.process_from_time(time, |r| collector.accept(r))?
            }
        }
    };

    let result = if collector.reached_time_limit {
        ProcessResult::Exhausted
    } else {
        result
    };

    Ok(LoadOutcome {
        records: collector.records,
        result,
        hash: snapshot.hash(),
        size,
        last_modified: snapshot.last_modified(),
    })
}
