// src/readers/timestampindex.rs

//! Implements [`TimestampIndex`], binary search of a log file by record
//! timestamp.
//!
//! The first and last records with a timestamp are found once and kept.
//! A search probes the record at the middle of the byte range between its
//! low and high bounds, narrows the range by the probe's timestamp, and
//! scans the last few KiB linearly. Each probe costs a few page reads, so a
//! search costs `O(log size)` page reads.
//!
//! Record timestamps must not decrease through the file. A probe out of
//! order fails the search with [`LogError::OrderingViolation`].
//!
//! [`LogError::OrderingViolation`]: crate::error::LogError::OrderingViolation

use crate::common::{Count, FPath, FileOffset, FileSz, TimeNanos};
use crate::data::record::Record;
use crate::error::{LogError, Result};
use crate::readers::logsnapshot::{LogSnapshot, RecordFlow, SnapshotConfig};

use std::fmt;
use std::num::NonZeroUsize;

use ::lru::LruCache;
use ::parking_lot::Mutex;
#[allow(unused_imports)]
use ::si_trace_print::{defn, defo, defx, defñ};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Probe results keyed by the file offset probed.
type ProbeCache = LruCache<FileOffset, Option<Record>>;

struct IndexState {
    /// file size the cached records were found in
    size: FileSz,
    /// first record with a timestamp, `Some(None)` if there is none
    first: Option<Option<Record>>,
    /// last record with a timestamp
    last: Option<Option<Record>>,
    probes: Option<ProbeCache>,
    count_first_loads: Count,
    count_last_loads: Count,
    count_probes: Count,
    count_probe_hits: Count,
}

/// Finds records by timestamp in one log file content.
///
/// Shared by the snapshots of a [`Log`] until its content hash changes.
/// When a later snapshot is larger, the cached last record and probes are
/// dropped and the first record is kept if it ends before the old size.
/// A snapshot smaller than the cached size is searched without the
/// caches.
///
/// One search runs at a time; the lock is held for the whole search.
///
/// [`Log`]: crate::readers::log::Log
pub struct TimestampIndex {
    path: FPath,
    residual_gap: FileSz,
    state: Mutex<IndexState>,
}

impl fmt::Debug for TimestampIndex {
    fn fmt(
        &self,
        f: &mut fmt::Formatter,
    ) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("TimestampIndex")
            .field("path", &self.path)
            .field("residual_gap", &self.residual_gap)
            .field("size", &state.size)
            .field("count_first_loads", &state.count_first_loads)
            .field("count_last_loads", &state.count_last_loads)
            .field("count_probes", &state.count_probes)
            .field("count_probe_hits", &state.count_probe_hits)
            .finish()
    }
}

/// First record with a timestamp passed by a scan.
fn first_timed(
    found: &mut Option<Record>,
    record: Record,
) -> RecordFlow {
    if record.has_time() {
        *found = Some(record);
        return RecordFlow::Break(());
    }

    RecordFlow::Continue(())
}

impl TimestampIndex {
    pub fn new(
        path: &FPath,
        config: &SnapshotConfig,
    ) -> TimestampIndex {
        TimestampIndex {
            path: path.clone(),
            residual_gap: config.index_residual_gap,
            state: Mutex::new(IndexState {
                size: 0,
                first: None,
                last: None,
                probes: NonZeroUsize::new(config.probe_cache_size).map(LruCache::new),
                count_first_loads: 0,
                count_last_loads: 0,
                count_probes: 0,
                count_probe_hits: 0,
            }),
        }
    }

    /// `Count` of scans for the first record with a timestamp.
    pub fn count_first_loads(&self) -> Count {
        self.state.lock().count_first_loads
    }

    /// `Count` of scans for the last record with a timestamp.
    pub fn count_last_loads(&self) -> Count {
        self.state.lock().count_last_loads
    }

    /// `Count` of binary search probes, cached or not.
    pub fn count_probes(&self) -> Count {
        self.state.lock().count_probes
    }

    /// `Count` of binary search probes answered by the probe cache.
    pub fn count_probe_hits(&self) -> Count {
        self.state.lock().count_probe_hits
    }

    /// The cached first record with a timestamp, if it was found already.
    pub fn cached_first(&self) -> Option<Record> {
        self.state.lock().first.clone().flatten()
    }

    /// The cached last record with a timestamp, if it was found already.
    pub fn cached_last(&self) -> Option<Record> {
        self.state.lock().last.clone().flatten()
    }

    fn ordering_violation(
        &self,
        earlier: &Record,
        later: &Record,
    ) -> LogError {
        LogError::OrderingViolation {
            path: self.path.clone(),
            earlier: String::from(earlier.text()),
            later: String::from(later.text()),
        }
    }

    /// Find the record at a bound of `time` in `snapshot`.
    ///
    /// If `last_bound` is `false`, the first record with a timestamp at or
    /// after `time`; a `time` before every record finds the first record,
    /// a `time` after every record finds nothing.
    ///
    /// If `last_bound` is `true`, the last record with a timestamp at or
    /// before `time`; a `time` after every record finds the last record,
    /// a `time` before every record finds nothing.
    ///
    /// An empty file or a file without timestamps finds nothing.
    pub fn find_record_bound(
        &self,
        time: TimeNanos,
        last_bound: bool,
        snapshot: &mut LogSnapshot,
    ) -> Result<Option<Record>> {
        defn!("({}, last_bound {}) size {}", time, last_bound, snapshot.size());
        let mut guard = self.state.lock();
        let state: &mut IndexState = &mut guard;
        let size = snapshot.size();
        let use_cache: bool = state.size <= size;
        if use_cache && state.size != size {
            defo!("size changed {} → {}", state.size, size);
            let first_complete = matches!(&state.first, Some(Some(first)) if first.end() < state.size);
            if !first_complete {
                state.first = None;
            }
            state.last = None;
            if let Some(probes) = state.probes.as_mut() {
                probes.clear();
            }
            state.size = size;
        }

        let cached_first = if use_cache { state.first.clone() } else { None };
        let first: Option<Record> = match cached_first {
            Some(first) => first,
            None => {
                state.count_first_loads += 1;
                let mut found: Option<Record> = None;
                snapshot.process_records(0, false, |record| first_timed(&mut found, record))?;
                if use_cache {
                    state.first = Some(found.clone());
                }
                found
            }
        };
        let first: Record = match first {
            Some(first) => first,
            None => {
                defx!("return None; no record with a timestamp");
                return Ok(None);
            }
        };
        if last_bound {
            if time < first.time() {
                defx!("return None; before first record");
                return Ok(None);
            }
        } else if time <= first.time() {
            defx!("return first record");
            return Ok(Some(first));
        }

        let cached_last = if use_cache { state.last.clone() } else { None };
        let last: Option<Record> = match cached_last {
            Some(last) => last,
            None => {
                state.count_last_loads += 1;
                let mut found: Option<Record> = None;
                snapshot.process_records_back(size, false, |record| first_timed(&mut found, record))?;
                if use_cache {
                    state.last = Some(found.clone());
                }
                found
            }
        };
        let last: Record = match last {
            Some(last) => last,
            None => return Ok(None),
        };
        if first.time() > last.time() {
            return Err(self.ordering_violation(&first, &last));
        }
        if last_bound {
            if time >= last.time() {
                defx!("return last record");
                return Ok(Some(last));
            }
        } else if time > last.time() {
            defx!("return None; after last record");
            return Ok(None);
        }

        // first.time() <= time <= last.time()
        let mut low: Record = first;
        let mut high: Record = last;
        while high.start().saturating_sub(low.end()) > self.residual_gap {
            let mid: FileOffset = low.end() + (high.start() - low.end()) / 2;
            state.count_probes += 1;
            let cached_probe = match state.probes.as_mut() {
                Some(probes) if use_cache => probes.get(&mid).cloned(),
                _ => None,
            };
            let probe: Option<Record> = match cached_probe {
                Some(probe) => {
                    state.count_probe_hits += 1;
                    probe
                }
                None => {
                    let mut found: Option<Record> = None;
                    snapshot.process_records(mid, false, |record| first_timed(&mut found, record))?;
                    if let Some(probes) = state.probes.as_mut() {
                        if use_cache {
                            probes.put(mid, found.clone());
                        }
                    }
                    found
                }
            };
            let probe: Record = match probe {
                Some(probe) => probe,
                None => break,
            };
            defo!("probe at {} found record [{}, {}) time {}", mid, probe.start(), probe.end(), probe.time());
            if probe.start() <= low.start() || probe.start() >= high.start() {
                break;
            }
            if probe.time() < low.time() {
                return Err(self.ordering_violation(&low, &probe));
            }
            if probe.time() > high.time() {
                return Err(self.ordering_violation(&probe, &high));
            }
            let probe_is_low: bool = if last_bound {
                time >= probe.time()
            } else {
                time > probe.time()
            };
            if probe_is_low {
                low = probe;
            } else {
                high = probe;
            }
        }

        defo!("scan residual [{}, {})", low.end(), high.start());
        let mut found: Option<Record> = None;
        if last_bound {
            snapshot.process_records_back(high.start(), true, |record| {
                if record.has_time() && record.time() <= time {
                    found = Some(record);
                    return RecordFlow::Break(());
                }
                RecordFlow::Continue(())
            })?;
        } else {
            snapshot.process_records(low.end(), true, |record| {
                if record.has_time() && record.time() >= time {
                    found = Some(record);
                    return RecordFlow::Break(());
                }
                RecordFlow::Continue(())
            })?;
        }
        defx!("return {:?}", found.as_ref().map(|record| (record.start(), record.time())));

        Ok(found)
    }
}
