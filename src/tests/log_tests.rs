// src/tests/log_tests.rs

//! tests for `log.rs`

#![allow(non_snake_case)]

use crate::common::{FPath, TimeNanos};
use crate::debug::helpers::{
    append_to_file,
    create_file_bytes_name_in_tmpdir,
    create_temp_dir,
    create_temp_file,
    ntf_fpath,
    rewrite_file,
};
use crate::error::LogError;
use crate::readers::accesspolicy::RootsAccessPolicy;
use crate::readers::filewatch::{DebounceTimer, PollingWatcher};
use crate::readers::helpers::{fpath_to_path, path_to_fpath};
use crate::readers::log::{log_id_of, FileAttributes, Log};
use crate::readers::logsnapshot::SnapshotConfig;
use crate::readers::windowedsource::{PAGE_SIZE_BITS_MAX, PAGE_SIZE_BITS_MIN};
use crate::tests::common::{
    collect_records,
    format_simple,
    format_ts,
    generate_ts_log,
    new_log,
    open_snapshot,
    texts,
    ts,
    NTF_NUMBERS_path,
};

use std::io::ErrorKind;
use std::sync::Arc;
use std::time::Duration;

use ::filetime::{set_file_mtime, FileTime};
use ::test_case::test_case;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Search the index of a new snapshot of `log` for `time`.
fn search(
    log: &Log,
    time: TimeNanos,
) {
    let mut snapshot = open_snapshot(log);
    let index = snapshot.index().clone();
    let result = index.find_record_bound(time, false, &mut snapshot);
    snapshot.close();
    assert!(result.is_ok(), "{:?}", result);
}

fn set_mtime(
    path: &FPath,
    secs: i64,
) {
    set_file_mtime(fpath_to_path(path), FileTime::from_unix_time(secs, 0)).unwrap();
}

// -------------------------------------------------------------------------------------------------

/// Appending keeps the hash and the timestamp index; the first record found
/// before the append is not searched for again.
#[test]
fn test_Log_append_keeps_index() {
    let data = generate_ts_log(20, 0, 0, |_| 1);
    assert!(data.len() > 255);
    let ntf = create_temp_file(&data);
    let path = ntf_fpath(&ntf);
    set_mtime(&path, 1_700_000_000);
    let log = new_log(&path, format_ts());

    let mut snapshot1 = open_snapshot(&log);
    let hash1 = snapshot1.hash().unwrap();
    let index1 = snapshot1.index().clone();
    snapshot1.close();
    search(&log, ts("2021-03-14 00:00:10"));
    assert_eq!(index1.count_first_loads(), 1);
    assert_eq!(index1.count_last_loads(), 1);

    append_to_file(fpath_to_path(&path), b"\n\tat appended.frame1");
    set_mtime(&path, 1_700_000_100);

    let mut snapshot2 = open_snapshot(&log);
    assert_eq!(snapshot2.size(), (data.len() + 20) as u64);
    assert_eq!(snapshot2.hash(), Some(hash1));
    assert!(Arc::ptr_eq(snapshot2.index(), &index1));
    assert!(snapshot2.is_valid_hash(hash1));
    snapshot2.close();

    search(&log, ts("2021-03-14 00:00:10"));
    assert_eq!(index1.count_first_loads(), 1);
    assert_eq!(index1.count_last_loads(), 2);
    let last = index1.cached_last().unwrap();
    assert!(last.text().ends_with("\tat appended.frame1"), "{:?}", last);
}

/// Rewriting the file changes the hash and starts a new index.
#[test]
fn test_Log_rewrite_new_index() {
    let data = generate_ts_log(20, 0, 0, |_| 1);
    let ntf = create_temp_file(&data);
    let path = ntf_fpath(&ntf);
    set_mtime(&path, 1_700_000_000);
    let log = new_log(&path, format_ts());

    let mut snapshot1 = open_snapshot(&log);
    let hash1 = snapshot1.hash().unwrap();
    let index1 = snapshot1.index().clone();
    snapshot1.close();

    // same length, different content
    let data2 = generate_ts_log(20, 0, 0, |_| 2);
    assert_eq!(data2.len(), data.len());
    rewrite_file(fpath_to_path(&path), data2.as_bytes());
    set_mtime(&path, 1_700_000_100);

    let mut snapshot2 = open_snapshot(&log);
    assert_ne!(snapshot2.hash(), Some(hash1));
    assert!(!snapshot2.is_valid_hash(hash1));
    assert!(!Arc::ptr_eq(snapshot2.index(), &index1));
    snapshot2.close();
}

/// Truncating to nothing and writing different content starts a new index
/// each time; records cached from the old content are never found again.
#[test]
fn test_Log_truncate_rewrite_new_index() {
    let data = generate_ts_log(20, 0, 0, |_| 1);
    let ntf = create_temp_file(&data);
    let path = ntf_fpath(&ntf);
    set_mtime(&path, 1_700_000_000);
    let log = new_log(&path, format_ts());

    let mut snapshot1 = open_snapshot(&log);
    let hash1 = snapshot1.hash().unwrap();
    let index1 = snapshot1.index().clone();
    snapshot1.close();
    search(&log, ts("2021-03-14 00:00:10"));
    assert_eq!(index1.count_first_loads(), 1);
    let first1 = index1.cached_first().unwrap();
    assert_eq!(first1.text(), data.lines().next().unwrap());

    rewrite_file(fpath_to_path(&path), b"");
    set_mtime(&path, 1_700_000_100);
    let mut snapshot_empty = open_snapshot(&log);
    assert_eq!(snapshot_empty.size(), 0);
    assert_ne!(snapshot_empty.hash(), Some(hash1));
    assert!(!snapshot_empty.is_valid_hash(hash1));
    let index_empty = snapshot_empty.index().clone();
    assert!(!Arc::ptr_eq(&index_empty, &index1));
    snapshot_empty.close();
    search(&log, ts("2021-03-14 00:00:10"));
    assert_eq!(index_empty.cached_first(), None);
    assert_eq!(index_empty.cached_last(), None);

    let data2 = generate_ts_log(30, 0, 0, |_| 3);
    rewrite_file(fpath_to_path(&path), data2.as_bytes());
    set_mtime(&path, 1_700_000_200);
    let mut snapshot2 = open_snapshot(&log);
    assert_eq!(snapshot2.size(), data2.len() as u64);
    assert!(!snapshot2.is_valid_hash(hash1));
    let index2 = snapshot2.index().clone();
    assert!(!Arc::ptr_eq(&index2, &index1));
    assert!(!Arc::ptr_eq(&index2, &index_empty));
    assert_eq!(index2.count_first_loads(), 0);
    assert_eq!(index2.cached_first(), None);
    snapshot2.close();

    search(&log, ts("2021-03-14 00:00:10"));
    assert_eq!(index2.count_first_loads(), 1);
    assert_eq!(index2.count_last_loads(), 1);
    let first2 = index2.cached_first().unwrap();
    let last2 = index2.cached_last().unwrap();
    assert_eq!(first2.text(), data2.lines().next().unwrap());
    assert_eq!(last2.text(), data2.lines().last().unwrap());
    assert_ne!(first2.text(), first1.text());
    // the old index is left as it was
    assert_eq!(index1.count_first_loads(), 1);
}

/// A file shorter than the hash prefix changes hash when it grows, but the
/// old hash still describes its start.
#[test]
fn test_Log_short_file_grows() {
    let ntf = create_temp_file("2021-03-14 15:09:26 a");
    let path = ntf_fpath(&ntf);
    set_mtime(&path, 1_700_000_000);
    let log = new_log(&path, format_ts());
    let mut snapshot1 = open_snapshot(&log);
    let hash1 = snapshot1.hash().unwrap();
    assert_eq!(hash1.prefix_len(), 21);
    snapshot1.close();

    append_to_file(fpath_to_path(&path), b"\n2021-03-14 15:09:27 b");
    set_mtime(&path, 1_700_000_100);
    let mut snapshot2 = open_snapshot(&log);
    let hash2 = snapshot2.hash().unwrap();
    assert_ne!(hash2, hash1);
    assert_eq!(hash2.prefix_len(), 43);
    assert!(snapshot2.is_valid_hash(hash1));
    snapshot2.close();
}

#[test]
fn test_Log_snapshot_sees_content_at_open() {
    let ntf = create_temp_file("one\ntwo");
    let path = ntf_fpath(&ntf);
    let log = new_log(&path, format_simple());
    let mut snapshot = open_snapshot(&log);
    append_to_file(fpath_to_path(&path), b"\nthree");
    let (records, _) = collect_records(&mut snapshot, 0, false);
    snapshot.close();
    assert_eq!(texts(&records), vec!["one", "two"]);

    let mut snapshot = open_snapshot(&log);
    let (records, _) = collect_records(&mut snapshot, 0, false);
    snapshot.close();
    assert_eq!(records.len(), 3);
}

// -------------------------------------------------------------------------------------------------

#[test]
fn test_Log_access_policy() {
    let tmpdir = create_temp_dir();
    let other = create_temp_dir();
    let path = create_file_bytes_name_in_tmpdir(b"one\n", "allowed.log", &tmpdir);

    let log = new_log(&path, format_simple()).with_access_policy(Arc::new(RootsAccessPolicy::new(vec![
        other.path().to_path_buf(),
    ])));
    match log.try_read() {
        Err(err @ LogError::NotVisible { .. }) => {
            let message = err.to_string();
            assert!(message.starts_with("You cannot open \""), "{}", message);
            assert!(message.contains(&path_to_fpath(other.path())), "{}", message);
            assert!(err.is_not_found());
        }
        other => panic!("unexpected {:?}", other),
    }

    let log = new_log(&path, format_simple()).with_access_policy(Arc::new(RootsAccessPolicy::new(vec![
        other.path().to_path_buf(),
        tmpdir.path().to_path_buf(),
    ])));
    assert!(log.try_read().is_ok());
}

#[test]
fn test_Log_not_found() {
    let tmpdir = create_temp_dir();
    let path: FPath = path_to_fpath(&tmpdir.path().join("missing.log"));
    let log = new_log(&path, format_simple());
    assert!(matches!(log.try_read(), Err(LogError::NotFound { .. })));
}

#[test]
fn test_Log_relative_path() {
    let log = new_log(&FPath::from("relative/file.log"), format_simple());
    assert!(matches!(log.try_read(), Err(LogError::NotFound { .. })));
}

#[test]
fn test_Log_directory() {
    let tmpdir = create_temp_dir();
    let log = new_log(&path_to_fpath(tmpdir.path()), format_simple());
    let result = log.try_read();
    assert!(matches!(result, Err(LogError::NotRegularFile { .. })), "{:?}", result);
}

#[test]
fn test_Log_try_read() {
    let log = new_log(&NTF_NUMBERS_path, format_simple());
    assert!(log.try_read().is_ok());
}

#[test]
fn test_log_id_of() {
    let id = log_id_of("/var/log/app.log");
    assert_eq!(id.len(), 16);
    assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    assert_eq!(id, log_id_of("/var/log/app.log"));
    assert_ne!(id, log_id_of("/var/log/app.log.1"));
    // the path length leads the id
    assert_eq!(&id[..8], format!("{:08x}", "/var/log/app.log".len()));
    let long = "x".repeat(0x1_0000);
    assert_eq!(&log_id_of(&long)[..8], "00010000");
    let log = new_log(&FPath::from("/var/log/app.log"), format_simple());
    assert_eq!(log.id(), id);
}

#[test_case(40, PAGE_SIZE_BITS_MAX; "too large")]
#[test_case(2, PAGE_SIZE_BITS_MIN; "too small")]
#[test_case(12, 12; "in range")]
fn test_Log_with_config_clamped(
    page_size_bits: u32,
    expect: u32,
) {
    let config = SnapshotConfig {
        page_size_bits,
        max_line_length: 0,
        ..SnapshotConfig::default()
    };
    let log = new_log(&NTF_NUMBERS_path, format_simple()).with_config(config);
    assert_eq!(log.config().page_size_bits, expect);
    assert_eq!(log.config().max_line_length, 1);
}

// -------------------------------------------------------------------------------------------------

#[test]
fn test_Log_add_change_listener_not_watched() {
    let log = new_log(&NTF_NUMBERS_path, format_simple());
    match log.add_change_listener(|_| {}) {
        Err(LogError::Io(err)) => assert_eq!(err.kind(), ErrorKind::Unsupported),
        other => panic!("unexpected {:?}", other),
    }
    assert_eq!(log.count_change_listeners(), 0);
}

#[test]
fn test_Log_add_change_listener() {
    let tmpdir = create_temp_dir();
    let path = create_file_bytes_name_in_tmpdir(b"one\n", "watched.log", &tmpdir);
    let watcher = Arc::new(PollingWatcher::new(Duration::from_millis(20)));
    let timer = Arc::new(DebounceTimer::new().unwrap());
    let log = new_log(&path, format_simple()).with_watch(watcher.clone(), timer);

    let (sender, receiver) = ::crossbeam_channel::unbounded::<Option<FileAttributes>>();
    let registration = log
        .add_change_listener(move |attributes| {
            let _ = sender.send(attributes);
        })
        .unwrap();
    assert_eq!(log.count_change_listeners(), 1);
    assert_eq!(watcher.watched_directories(), vec![tmpdir.path().to_path_buf()]);

    append_to_file(fpath_to_path(&path), b"two\n");
    let attributes = receiver
        .recv_timeout(Duration::from_secs(10))
        .unwrap()
        .unwrap();
    assert_eq!(attributes.size, 8);

    drop(registration);
    assert_eq!(log.count_change_listeners(), 0);
    assert!(watcher.watched_directories().is_empty());
}
