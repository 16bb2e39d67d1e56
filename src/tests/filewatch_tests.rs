// src/tests/filewatch_tests.rs

//! tests for `filewatch.rs`

#![allow(non_snake_case)]

use crate::debug::helpers::{append_to_file, create_file_bytes_name_in_tmpdir, create_temp_dir, create_temp_file};
use crate::readers::filewatch::{
    run_caught,
    DebounceTimer,
    DirectoryWatcher,
    ListenerSet,
    PollingWatcher,
    Registration,
    WatchCallback,
};
use crate::readers::helpers::fpath_to_path;

use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use ::parking_lot::Mutex;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Poll `cond` for up to ten seconds.
fn wait_for<F: Fn() -> bool>(cond: F) -> bool {
    let until = Instant::now() + Duration::from_secs(10);
    while Instant::now() < until {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }

    cond()
}

fn counting_task(counter: &Arc<AtomicUsize>) -> impl FnOnce() + Send + 'static {
    let counter = counter.clone();
    move || {
        counter.fetch_add(1, Ordering::SeqCst);
    }
}

// -------------------------------------------------------------------------------------------------

#[test]
fn test_Registration_drop() {
    let counter = Arc::new(AtomicUsize::new(0));
    let registration = Registration::new(counting_task(&counter));
    assert_eq!(counter.load(Ordering::SeqCst), 0);
    drop(registration);
    assert_eq!(counter.load(Ordering::SeqCst), 1);
    drop(Registration::empty());
}

#[test]
fn test_run_caught() {
    let counter = Arc::new(AtomicUsize::new(0));
    run_caught("test panic", || panic!("expected panic"));
    run_caught("test task", counting_task(&counter));
    assert_eq!(counter.load(Ordering::SeqCst), 1);
}

// -------------------------------------------------------------------------------------------------

#[test]
fn test_DebounceTimer_one_task_per_key() {
    let timer = DebounceTimer::new().unwrap();
    let counter = Arc::new(AtomicUsize::new(0));
    assert!(timer.schedule_task("k", Duration::from_millis(50), counting_task(&counter)));
    assert!(!timer.schedule_task("k", Duration::from_millis(50), counting_task(&counter)));
    assert!(timer.is_pending("k"));
    assert!(!timer.is_pending("other"));
    assert!(wait_for(|| counter.load(Ordering::SeqCst) == 1));
    assert!(wait_for(|| !timer.is_pending("k")));
    // the key is free again
    assert!(timer.schedule_task("k", Duration::from_millis(1), counting_task(&counter)));
    assert!(wait_for(|| counter.load(Ordering::SeqCst) == 2));
}

#[test]
fn test_DebounceTimer_due_order() {
    let timer = DebounceTimer::new().unwrap();
    let order: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));
    let order_ = order.clone();
    timer.schedule_task("late", Duration::from_millis(200), move || order_.lock().push("late"));
    let order_ = order.clone();
    timer.schedule_task("early", Duration::from_millis(10), move || order_.lock().push("early"));
    assert!(wait_for(|| order.lock().len() == 2));
    assert_eq!(*order.lock(), vec!["early", "late"]);
}

#[test]
fn test_DebounceTimer_task_panics() {
    let timer = DebounceTimer::new().unwrap();
    let counter = Arc::new(AtomicUsize::new(0));
    timer.schedule_task("panics", Duration::from_millis(1), || panic!("expected panic"));
    timer.schedule_task("counts", Duration::from_millis(20), counting_task(&counter));
    assert!(wait_for(|| counter.load(Ordering::SeqCst) == 1));
}

#[test]
fn test_DebounceTimer_drop_discards_pending() {
    let timer = DebounceTimer::new().unwrap();
    let counter = Arc::new(AtomicUsize::new(0));
    timer.schedule_task("k", Duration::from_millis(100), counting_task(&counter));
    drop(timer);
    thread::sleep(Duration::from_millis(300));
    assert_eq!(counter.load(Ordering::SeqCst), 0);
}

// -------------------------------------------------------------------------------------------------

#[test]
fn test_ListenerSet_shared_registration() {
    let set: ListenerSet<&'static str> = ListenerSet::new();
    let registers = Arc::new(AtomicUsize::new(0));
    let unregisters = Arc::new(AtomicUsize::new(0));
    let register = || -> io::Result<Registration> {
        registers.fetch_add(1, Ordering::SeqCst);
        Ok(Registration::new(counting_task(&unregisters)))
    };
    assert!(set.is_empty());
    assert!(!set.is_registered());

    let reg1 = set.add("one", register).unwrap();
    let reg2 = set.add("two", register).unwrap();
    assert_eq!(registers.load(Ordering::SeqCst), 1);
    assert_eq!(set.len(), 2);
    assert_eq!(set.listeners(), vec!["one", "two"]);
    assert!(set.is_registered());

    drop(reg1);
    assert_eq!(set.listeners(), vec!["two"]);
    assert!(set.is_registered());
    assert_eq!(unregisters.load(Ordering::SeqCst), 0);

    drop(reg2);
    assert!(set.is_empty());
    assert!(!set.is_registered());
    assert_eq!(unregisters.load(Ordering::SeqCst), 1);

    // a new first listener registers again
    let reg3 = set.add("three", register).unwrap();
    assert_eq!(registers.load(Ordering::SeqCst), 2);
    drop(reg3);
    assert_eq!(unregisters.load(Ordering::SeqCst), 2);
}

#[test]
fn test_ListenerSet_register_fails() {
    let set: ListenerSet<u32> = ListenerSet::new();
    let result = set.add(1, || Err(io::Error::new(io::ErrorKind::PermissionDenied, "denied")));
    match result {
        Err(err) => assert_eq!(err.kind(), io::ErrorKind::PermissionDenied),
        Ok(_) => panic!("add succeeded"),
    }
    assert!(set.is_empty());
    assert!(!set.is_registered());
}

// -------------------------------------------------------------------------------------------------

#[test]
fn test_PollingWatcher_not_a_directory() {
    let ntf = create_temp_file("x");
    let watcher = PollingWatcher::new(Duration::from_millis(20));
    let callback: WatchCallback = Arc::new(|_changed: &[PathBuf]| {});
    match watcher.watch_directory(ntf.path(), callback) {
        Err(err) => assert_eq!(err.kind(), io::ErrorKind::InvalidInput),
        Ok(_) => panic!("watch_directory succeeded"),
    }
    assert!(watcher.watched_directories().is_empty());
}

#[test]
fn test_PollingWatcher_reports_changes() {
    let tmpdir = create_temp_dir();
    let path = create_file_bytes_name_in_tmpdir(b"one\n", "a.log", &tmpdir);
    let watcher = PollingWatcher::new(Duration::from_millis(20));
    let changed: Arc<Mutex<Vec<PathBuf>>> = Arc::new(Mutex::new(Vec::new()));
    let changed_ = changed.clone();
    let callback: WatchCallback = Arc::new(move |paths: &[PathBuf]| {
        changed_.lock().extend(paths.iter().cloned());
    });
    let registration1 = watcher
        .watch_directory(tmpdir.path(), callback)
        .unwrap();
    let registration2 = watcher
        .watch_directory(tmpdir.path(), Arc::new(|_changed: &[PathBuf]| {}))
        .unwrap();
    assert_eq!(watcher.watched_directories(), vec![tmpdir.path().to_path_buf()]);

    append_to_file(fpath_to_path(&path), b"two\n");
    let expect = PathBuf::from(&path);
    assert!(wait_for(|| changed.lock().contains(&expect)));

    let created = create_file_bytes_name_in_tmpdir(b"new\n", "b.log", &tmpdir);
    let expect = PathBuf::from(&created);
    assert!(wait_for(|| changed.lock().contains(&expect)));

    drop(registration1);
    assert_eq!(watcher.watched_directories().len(), 1);
    drop(registration2);
    assert!(watcher.watched_directories().is_empty());
}
