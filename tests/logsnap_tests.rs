// tests/logsnap_tests.rs
//
// tests of the public API of `logsnaplib` and of the `logsnap` binary

#![allow(non_snake_case)]

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::process::Command;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use ::logsnaplib::common::{FPath, ProcessResult};
use ::logsnaplib::data::position::Position;
use ::logsnaplib::data::record::Record;
use ::logsnaplib::formats::regexformat::{RegexField, RegexLogFormat};
use ::logsnaplib::formats::LogFormat;
use ::logsnaplib::readers::log::Log;
use ::logsnaplib::readers::recordloader::{load_records, run_load, LoadRequest};
use ::logsnaplib::readers::workerpool::WorkerPool;

use ::tempfile::TempDir;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

const PATTERN: &str = r"(?P<date>\d{4}-\d{2}-\d{2} \d{2}:\d{2}:\d{2}) (?P<msg>.*)";
const DATE_PATTERN: &str = "%Y-%m-%d %H:%M:%S";

const DATA_A: &str = "\
2021-03-14 15:09:20 a1
2021-03-14 15:09:22 a2
\tat a2.frame
2021-03-14 15:09:24 a3
";

const DATA_B: &str = "\
2021-03-14 15:09:21 b1
2021-03-14 15:09:22 b2
2021-03-14 15:09:25 b3
";

fn format() -> Arc<dyn LogFormat> {
    let format = RegexLogFormat::new(PATTERN, vec![RegexField::named("date"), RegexField::named("msg")])
        .unwrap()
        .with_date("date", DATE_PATTERN)
        .unwrap();

    Arc::new(format)
}

fn write_file(
    dir: &TempDir,
    name: &str,
    data: &str,
) -> FPath {
    let path = dir.path().join(name);
    std::fs::write(&path, data).unwrap();

    path.to_string_lossy().into_owned()
}

fn append(
    path: &FPath,
    data: &str,
) {
    let mut file = OpenOptions::new()
        .append(true)
        .open(Path::new(path))
        .unwrap();
    file.write_all(data.as_bytes()).unwrap();
}

fn first_words(records: &[Record]) -> Vec<&str> {
    records
        .iter()
        .map(|r| r.field_text(1).unwrap_or(""))
        .map(|msg| msg.split_whitespace().next().unwrap_or(""))
        .collect()
}

// -------------------------------------------------------------------------------------------------

/// Records of two logs merged by `Record` order are in time order, with
/// equal times ordered by log id.
#[test]
fn test_merge_two_logs() {
    let dir = TempDir::new().unwrap();
    let log_a = Log::new(write_file(&dir, "a.log", DATA_A), format());
    let log_b = Log::new(write_file(&dir, "b.log", DATA_B), format());
    let cancelled = AtomicBool::new(false);

    let mut records: Vec<Record> = Vec::new();
    for log in [&log_a, &log_b] {
        let outcome = run_load(log, &LoadRequest::tail(100), &cancelled).unwrap();
        assert_eq!(outcome.result, ProcessResult::Exhausted);
        records.extend(outcome.records);
    }
    records.sort();
    let words = first_words(&records);
    let (first22, second22) = if log_a.id() < log_b.id() {
        ("a2", "b2")
    } else {
        ("b2", "a2")
    };
    assert_eq!(words, vec!["a1", "b1", first22, second22, "a3", "b3"]);
    let a2 = records
        .iter()
        .find(|r| r.text().contains("a2"))
        .unwrap();
    assert!(a2.text().ends_with("\tat a2.frame"));

    // continue in log b from a position in log a
    let position = Position::record_end(a2);
    let outcome = run_load(&log_b, &LoadRequest::forward_from(position, 10), &cancelled).unwrap();
    let expect: Vec<&str> = if log_a.id() < log_b.id() {
        vec!["b2", "b3"]
    } else {
        vec!["b3"]
    };
    assert_eq!(first_words(&outcome.records), expect);
}

/// Follow a growing file: each load continues after the last record seen.
#[test]
fn test_follow_growing_file() {
    let dir = TempDir::new().unwrap();
    let path = write_file(&dir, "grow.log", DATA_A);
    let log = Arc::new(Log::new(path.clone(), format()));
    let pool = WorkerPool::new(2).unwrap();

    let outcome = load_records(log.clone(), &pool, LoadRequest::tail(2))
        .unwrap()
        .wait()
        .unwrap();
    assert_eq!(first_words(&outcome.records), vec!["a3", "a2"]);
    let hash = outcome.hash.unwrap();
    let newest = Position::record_end(&outcome.records[0]);

    append(&path, "2021-03-14 15:09:30 a4\n2021-03-14 15:09:31 a5\n");
    let request = LoadRequest::forward_from(newest, 10).with_hash(hash);
    let outcome = load_records(log.clone(), &pool, request)
        .unwrap()
        .wait()
        .unwrap();
    assert_eq!(first_words(&outcome.records), vec!["a4", "a5"]);
    assert_eq!(outcome.result, ProcessResult::Exhausted);
}

// -------------------------------------------------------------------------------------------------

fn logsnap() -> Command {
    Command::new(env!("CARGO_BIN_EXE_logsnap"))
}

#[test]
fn test_logsnap_tail() {
    let dir = TempDir::new().unwrap();
    let path = write_file(&dir, "numbers.log", "1\n2\n3\n4\n5\n");
    let output = logsnap()
        .args([path.as_str(), "-n", "2"])
        .output()
        .unwrap();
    assert!(output.status.success(), "{:?}", output);
    assert_eq!(String::from_utf8_lossy(&output.stdout), "4\n5\n");

    let output = logsnap()
        .args([path.as_str(), "-n", "2", "--backward"])
        .output()
        .unwrap();
    assert!(output.status.success(), "{:?}", output);
    assert_eq!(String::from_utf8_lossy(&output.stdout), "5\n4\n");
}

#[test]
fn test_logsnap_from_time() {
    let dir = TempDir::new().unwrap();
    let path = write_file(&dir, "a.log", DATA_A);
    let output = logsnap()
        .args([
            path.as_str(),
            "--regex",
            PATTERN,
            "--date-field",
            "date",
            "--date-pattern",
            DATE_PATTERN,
            "--from",
            "2021-03-14 15:09:21",
        ])
        .output()
        .unwrap();
    assert!(output.status.success(), "{:?}", output);
    assert_eq!(
        String::from_utf8_lossy(&output.stdout),
        "2021-03-14 15:09:22 a2\n\tat a2.frame\n2021-03-14 15:09:24 a3\n"
    );
}

#[test]
fn test_logsnap_missing_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("missing.log");
    let output = logsnap()
        .arg(&path)
        .output()
        .unwrap();
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("file not found"), "{}", stderr);
}
