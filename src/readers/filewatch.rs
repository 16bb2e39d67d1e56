// src/readers/filewatch.rs

//! Plumbing for file change notifications.
//!
//! * [`DirectoryWatcher`]: reports changed paths of a directory.
//!   [`PollingWatcher`] implements it by polling directory entries.
//! * [`DebounceTimer`]: runs delayed tasks on one thread, at most one
//!   pending task per key, so a burst of writes makes one notification.
//! * [`ListenerSet`]: listeners sharing one underlying registration, made
//!   by the first listener and dropped with the last.
//!
//! Every registration is a [`Registration`] guard that unregisters on
//! drop.
//!
//! Panics of listeners, watch callbacks, and timer tasks are caught and
//! printed; they never stop the watcher or timer thread.

use crate::common::{FileSz, Path};
#[allow(unused_imports)]
use crate::debug::printers::{de_err, de_wrn, e_err, e_wrn};

use std::any::Any;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};
use std::fmt;
use std::fs;
use std::io;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant, SystemTime};

use ::parking_lot::{Condvar, Mutex};
#[allow(unused_imports)]
use ::si_trace_print::{defn, defo, defx, defñ};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Message of a caught panic payload.
fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        return s;
    }
    match payload.downcast_ref::<String>() {
        Some(s) => s.as_str(),
        None => "unknown panic",
    }
}

/// Run `f`; print a caught panic with `what`.
pub(crate) fn run_caught<F: FnOnce()>(
    what: &str,
    f: F,
) {
    if let Err(payload) = catch_unwind(AssertUnwindSafe(f)) {
        e_err!("{} panicked: {}", what, panic_message(payload.as_ref()));
    }
}

/// Unregisters something when dropped.
#[must_use = "dropping a Registration unregisters immediately"]
pub struct Registration {
    unregister: Option<Box<dyn FnOnce() + Send>>,
}

impl Registration {
    pub fn new<F>(unregister: F) -> Registration
    where
        F: FnOnce() + Send + 'static,
    {
        Registration {
            unregister: Some(Box::new(unregister)),
        }
    }

    /// A registration with nothing to undo.
    pub fn empty() -> Registration {
        Registration { unregister: None }
    }
}

impl fmt::Debug for Registration {
    fn fmt(
        &self,
        f: &mut fmt::Formatter,
    ) -> fmt::Result {
        f.debug_struct("Registration")
            .field("active", &self.unregister.is_some())
            .finish()
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        if let Some(unregister) = self.unregister.take() {
            unregister();
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// DirectoryWatcher
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Called with the paths of a watched directory that were created,
/// modified, or removed.
pub type WatchCallback = Arc<dyn Fn(&[PathBuf]) + Send + Sync>;

/// Reports changes to the entries of directories.
pub trait DirectoryWatcher: Send + Sync + fmt::Debug {
    /// Call `callback` on changes in `dir` until the returned
    /// [`Registration`] is dropped.
    fn watch_directory(
        &self,
        dir: &Path,
        callback: WatchCallback,
    ) -> io::Result<Registration>;
}

/// Default interval of [`PollingWatcher`].
pub const POLL_INTERVAL_DEFAULT: Duration = Duration::from_millis(250);

/// Size and modification time of each entry of a directory.
type DirEntries = HashMap<PathBuf, (FileSz, SystemTime)>;

struct WatchedDir {
    entries: DirEntries,
    callbacks: Vec<(u64, WatchCallback)>,
}

#[derive(Default)]
struct PollingState {
    dirs: HashMap<PathBuf, WatchedDir>,
    next_id: u64,
    /// the polling thread is running
    running: bool,
}

struct PollingShared {
    interval: Duration,
    state: Mutex<PollingState>,
}

/// A [`DirectoryWatcher`] that compares the size and modification time of
/// directory entries every `interval`, on its own thread.
///
/// The thread runs while at least one directory is watched.
#[derive(Clone)]
pub struct PollingWatcher {
    shared: Arc<PollingShared>,
}

impl fmt::Debug for PollingWatcher {
    fn fmt(
        &self,
        f: &mut fmt::Formatter,
    ) -> fmt::Result {
        let state = self.shared.state.lock();
        let dirs: Vec<&PathBuf> = state.dirs.keys().collect();
        f.debug_struct("PollingWatcher")
            .field("interval", &self.shared.interval)
            .field("dirs", &dirs)
            .field("running", &state.running)
            .finish()
    }
}

impl Default for PollingWatcher {
    fn default() -> Self {
        PollingWatcher::new(POLL_INTERVAL_DEFAULT)
    }
}

/// Read the entries of `dir`; a missing directory has no entries.
fn read_entries(dir: &Path) -> DirEntries {
    let mut entries = DirEntries::new();
    let read_dir = match fs::read_dir(dir) {
        Ok(read_dir) => read_dir,
        Err(_err) => {
            defñ!("read_dir({:?}) failed {}", dir, _err);
            return entries;
        }
    };
    for entry in read_dir.flatten() {
        if let Ok(metadata) = entry.metadata() {
            let modified = metadata
                .modified()
                .unwrap_or(SystemTime::UNIX_EPOCH);
            entries.insert(entry.path(), (metadata.len(), modified));
        }
    }

    entries
}

/// Paths that differ between `old` and `new`.
fn changed_paths(
    old: &DirEntries,
    new: &DirEntries,
) -> Vec<PathBuf> {
    let mut changed: Vec<PathBuf> = new
        .iter()
        .filter(|(path, attrs)| old.get(*path) != Some(*attrs))
        .map(|(path, _)| path.clone())
        .collect();
    changed.extend(
        old.keys()
            .filter(|path| !new.contains_key(*path))
            .cloned(),
    );
    changed.sort();

    changed
}

impl PollingWatcher {
    pub fn new(interval: Duration) -> PollingWatcher {
        PollingWatcher {
            shared: Arc::new(PollingShared {
                interval,
                state: Mutex::new(PollingState::default()),
            }),
        }
    }

    /// Directories watched now.
    pub fn watched_directories(&self) -> Vec<PathBuf> {
        self.shared
            .state
            .lock()
            .dirs
            .keys()
            .cloned()
            .collect()
    }

    fn poll_loop(shared: Arc<PollingShared>) {
        defn!();
        loop {
            thread::sleep(shared.interval);
            let dirs: Vec<PathBuf> = {
                let mut state = shared.state.lock();
                if state.dirs.is_empty() {
                    state.running = false;
                    defx!("no directories left");
                    return;
                }
                state.dirs.keys().cloned().collect()
            };
            for dir in dirs.iter() {
                let entries = read_entries(dir);
                let (changed, callbacks): (Vec<PathBuf>, Vec<WatchCallback>) = {
                    let mut state = shared.state.lock();
                    let watched: &mut WatchedDir = match state.dirs.get_mut(dir) {
                        Some(watched) => watched,
                        None => continue,
                    };
                    let changed = changed_paths(&watched.entries, &entries);
                    watched.entries = entries;
                    let callbacks = watched
                        .callbacks
                        .iter()
                        .map(|(_, callback)| callback.clone())
                        .collect();
                    (changed, callbacks)
                };
                if changed.is_empty() {
                    continue;
                }
                defo!("{:?} changed {:?}", dir, changed);
                for callback in callbacks.iter() {
                    run_caught("directory watch callback", || callback(&changed));
                }
            }
        }
    }
}

impl DirectoryWatcher for PollingWatcher {
    fn watch_directory(
        &self,
        dir: &Path,
        callback: WatchCallback,
    ) -> io::Result<Registration> {
        defn!("({:?})", dir);
        if dir.exists() && !dir.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("path must be a directory: {}", dir.display()),
            ));
        }
        let dir: PathBuf = dir.to_path_buf();
        let mut state = self.shared.state.lock();
        let id = state.next_id;
        state.next_id += 1;
        state
            .dirs
            .entry(dir.clone())
            .or_insert_with(|| {
                defo!("start watching {:?}", dir);
                WatchedDir {
                    entries: read_entries(&dir),
                    callbacks: Vec::new(),
                }
            })
            .callbacks
            .push((id, callback));
        if !state.running {
            let shared = self.shared.clone();
            thread::Builder::new()
                .name(String::from("logsnap-file-watcher"))
                .spawn(move || PollingWatcher::poll_loop(shared))?;
            state.running = true;
        }
        drop(state);

        let shared = self.shared.clone();
        defx!();

        Ok(Registration::new(move || {
            let mut state = shared.state.lock();
            let now_empty: bool = match state.dirs.get_mut(&dir) {
                Some(watched) => {
                    watched.callbacks.retain(|(id_, _)| *id_ != id);
                    watched.callbacks.is_empty()
                }
                None => false,
            };
            if now_empty {
                defñ!("stop watching {:?}", dir);
                state.dirs.remove(&dir);
            }
        }))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// DebounceTimer
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

type Task = Box<dyn FnOnce() + Send>;

#[derive(Default)]
struct TimerState {
    /// keys of scheduled tasks that have not run
    pending: HashSet<String>,
    /// due time and sequence number of scheduled tasks
    queue: BinaryHeap<Reverse<(Instant, u64)>>,
    tasks: HashMap<u64, (String, Task)>,
    next_seq: u64,
    shutdown: bool,
}

struct TimerShared {
    state: Mutex<TimerState>,
    wakeup: Condvar,
}

/// Runs delayed tasks on one thread, at most one pending task per key.
///
/// Tasks are run in due order. The thread stops when the timer is
/// dropped; tasks still pending are not run.
pub struct DebounceTimer {
    shared: Arc<TimerShared>,
}

impl fmt::Debug for DebounceTimer {
    fn fmt(
        &self,
        f: &mut fmt::Formatter,
    ) -> fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("DebounceTimer")
            .field("pending", &state.pending)
            .finish()
    }
}

impl DebounceTimer {
    /// Start the timer thread.
    pub fn new() -> io::Result<DebounceTimer> {
        let shared = Arc::new(TimerShared {
            state: Mutex::new(TimerState::default()),
            wakeup: Condvar::new(),
        });
        let shared_ = shared.clone();
        thread::Builder::new()
            .name(String::from("logsnap-timer"))
            .spawn(move || DebounceTimer::run(shared_))?;

        Ok(DebounceTimer { shared })
    }

    /// Run `task` after `delay`, unless a task with `key` is pending
    /// already. Returns `true` if `task` was scheduled.
    pub fn schedule_task<F>(
        &self,
        key: &str,
        delay: Duration,
        task: F,
    ) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        let mut state = self.shared.state.lock();
        if state.shutdown || !state.pending.insert(String::from(key)) {
            defñ!("({:?}) not scheduled", key);
            return false;
        }
        let seq = state.next_seq;
        state.next_seq += 1;
        state
            .queue
            .push(Reverse((Instant::now() + delay, seq)));
        state
            .tasks
            .insert(seq, (String::from(key), Box::new(task)));
        self.shared.wakeup.notify_one();
        defñ!("({:?}, {:?}) scheduled", key, delay);

        true
    }

    /// Is a task with `key` waiting to run?
    pub fn is_pending(
        &self,
        key: &str,
    ) -> bool {
        self.shared
            .state
            .lock()
            .pending
            .contains(key)
    }

    fn run(shared: Arc<TimerShared>) {
        defn!();
        let mut state = shared.state.lock();
        loop {
            if state.shutdown {
                defx!("shutdown");
                return;
            }
            let (due, seq) = match state.queue.peek() {
                Some(Reverse(next)) => *next,
                None => {
                    shared.wakeup.wait(&mut state);
                    continue;
                }
            };
            if Instant::now() < due {
                shared.wakeup.wait_until(&mut state, due);
                continue;
            }
            state.queue.pop();
            let (key, task) = match state.tasks.remove(&seq) {
                Some(entry) => entry,
                None => continue,
            };
            state.pending.remove(&key);
            drop(state);
            run_caught("scheduled task", task);
            state = shared.state.lock();
        }
    }
}

impl Drop for DebounceTimer {
    fn drop(&mut self) {
        let mut state = self.shared.state.lock();
        state.shutdown = true;
        state.tasks.clear();
        state.queue.clear();
        state.pending.clear();
        self.shared.wakeup.notify_all();
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// ListenerSet
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

struct ListenerState<T> {
    listeners: Vec<(u64, T)>,
    next_id: u64,
    /// made when the first listener was added
    shared_registration: Option<Registration>,
}

/// Listeners that share one registration of the set itself, e.g. one
/// directory watch for all listeners of one file.
pub struct ListenerSet<T> {
    state: Arc<Mutex<ListenerState<T>>>,
}

impl<T> Clone for ListenerSet<T> {
    fn clone(&self) -> Self {
        ListenerSet {
            state: self.state.clone(),
        }
    }
}

impl<T> Default for ListenerSet<T> {
    fn default() -> Self {
        ListenerSet {
            state: Arc::new(Mutex::new(ListenerState {
                listeners: Vec::new(),
                next_id: 0,
                shared_registration: None,
            })),
        }
    }
}

impl<T> fmt::Debug for ListenerSet<T> {
    fn fmt(
        &self,
        f: &mut fmt::Formatter,
    ) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("ListenerSet")
            .field("listeners", &state.listeners.len())
            .field("registered", &state.shared_registration.is_some())
            .finish()
    }
}

impl<T: Clone + Send + 'static> ListenerSet<T> {
    pub fn new() -> ListenerSet<T> {
        ListenerSet::default()
    }

    /// Add `listener`. If it is the first one, call `register` and keep
    /// its registration until the last listener is removed.
    ///
    /// The listener is removed when the returned [`Registration`] is
    /// dropped.
    pub fn add<F>(
        &self,
        listener: T,
        register: F,
    ) -> io::Result<Registration>
    where
        F: FnOnce() -> io::Result<Registration>,
    {
        let mut state = self.state.lock();
        if state.listeners.is_empty() {
            state.shared_registration = Some(register()?);
        }
        let id = state.next_id;
        state.next_id += 1;
        state.listeners.push((id, listener));
        drop(state);

        let state_ = self.state.clone();

        Ok(Registration::new(move || {
            let shared_registration: Option<Registration> = {
                let mut state = state_.lock();
                state
                    .listeners
                    .retain(|(id_, _)| *id_ != id);
                if state.listeners.is_empty() {
                    state.shared_registration.take()
                } else {
                    None
                }
            };
            // unregister outside the lock
            drop(shared_registration);
        }))
    }

    /// The listeners now.
    pub fn listeners(&self) -> Vec<T> {
        self.state
            .lock()
            .listeners
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.state.lock().listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The shared registration is held.
    pub fn is_registered(&self) -> bool {
        self.state
            .lock()
            .shared_registration
            .is_some()
    }
}
