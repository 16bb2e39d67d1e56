// src/readers/log.rs

//! Implements [`Log`], one log file and the state shared by its
//! snapshots.

use crate::common::{FPath, File, FileSz, LogId, Path};
use crate::error::{LogError, Result};
use crate::formats::LogFormat;
use crate::readers::accesspolicy::{AccessPolicy, AllowAll};
use crate::readers::contenthash::ContentHash;
use crate::readers::filewatch::{run_caught, DebounceTimer, DirectoryWatcher, ListenerSet, Registration, WatchCallback};
use crate::readers::helpers::fpath_to_path;
use crate::readers::logsnapshot::{compute_hash, LogSnapshot, SnapshotConfig};
use crate::readers::timestampindex::TimestampIndex;
use crate::readers::windowedsource::WindowedByteSource;
#[allow(unused_imports)]
use crate::debug::printers::{de_err, de_wrn, e_err, e_wrn};

use std::fmt;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use ::flate2::Crc;
use ::parking_lot::Mutex;
#[allow(unused_imports)]
use ::si_trace_print::{defn, defo, defx, defñ};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Delay between a change of a file and the notification of its
/// listeners; changes within the delay make one notification.
pub const CHANGE_DEBOUNCE_DELAY: Duration = Duration::from_millis(50);

/// Size and modification time of a file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FileAttributes {
    pub size: FileSz,
    pub modified: SystemTime,
}

impl FileAttributes {
    /// Attributes of the file at `path`, `None` if there is no file.
    pub fn from_path(path: &Path) -> io::Result<Option<FileAttributes>> {
        let metadata = match fs::metadata(path) {
            Ok(metadata) => metadata,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err),
        };

        Ok(Some(FileAttributes {
            size: metadata.len(),
            modified: metadata
                .modified()
                .unwrap_or(SystemTime::UNIX_EPOCH),
        }))
    }
}

/// Called after the file of a [`Log`] changed, with its new attributes, or
/// `None` if the file was removed.
pub type ChangeListener = Arc<dyn Fn(Option<FileAttributes>) + Send + Sync>;

/// Content hash of the file as of a modification time and size, and the
/// timestamp index of that content.
struct HashCache {
    key: Option<(SystemTime, FileSz)>,
    hash: Option<ContentHash>,
    index: Arc<TimestampIndex>,
}

/// Stable id of the log at `path`: CRC32 of the path and the path length,
/// as 16 hex digits. A length past `u32::MAX` is written as `u32::MAX`.
pub fn log_id_of(path: &str) -> LogId {
    let mut crc = Crc::new();
    crc.update(path.as_bytes());
    let len: u32 = u32::try_from(path.len()).unwrap_or(u32::MAX);

    format!("{:08x}{:08x}", len, crc.sum())
}

/// One log file read with one [`LogFormat`].
///
/// A `Log` creates [`LogSnapshot`]s of its file. It remembers the content
/// hash of the file keyed by modification time and size, and keeps a
/// [`TimestampIndex`] for the snapshots while the hash stays the same.
pub struct Log {
    path: FPath,
    id: LogId,
    format: Arc<dyn LogFormat>,
    config: SnapshotConfig,
    access: Arc<dyn AccessPolicy>,
    cache: Mutex<HashCache>,
    watch: Option<(Arc<dyn DirectoryWatcher>, Arc<DebounceTimer>)>,
    listeners: ListenerSet<ChangeListener>,
}

impl fmt::Debug for Log {
    fn fmt(
        &self,
        f: &mut fmt::Formatter,
    ) -> fmt::Result {
        f.debug_struct("Log")
            .field("path", &self.path)
            .field("id", &self.id)
            .field("format", &self.format)
            .field("config", &self.config)
            .field("access", &self.access)
            .field("listeners", &self.listeners)
            .finish()
    }
}

impl Log {
    pub fn new(
        path: FPath,
        format: Arc<dyn LogFormat>,
    ) -> Log {
        let config = SnapshotConfig::default();
        let id = log_id_of(&path);
        defñ!("({:?}) id {}", path, id);
        let index = Arc::new(TimestampIndex::new(&path, &config));
        Log {
            path,
            id,
            format,
            config,
            access: Arc::new(AllowAll),
            cache: Mutex::new(HashCache {
                key: None,
                hash: None,
                index,
            }),
            watch: None,
            listeners: ListenerSet::new(),
        }
    }

    pub fn with_access_policy(
        mut self,
        access: Arc<dyn AccessPolicy>,
    ) -> Log {
        self.access = access;
        self
    }

    pub fn with_config(
        mut self,
        config: SnapshotConfig,
    ) -> Log {
        self.config = config.clamped();
        self.cache.get_mut().index = Arc::new(TimestampIndex::new(&self.path, &self.config));
        self
    }

    /// Enable [`add_change_listener`].
    ///
    /// [`add_change_listener`]: Log::add_change_listener
    pub fn with_watch(
        mut self,
        watcher: Arc<dyn DirectoryWatcher>,
        timer: Arc<DebounceTimer>,
    ) -> Log {
        self.watch = Some((watcher, timer));
        self
    }

    pub fn path(&self) -> &FPath {
        &self.path
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn format(&self) -> &Arc<dyn LogFormat> {
        &self.format
    }

    pub const fn config(&self) -> &SnapshotConfig {
        &self.config
    }

    fn failed_snapshot(
        &self,
        error: LogError,
    ) -> LogSnapshot {
        LogSnapshot::failed(self.path.clone(), self.id.clone(), self.format.clone(), self.config.clone(), error)
    }

    /// Open a snapshot of the file as it is now.
    ///
    /// A file that cannot be opened makes a snapshot that fails every call
    /// with the open error. A file rewritten while the snapshot opens is
    /// opened again.
    pub fn create_snapshot(&self) -> LogSnapshot {
        defn!("({:?})", self.path);
        loop {
            match self.open_snapshot() {
                Ok(snapshot) => {
                    defx!("({:?}) size {}", self.path, snapshot.size());
                    return snapshot;
                }
                Err(err) if err.is_retryable() => {
                    defo!("({:?}) changed while opening, retry", self.path);
                    continue;
                }
                Err(err) => {
                    defx!("({:?}) failed {}", self.path, err);
                    return self.failed_snapshot(err);
                }
            }
        }
    }

    fn open_snapshot(&self) -> Result<LogSnapshot> {
        let path: &Path = fpath_to_path(&self.path);
        if !path.is_absolute() {
            return Err(LogError::NotFound {
                path: self.path.clone(),
            });
        }
        if let Some(reason) = self.access.check_access(path) {
            return Err(LogError::NotVisible {
                path: self.path.clone(),
                reason,
            });
        }
        let metadata = match fs::metadata(path) {
            Ok(metadata) => metadata,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(LogError::NotFound {
                    path: self.path.clone(),
                });
            }
            Err(err) => return Err(LogError::Io(err)),
        };
        if !metadata.is_file() {
            return Err(LogError::NotRegularFile {
                path: self.path.clone(),
            });
        }
        let file = match File::open(path) {
            Ok(file) => file,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Err(LogError::Crashed),
            Err(err) => return Err(LogError::Io(err)),
        };
        // the size and time of the open file, not of the path looked up before
        let metadata = file.metadata()?;
        let size: FileSz = metadata.len();
        let modified = metadata
            .modified()
            .unwrap_or(SystemTime::UNIX_EPOCH);
        let mut source = WindowedByteSource::new(file, size, self.config.page_size_bits);

        let mut cache = self.cache.lock();
        let hash: ContentHash = match (cache.key, cache.hash) {
            (Some(key), Some(hash)) if key == (modified, size) => hash,
            _ => {
                let hash = compute_hash(&mut source)?;
                if cache.hash != Some(hash) {
                    defo!("({:?}) hash {:?} → {}, new index", self.path, cache.hash, hash);
                    cache.index = Arc::new(TimestampIndex::new(&self.path, &self.config));
                }
                cache.key = Some((modified, size));
                cache.hash = Some(hash);
                hash
            }
        };
        let index = cache.index.clone();
        drop(cache);

        Ok(LogSnapshot::opened(
            self.path.clone(),
            self.id.clone(),
            self.format.clone(),
            self.config.clone(),
            modified,
            hash,
            source,
            index,
        ))
    }

    /// Check that the file can be opened.
    pub fn try_read(&self) -> Result<()> {
        let mut snapshot = self.create_snapshot();
        let result = match snapshot.error() {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        };
        snapshot.close();

        result
    }

    /// Call `listener` after the file changes, until the returned
    /// [`Registration`] is dropped.
    ///
    /// The first listener starts watching the directory of the file; the
    /// last one dropped stops it. Changes within
    /// [`CHANGE_DEBOUNCE_DELAY`] make one call.
    ///
    /// Fails if the `Log` was not built [`with_watch`].
    ///
    /// [`with_watch`]: Log::with_watch
    pub fn add_change_listener<F>(
        &self,
        listener: F,
    ) -> Result<Registration>
    where
        F: Fn(Option<FileAttributes>) + Send + Sync + 'static,
    {
        defñ!("({:?})", self.path);
        let (watcher, timer) = match &self.watch {
            Some((watcher, timer)) => (watcher.clone(), timer.clone()),
            None => {
                return Err(LogError::Io(io::Error::new(
                    io::ErrorKind::Unsupported,
                    "log is not watched",
                )));
            }
        };
        let file: PathBuf = PathBuf::from(&self.path);
        let dir: PathBuf = match file.parent() {
            Some(dir) => dir.to_path_buf(),
            None => {
                return Err(LogError::NotFound {
                    path: self.path.clone(),
                });
            }
        };
        let listeners = self.listeners.clone();
        let key: LogId = self.id.clone();
        let listener: ChangeListener = Arc::new(listener);

        let registration = self.listeners.add(listener, move || {
            let callback: WatchCallback = Arc::new(move |changed: &[PathBuf]| {
                if !changed.iter().any(|path| path == &file) {
                    return;
                }
                let listeners = listeners.clone();
                let file = file.clone();
                timer.schedule_task(&key, CHANGE_DEBOUNCE_DELAY, move || {
                    let attributes: Option<FileAttributes> = match FileAttributes::from_path(&file) {
                        Ok(attributes) => attributes,
                        Err(err) => {
                            e_wrn!("cannot read attributes of {:?}: {}", file, err);
                            None
                        }
                    };
                    for listener in listeners.listeners() {
                        run_caught("log change listener", || listener(attributes));
                    }
                });
            });
            watcher.watch_directory(&dir, callback)
        })?;

        Ok(registration)
    }

    /// Count of change listeners now.
    pub fn count_change_listeners(&self) -> usize {
        self.listeners.len()
    }
}
