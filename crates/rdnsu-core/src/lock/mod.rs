// # Instance Lock
//
// Cross-process mutual exclusion identifying the single legitimate worker.
//
// ## Storage
//
// Each lock name maps to a JSON record in the lock directory:
//
// ```json
// {
//   "version": "1.0",
//   "name": "Remote DNS Updater",
//   "pid": 4242,
//   "acquired_at": "2025-01-09T12:00:00Z"
// }
// ```
//
// ## Atomicity
//
// `lock()` and `unlock()` run their read-check-write sequence while holding an
// exclusive `flock(2)` on a sibling `.guard` file, so two processes can never
// both observe "no live owner" and both claim the record. Records are written
// to a temporary file and renamed into place, which lets `owner_pid()` read
// without taking the guard.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::traits::{Pid, ProcessControl};

/// Environment variable carrying the lock name to the worker
pub const LOCK_NAME_ENV: &str = "RDNSU_LOCK_NAME";

/// Environment variable overriding the lock directory
pub const LOCK_DIR_ENV: &str = "RDNSU_LOCK_DIR";

/// Lock name used when none is configured
pub const DEFAULT_LOCK_NAME: &str = "Remote DNS Updater";

/// Lock record format version
const LOCK_FILE_VERSION: &str = "1.0";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LockRecord {
    version: String,
    name: String,
    pid: Pid,
    acquired_at: DateTime<Utc>,
}

/// File-backed instance lock
///
/// The lock is identified by name; every process constructing an
/// `InstanceLock` with the same name and directory shares one record.
pub struct InstanceLock {
    name: String,
    record_path: PathBuf,
    guard_path: PathBuf,
    pid: Pid,
    processes: Arc<dyn ProcessControl>,
}

impl std::fmt::Debug for InstanceLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstanceLock")
            .field("name", &self.name)
            .field("record_path", &self.record_path)
            .field("pid", &self.pid)
            .finish()
    }
}

impl InstanceLock {
    /// Create a lock handle for the current process
    ///
    /// No file is touched until the lock is queried or acquired.
    pub fn new(
        name: impl Into<String>,
        dir: impl AsRef<Path>,
        processes: Arc<dyn ProcessControl>,
    ) -> Self {
        Self::with_pid(name, dir, processes, std::process::id())
    }

    /// Create a lock handle that acts on behalf of `pid`
    pub fn with_pid(
        name: impl Into<String>,
        dir: impl AsRef<Path>,
        processes: Arc<dyn ProcessControl>,
        pid: Pid,
    ) -> Self {
        let name = name.into();
        let slug = slug(&name);
        let dir = dir.as_ref();

        Self {
            record_path: dir.join(format!("{}.lock.json", slug)),
            guard_path: dir.join(format!("{}.guard", slug)),
            name,
            pid,
            processes,
        }
    }

    /// Create a lock handle from `RDNSU_LOCK_NAME` / `RDNSU_LOCK_DIR`
    pub fn from_env(processes: Arc<dyn ProcessControl>) -> Self {
        Self::new(lock_name_from_env(), lock_dir_from_env(), processes)
    }

    /// Lock name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Path of the lock record
    pub fn record_path(&self) -> &Path {
        &self.record_path
    }

    /// Process identifier this handle acquires on behalf of
    pub fn pid(&self) -> Pid {
        self.pid
    }

    /// Recorded owner, if any
    ///
    /// Reads the record without side effects and without waiting for the
    /// guard. The owner is returned as recorded; it may no longer be alive.
    pub fn owner_pid(&self) -> Result<Option<Pid>> {
        Ok(self.read_record()?.map(|record| record.pid))
    }

    /// Recorded owner, if it is still alive
    pub fn live_owner(&self) -> Result<Option<Pid>> {
        Ok(self
            .owner_pid()?
            .filter(|pid| self.processes.is_alive(*pid)))
    }

    /// Try to become the owner
    ///
    /// Returns `true` when the record now names this process, `false` when a
    /// different live process owns it. A stale record left by a dead process
    /// is reclaimed.
    pub fn lock(&self) -> Result<bool> {
        let _guard = self.acquire_guard()?;

        if let Some(record) = self.read_record()? {
            if record.pid == self.pid {
                debug!("Lock \"{}\" already held by this process", self.name);
                return Ok(true);
            }

            if self.processes.is_alive(record.pid) {
                debug!(
                    "Lock \"{}\" is held by live process {}",
                    self.name, record.pid
                );
                return Ok(false);
            }

            warn!(
                "Reclaiming stale lock \"{}\" left by process {}",
                self.name, record.pid
            );
        }

        self.write_record(&LockRecord {
            version: LOCK_FILE_VERSION.to_string(),
            name: self.name.clone(),
            pid: self.pid,
            acquired_at: Utc::now(),
        })?;

        info!("Acquired lock \"{}\" (pid {})", self.name, self.pid);
        Ok(true)
    }

    /// Release the lock if this process owns it
    ///
    /// Idempotent: a missing record or a record owned by another process is
    /// left alone.
    pub fn unlock(&self) -> Result<()> {
        let _guard = self.acquire_guard()?;

        match self.read_record()? {
            Some(record) if record.pid == self.pid => {
                match fs::remove_file(&self.record_path) {
                    Ok(()) => {}
                    Err(e) if e.kind() == ErrorKind::NotFound => {}
                    Err(e) => {
                        return Err(Error::lock_io(format!(
                            "Failed to remove lock record {}: {}",
                            self.record_path.display(),
                            e
                        )));
                    }
                }
                info!("Released lock \"{}\"", self.name);
            }
            Some(record) => {
                debug!(
                    "Lock \"{}\" is owned by {}, not releasing",
                    self.name, record.pid
                );
            }
            None => {}
        }

        Ok(())
    }

    fn read_record(&self) -> Result<Option<LockRecord>> {
        let content = match fs::read_to_string(&self.record_path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(Error::lock_io(format!(
                    "Failed to read lock record {}: {}",
                    self.record_path.display(),
                    e
                )));
            }
        };

        if content.trim().is_empty() {
            return Ok(None);
        }

        let record: LockRecord = serde_json::from_str(&content).map_err(|e| {
            Error::lock_io(format!(
                "Lock record {} is corrupted: {}",
                self.record_path.display(),
                e
            ))
        })?;

        if record.version != LOCK_FILE_VERSION {
            warn!(
                "Lock record version mismatch: expected {}, got {}",
                LOCK_FILE_VERSION, record.version
            );
        }

        Ok(Some(record))
    }

    fn write_record(&self, record: &LockRecord) -> Result<()> {
        let json = serde_json::to_string_pretty(record)?;
        let temp_path = self.record_path.with_extension(format!("tmp.{}", self.pid));

        let write = || -> std::io::Result<()> {
            let mut file = File::create(&temp_path)?;
            file.write_all(json.as_bytes())?;
            file.sync_all()?;
            fs::rename(&temp_path, &self.record_path)
        };

        write().map_err(|e| {
            let _ = fs::remove_file(&temp_path);
            Error::lock_io(format!(
                "Failed to write lock record {}: {}",
                self.record_path.display(),
                e
            ))
        })
    }

    fn acquire_guard(&self) -> Result<Guard> {
        if let Some(parent) = self.guard_path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|e| {
                Error::lock_io(format!(
                    "Failed to create lock directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&self.guard_path)
            .map_err(|e| {
                Error::lock_io(format!(
                    "Failed to open lock guard {}: {}",
                    self.guard_path.display(),
                    e
                ))
            })?;

        Guard::exclusive(file).map_err(|e| {
            Error::lock_io(format!(
                "Failed to lock guard {}: {}",
                self.guard_path.display(),
                e
            ))
        })
    }
}

/// Exclusive advisory lock held for the lifetime of the value
struct Guard {
    #[cfg_attr(not(unix), allow(dead_code))]
    file: File,
}

impl Guard {
    #[cfg(unix)]
    fn exclusive(file: File) -> std::io::Result<Self> {
        use std::os::unix::io::AsRawFd;

        loop {
            // SAFETY: the descriptor is owned by `file` and stays open
            if unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX) } == 0 {
                return Ok(Self { file });
            }
            let err = std::io::Error::last_os_error();
            if err.kind() != ErrorKind::Interrupted {
                return Err(err);
            }
        }
    }

    #[cfg(not(unix))]
    fn exclusive(file: File) -> std::io::Result<Self> {
        Ok(Self { file })
    }
}

#[cfg(unix)]
impl Drop for Guard {
    fn drop(&mut self) {
        use std::os::unix::io::AsRawFd;

        // SAFETY: see `exclusive`
        unsafe {
            libc::flock(self.file.as_raw_fd(), libc::LOCK_UN);
        }
    }
}

/// Lock name from the environment, falling back to the default
pub fn lock_name_from_env() -> String {
    std::env::var(LOCK_NAME_ENV)
        .ok()
        .filter(|name| !name.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_LOCK_NAME.to_string())
}

/// Lock directory from the environment, falling back to the temp directory
pub fn lock_dir_from_env() -> PathBuf {
    std::env::var_os(LOCK_DIR_ENV)
        .filter(|dir| !dir.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| std::env::temp_dir().join("rdnsu"))
}

/// File-name-safe form of a lock name
fn slug(name: &str) -> String {
    let slug: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '-'
            }
        })
        .collect();

    if slug.trim_matches('-').is_empty() {
        "instance".to_string()
    } else {
        slug
    }
}
