//! Liveness records and per-unit locks
//!
//! A started unit leaves a small JSON record in the runtime directory naming
//! the PID and the process start time observed right after spawning. A later
//! invocation (possibly another process entirely) compares that start time
//! with the live process table, so a recycled PID is never mistaken for the
//! service.
//!
//! Files per unit, keyed by the lower-cased unit name:
//!
//! - `<key>.pid`  liveness record
//! - `<key>.lock` advisory lock serializing start/stop/status
//! - `<key>.log`  captured stdout/stderr

use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use nix::fcntl::{Flock, FlockArg};
use serde::{Deserialize, Serialize};

use crate::units::unit_key;

/// What was launched for a unit, persisted across invocations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LivenessRecord {
    pub unit: String,
    pub pid: u32,
    /// Process start time as reported by the OS
    pub start_time: String,
    pub command: String,
    pub started_at: DateTime<Utc>,
}

/// Exclusive hold on one unit's lifecycle; released on drop
pub struct UnitLock {
    flock: Flock<File>,
    path: PathBuf,
}

impl UnitLock {
    /// Delete the lock file, then release the lock
    ///
    /// Waiters holding the old file notice it was unlinked and retry.
    pub fn discard(self) -> io::Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Whether the lock file on disk is still the one this lock holds
    fn is_current(&self) -> io::Result<bool> {
        let held = self.flock.metadata()?;
        match std::fs::metadata(&self.path) {
            Ok(on_disk) => Ok(held.dev() == on_disk.dev() && held.ino() == on_disk.ino()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }
}

/// Runtime directory holding liveness records, locks and output logs
#[derive(Debug, Clone)]
pub struct LivenessStore {
    dir: PathBuf,
}

impl LivenessStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn record_path(&self, unit: &str) -> PathBuf {
        self.dir.join(format!("{}.pid", unit_key(unit)))
    }

    pub fn log_path(&self, unit: &str) -> PathBuf {
        self.dir.join(format!("{}.log", unit_key(unit)))
    }

    fn lock_path(&self, unit: &str) -> PathBuf {
        self.dir.join(format!("{}.lock", unit_key(unit)))
    }

    /// Block until this unit's lock is held
    ///
    /// The lock is an `flock(2)` on a per-unit file, so it serializes
    /// concurrent daemon tasks and separate CLI processes alike.
    pub async fn lock(&self, unit: &str) -> io::Result<UnitLock> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.lock_path(unit);
        tokio::task::spawn_blocking(move || -> io::Result<UnitLock> {
            loop {
                let file = OpenOptions::new()
                    .create(true)
                    .truncate(false)
                    .write(true)
                    .open(&path)?;
                let flock = Flock::lock(file, FlockArg::LockExclusive)
                    .map_err(|(_, errno)| io::Error::from(errno))?;
                let lock = UnitLock {
                    flock,
                    path: path.clone(),
                };
                if lock.is_current()? {
                    return Ok(lock);
                }
            }
        })
        .await
        .map_err(io::Error::other)?
    }

    /// Read the record for a unit
    ///
    /// A record that cannot be parsed is discarded and reported as absent.
    pub async fn read(&self, unit: &str) -> io::Result<Option<LivenessRecord>> {
        let path = self.record_path(unit);
        let text = match tokio::fs::read_to_string(&path).await {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };

        match serde_json::from_str(&text) {
            Ok(record) => Ok(Some(record)),
            Err(e) => {
                log::warn!("Discarding corrupt record {}: {}", path.display(), e);
                self.remove(unit).await?;
                Ok(None)
            }
        }
    }

    /// Persist a record, replacing any previous one atomically
    pub async fn write(&self, record: &LivenessRecord) -> io::Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.record_path(&record.unit);
        let tmp = path.with_extension(format!("pid.tmp{}", std::process::id()));
        let json = serde_json::to_vec_pretty(record).map_err(io::Error::other)?;
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &path).await
    }

    /// Delete a unit's record; absent records are fine
    pub async fn remove(&self, unit: &str) -> io::Result<()> {
        match tokio::fs::remove_file(self.record_path(unit)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}
