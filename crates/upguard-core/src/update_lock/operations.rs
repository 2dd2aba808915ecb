//! Lock operations for the update lock.
//!
//! File operations, lock acquisition, release and forced recovery.

use std::{
    fs::{self, File, OpenOptions},
    io::{self, Seek, SeekFrom, Write},
    os::unix::fs::{MetadataExt, OpenOptionsExt},
    path::{Path, PathBuf},
    sync::{Mutex, MutexGuard, PoisonError},
};

use fs2::FileExt;

use super::{
    queries::{classify_holder, is_process_alive, parse_pid},
    types::{HolderStatus, LockAttempt, LockError, UpdateLock},
};
use crate::scope::ScopeIdentity;

/// Attempts before giving up when the lock file keeps being replaced
const MAX_RELINK_ATTEMPTS: u32 = 3;

/// Create the lock file's directory if it doesn't exist.
pub(super) fn create_lock_directory(lock_path: &Path) -> Result<(), LockError> {
    match lock_path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => {
            fs::create_dir_all(dir).map_err(|e| LockError::DirectoryCreationFailed {
                path: dir.to_path_buf(),
                source: e.into(),
            })
        }
        _ => Ok(()),
    }
}

/// Open (or create) the lock file without truncating the holder's stamp.
fn open_lock_file(lock_path: &Path) -> Result<File, LockError> {
    let mut options = OpenOptions::new();
    options.read(true).write(true).create(true).truncate(false);

    options
        .mode(0o644) // rw-r--r--
        .open(lock_path)
        .map_err(|e| LockError::LockFileOpenFailed {
            path: lock_path.to_path_buf(),
            source: e.into(),
        })
}

fn is_contention(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::WouldBlock
        || err.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}

/// Non-blocking exclusive lock; `Ok(false)` means someone else holds it.
fn try_lock_file(file: &File, lock_path: &Path) -> Result<bool, LockError> {
    match file.try_lock_exclusive() {
        Ok(()) => Ok(true),
        Err(err) if is_contention(&err) => Ok(false),
        Err(err) => Err(LockError::LockOperationFailed {
            path: lock_path.to_path_buf(),
            source: err.into(),
        }),
    }
}

/// Whether `lock_path` still names the inode we locked.
///
/// A forced unlock elsewhere may unlink the file between our open and lock.
fn still_linked(file: &File, lock_path: &Path) -> Result<bool, LockError> {
    let locked = file
        .metadata()
        .map_err(|e| LockError::LockOperationFailed {
            path: lock_path.to_path_buf(),
            source: e.into(),
        })?;

    match fs::metadata(lock_path) {
        Ok(current) => Ok(current.dev() == locked.dev() && current.ino() == locked.ino()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(LockError::LockOperationFailed {
            path: lock_path.to_path_buf(),
            source: e.into(),
        }),
    }
}

/// Replace the lock file content with the current PID.
fn write_pid(file: &mut File, lock_path: &Path) -> Result<(), LockError> {
    let to_err = |e: io::Error| LockError::PidWriteFailed {
        path: lock_path.to_path_buf(),
        source: e.into(),
    };

    file.set_len(0).map_err(to_err)?;
    file.seek(SeekFrom::Start(0)).map_err(to_err)?;
    file.write_all(std::process::id().to_string().as_bytes())
        .map_err(to_err)
}

/// Read the recorded holder PID; a missing file means no holder.
pub(super) fn read_pid(lock_path: &Path) -> Result<Option<u32>, LockError> {
    match fs::read_to_string(lock_path) {
        Ok(content) => parse_pid(&content),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(LockError::PidReadFailed {
            path: lock_path.to_path_buf(),
            source: e.into(),
        }),
    }
}

/// Clear the PID stamp and drop the advisory lock (best-effort, logged).
fn release_file(file: File, lock_path: &Path) {
    if let Err(e) = file.set_len(0) {
        tracing::warn!(path = %lock_path.display(), error = %e, "Failed to clear holder PID");
    }
    if let Err(e) = FileExt::unlock(&file) {
        // Closing the descriptor below releases the lock regardless
        tracing::warn!(path = %lock_path.display(), error = %e, "Explicit unlock failed");
    }
    drop(file);
    tracing::debug!("Released update lock: {}", lock_path.display());
}

impl UpdateLock {
    pub(crate) fn new(scope: ScopeIdentity, lock_path: PathBuf) -> Self {
        Self {
            scope,
            lock_path,
            held: Mutex::new(None),
        }
    }

    fn held(&self) -> MutexGuard<'_, Option<File>> {
        self.held.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Attempt to take the lock without blocking, reporting resource faults.
    ///
    /// # Errors
    ///
    /// Returns a [`LockError`] when the lock resource itself is broken
    /// (directory or file cannot be created, locking syscall fails). Plain
    /// contention is `Ok(LockAttempt::Contended { .. })`.
    pub fn try_acquire(&self) -> Result<LockAttempt, LockError> {
        let mut held = self.held();
        if held.is_some() {
            tracing::debug!(scope = %self.scope, "Update lock already held by this handle");
            return Ok(LockAttempt::Contended {
                holder_pid: Some(std::process::id()),
            });
        }

        create_lock_directory(&self.lock_path)?;

        for attempt in 1..=MAX_RELINK_ATTEMPTS {
            let mut file = open_lock_file(&self.lock_path)?;

            if !try_lock_file(&file, &self.lock_path)? {
                let holder_pid = read_pid(&self.lock_path).unwrap_or_else(|e| {
                    tracing::debug!(error = %e, "Could not read holder PID");
                    None
                });
                tracing::debug!(scope = %self.scope, ?holder_pid, "Update lock contended");
                return Ok(LockAttempt::Contended { holder_pid });
            }

            if !still_linked(&file, &self.lock_path)? {
                tracing::debug!(
                    scope = %self.scope,
                    attempt,
                    "Lock file replaced during acquisition, retrying"
                );
                continue;
            }

            write_pid(&mut file, &self.lock_path)?;
            tracing::info!(
                scope = %self.scope,
                path = %self.lock_path.display(),
                "Acquired update lock"
            );
            *held = Some(file);
            return Ok(LockAttempt::Acquired);
        }

        tracing::warn!(
            scope = %self.scope,
            "Lock file kept being replaced; treating as contended"
        );
        Ok(LockAttempt::Contended { holder_pid: None })
    }

    /// Non-blocking acquisition; `true` iff this handle now holds the lock.
    ///
    /// Resource faults are logged and reported as `false`; use
    /// [`try_acquire`](Self::try_acquire) to tell them apart from contention.
    pub fn try_lock(&self) -> bool {
        match self.try_acquire() {
            Ok(attempt) => attempt.is_acquired(),
            Err(e) => {
                tracing::warn!(scope = %self.scope, error = %e, "Update lock unavailable");
                false
            }
        }
    }

    #[must_use]
    pub fn is_held(&self) -> bool {
        self.held().is_some()
    }

    /// Release a hold taken by this handle. No-op when not held.
    pub fn unlock(&self) {
        match self.held().take() {
            Some(file) => {
                release_file(file, &self.lock_path);
                tracing::info!(scope = %self.scope, "Released update lock");
            }
            None => {
                tracing::debug!(scope = %self.scope, "Unlock without hold ignored");
            }
        }
    }

    /// Unconditionally clear the lock resource.
    ///
    /// **This breaks mutual exclusion** if the recorded holder is still
    /// running: it unlinks the lock file, so the next `try_lock` creates a
    /// fresh one and succeeds while the old holder keeps its descriptor.
    /// Only call it after independently confirming the holder is dead. With
    /// flock the OS already reclaims a dead holder's lock, so
    /// [`force_unlock_if_stale`](Self::force_unlock_if_stale) is the safe
    /// recovery path and never unlinks.
    pub fn force_unlock(&self) {
        if let Err(e) = self.try_force_unlock() {
            tracing::warn!(scope = %self.scope, error = %e, "Forced unlock failed");
        }
    }

    /// Same as [`force_unlock`](Self::force_unlock), reporting whether a
    /// lock file was removed.
    pub fn try_force_unlock(&self) -> Result<bool, LockError> {
        let mut held = self.held();

        tracing::warn!(
            scope = %self.scope,
            path = %self.lock_path.display(),
            recorded_holder = ?read_pid(&self.lock_path).ok().flatten(),
            "Forcing update lock open"
        );

        if let Some(file) = held.take() {
            release_file(file, &self.lock_path);
        }

        match fs::remove_file(&self.lock_path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(LockError::ForceUnlockFailed {
                path: self.lock_path.clone(),
                source: e.into(),
            }),
        }
    }

    /// PID stamped by the current or last holder, if any.
    pub fn recorded_holder(&self) -> Result<Option<u32>, LockError> {
        read_pid(&self.lock_path)
    }

    pub fn holder_status(&self) -> Result<HolderStatus, LockError> {
        self.recorded_holder()
            .map(|pid| classify_holder(pid, is_process_alive))
    }

    /// Recover from a holder that died without unlocking.
    ///
    /// The OS drops a flock when its holder exits, so a contended lock
    /// always has a live holder, even when the PID stamp names a dead
    /// process (a new holder that has not stamped yet, or a holder in
    /// another PID namespace). Such a lock is never touched.
    ///
    /// Returns `true` if the lock was free and still carried a dead
    /// holder's stamp, which is now cleared.
    pub fn force_unlock_if_stale(&self) -> Result<bool, LockError> {
        let before = self.holder_status()?;

        match self.try_acquire()? {
            LockAttempt::Acquired => {
                self.unlock();
                if let HolderStatus::Dead { pid } = before {
                    tracing::warn!(scope = %self.scope, pid, "Cleared stamp of dead update lock holder");
                    return Ok(true);
                }
                Ok(false)
            }
            LockAttempt::Contended { holder_pid } => {
                tracing::debug!(
                    scope = %self.scope,
                    ?holder_pid,
                    "Update lock is held by a running process, leaving it alone"
                );
                Ok(false)
            }
        }
    }
}

impl Drop for UpdateLock {
    fn drop(&mut self) {
        let held = self.held.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(file) = held.take() {
            release_file(file, &self.lock_path);
        }
    }
}
