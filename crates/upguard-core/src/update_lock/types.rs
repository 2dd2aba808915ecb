//! Type definitions for the update lock.
//!
//! Provides error types, the lock handle, and the acquisition result enum.

use std::{fs::File, path::PathBuf, sync::Mutex};

use thiserror::Error;

use crate::{error::IoErrorKind, scope::ScopeIdentity};

/// Resource faults of the update lock.
///
/// Contention is never represented here; see [`LockAttempt::Contended`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LockError {
    /// Lock directory could not be created
    #[error("failed to create lock directory at {path}: {source}")]
    DirectoryCreationFailed {
        path: PathBuf,
        #[source]
        source: IoErrorKind,
    },

    /// Lock file could not be opened or created
    #[error("failed to open lock file at {path}: {source}")]
    LockFileOpenFailed {
        path: PathBuf,
        #[source]
        source: IoErrorKind,
    },

    /// The locking syscall failed for a reason other than contention
    #[error("file locking failed on {path}: {source}")]
    LockOperationFailed {
        path: PathBuf,
        #[source]
        source: IoErrorKind,
    },

    /// Holder PID could not be written after acquisition
    #[error("failed to record holder PID in {path}: {source}")]
    PidWriteFailed {
        path: PathBuf,
        #[source]
        source: IoErrorKind,
    },

    /// Holder PID could not be read
    #[error("failed to read holder PID from {path}: {source}")]
    PidReadFailed {
        path: PathBuf,
        #[source]
        source: IoErrorKind,
    },

    /// Lock file contains invalid PID data
    #[error("invalid PID in lock file: '{raw}'")]
    InvalidPid { raw: String },

    /// Lock file could not be removed by a forced unlock
    #[error("failed to remove lock file at {path}: {source}")]
    ForceUnlockFailed {
        path: PathBuf,
        #[source]
        source: IoErrorKind,
    },
}

/// Result of a non-blocking acquisition attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockAttempt {
    /// This handle now holds the lock
    Acquired,
    /// Someone else (or this very handle) already holds it
    Contended { holder_pid: Option<u32> },
}

impl LockAttempt {
    #[must_use]
    pub const fn is_acquired(&self) -> bool {
        matches!(self, Self::Acquired)
    }
}

/// What the lock file says about its last holder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HolderStatus {
    /// No holder recorded
    Vacant,
    /// Recorded holder process is running
    Alive { pid: u32 },
    /// Recorded holder process is gone; the stamp alone does not prove the
    /// lock is free
    Dead { pid: u32 },
}

impl HolderStatus {
    #[must_use]
    pub const fn is_stale(&self) -> bool {
        matches!(self, Self::Dead { .. })
    }
}

/// Update lock handle for one scope identity.
///
/// Obtain handles through [`LockRegistry`](super::LockRegistry) so every
/// caller in a process shares the same one. State transitions on a handle
/// are serialized by an internal mutex; the cross-process guarantee comes
/// from the advisory lock on `lock_path`.
#[derive(Debug)]
pub struct UpdateLock {
    pub(super) scope: ScopeIdentity,
    pub(super) lock_path: PathBuf,
    /// Locked descriptor while held; closing it releases the lock
    pub(super) held: Mutex<Option<File>>,
}

impl UpdateLock {
    #[must_use]
    pub fn scope(&self) -> &ScopeIdentity {
        &self.scope
    }

    #[must_use]
    pub fn lock_path(&self) -> &std::path::Path {
        &self.lock_path
    }
}
