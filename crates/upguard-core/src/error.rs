//! Error types for upguard-core.
//!
//! Contention on the update lock and inconclusive probes are *not* errors:
//! they fold into [`LockAttempt`](crate::LockAttempt) and the prober's
//! boolean/optional results. Everything here is an environment fault that
//! operational tooling should be able to tell apart from "someone else is
//! installing".

use std::{io, path::PathBuf};

use thiserror::Error;

use crate::{beacon::BeaconError, update_lock::LockError};

/// Top-level error type for the crate.
#[derive(Debug, Error)]
pub enum Error {
    /// Scope identity failed validation
    #[error("invalid scope identity '{raw}': {reason}")]
    InvalidScope { raw: String, reason: String },

    /// Configuration could not be loaded or is invalid
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Configuration file could not be read
    #[error("failed to read config file {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: IoErrorKind,
    },

    /// Update lock resource fault
    #[error(transparent)]
    Lock(#[from] LockError),

    /// Status beacon or installation info publication fault
    #[error(transparent)]
    Beacon(#[from] BeaconError),
}

impl Error {
    /// Create an invalid scope error.
    pub fn invalid_scope(raw: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidScope {
            raw: raw.into(),
            reason: reason.into(),
        }
    }

    /// Create an invalid configuration error.
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }
}

/// Result type alias for upguard-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// IO error kinds (cloneable, no source chain issues)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IoErrorKind {
    NotFound,
    PermissionDenied,
    AlreadyExists,
    WouldBlock,
    InvalidInput,
    TimedOut,
    ConnectionRefused,
    UnexpectedEof,
    Other(String),
}

impl std::fmt::Display for IoErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound => write!(f, "not found"),
            Self::PermissionDenied => write!(f, "permission denied"),
            Self::AlreadyExists => write!(f, "already exists"),
            Self::WouldBlock => write!(f, "would block"),
            Self::InvalidInput => write!(f, "invalid input"),
            Self::TimedOut => write!(f, "timed out"),
            Self::ConnectionRefused => write!(f, "connection refused"),
            Self::UnexpectedEof => write!(f, "unexpected EOF"),
            Self::Other(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for IoErrorKind {}

impl From<io::Error> for IoErrorKind {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => Self::NotFound,
            io::ErrorKind::PermissionDenied => Self::PermissionDenied,
            io::ErrorKind::AlreadyExists => Self::AlreadyExists,
            io::ErrorKind::WouldBlock => Self::WouldBlock,
            io::ErrorKind::InvalidInput => Self::InvalidInput,
            io::ErrorKind::TimedOut => Self::TimedOut,
            io::ErrorKind::ConnectionRefused => Self::ConnectionRefused,
            io::ErrorKind::UnexpectedEof => Self::UnexpectedEof,
            _ => Self::Other(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_kind_from_io_error() {
        let err = io::Error::from(io::ErrorKind::PermissionDenied);
        assert_eq!(IoErrorKind::from(err), IoErrorKind::PermissionDenied);

        let err = io::Error::new(io::ErrorKind::Unsupported, "nope");
        assert!(matches!(IoErrorKind::from(err), IoErrorKind::Other(msg) if msg == "nope"));
    }

    #[test]
    fn test_invalid_scope_display() {
        let err = Error::invalid_scope("", "must not be empty");
        assert_eq!(
            err.to_string(),
            "invalid scope identity '': must not be empty"
        );
    }
}
