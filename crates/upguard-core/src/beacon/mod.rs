//! Installer status beacon.
//!
//! An installer serves a Unix socket per scope identity for as long as it
//! runs. The socket *is* the liveness signal: a crashed installer leaves at
//! most a dead socket file behind, and connecting to that fails at once.
//!
//! # Protocol
//!
//! Line-delimited JSON over the socket:
//!
//! ```text
//! -> {"type":"ping"}
//! <- {"type":"pong","scope":"com.example.App","pid":4242,"session":"…","started_at":"…"}
//! ```

pub mod protocol;
mod server;

use std::path::PathBuf;

use thiserror::Error;

use crate::{error::IoErrorKind, scope::ScopeIdentity};

pub use protocol::{BeaconRequest, BeaconResponse, BeaconStatus};
pub use server::StatusBeacon;

/// Faults of the installer side: serving the beacon and publishing info.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BeaconError {
    /// Socket directory or socket could not be set up
    #[error("failed to bind status beacon at {path}: {source}")]
    BindFailed {
        path: PathBuf,
        #[source]
        source: IoErrorKind,
    },

    /// Beacon thread or its runtime could not be started
    #[error("failed to start status beacon worker: {source}")]
    WorkerFailed {
        #[source]
        source: IoErrorKind,
    },

    /// Another live installer already answers on this socket
    #[error("another installer is already serving {path}")]
    AlreadyRunning { path: PathBuf },

    /// Installation record could not be written
    #[error("failed to publish installation info to {path}: {source}")]
    PublishFailed {
        path: PathBuf,
        #[source]
        source: IoErrorKind,
    },

    /// Installation record could not be serialized
    #[error("failed to encode installation info: {0}")]
    Encode(String),

    /// Info for a different application was handed to this beacon
    #[error("installation info is for '{found}', beacon serves '{expected}'")]
    ScopeMismatch {
        expected: ScopeIdentity,
        found: ScopeIdentity,
    },
}
