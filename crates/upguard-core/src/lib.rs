//! # Upguard Core
//!
//! Coordinates application update installs across unrelated processes.
//!
//! - [`UpdateLock`]: one advisory file lock per application identity, released
//!   by the OS when its holder exits.
//! - [`InstallStatusProber`]: read-only "is an installer running, and what is
//!   it installing?" queries that never touch the lock.
//! - [`InstallerSession`]: the installer side, holding the lock and serving
//!   the status beacon the prober talks to.
//!
//! ## Laws (Compiler Enforced)
//!
//! - No `unwrap()` - returns `Result` instead
//! - No `expect()` - returns `Result` instead
//! - No `panic!()` - returns `Result` instead
//! - No `unsafe` - safe Rust only
//!
//! ## Error Handling
//!
//! Contention and inconclusive probes are ordinary outcomes, folded into
//! [`LockAttempt`], `bool` and `Option` results. Resource faults surface as
//! [`Error`].

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

#[cfg(not(unix))]
compile_error!("upguard-core requires a Unix platform (advisory file locks and Unix sockets)");

pub mod beacon;
pub mod config;
mod coordinator;
mod error;
pub mod install_info;
pub mod probe;
pub mod scope;
mod session;
pub mod update_lock;

pub use beacon::{BeaconError, BeaconStatus, StatusBeacon};
pub use config::{load_config, Config, ProbeConfig, ScopePaths};
pub use coordinator::Coordinator;
pub use error::{Error, IoErrorKind, Result};
pub use install_info::{InstallStage, InstallationInfo};
pub use probe::{InstallStatus, InstallStatusProber, ProbeError};
pub use scope::ScopeIdentity;
pub use session::{InstallerSession, SessionStart};
pub use update_lock::{HolderStatus, LockAttempt, LockError, LockRegistry, UpdateLock};
