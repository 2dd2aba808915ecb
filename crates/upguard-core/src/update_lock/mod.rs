//! Cross-process update lock, one per scope identity.
//!
//! # Guarantees
//!
//! - **Mutual Exclusion**: At most ONE holder per scope identity, across processes
//! - **Crash Release**: The OS drops the advisory lock when the holder exits
//! - **Never Blocks**: `try_lock` returns immediately; contention is not an error
//! - **Defensive Unlock**: `unlock` without a hold is a no-op
//! - **Escape Hatch**: `force_unlock` for primitives without crash release
//!
//! # Example
//!
//! ```no_run
//! use upguard_core::{Config, Coordinator, LockAttempt, ScopeIdentity};
//!
//! let coordinator = Coordinator::new(Config::default())?;
//! let scope = ScopeIdentity::new("com.example.App")?;
//! let lock = coordinator.lock_for(&scope);
//!
//! match lock.try_acquire()? {
//!     LockAttempt::Acquired => {
//!         // Replace application files
//!         lock.unlock();
//!     }
//!     LockAttempt::Contended { holder_pid } => {
//!         println!("Install already running (PID: {holder_pid:?})");
//!     }
//! }
//! # Ok::<(), upguard_core::Error>(())
//! ```

mod operations;
mod queries;
mod registry;
pub mod types;

pub use registry::LockRegistry;
pub use types::{HolderStatus, LockAttempt, LockError, UpdateLock};
