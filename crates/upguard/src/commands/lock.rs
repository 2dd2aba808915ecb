//! Lock command: try the update lock from the shell

use anyhow::{Context, Result};
use upguard_core::{Coordinator, LockAttempt, ScopeIdentity};

use super::{describe_holder, Outcome};
use crate::shutdown::ShutdownSignals;

#[derive(Debug, Clone)]
pub struct LockOptions {
    pub scope: ScopeIdentity,
    /// Keep the lock until SIGINT/SIGTERM instead of releasing on exit
    pub hold: bool,
}

/// Try the update lock once.
///
/// Contention is [`Outcome::Contended`], not an error.
pub async fn run(options: &LockOptions, coordinator: &Coordinator) -> Result<Outcome> {
    let lock = coordinator.lock_for(&options.scope);

    // Registered before "acquired" is printed
    let signals = if options.hold {
        Some(ShutdownSignals::install()?)
    } else {
        None
    };

    match lock
        .try_acquire()
        .with_context(|| format!("Failed to try update lock for '{}'", options.scope))?
    {
        LockAttempt::Acquired => {
            println!("acquired {}", options.scope);
            if let Some(mut signals) = signals {
                signals.recv().await;
            }
            lock.unlock();
            Ok(Outcome::Done)
        }
        LockAttempt::Contended { holder_pid } => {
            println!(
                "contended {}: held by {}",
                options.scope,
                describe_holder(holder_pid)
            );
            Ok(Outcome::Contended)
        }
    }
}
