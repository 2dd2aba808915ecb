//! Force-unlock command

use anyhow::{Context, Result};
use upguard_core::{Coordinator, ScopeIdentity};

use super::Outcome;

#[derive(Debug, Clone)]
pub struct ForceUnlockOptions {
    pub scope: ScopeIdentity,
    /// Only clear a dead holder's leftover record, never a held lock
    pub if_stale: bool,
}

pub fn run(options: &ForceUnlockOptions, coordinator: &Coordinator) -> Result<Outcome> {
    let lock = coordinator.lock_for(&options.scope);

    let changed = if options.if_stale {
        lock.force_unlock_if_stale()
    } else {
        lock.try_force_unlock()
    }
    .with_context(|| format!("Failed to force unlock '{}'", options.scope))?;

    if changed && options.if_stale {
        println!("cleared stale holder record for {}", options.scope);
    } else if changed {
        println!("unlocked {}", options.scope);
    } else if options.if_stale {
        println!("{}: lock is not stale, left alone", options.scope);
    } else {
        println!("{}: no lock file", options.scope);
    }
    Ok(Outcome::Done)
}
