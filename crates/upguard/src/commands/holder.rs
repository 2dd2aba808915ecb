//! Holder command: who is recorded in the lock file, and are they alive

use anyhow::{Context, Result};
use upguard_core::{Coordinator, HolderStatus, ScopeIdentity};

use super::Outcome;

pub fn run(scope: &ScopeIdentity, coordinator: &Coordinator) -> Result<Outcome> {
    let status = coordinator
        .lock_for(scope)
        .holder_status()
        .with_context(|| format!("Failed to read lock holder for '{scope}'"))?;

    println!("{}", describe(scope, status));
    Ok(Outcome::Done)
}

fn describe(scope: &ScopeIdentity, status: HolderStatus) -> String {
    match status {
        HolderStatus::Vacant => format!("{scope}: no holder recorded"),
        HolderStatus::Alive { pid } => format!("{scope}: pid {pid} (alive)"),
        HolderStatus::Dead { pid } => format!("{scope}: pid {pid} (dead)"),
    }
}
