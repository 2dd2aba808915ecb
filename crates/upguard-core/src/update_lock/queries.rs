//! Query operations for the update lock.
//!
//! Pure functions for parsing PID stamps, checking process liveness, and
//! classifying the recorded holder.

use super::types::{HolderStatus, LockError};

/// Parse PID from lock file content; an empty stamp means no holder.
pub(super) fn parse_pid(content: &str) -> Result<Option<u32>, LockError> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }

    trimmed
        .parse::<u32>()
        .ok()
        .filter(|pid| *pid != 0)
        .map(Some)
        .ok_or_else(|| LockError::InvalidPid {
            raw: content.to_string(),
        })
}

/// Check if a process is still alive.
#[cfg(target_os = "linux")]
pub(super) fn is_process_alive(pid: u32) -> bool {
    if pid == std::process::id() {
        return true;
    }
    std::path::Path::new(&format!("/proc/{pid}")).exists()
}

#[cfg(not(target_os = "linux"))]
pub(super) fn is_process_alive(pid: u32) -> bool {
    // Without /proc, conservatively assume alive so nothing is force-unlocked
    pid != 0
}

/// Combine a recorded PID with a liveness check.
pub(super) fn classify_holder(pid: Option<u32>, alive: impl Fn(u32) -> bool) -> HolderStatus {
    match pid {
        None => HolderStatus::Vacant,
        Some(pid) if alive(pid) => HolderStatus::Alive { pid },
        Some(pid) => HolderStatus::Dead { pid },
    }
}
