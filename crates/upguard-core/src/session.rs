//! Installer session: the update lock plus a status beacon, held together.

use std::sync::Arc;

use crate::{
    beacon::{BeaconStatus, StatusBeacon},
    config::ScopePaths,
    install_info::InstallationInfo,
    scope::ScopeIdentity,
    update_lock::{LockAttempt, UpdateLock},
    Result,
};

/// Outcome of trying to start an installation
#[derive(Debug)]
pub enum SessionStart {
    Started(InstallerSession),
    /// Another holder owns the update lock
    AlreadyInstalling { holder_pid: Option<u32> },
}

/// A running installation attempt.
///
/// While the session lives it holds the update lock and answers status
/// probes. Ending it (via [`finish`](Self::finish) or drop) stops the
/// beacon first, then releases the lock.
#[derive(Debug)]
pub struct InstallerSession {
    lock: Arc<UpdateLock>,
    beacon: Option<StatusBeacon>,
}

impl InstallerSession {
    pub(crate) async fn begin(lock: Arc<UpdateLock>, paths: &ScopePaths) -> Result<SessionStart> {
        if let LockAttempt::Contended { holder_pid } = lock.try_acquire()? {
            tracing::info!(scope = %lock.scope(), ?holder_pid, "Installation already in progress");
            return Ok(SessionStart::AlreadyInstalling { holder_pid });
        }

        match StatusBeacon::start(lock.scope().clone(), paths).await {
            Ok(beacon) => Ok(SessionStart::Started(Self {
                lock,
                beacon: Some(beacon),
            })),
            Err(e) => {
                lock.unlock();
                Err(e.into())
            }
        }
    }

    #[must_use]
    pub fn scope(&self) -> &ScopeIdentity {
        self.lock.scope()
    }

    pub fn beacon_status(&self) -> Option<&BeaconStatus> {
        self.beacon.as_ref().map(StatusBeacon::status)
    }

    /// Publish what this installation is processing; may be called again
    /// as the installation advances.
    pub async fn publish(&self, info: &InstallationInfo) -> Result<()> {
        match &self.beacon {
            Some(beacon) => beacon.publish(info).await.map_err(Into::into),
            None => Ok(()),
        }
    }

    pub async fn finish(mut self) {
        if let Some(beacon) = self.beacon.take() {
            beacon.shutdown().await;
        }
        self.lock.unlock();
    }
}

impl Drop for InstallerSession {
    fn drop(&mut self) {
        drop(self.beacon.take());
        self.lock.unlock();
    }
}
