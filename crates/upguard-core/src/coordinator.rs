//! Process-wide coordination context.

use std::{path::Path, sync::Arc};

use crate::{
    config::{load_config, Config, ScopePaths},
    probe::InstallStatusProber,
    scope::ScopeIdentity,
    session::{InstallerSession, SessionStart},
    update_lock::{LockRegistry, UpdateLock},
    Result,
};

/// Owns the lock registry and prober for one configuration.
///
/// Construct one explicitly at startup and pass it around; there is no
/// global default instance.
#[derive(Debug)]
pub struct Coordinator {
    config: Config,
    locks: LockRegistry,
    prober: InstallStatusProber,
}

impl Coordinator {
    /// Validate `config` and build the context.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`](crate::Error::InvalidConfig) if the
    /// configuration fails validation.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            locks: LockRegistry::new(config.clone()),
            prober: InstallStatusProber::new(config.clone()),
            config,
        })
    }

    /// Build from defaults, the config file and `UPGUARD_*` variables.
    pub fn from_env(config_path: Option<&Path>) -> Result<Self> {
        Self::new(load_config(config_path)?)
    }

    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    #[must_use]
    pub const fn locks(&self) -> &LockRegistry {
        &self.locks
    }

    #[must_use]
    pub const fn prober(&self) -> &InstallStatusProber {
        &self.prober
    }

    /// The process-wide update lock handle for `scope`.
    pub fn lock_for(&self, scope: &ScopeIdentity) -> Arc<UpdateLock> {
        self.locks.lock_for(scope)
    }

    #[must_use]
    pub fn paths_for(&self, scope: &ScopeIdentity) -> ScopePaths {
        self.config.paths_for(scope)
    }

    /// Acquire the update lock for `scope` and start answering probes.
    pub async fn begin_installation(&self, scope: &ScopeIdentity) -> Result<SessionStart> {
        InstallerSession::begin(self.lock_for(scope), &self.paths_for(scope)).await
    }
}
