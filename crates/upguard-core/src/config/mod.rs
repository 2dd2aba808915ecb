//! Configuration loading and management
//!
//! # Hierarchy
//!
//! Configuration is loaded in this order (later overrides earlier):
//! 1. Built-in defaults
//! 2. Config file: `$UPGUARD_CONFIG`, or ~/.config/upguard/config.toml if present
//! 3. Environment variables: `UPGUARD_*`
//!
//! # Example Config
//!
//! ```toml
//! state_dir = "/var/tmp/upguard"
//! runtime_dir = "/run/user/1000/upguard"
//!
//! [probe]
//! timeout_ms = 500
//! ```

mod load;

#[cfg(test)]
mod tests_loading;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{scope::ScopeIdentity, Error, Result};

pub use load::{global_config_path, load_config, load_config_from, load_toml_file};

/// Default probe timeout in milliseconds
const DEFAULT_PROBE_TIMEOUT_MS: u64 = 1000;

/// Upper bound for the probe timeout in milliseconds
const MAX_PROBE_TIMEOUT_MS: u64 = 60_000;

/// Portable bound on `sun_path` (108 on Linux, 104 on macOS, minus NUL)
const MAX_SOCKET_PATH_LEN: usize = 103;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    /// Lock files and published installation records
    pub state_dir: PathBuf,
    /// Status beacon sockets
    pub runtime_dir: PathBuf,
    pub probe: ProbeConfig,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ProbeConfig {
    pub timeout_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        let dirs = directories::ProjectDirs::from("", "", "upguard");

        let state_dir = dirs
            .as_ref()
            .map(|d| d.data_local_dir().to_path_buf())
            .unwrap_or_else(|| std::env::temp_dir().join("upguard"));

        let runtime_dir = dirs
            .as_ref()
            .and_then(|d| d.runtime_dir().map(|p| p.to_path_buf()))
            .unwrap_or_else(|| std::env::temp_dir().join("upguard-run"));

        Self {
            state_dir,
            runtime_dir,
            probe: ProbeConfig::default(),
        }
    }
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_PROBE_TIMEOUT_MS,
        }
    }
}

impl ProbeConfig {
    #[must_use]
    pub const fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.timeout_ms)
    }
}

impl Config {
    /// Config rooted at a single directory, used by tests and embedders.
    #[must_use]
    pub fn rooted_at(root: &Path) -> Self {
        Self {
            state_dir: root.join("state"),
            runtime_dir: root.join("run"),
            probe: ProbeConfig::default(),
        }
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if a directory is empty, the probe timeout is out of
    /// range, or beacon socket paths would not fit in `sun_path`.
    pub fn validate(&self) -> Result<()> {
        if self.state_dir.as_os_str().is_empty() {
            return Err(Error::invalid_config("state_dir must not be empty"));
        }
        if self.runtime_dir.as_os_str().is_empty() {
            return Err(Error::invalid_config("runtime_dir must not be empty"));
        }

        if self.probe.timeout_ms == 0 || self.probe.timeout_ms > MAX_PROBE_TIMEOUT_MS {
            return Err(Error::invalid_config(format!(
                "probe.timeout_ms must be between 1 and {MAX_PROBE_TIMEOUT_MS}, got {}",
                self.probe.timeout_ms
            )));
        }

        // Every scope key has the same length, so any identity will do
        let sample = ScopeIdentity::new("upguard.sample")?;
        let socket = ScopePaths::resolve(self, &sample).beacon_socket;
        let len = socket.as_os_str().len();
        if len > MAX_SOCKET_PATH_LEN {
            return Err(Error::invalid_config(format!(
                "runtime_dir is too long for beacon sockets ({len} > {MAX_SOCKET_PATH_LEN} bytes): {}",
                self.runtime_dir.display()
            )));
        }

        Ok(())
    }

    #[must_use]
    pub fn paths_for(&self, scope: &ScopeIdentity) -> ScopePaths {
        ScopePaths::resolve(self, scope)
    }
}

/// Filesystem resources owned by one scope identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopePaths {
    pub lock_file: PathBuf,
    pub info_file: PathBuf,
    pub beacon_socket: PathBuf,
}

impl ScopePaths {
    #[must_use]
    pub fn resolve(config: &Config, scope: &ScopeIdentity) -> Self {
        let key = scope.resource_key();
        Self {
            lock_file: config.state_dir.join(format!("{key}.lock")),
            info_file: config.state_dir.join(format!("{key}.install.json")),
            beacon_socket: config.runtime_dir.join(format!("{key}.sock")),
        }
    }
}
