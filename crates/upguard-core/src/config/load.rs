//! Configuration loading from files and environment (Immutable functional pattern)
//!
//! All operations return new instances rather than mutating in place.

use std::path::{Path, PathBuf};

use super::Config;
use crate::{Error, Result};

/// Explicit config file path
const ENV_CONFIG: &str = "UPGUARD_CONFIG";
const ENV_STATE_DIR: &str = "UPGUARD_STATE_DIR";
const ENV_RUNTIME_DIR: &str = "UPGUARD_RUNTIME_DIR";
const ENV_PROBE_TIMEOUT_MS: &str = "UPGUARD_PROBE_TIMEOUT_MS";

// ═══════════════════════════════════════════════════════════════════════════
// PUBLIC API
// ═══════════════════════════════════════════════════════════════════════════

/// Load configuration from all sources using the process environment
///
/// # Errors
///
/// Returns error if:
/// - An explicitly named config file is missing or unreadable
/// - Config file is malformed TOML
/// - Environment overrides or final values fail validation
pub fn load_config(explicit_path: Option<&Path>) -> Result<Config> {
    load_config_from(explicit_path, |key| std::env::var(key).ok())
}

/// Load configuration with an injectable environment lookup
///
/// An explicit path wins over `UPGUARD_CONFIG`, which wins over the global
/// config file. Only the global file may be absent.
pub fn load_config_from<F>(explicit_path: Option<&Path>, env: F) -> Result<Config>
where
    F: Fn(&str) -> Option<String>,
{
    let named = explicit_path
        .map(Path::to_path_buf)
        .or_else(|| env(ENV_CONFIG).map(PathBuf::from));

    let config = match named {
        Some(path) => load_toml_file(&path)?,
        None => match global_config_path() {
            Some(global) if global.is_file() => load_toml_file(&global)?,
            _ => Config::default(),
        },
    };

    let config = config.apply_env(env)?;
    config.validate()?;

    tracing::debug!(
        state_dir = %config.state_dir.display(),
        runtime_dir = %config.runtime_dir.display(),
        probe_timeout_ms = config.probe.timeout_ms,
        "Loaded configuration"
    );

    Ok(config)
}

// ═══════════════════════════════════════════════════════════════════════════
// PATH HELPERS
// ═══════════════════════════════════════════════════════════════════════════

/// Get path to global config file
pub fn global_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "upguard")
        .map(|proj_dirs| proj_dirs.config_dir().join("config.toml"))
}

/// Load a TOML file into a Config; missing keys take their defaults
///
/// # Errors
///
/// Returns error if the file cannot be read, is a directory, or is malformed.
pub fn load_toml_file(path: &Path) -> Result<Config> {
    if path.is_dir() {
        return Err(Error::invalid_config(format!(
            "Config path is a directory, not a file: {}",
            path.display()
        )));
    }

    let content = std::fs::read_to_string(path).map_err(|e| Error::ConfigRead {
        path: path.to_path_buf(),
        source: e.into(),
    })?;

    toml::from_str(&content).map_err(|e| {
        Error::invalid_config(format!(
            "Failed to parse config file {}: {e}",
            path.display()
        ))
    })
}

// ═══════════════════════════════════════════════════════════════════════════
// ENVIRONMENT VARIABLE OVERRIDES (Immutable pattern)
// ═══════════════════════════════════════════════════════════════════════════

impl Config {
    /// Apply `UPGUARD_*` overrides from the given lookup
    ///
    /// # Errors
    ///
    /// Returns error if an override value cannot be parsed
    pub fn apply_env<F>(mut self, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = env(ENV_STATE_DIR).filter(|v| !v.is_empty()) {
            self.state_dir = PathBuf::from(dir);
        }

        if let Some(dir) = env(ENV_RUNTIME_DIR).filter(|v| !v.is_empty()) {
            self.runtime_dir = PathBuf::from(dir);
        }

        if let Some(raw) = env(ENV_PROBE_TIMEOUT_MS) {
            self.probe.timeout_ms = raw.trim().parse().map_err(|e| {
                Error::invalid_config(format!(
                    "{ENV_PROBE_TIMEOUT_MS} must be a number of milliseconds, got '{raw}': {e}"
                ))
            })?;
        }

        Ok(self)
    }
}
