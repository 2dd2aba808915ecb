//! Installation info: what an active installer says it is installing.
//!
//! The installer writes a [`PublishedInstallation`] record next to the lock
//! file. Records are never cleaned up; a reader only trusts one whose
//! `session` matches the beacon that is answering right now.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

use crate::{beacon::BeaconError, scope::ScopeIdentity};

/// Installation stage reported by an installer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum InstallStage {
    Preparing,
    Extracting,
    ReadyToInstall,
    Installing,
    Relaunching,
}

/// Descriptor of the update item an installer is processing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallationInfo {
    pub host_identity: ScopeIdentity,
    /// Machine-readable version of the update payload
    pub update_version: String,
    /// Human-readable version, if different
    pub display_version: Option<String>,
    pub stage: InstallStage,
    /// Whether the update can be applied without user interaction
    pub can_silently_install: bool,
    pub published_at: DateTime<Utc>,
}

impl InstallationInfo {
    #[must_use]
    pub fn new(host_identity: ScopeIdentity, update_version: impl Into<String>) -> Self {
        Self {
            host_identity,
            update_version: update_version.into(),
            display_version: None,
            stage: InstallStage::Preparing,
            can_silently_install: false,
            published_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn with_display_version(mut self, display_version: impl Into<String>) -> Self {
        self.display_version = Some(display_version.into());
        self
    }

    #[must_use]
    pub const fn with_stage(mut self, stage: InstallStage) -> Self {
        self.stage = stage;
        self
    }

    #[must_use]
    pub const fn with_silent_install(mut self, can_silently_install: bool) -> Self {
        self.can_silently_install = can_silently_install;
        self
    }
}

/// Durable record written by the installer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishedInstallation {
    /// Beacon session that published the record
    pub session: Uuid,
    pub pid: u32,
    pub info: InstallationInfo,
}

impl PublishedInstallation {
    /// Write the record atomically (temp file + rename).
    pub(crate) async fn write(&self, path: &Path) -> Result<(), BeaconError> {
        let publish_err = |e: std::io::Error| BeaconError::PublishFailed {
            path: path.to_path_buf(),
            source: e.into(),
        };

        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir).await.map_err(publish_err)?;
        }

        let body = serde_json::to_vec_pretty(self).map_err(|e| BeaconError::Encode(e.to_string()))?;

        let tmp = path.with_extension(format!("json.{}.tmp", self.pid));
        tokio::fs::write(&tmp, body).await.map_err(publish_err)?;
        tokio::fs::rename(&tmp, path).await.map_err(publish_err)
    }

    /// Read the last published record, if any.
    ///
    /// A missing or unreadable record is simply absent: callers treat the
    /// result as advisory.
    pub(crate) async fn read(path: &Path) -> Option<Self> {
        let body = match tokio::fs::read(path).await {
            Ok(body) => body,
            Err(e) => {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::debug!(path = %path.display(), error = %e, "Installation record unreadable");
                }
                return None;
            }
        };

        serde_json::from_slice(&body)
            .map_err(|e| {
                tracing::debug!(path = %path.display(), error = %e, "Installation record malformed");
            })
            .ok()
    }
}
