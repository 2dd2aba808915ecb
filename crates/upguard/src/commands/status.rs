//! Status command: read-only installer probe

use anyhow::Result;
use serde_json::json;
use upguard_core::{Coordinator, InstallStatus, InstallationInfo, ScopeIdentity};

use super::Outcome;

#[derive(Debug, Clone)]
pub struct StatusOptions {
    pub scope: ScopeIdentity,
    pub json: bool,
}

/// Probe the installer for `scope` and print what it reports.
///
/// Never touches the update lock.
pub async fn run(options: &StatusOptions, coordinator: &Coordinator) -> Result<Outcome> {
    let status = coordinator.prober().install_status(&options.scope).await;

    if options.json {
        println!("{}", render_json(&options.scope, &status)?);
    } else {
        println!("{}", render_text(&options.scope, &status));
    }
    Ok(Outcome::Done)
}

fn render_json(scope: &ScopeIdentity, status: &InstallStatus) -> Result<String> {
    let value = json!({
        "scope": scope,
        "installer_running": status.is_installer_running(),
        "installation_info": status.installation_info(),
    });
    Ok(serde_json::to_string_pretty(&value)?)
}

fn render_text(scope: &ScopeIdentity, status: &InstallStatus) -> String {
    match status {
        InstallStatus::Idle => format!("{scope}: idle"),
        InstallStatus::InstallerRunning(None) => {
            format!("{scope}: installer running (no installation info yet)")
        }
        InstallStatus::InstallerRunning(Some(info)) => {
            format!("{scope}: installer running\n{}", describe_info(info))
        }
    }
}

fn describe_info(info: &InstallationInfo) -> String {
    let version = info.display_version.as_deref().map_or_else(
        || info.update_version.clone(),
        |display| format!("{display} ({})", info.update_version),
    );
    format!(
        "  version: {version}\n  stage: {}\n  silent: {}\n  published: {}",
        info.stage,
        info.can_silently_install,
        info.published_at.to_rfc3339()
    )
}
