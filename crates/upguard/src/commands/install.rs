//! Install command: an installer session driven from the shell
//!
//! Holds the update lock and serves the status beacon until SIGINT/SIGTERM.
//! Prints `ready` once probes can see it (and after any immediate publish),
//! which lets scripts and tests synchronize on it.

use std::time::Duration;

use anyhow::{Context, Result};
use upguard_core::{
    Coordinator, InstallStage, InstallationInfo, InstallerSession, ScopeIdentity, SessionStart,
};

use super::{describe_holder, Outcome};
use crate::shutdown::ShutdownSignals;

/// When to publish installation info
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Publish {
    Never,
    Immediately,
    After(Duration),
}

#[derive(Debug, Clone)]
pub struct InstallOptions {
    pub scope: ScopeIdentity,
    pub update_version: String,
    pub display_version: Option<String>,
    pub stage: InstallStage,
    pub silent: bool,
    pub publish: Publish,
}

impl InstallOptions {
    fn info(&self) -> InstallationInfo {
        let info = InstallationInfo::new(self.scope.clone(), self.update_version.clone())
            .with_stage(self.stage)
            .with_silent_install(self.silent);
        match &self.display_version {
            Some(display) => info.with_display_version(display.clone()),
            None => info,
        }
    }
}

pub async fn run(options: &InstallOptions, coordinator: &Coordinator) -> Result<Outcome> {
    let mut signals = ShutdownSignals::install()?;

    let session = match coordinator
        .begin_installation(&options.scope)
        .await
        .with_context(|| format!("Failed to begin installation of '{}'", options.scope))?
    {
        SessionStart::Started(session) => session,
        SessionStart::AlreadyInstalling { holder_pid } => {
            println!(
                "already installing {}: held by {}",
                options.scope,
                describe_holder(holder_pid)
            );
            return Ok(Outcome::Contended);
        }
    };

    let info = options.info();
    if options.publish == Publish::Immediately {
        publish(&session, &info).await?;
    }
    println!("ready");

    if let Publish::After(delay) = options.publish {
        tokio::select! {
            () = signals.recv() => {
                session.finish().await;
                return Ok(Outcome::Done);
            }
            () = tokio::time::sleep(delay) => publish(&session, &info).await?,
        }
    }

    signals.recv().await;
    session.finish().await;
    Ok(Outcome::Done)
}

async fn publish(session: &InstallerSession, info: &InstallationInfo) -> Result<()> {
    session
        .publish(info)
        .await
        .with_context(|| format!("Failed to publish installation info for '{}'", session.scope()))?;
    tracing::info!(scope = %session.scope(), version = %info.update_version, "Published installation info");
    Ok(())
}
