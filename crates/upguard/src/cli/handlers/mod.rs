//! Turn parsed arguments into command options and run them

use std::{path::PathBuf, time::Duration};

use anyhow::{Context, Result};
use clap::ArgMatches;
use upguard_core::{InstallStage, ScopeIdentity};

use crate::commands::{
    self,
    force_unlock::ForceUnlockOptions,
    install::{InstallOptions, Publish},
    lock::LockOptions,
    status::StatusOptions,
    Outcome,
};

pub async fn dispatch(matches: &ArgMatches) -> Result<Outcome> {
    let config_path = matches.get_one::<PathBuf>("config").map(PathBuf::as_path);
    let coordinator = commands::coordinator(config_path)?;

    match matches.subcommand() {
        Some(("status", sub_m)) => {
            let options = StatusOptions {
                scope: scope(sub_m)?,
                json: sub_m.get_flag("json"),
            };
            commands::status::run(&options, &coordinator).await
        }
        Some(("lock", sub_m)) => {
            let options = LockOptions {
                scope: scope(sub_m)?,
                hold: sub_m.get_flag("hold"),
            };
            commands::lock::run(&options, &coordinator).await
        }
        Some(("install", sub_m)) => {
            let options = install_options(sub_m)?;
            commands::install::run(&options, &coordinator).await
        }
        Some(("holder", sub_m)) => commands::holder::run(&scope(sub_m)?, &coordinator),
        Some(("force-unlock", sub_m)) => {
            let options = ForceUnlockOptions {
                scope: scope(sub_m)?,
                if_stale: sub_m.get_flag("if-stale"),
            };
            commands::force_unlock::run(&options, &coordinator)
        }
        _ => anyhow::bail!("Unknown command. Run 'upguard --help' for usage."),
    }
}

fn scope(matches: &ArgMatches) -> Result<ScopeIdentity> {
    matches
        .get_one::<ScopeIdentity>("scope")
        .cloned()
        .context("Missing SCOPE argument")
}

fn install_options(matches: &ArgMatches) -> Result<InstallOptions> {
    let publish = if matches.get_flag("no-publish") {
        Publish::Never
    } else {
        matches
            .get_one::<u64>("publish-after-ms")
            .map_or(Publish::Immediately, |ms| {
                Publish::After(Duration::from_millis(*ms))
            })
    };

    Ok(InstallOptions {
        scope: scope(matches)?,
        update_version: matches
            .get_one::<String>("version")
            .cloned()
            .context("Missing --version")?,
        display_version: matches.get_one::<String>("display-version").cloned(),
        stage: matches
            .get_one::<InstallStage>("stage")
            .copied()
            .unwrap_or(InstallStage::Installing),
        silent: matches.get_flag("silent"),
        publish,
    })
}
