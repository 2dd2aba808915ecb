pub mod handlers;

use clap::{value_parser, Arg, ArgAction, Command};
use upguard_core::{InstallStage, ScopeIdentity};

pub fn build_cli() -> Command {
    Command::new("upguard")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Coordinate application update installs across processes")
        .subcommand_required(true)
        .arg(
            Arg::new("config")
                .long("config")
                .global(true)
                .value_name("PATH")
                .value_parser(value_parser!(std::path::PathBuf))
                .help("Config file to load instead of the global one"),
        )
        .subcommand(cmd_status())
        .subcommand(cmd_lock())
        .subcommand(cmd_install())
        .subcommand(cmd_holder())
        .subcommand(cmd_force_unlock())
}

fn scope_arg() -> Arg {
    Arg::new("scope")
        .required(true)
        .value_name("SCOPE")
        .value_parser(value_parser!(ScopeIdentity))
        .help("Application identity, e.g. com.example.App")
}

fn cmd_status() -> Command {
    Command::new("status")
        .about("Show whether an installer is running and what it is installing")
        .arg(scope_arg())
        .arg(
            Arg::new("json")
                .long("json")
                .action(ArgAction::SetTrue)
                .help("Print machine-readable JSON"),
        )
}

fn cmd_lock() -> Command {
    Command::new("lock")
        .about("Try the update lock (exit 2 if another process holds it)")
        .arg(scope_arg())
        .arg(
            Arg::new("hold")
                .long("hold")
                .action(ArgAction::SetTrue)
                .help("Keep the lock until SIGINT or SIGTERM"),
        )
}

fn cmd_install() -> Command {
    Command::new("install")
        .about("Run an installer session: hold the lock and answer status probes")
        .disable_version_flag(true)
        .arg(scope_arg())
        .arg(
            Arg::new("version")
                .long("version")
                .required(true)
                .value_name("VERSION")
                .help("Update version being installed"),
        )
        .arg(
            Arg::new("display-version")
                .long("display-version")
                .value_name("VERSION")
                .help("Human-readable version"),
        )
        .arg(
            Arg::new("stage")
                .long("stage")
                .value_name("STAGE")
                .value_parser(value_parser!(InstallStage))
                .default_value("installing")
                .help("preparing, extracting, ready-to-install, installing or relaunching"),
        )
        .arg(
            Arg::new("silent")
                .long("silent")
                .action(ArgAction::SetTrue)
                .help("Advertise that the update installs without user interaction"),
        )
        .arg(
            Arg::new("no-publish")
                .long("no-publish")
                .action(ArgAction::SetTrue)
                .conflicts_with("publish-after-ms")
                .help("Never publish installation info"),
        )
        .arg(
            Arg::new("publish-after-ms")
                .long("publish-after-ms")
                .value_name("MS")
                .value_parser(value_parser!(u64))
                .help("Delay publishing installation info"),
        )
}

fn cmd_holder() -> Command {
    Command::new("holder")
        .about("Show the recorded lock holder and whether it is alive")
        .arg(scope_arg())
}

fn cmd_force_unlock() -> Command {
    Command::new("force-unlock")
        .about("Break the update lock regardless of who holds it")
        .arg(scope_arg())
        .arg(
            Arg::new("if-stale")
                .long("if-stale")
                .action(ArgAction::SetTrue)
                .help("Only clear a dead holder's record; never breaks a held lock"),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition_is_consistent() {
        build_cli().debug_assert();
    }

    #[test]
    fn test_rejects_invalid_scope() {
        let result = build_cli().try_get_matches_from(["upguard", "status", " padded "]);
        assert!(result.is_err());
    }

    #[test]
    fn test_stage_defaults_to_installing() -> Result<(), clap::Error> {
        let matches =
            build_cli().try_get_matches_from(["upguard", "install", "com.example.App", "--version", "2.0"])?;
        let install = matches.subcommand_matches("install");
        assert_eq!(
            install.and_then(|m| m.get_one::<InstallStage>("stage")),
            Some(&InstallStage::Installing)
        );
        Ok(())
    }

    #[test]
    fn test_no_publish_conflicts_with_delay() {
        let result = build_cli().try_get_matches_from([
            "upguard",
            "install",
            "com.example.App",
            "--version",
            "2.0",
            "--no-publish",
            "--publish-after-ms",
            "10",
        ]);
        assert!(result.is_err());
    }
}
