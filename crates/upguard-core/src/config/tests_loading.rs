use std::{collections::HashMap, path::PathBuf};

use tempfile::TempDir;

use super::{load_config_from, load_toml_file, Config, ScopePaths};
use crate::{Error, ScopeIdentity};

fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect();
    move |key| map.get(key).cloned()
}

#[test]
fn test_default_config_is_valid() {
    assert!(Config::default().validate().is_ok());
}

#[test]
fn test_partial_toml_keeps_defaults() -> Result<(), Box<dyn std::error::Error>> {
    let dir = TempDir::new()?;
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[probe]\ntimeout_ms = 250\n")?;

    let config = load_toml_file(&path)?;
    assert_eq!(config.probe.timeout_ms, 250);
    assert_eq!(config.state_dir, Config::default().state_dir);
    Ok(())
}

#[test]
fn test_malformed_toml_is_rejected() -> Result<(), Box<dyn std::error::Error>> {
    let dir = TempDir::new()?;
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "state_dir = [unclosed")?;

    assert!(matches!(load_toml_file(&path), Err(Error::InvalidConfig(_))));
    Ok(())
}

#[test]
fn test_directory_as_config_path_is_rejected() -> Result<(), Box<dyn std::error::Error>> {
    let dir = TempDir::new()?;
    assert!(matches!(
        load_toml_file(dir.path()),
        Err(Error::InvalidConfig(_))
    ));
    Ok(())
}

#[test]
fn test_explicit_missing_file_is_an_error() {
    let missing = PathBuf::from("/nonexistent/upguard/config.toml");
    let result = load_config_from(Some(&missing), env_from(&[]));
    assert!(matches!(result, Err(Error::ConfigRead { .. })));
}

#[test]
fn test_env_config_path_is_used() -> Result<(), Box<dyn std::error::Error>> {
    let dir = TempDir::new()?;
    let path = dir.path().join("upguard.toml");
    let state = dir.path().join("state");
    std::fs::write(
        &path,
        format!("state_dir = {:?}\nruntime_dir = {:?}\n", state, dir.path().join("run")),
    )?;

    let path_str = path.to_string_lossy().into_owned();
    let config = load_config_from(None, env_from(&[("UPGUARD_CONFIG", &path_str)]))?;
    assert_eq!(config.state_dir, state);
    Ok(())
}

#[test]
fn test_env_overrides_file_values() -> Result<(), Box<dyn std::error::Error>> {
    let dir = TempDir::new()?;
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[probe]\ntimeout_ms = 250\n")?;

    let config = load_config_from(
        Some(&path),
        env_from(&[
            ("UPGUARD_STATE_DIR", "/tmp/upguard-env-state"),
            ("UPGUARD_RUNTIME_DIR", "/tmp/upguard-env-run"),
            ("UPGUARD_PROBE_TIMEOUT_MS", "750"),
        ]),
    )?;

    assert_eq!(config.state_dir, PathBuf::from("/tmp/upguard-env-state"));
    assert_eq!(config.runtime_dir, PathBuf::from("/tmp/upguard-env-run"));
    assert_eq!(config.probe.timeout_ms, 750);
    Ok(())
}

#[test]
fn test_invalid_timeout_env_is_rejected() {
    let result = Config::default().apply_env(env_from(&[("UPGUARD_PROBE_TIMEOUT_MS", "soon")]));
    assert!(matches!(result, Err(Error::InvalidConfig(_))));
}

#[test]
fn test_timeout_bounds() {
    let mut config = Config::default();
    config.probe.timeout_ms = 0;
    assert!(config.validate().is_err());

    config.probe.timeout_ms = 60_001;
    assert!(config.validate().is_err());

    config.probe.timeout_ms = 60_000;
    assert!(config.validate().is_ok());
}

#[test]
fn test_overlong_runtime_dir_is_rejected() {
    let mut config = Config::default();
    config.runtime_dir = PathBuf::from("/").join("r".repeat(90));
    assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
}

#[test]
fn test_scope_paths_share_key() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::rooted_at(&PathBuf::from("/tmp/upguard-test"));
    let scope = ScopeIdentity::new("com.example.App")?;
    let key = scope.resource_key();

    let paths = ScopePaths::resolve(&config, &scope);
    assert_eq!(paths.lock_file, config.state_dir.join(format!("{key}.lock")));
    assert_eq!(
        paths.info_file,
        config.state_dir.join(format!("{key}.install.json"))
    );
    assert_eq!(
        paths.beacon_socket,
        config.runtime_dir.join(format!("{key}.sock"))
    );
    Ok(())
}
