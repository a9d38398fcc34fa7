//! Configuration loader tests over layered env files.

use anyhow::Result;
use std::fs;

use accord::config::{ConfigError, ConfigLoader};

#[test]
fn defaults_apply_when_no_env_files_exist() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let config = ConfigLoader::with_base_dir(dir.path()).load()?;

    assert_eq!(config.profile, "local");
    assert_eq!(config.log_level, "info");
    assert_eq!(config.remote_pool_size, 5);

    Ok(())
}

#[test]
fn profile_env_file_overrides_the_base_file() -> Result<()> {
    let dir = tempfile::tempdir()?;
    fs::write(
        dir.path().join(".env"),
        "ACCORD_PROFILE=test\nACCORD_LOG_LEVEL=debug\nACCORD_DATABASE_URL=sqlite::memory:\n",
    )?;
    fs::write(
        dir.path().join(".env.test"),
        "ACCORD_LOG_LEVEL=trace\nACCORD_REMOTE_POOL_SIZE=2\n",
    )?;

    let config = ConfigLoader::with_base_dir(dir.path()).load()?;

    assert_eq!(config.profile, "test");
    assert_eq!(config.log_level, "trace");
    assert_eq!(config.database_url, "sqlite::memory:");
    assert_eq!(config.remote_pool_size, 2);

    Ok(())
}

#[test]
fn unprefixed_keys_are_ignored() -> Result<()> {
    let dir = tempfile::tempdir()?;
    fs::write(
        dir.path().join(".env"),
        "LOG_LEVEL=trace\nACCORD_LOG_LEVEL=warn\n",
    )?;

    let config = ConfigLoader::with_base_dir(dir.path()).load()?;
    assert_eq!(config.log_level, "warn");

    Ok(())
}

#[test]
fn unparseable_numbers_are_rejected() -> Result<()> {
    let dir = tempfile::tempdir()?;
    fs::write(dir.path().join(".env"), "ACCORD_DB_MAX_CONNECTIONS=lots\n")?;

    let err = ConfigLoader::with_base_dir(dir.path()).load().unwrap_err();
    assert!(matches!(err, ConfigError::InvalidNumber { .. }));

    Ok(())
}

#[test]
fn invalid_log_format_fails_validation() -> Result<()> {
    let dir = tempfile::tempdir()?;
    fs::write(dir.path().join(".env"), "ACCORD_LOG_FORMAT=yaml\n")?;

    let err = ConfigLoader::with_base_dir(dir.path()).load().unwrap_err();
    assert!(matches!(err, ConfigError::InvalidLogFormat { .. }));

    Ok(())
}
