pub mod error;
pub mod model;
pub mod path;
pub mod secrets;

pub use error::*;
pub use model::*;
pub use path::set_nested_value;
pub use secrets::{apply_env_overrides, resolve_placeholders};

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_FILENAME: &str = "nebari-config.yaml";

/// Environment variable pointing at the configuration file.
pub const CONFIG_PATH_ENV: &str = "NEBARI_CONFIG_PATH";

/// Locates the configuration file.
///
/// Search order:
/// 1. the explicit path (`--config`)
/// 2. `NEBARI_CONFIG_PATH`
/// 3. `./nebari-config.yaml`
pub fn find_config_file(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        if path.is_file() {
            return Ok(path.to_path_buf());
        }
        return Err(ConfigError::NotFound(path.to_path_buf()));
    }

    if let Ok(config_path) = std::env::var(CONFIG_PATH_ENV) {
        let path = PathBuf::from(config_path);
        if path.is_file() {
            return Ok(path);
        }
        tracing::warn!(path = %path.display(), "{} points at a missing file", CONFIG_PATH_ENV);
    }

    let path = std::env::current_dir()?.join(DEFAULT_CONFIG_FILENAME);
    if path.is_file() {
        return Ok(path);
    }

    Err(ConfigError::NotFound(path))
}

/// Reads, resolves and validates a configuration file using the process environment.
pub fn read_configuration(path: &Path, read_environment: bool) -> Result<NebariConfig> {
    let env: BTreeMap<String, String> = std::env::vars().collect();
    read_configuration_with_env(path, read_environment, &env)
}

/// Same as [`read_configuration`] with an explicit environment snapshot.
pub fn read_configuration_with_env(
    path: &Path,
    read_environment: bool,
    env: &BTreeMap<String, String>,
) -> Result<NebariConfig> {
    if !path.is_file() {
        return Err(ConfigError::NotFound(path.to_path_buf()));
    }
    let text = std::fs::read_to_string(path)?;
    parse_configuration(&text, path, read_environment, env)
}

/// Parses configuration text. `path` is only used in error messages.
pub fn parse_configuration(
    text: &str,
    path: &Path,
    read_environment: bool,
    env: &BTreeMap<String, String>,
) -> Result<NebariConfig> {
    let mut raw: serde_yaml::Value =
        serde_yaml::from_str(text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

    if read_environment {
        let applied = apply_env_overrides(
            &mut raw,
            env.iter().map(|(k, v)| (k.clone(), v.clone())),
        )?;
        if !applied.is_empty() {
            tracing::info!(count = applied.len(), "applied environment overrides");
        }
    }

    resolve_placeholders(&mut raw, &|var| env.get(var).cloned())?;

    let config: NebariConfig =
        serde_yaml::from_value(raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
    config.validate()?;

    tracing::debug!(
        project = %config.project_name,
        provider = %config.provider,
        "loaded configuration"
    );
    Ok(config)
}

/// Writes the configuration back as YAML.
pub fn write_configuration(path: &Path, config: &NebariConfig) -> Result<()> {
    let text = serde_yaml::to_string(config)?;
    std::fs::write(path, text)?;
    Ok(())
}

/// Default extension used by [`backup_configuration`].
pub const BACKUP_EXTENSION: &str = ".backup";

/// Moves an existing file out of the way as `<name><extension>`, then
/// `<name><extension>~1`, `~2`... when those are taken.
///
/// Returns the backup path, or `None` when there was nothing to back up.
pub fn backup_configuration(path: &Path, extension: &str) -> Result<Option<PathBuf>> {
    if !path.exists() {
        return Ok(None);
    }

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| ConfigError::Invalid(format!("{} has no file name", path.display())))?;

    let mut backup = path.with_file_name(format!("{}{}", file_name, extension));
    let mut counter = 1;
    while backup.exists() {
        backup = path.with_file_name(format!("{}{}~{}", file_name, extension, counter));
        counter += 1;
    }

    std::fs::rename(path, &backup)?;
    tracing::info!(from = %path.display(), to = %backup.display(), "backed up configuration");
    Ok(Some(backup))
}
