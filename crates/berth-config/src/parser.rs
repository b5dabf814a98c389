//! Loading, validating and saving settings files

use crate::{ConfigError, Result, Settings};
use std::path::{Path, PathBuf};
use tracing::debug;

/// `<config dir>/berth/config.yaml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("berth").join("config.yaml"))
}

/// `<data dir>/berth`
pub fn default_data_dir() -> Option<PathBuf> {
    dirs::data_dir().map(|dir| dir.join("berth"))
}

/// Load settings from `path`. A missing file yields the defaults.
pub fn load(path: impl AsRef<Path>) -> Result<Settings> {
    let path = path.as_ref();
    if !path.exists() {
        debug!(?path, "no settings file, using defaults");
        return Ok(Settings::default());
    }

    let content = std::fs::read_to_string(path)?;
    parse_str(&content)
}

/// Parse YAML settings from a string
pub fn parse_str(content: &str) -> Result<Settings> {
    // An empty document means "all defaults"
    if content.trim().is_empty() {
        return Ok(Settings::default());
    }
    let settings: Settings = serde_yaml::from_str(content)?;
    validate_settings(&settings)?;
    Ok(settings)
}

/// Validate and write `settings` to `path`, creating parent directories
pub fn save(settings: &Settings, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    validate_settings(settings)?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serde_yaml::to_string(settings)?)?;

    debug!(?path, "settings saved");
    Ok(())
}

/// Validate settings
fn validate_settings(settings: &Settings) -> Result<()> {
    if settings.termination_grace_ms == 0 {
        return Err(ConfigError::ValidationError(
            "termination_grace_ms must be greater than zero".to_string(),
        ));
    }

    for dir in &settings.path_prefix {
        if dir.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "path_prefix entries must not be empty".to_string(),
            ));
        }
        if dir.contains(':') {
            return Err(ConfigError::ValidationError(format!(
                "path_prefix entry '{}' must not contain ':'",
                dir
            )));
        }
    }

    Ok(())
}
