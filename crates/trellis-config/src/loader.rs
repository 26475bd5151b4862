//! Configuration loader.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::{Config, ConfigError, ConfigResult};

/// Default configuration file name.
pub const CONFIG_FILE_NAME: &str = "trellis.toml";

/// Loads and validates configuration from the given path.
///
/// # Errors
///
/// Returns an error if the file does not exist, cannot be read or parsed,
/// or fails validation.
pub fn load_config(path: impl AsRef<Path>) -> ConfigResult<Config> {
    let path = path.as_ref();
    debug!(?path, "loading configuration");

    if !path.exists() {
        return Err(ConfigError::NotFound(path.to_path_buf()));
    }

    let content = std::fs::read_to_string(path)?;
    let config: Config = toml::from_str(&content)?;
    config.validate()?;

    Ok(config)
}

/// Returns `<config_dir>/trellis/trellis.toml`, if the platform has a config directory.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("trellis").join(CONFIG_FILE_NAME))
}

/// Loads configuration from `explicit`, else the default location, else defaults.
///
/// An explicit path must exist; a missing default file is not an error.
///
/// # Errors
///
/// Returns an error if the chosen file cannot be loaded.
pub fn load_or_default(explicit: Option<&Path>) -> ConfigResult<Config> {
    load_from(explicit, default_config_path())
}

fn load_from(explicit: Option<&Path>, fallback: Option<PathBuf>) -> ConfigResult<Config> {
    if let Some(path) = explicit {
        return load_config(path);
    }

    match fallback {
        Some(path) if path.exists() => load_config(path),
        _ => {
            debug!("no configuration file found, using defaults");
            Ok(Config::default())
        }
    }
}
