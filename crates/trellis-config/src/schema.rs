//! Configuration schema.

use std::path::PathBuf;

use semver::Version;
use serde::{Deserialize, Serialize};
use trellis_plugin_manager::registry::{DEFAULT_API_PREFIX, DEFAULT_NAMESPACE, DEFAULT_PAGE_PREFIX};
use trellis_plugin_manager::{ManagerConfig, RegistrySettings};

use crate::{ConfigError, ConfigResult};

const APP_DIR: &str = "trellis";
const PLUGINS_DIR: &str = "plugins";

/// Main configuration structure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Registry location.
    #[serde(default)]
    pub registry: RegistryConfig,

    /// Plugins directory and host settings.
    #[serde(default)]
    pub plugins: PluginsConfig,

    /// Archive source allow-list extensions.
    #[serde(default)]
    pub security: SecurityConfig,
}

/// Registry configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Prefix of accepted package page URLs.
    #[serde(default = "default_page_prefix")]
    pub page_prefix: String,

    /// Prefix of the matching API endpoints.
    #[serde(default = "default_api_prefix")]
    pub api_prefix: String,

    /// Namespace of the package attribute keys.
    #[serde(default = "default_namespace")]
    pub namespace: String,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            page_prefix: default_page_prefix(),
            api_prefix: default_api_prefix(),
            namespace: default_namespace(),
        }
    }
}

fn default_page_prefix() -> String {
    DEFAULT_PAGE_PREFIX.to_string()
}

fn default_api_prefix() -> String {
    DEFAULT_API_PREFIX.to_string()
}

fn default_namespace() -> String {
    DEFAULT_NAMESPACE.to_string()
}

/// Plugins configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginsConfig {
    /// Plugins directory. Defaults to a platform data or config directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directory: Option<PathBuf>,

    /// Host version checked against plugin compatibility ranges.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_version: Option<String>,
}

/// Security configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// Extra archive origins (`scheme://host[:port]`) trusted besides the built-in hosts.
    #[serde(default)]
    pub trusted_origins: Vec<String>,
}

impl Config {
    /// Checks values that deserialize fine but cannot be used.
    ///
    /// # Errors
    ///
    /// Returns an error if a registry setting is empty, the host version is
    /// not a semantic version, or a trusted origin is not an http(s) origin.
    pub fn validate(&self) -> ConfigResult<()> {
        for (key, value) in [
            ("registry.page_prefix", &self.registry.page_prefix),
            ("registry.api_prefix", &self.registry.api_prefix),
            ("registry.namespace", &self.registry.namespace),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::Invalid(format!("{key} must not be empty")));
            }
        }

        self.host_version()?;

        for origin in &self.security.trusted_origins {
            let Some(rest) = origin
                .strip_prefix("https://")
                .or_else(|| origin.strip_prefix("http://"))
            else {
                return Err(ConfigError::Invalid(format!(
                    "trusted origin {origin:?} must start with http:// or https://"
                )));
            };
            if rest.trim_end_matches('/').is_empty() || rest.trim_end_matches('/').contains('/') {
                return Err(ConfigError::Invalid(format!(
                    "trusted origin {origin:?} must be scheme://host[:port] without a path"
                )));
            }
        }

        Ok(())
    }

    /// Parses the configured host version, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if `plugins.host_version` is not a semantic version.
    pub fn host_version(&self) -> ConfigResult<Option<Version>> {
        self.plugins
            .host_version
            .as_deref()
            .map(|version| {
                Version::parse(version.trim().trim_start_matches('v')).map_err(|err| {
                    ConfigError::Invalid(format!("plugins.host_version {version:?}: {err}"))
                })
            })
            .transpose()
    }

    /// Resolves the plugins directory: the configured one, else the platform default.
    ///
    /// # Errors
    ///
    /// Returns an error if nothing is configured and the platform has no
    /// data or config directory.
    pub fn plugins_dir(&self) -> ConfigResult<PathBuf> {
        match &self.plugins.directory {
            Some(directory) => Ok(directory.clone()),
            None => default_plugins_dir().ok_or(ConfigError::NoPluginsDir),
        }
    }

    /// Builds the plugin manager configuration, rooted at `plugins_dir`.
    #[must_use]
    pub fn to_manager_config(&self, plugins_dir: PathBuf) -> ManagerConfig {
        ManagerConfig {
            plugins_dir,
            registry: RegistrySettings {
                page_prefix: self.registry.page_prefix.clone(),
                api_prefix: self.registry.api_prefix.clone(),
                namespace: self.registry.namespace.clone(),
            },
            trusted_origins: self.security.trusted_origins.clone(),
            staging_dir: None,
        }
    }
}

/// Returns the default plugins directory.
///
/// `<data_dir>/trellis/plugins` if `<data_dir>/trellis` already exists,
/// otherwise `<config_dir>/trellis/plugins`.
#[must_use]
pub fn default_plugins_dir() -> Option<PathBuf> {
    resolve_plugins_dir(dirs::data_dir(), dirs::config_dir())
}

fn resolve_plugins_dir(data_dir: Option<PathBuf>, config_dir: Option<PathBuf>) -> Option<PathBuf> {
    if let Some(app_data) = data_dir.map(|dir| dir.join(APP_DIR))
        && app_data.is_dir()
    {
        return Some(app_data.join(PLUGINS_DIR));
    }

    config_dir.map(|dir| dir.join(APP_DIR).join(PLUGINS_DIR))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.registry.page_prefix, DEFAULT_PAGE_PREFIX);
        assert_eq!(config.registry.api_prefix, DEFAULT_API_PREFIX);
        assert_eq!(config.registry.namespace, "trellis");
        assert!(config.plugins.directory.is_none());
        assert!(config.plugins.host_version.is_none());
        assert!(config.security.trusted_origins.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_registry_section_keeps_defaults() {
        let config: Config = toml::from_str(
            r#"
            [registry]
            namespace = "acme"
        "#,
        )
        .unwrap();

        assert_eq!(config.registry.namespace, "acme");
        assert_eq!(config.registry.page_prefix, DEFAULT_PAGE_PREFIX);
    }

    #[test]
    fn test_validate_rejects_empty_registry_values() {
        let mut config = Config::default();
        config.registry.api_prefix = "  ".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("registry.api_prefix"));
    }

    #[test]
    fn test_host_version() {
        let mut config = Config::default();
        assert_eq!(config.host_version().unwrap(), None);

        config.plugins.host_version = Some("v0.25.1".to_string());
        assert_eq!(config.host_version().unwrap(), Some(Version::new(0, 25, 1)));

        config.plugins.host_version = Some("soon".to_string());
        assert!(config.host_version().is_err());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_trusted_origins() {
        let mut config = Config::default();
        config.security.trusted_origins = vec!["https://cdn.example.com".to_string()];
        assert!(config.validate().is_ok());

        config.security.trusted_origins = vec!["cdn.example.com".to_string()];
        assert!(config.validate().is_err());

        config.security.trusted_origins = vec!["https://cdn.example.com/any".to_string()];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_plugins_dir_prefers_configured_directory() {
        let mut config = Config::default();
        config.plugins.directory = Some(PathBuf::from("/srv/plugins"));
        assert_eq!(config.plugins_dir().unwrap(), PathBuf::from("/srv/plugins"));
    }

    #[test]
    fn test_resolve_plugins_dir_uses_existing_data_dir() {
        let data = TempDir::new().unwrap();
        let config = TempDir::new().unwrap();

        let resolved = resolve_plugins_dir(
            Some(data.path().to_path_buf()),
            Some(config.path().to_path_buf()),
        );
        assert_eq!(
            resolved.unwrap(),
            config.path().join("trellis").join("plugins")
        );

        std::fs::create_dir_all(data.path().join("trellis")).unwrap();
        let resolved = resolve_plugins_dir(
            Some(data.path().to_path_buf()),
            Some(config.path().to_path_buf()),
        );
        assert_eq!(resolved.unwrap(), data.path().join("trellis").join("plugins"));
    }

    #[test]
    fn test_resolve_plugins_dir_without_platform_dirs() {
        assert_eq!(resolve_plugins_dir(None, None), None);
    }

    #[test]
    fn test_to_manager_config() {
        let mut config = Config::default();
        config.security.trusted_origins = vec!["https://cdn.example.com".to_string()];

        let manager = config.to_manager_config(PathBuf::from("/tmp/plugins"));
        assert_eq!(manager.plugins_dir, PathBuf::from("/tmp/plugins"));
        assert_eq!(manager.registry, RegistrySettings::default());
        assert_eq!(manager.trusted_origins, ["https://cdn.example.com"]);
    }

    #[test]
    fn test_config_serialization_roundtrip() {
        let mut config = Config::default();
        config.plugins.host_version = Some("1.2.3".to_string());

        let serialized = toml::to_string(&config).unwrap();
        let parsed: Config = toml::from_str(&serialized).unwrap();
        assert_eq!(parsed, config);
    }
}
