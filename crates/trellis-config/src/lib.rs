//! Configuration management for Trellis.
//!
//! This crate handles loading and validating the `trellis.toml` configuration
//! file and resolving the default plugins directory.

mod error;
mod loader;
mod schema;

pub use error::{ConfigError, ConfigResult};
pub use loader::{CONFIG_FILE_NAME, default_config_path, load_config, load_or_default};
pub use schema::{Config, PluginsConfig, RegistryConfig, SecurityConfig, default_plugins_dir};
