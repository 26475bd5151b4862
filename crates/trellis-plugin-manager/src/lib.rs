//! Plugin manager for Trellis.
//!
//! This crate handles:
//! - Package metadata lookup against the registry API
//! - Archive download with SHA-256 verification
//! - Extraction into a staging directory and promotion into the plugins directory
//! - Updates, removal and listing of managed plugins
//! - Progress events and cooperative cancellation for every operation

pub mod cancel;
pub mod compat;
pub mod error;
pub mod events;
pub mod extract;
pub mod fetch;
pub mod manager;
pub mod manifest;
pub mod registry;
pub mod storage;
pub mod validate;

pub use cancel::CancellationToken;
pub use error::{ErrorKind, PluginManagerError, PluginManagerResult};
pub use events::{
    EventKind, OperationEvent, OperationHandle, OperationOutcome, ProgressEvent, Reporter,
};
pub use manager::{InstallSource, ManagerConfig, Operation, PluginManager};
pub use manifest::{PluginManifest, Provenance};
pub use registry::{PackageMetadata, RegistrySettings};
pub use storage::{InstalledPlugin, PluginStorage};
pub use validate::{validate_archive_source_url, validate_plugin_name};
