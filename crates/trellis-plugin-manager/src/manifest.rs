//! On-disk plugin manifest and provenance record.
//!
//! Every installed plugin folder holds a `package.json` manifest next to its
//! `main.js` entry point. After installation the manifest carries a
//! `provenance` object describing where the plugin came from and a
//! `managedFlag: true` marker flagging the folder as owned by the manager:
//!
//! ```json
//! {
//!   "name": "pod-counter",
//!   "version": "0.3.1",
//!   "provenance": {
//!     "name": "pod-counter",
//!     "title": "Pod Counter",
//!     "url": "https://artifacthub.io/packages/trellis/example-repo/pod-counter",
//!     "version": "0.3.1",
//!     "repoName": "example-repo",
//!     "author": "example",
//!     "installedAt": "2026-01-01T00:00:00Z"
//!   },
//!   "managedFlag": true
//! }
//! ```

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{PluginManagerError, PluginManagerResult};

/// File name of the plugin manifest.
pub const MANIFEST_FILE: &str = "package.json";

/// File name of the plugin entry point.
pub const ENTRY_POINT_FILE: &str = "main.js";

/// Registry attribution embedded into an installed plugin's manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Provenance {
    /// Package name in the registry.
    pub name: String,
    /// Human-facing title.
    pub title: String,
    /// Registry package page URL; update re-resolves metadata from here.
    pub url: String,
    /// Registry version at install time.
    pub version: String,
    /// Registry repository the package belongs to.
    pub repo_name: String,
    /// Publisher alias.
    pub author: String,
    /// When the plugin was installed or last updated.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub installed_at: Option<DateTime<Utc>>,
}

/// A plugin's `package.json`.
///
/// Only the fields the manager reads are typed; everything else the plugin
/// author put in the manifest is preserved verbatim on rewrite.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PluginManifest {
    /// Declared plugin name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Declared plugin version.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    /// Registry provenance, present once installed by the manager.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provenance: Option<Provenance>,

    /// Marks folders owned by the manager. Stored as `managedFlag`.
    #[serde(default, rename = "managedFlag", alias = "managed")]
    pub managed: bool,

    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl PluginManifest {
    /// Reads and parses the manifest at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not a valid manifest.
    pub fn read(path: impl AsRef<Path>) -> PluginManagerResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;

        serde_json::from_str(&content).map_err(|source| PluginManagerError::ManifestParse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Reads the manifest of the plugin folder at `dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if the manifest cannot be read or parsed.
    pub fn read_from_dir(dir: impl AsRef<Path>) -> PluginManagerResult<Self> {
        Self::read(dir.as_ref().join(MANIFEST_FILE))
    }

    /// Writes the manifest to `path` as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub fn write(&self, path: impl AsRef<Path>) -> PluginManagerResult<()> {
        let path = path.as_ref();

        let mut content = serde_json::to_string_pretty(self).map_err(|source| {
            PluginManagerError::ManifestSerialize {
                path: path.to_path_buf(),
                source,
            }
        })?;
        content.push('\n');

        std::fs::write(path, content).map_err(|source| PluginManagerError::ManifestWrite {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Embeds `provenance` and marks the manifest as managed.
    pub fn stamp(&mut self, provenance: Provenance) {
        self.provenance = Some(provenance);
        self.managed = true;
    }
}
