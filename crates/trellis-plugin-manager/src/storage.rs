//! Local plugin directory management.
//!
//! Installed plugins live directly under the plugins directory, one folder
//! per plugin:
//! ```text
//! plugins/
//! ├── pod-counter/
//! │   ├── main.js
//! │   └── package.json   (managedFlag: true, provenance: {...})
//! ├── node-graph/
//! │   └── ...
//! └── hand-copied-thing/ (no managed flag, ignored)
//! ```
//!
//! Only folders that pass [`PluginStorage::is_valid_plugin_folder`] are ever
//! listed, replaced or removed.

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::manifest::{ENTRY_POINT_FILE, MANIFEST_FILE, PluginManifest, Provenance};
use crate::{PluginManagerError, PluginManagerResult};

/// A managed plugin found in the plugins directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstalledPlugin {
    /// Canonical identifier: the manifest name, or the folder name when the manifest has none.
    pub name: String,
    /// Folder name under the plugins directory.
    pub folder_name: String,
    /// Full path of the plugin folder.
    pub path: PathBuf,
    /// Version declared by the plugin's manifest.
    pub version: Option<String>,
    /// Registry title, if known.
    pub title: Option<String>,
    /// Registry provenance.
    pub provenance: Provenance,
}

impl InstalledPlugin {
    fn from_manifest(path: PathBuf, folder_name: String, manifest: PluginManifest) -> Self {
        let provenance = manifest.provenance.unwrap_or_default();
        let title = Some(provenance.title.clone()).filter(|title| !title.is_empty());

        Self {
            name: manifest
                .name
                .filter(|name| !name.is_empty())
                .unwrap_or_else(|| folder_name.clone()),
            folder_name,
            path,
            version: manifest.version,
            title,
            provenance,
        }
    }
}

/// Manages the on-disk plugins directory.
#[derive(Debug, Clone)]
pub struct PluginStorage {
    plugins_dir: PathBuf,
}

impl PluginStorage {
    /// Creates a storage rooted at `plugins_dir`.
    ///
    /// The directory is not created until something is installed into it.
    #[must_use]
    pub fn new(plugins_dir: PathBuf) -> Self {
        Self { plugins_dir }
    }

    /// Returns the plugins directory path.
    #[must_use]
    pub fn plugins_dir(&self) -> &Path {
        &self.plugins_dir
    }

    /// Returns the folder path for a plugin folder name.
    #[must_use]
    pub fn plugin_path(&self, folder_name: &str) -> PathBuf {
        self.plugins_dir.join(folder_name)
    }

    /// Creates the plugins directory if it does not exist yet.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn ensure_plugins_dir(&self) -> PluginManagerResult<()> {
        std::fs::create_dir_all(&self.plugins_dir).map_err(|source| {
            PluginManagerError::DirectoryCreation {
                path: self.plugins_dir.clone(),
                source,
            }
        })
    }

    /// Checks whether `dir` is a managed plugin folder.
    ///
    /// A folder is valid if it exists, has both the entry point and the
    /// manifest, and the manifest carries `managedFlag: true`.
    #[must_use]
    pub fn is_valid_plugin_folder(dir: &Path) -> bool {
        Self::read_valid_manifest(dir).is_some()
    }

    fn read_valid_manifest(dir: &Path) -> Option<PluginManifest> {
        if !dir.is_dir() || !dir.join(ENTRY_POINT_FILE).is_file() {
            return None;
        }

        match PluginManifest::read(dir.join(MANIFEST_FILE)) {
            Ok(manifest) if manifest.managed => Some(manifest),
            Ok(_) => None,
            Err(err) => {
                tracing::debug!(dir = %dir.display(), error = %err, "unreadable plugin manifest");
                None
            }
        }
    }

    /// Lists managed plugins, sorted by name.
    ///
    /// Folders that are not managed plugin folders are skipped silently.
    ///
    /// # Errors
    ///
    /// Returns an error if the plugins directory exists but cannot be read.
    pub fn list(&self) -> PluginManagerResult<Vec<InstalledPlugin>> {
        if !self.plugins_dir.exists() {
            return Ok(Vec::new());
        }

        let mut plugins = Vec::new();

        for entry in std::fs::read_dir(&self.plugins_dir)? {
            let entry = entry?;
            let path = entry.path();

            let Some(manifest) = Self::read_valid_manifest(&path) else {
                tracing::debug!(path = %path.display(), "skipping non-plugin folder");
                continue;
            };

            let folder_name = entry.file_name().to_string_lossy().into_owned();
            plugins.push(InstalledPlugin::from_manifest(path, folder_name, manifest));
        }

        plugins.sort_by(|a, b| a.name.cmp(&b.name));

        Ok(plugins)
    }

    /// Finds a managed plugin by its canonical name.
    ///
    /// # Errors
    ///
    /// Returns an error if the plugins directory cannot be read.
    pub fn find(&self, name: &str) -> PluginManagerResult<Option<InstalledPlugin>> {
        Ok(self.list()?.into_iter().find(|plugin| plugin.name == name))
    }

    /// Reads the managed plugin in `folder_name`.
    ///
    /// # Errors
    ///
    /// Returns [`PluginManagerError::InvalidPluginFolder`] if the folder is
    /// missing or not a managed plugin folder.
    pub fn get(&self, folder_name: &str) -> PluginManagerResult<InstalledPlugin> {
        let path = self.plugin_path(folder_name);
        let manifest = Self::read_valid_manifest(&path)
            .ok_or_else(|| PluginManagerError::InvalidPluginFolder { path: path.clone() })?;

        Ok(InstalledPlugin::from_manifest(
            path,
            folder_name.to_string(),
            manifest,
        ))
    }

    /// Copies `staged_dir` to `destination` and then removes `staged_dir`.
    ///
    /// The staged tree is only removed once the copy has fully succeeded.
    ///
    /// # Errors
    ///
    /// Returns an error if the destination cannot be created or the copy fails.
    pub fn promote(&self, staged_dir: &Path, destination: &Path) -> PluginManagerResult<()> {
        let promote_error = |source| PluginManagerError::Promote {
            from: staged_dir.to_path_buf(),
            to: destination.to_path_buf(),
            source,
        };

        let existed = destination.exists();

        if let Err(source) = copy_dir_recursive(staged_dir, destination) {
            if !existed && let Err(err) = std::fs::remove_dir_all(destination) {
                tracing::warn!(
                    path = %destination.display(),
                    error = %err,
                    "failed to clean up partially promoted plugin"
                );
            }
            return Err(promote_error(source));
        }

        std::fs::remove_dir_all(staged_dir)?;

        tracing::info!("Installed plugin to {}", destination.display());

        Ok(())
    }

    /// Replaces the plugin folder at `plugin_dir` with the contents of `staged_dir`.
    ///
    /// The old folder is removed entirely, not merged.
    ///
    /// # Errors
    ///
    /// Returns an error if `plugin_dir` is not a managed plugin folder or any step fails.
    pub fn replace(&self, plugin_dir: &Path, staged_dir: &Path) -> PluginManagerResult<()> {
        self.remove(plugin_dir)?;

        std::fs::create_dir_all(plugin_dir).map_err(|source| {
            PluginManagerError::DirectoryCreation {
                path: plugin_dir.to_path_buf(),
                source,
            }
        })?;

        self.promote(staged_dir, plugin_dir)
    }

    /// Removes the managed plugin folder at `plugin_dir`.
    ///
    /// # Errors
    ///
    /// Returns [`PluginManagerError::InvalidPluginFolder`] if the folder is
    /// missing or not managed; it is left untouched in that case.
    pub fn remove(&self, plugin_dir: &Path) -> PluginManagerResult<()> {
        if !Self::is_valid_plugin_folder(plugin_dir) {
            return Err(PluginManagerError::InvalidPluginFolder {
                path: plugin_dir.to_path_buf(),
            });
        }

        std::fs::remove_dir_all(plugin_dir)?;
        tracing::info!("Removed plugin from {}", plugin_dir.display());

        Ok(())
    }
}

/// Recursively copies `src` into `dst`, creating `dst` and its parents.
fn copy_dir_recursive(src: &Path, dst: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(dst)?;

    for entry in std::fs::read_dir(src)? {
        let entry = entry?;
        let src_path = entry.path();
        let dst_path = dst.join(entry.file_name());

        if entry.file_type()?.is_dir() {
            copy_dir_recursive(&src_path, &dst_path)?;
        } else {
            std::fs::copy(&src_path, &dst_path)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_plugin(root: &Path, folder: &str, manifest: &str, entry_point: bool) -> PathBuf {
        let dir = root.join(folder);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(MANIFEST_FILE), manifest).unwrap();
        if entry_point {
            std::fs::write(dir.join(ENTRY_POINT_FILE), "export {}").unwrap();
        }
        dir
    }

    fn managed_manifest(name: &str) -> String {
        format!(
            r#"{{"name": "{name}", "version": "1.0.0", "managedFlag": true,
                "provenance": {{"name": "{name}", "title": "Title {name}", "version": "1.0.0"}}}}"#
        )
    }

    #[test]
    fn test_list_missing_root_is_empty() {
        let temp = TempDir::new().unwrap();
        let storage = PluginStorage::new(temp.path().join("does-not-exist"));
        assert!(storage.list().unwrap().is_empty());
    }

    #[test]
    fn test_list_skips_foreign_folders() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();

        write_plugin(root, "alpha", &managed_manifest("alpha"), true);
        write_plugin(root, "beta", &managed_manifest("beta"), true);
        // Not managed.
        write_plugin(root, "hand-copied", r#"{"name": "hand-copied"}"#, true);
        // Managed flag but no entry point.
        write_plugin(root, "no-entry", &managed_manifest("no-entry"), false);
        // Broken manifest.
        write_plugin(root, "broken", "{ nope", true);
        // Empty folder and a stray file.
        std::fs::create_dir_all(root.join("empty")).unwrap();
        std::fs::write(root.join("README.txt"), "hi").unwrap();

        let plugins = PluginStorage::new(root.to_path_buf()).list().unwrap();
        let names: Vec<_> = plugins.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["alpha", "beta"]);
        assert_eq!(plugins[0].title.as_deref(), Some("Title alpha"));
        assert_eq!(plugins[0].version.as_deref(), Some("1.0.0"));
    }

    #[test]
    fn test_list_keys_by_manifest_name() {
        let temp = TempDir::new().unwrap();
        write_plugin(temp.path(), "renamed-folder", &managed_manifest("real-name"), true);
        write_plugin(temp.path(), "nameless", r#"{"managedFlag": true}"#, true);

        let storage = PluginStorage::new(temp.path().to_path_buf());
        let plugin = storage.find("real-name").unwrap().unwrap();
        assert_eq!(plugin.folder_name, "renamed-folder");
        assert!(storage.find("renamed-folder").unwrap().is_none());

        let nameless = storage.find("nameless").unwrap().unwrap();
        assert_eq!(nameless.folder_name, "nameless");
        assert!(nameless.version.is_none());
    }

    #[test]
    fn test_get_by_folder_name() {
        let temp = TempDir::new().unwrap();
        write_plugin(temp.path(), "p", &managed_manifest("p"), true);
        write_plugin(temp.path(), "loose", r#"{"name": "loose"}"#, true);

        let storage = PluginStorage::new(temp.path().to_path_buf());
        assert_eq!(storage.get("p").unwrap().name, "p");
        assert!(matches!(
            storage.get("loose").unwrap_err(),
            PluginManagerError::InvalidPluginFolder { .. }
        ));
        assert!(storage.get("ghost").is_err());
    }

    #[test]
    fn test_promote_copies_and_removes_source() {
        let temp = TempDir::new().unwrap();
        let staged = write_plugin(temp.path(), "staged", &managed_manifest("p"), true);
        std::fs::create_dir_all(staged.join("nested/deeper")).unwrap();
        std::fs::write(staged.join("nested/deeper/file.txt"), "x").unwrap();

        let storage = PluginStorage::new(temp.path().join("plugins"));
        let destination = storage.plugin_path("p");
        storage.promote(&staged, &destination).unwrap();

        assert!(!staged.exists());
        assert!(PluginStorage::is_valid_plugin_folder(&destination));
        assert_eq!(
            std::fs::read_to_string(destination.join("nested/deeper/file.txt")).unwrap(),
            "x"
        );
    }

    #[test]
    fn test_promote_failure_keeps_source() {
        let temp = TempDir::new().unwrap();
        let storage = PluginStorage::new(temp.path().join("plugins"));

        let err = storage
            .promote(&temp.path().join("missing"), &storage.plugin_path("p"))
            .unwrap_err();
        assert!(matches!(err, PluginManagerError::Promote { .. }));
        assert!(!storage.plugin_path("p").exists());
    }

    #[test]
    fn test_replace_drops_old_files() {
        let temp = TempDir::new().unwrap();
        let plugins = temp.path().join("plugins");
        let installed = write_plugin(&plugins, "p", &managed_manifest("p"), true);
        std::fs::write(installed.join("stale.js"), "old").unwrap();

        let staged = write_plugin(temp.path(), "staged", &managed_manifest("p"), true);
        std::fs::write(staged.join("fresh.js"), "new").unwrap();

        let storage = PluginStorage::new(plugins);
        storage.replace(&installed, &staged).unwrap();

        assert!(installed.join("fresh.js").exists());
        assert!(!installed.join("stale.js").exists());
        assert!(!staged.exists());
    }

    #[test]
    fn test_remove_valid_folder() {
        let temp = TempDir::new().unwrap();
        let dir = write_plugin(temp.path(), "p", &managed_manifest("p"), true);

        PluginStorage::new(temp.path().to_path_buf())
            .remove(&dir)
            .unwrap();
        assert!(!dir.exists());
    }

    #[test]
    fn test_remove_refuses_unmanaged_folder() {
        let temp = TempDir::new().unwrap();
        let dir = write_plugin(temp.path(), "p", r#"{"name": "p"}"#, true);

        let err = PluginStorage::new(temp.path().to_path_buf())
            .remove(&dir)
            .unwrap_err();
        assert!(matches!(err, PluginManagerError::InvalidPluginFolder { .. }));
        assert!(dir.join(MANIFEST_FILE).exists());
    }

    #[test]
    fn test_remove_missing_folder() {
        let temp = TempDir::new().unwrap();
        let err = PluginStorage::new(temp.path().to_path_buf())
            .remove(&temp.path().join("ghost"))
            .unwrap_err();
        assert!(matches!(err, PluginManagerError::InvalidPluginFolder { .. }));
    }
}
