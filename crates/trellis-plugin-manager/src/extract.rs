//! Archive extraction into a staging directory.
//!
//! Registry archives are gzip'd tarballs whose contents are wrapped in a
//! single top-level folder (`package/`, `pod-counter-0.3.1/`, ...). That
//! folder is stripped so the staging directory holds the plugin files
//! directly.

use std::path::{Component, Path, PathBuf};

use flate2::read::GzDecoder;
use tempfile::TempDir;

use crate::manifest::{ENTRY_POINT_FILE, MANIFEST_FILE, PluginManifest, Provenance};
use crate::registry::PackageMetadata;
use crate::{PluginManagerError, PluginManagerResult};

const STAGING_PREFIX: &str = "trellis-staging-";

/// A verified plugin unpacked into a temporary directory, waiting to be promoted.
///
/// Dropping it removes the directory, so a staged plugin that is never
/// promoted does not linger.
#[derive(Debug)]
pub struct StagedPlugin {
    /// Package name the plugin was staged for.
    pub name: String,
    dir: TempDir,
}

impl StagedPlugin {
    /// Path of the staging directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        self.dir.path()
    }
}

/// Unpacks verified archives and stamps their manifest with provenance.
#[derive(Debug, Clone, Default)]
pub struct ArchiveExtractor {
    staging_root: Option<PathBuf>,
}

impl ArchiveExtractor {
    /// Creates an extractor staging under the system temporary directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an extractor staging under `staging_root`.
    #[must_use]
    pub fn with_staging_root(staging_root: PathBuf) -> Self {
        Self {
            staging_root: Some(staging_root),
        }
    }

    /// Extracts `archive` into a fresh staging directory.
    ///
    /// `archive` must already have passed checksum verification.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The staging directory cannot be created
    /// - The archive is corrupt, not a gzip'd tarball, or has unsafe entry paths
    /// - The archive lacks a manifest or entry point
    /// - The manifest cannot be parsed or rewritten
    pub fn extract(
        &self,
        archive: &[u8],
        metadata: &PackageMetadata,
    ) -> PluginManagerResult<StagedPlugin> {
        let dir = self.create_staging_dir()?;
        tracing::debug!(path = %dir.path().display(), "staging plugin {}", metadata.name);

        let unpacked = unpack_stripped(archive, dir.path())?;
        tracing::debug!(entries = unpacked, "unpacked archive");

        if !dir.path().join(ENTRY_POINT_FILE).is_file() {
            return Err(PluginManagerError::Extraction {
                reason: format!("archive does not contain {ENTRY_POINT_FILE}"),
            });
        }

        let manifest_path = dir.path().join(MANIFEST_FILE);
        if !manifest_path.is_file() {
            return Err(PluginManagerError::Extraction {
                reason: format!("archive does not contain {MANIFEST_FILE}"),
            });
        }

        let mut manifest = PluginManifest::read(&manifest_path)?;
        manifest.stamp(provenance_for(metadata));
        manifest.write(&manifest_path)?;

        Ok(StagedPlugin {
            name: metadata.name.clone(),
            dir,
        })
    }

    fn create_staging_dir(&self) -> PluginManagerResult<TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(STAGING_PREFIX);

        let result = match &self.staging_root {
            Some(root) => {
                std::fs::create_dir_all(root).map_err(|source| {
                    PluginManagerError::DirectoryCreation {
                        path: root.clone(),
                        source,
                    }
                })?;
                builder.tempdir_in(root)
            }
            None => builder.tempdir(),
        };

        result.map_err(|source| PluginManagerError::DirectoryCreation {
            path: self
                .staging_root
                .clone()
                .unwrap_or_else(std::env::temp_dir),
            source,
        })
    }
}

/// Builds the provenance record written into an installed plugin's manifest.
pub fn provenance_for(metadata: &PackageMetadata) -> Provenance {
    Provenance {
        name: metadata.name.clone(),
        title: metadata.display_title.clone(),
        url: metadata.registry_url.clone(),
        version: metadata.version.clone(),
        repo_name: metadata.repository_name.clone(),
        author: metadata.author_alias.clone(),
        installed_at: Some(chrono::Utc::now()),
    }
}

fn extraction_error(err: &std::io::Error) -> PluginManagerError {
    PluginManagerError::Extraction {
        reason: err.to_string(),
    }
}

/// Unpacks a gzip'd tarball into `dest`, dropping the first path component.
///
/// Returns the number of entries written.
fn unpack_stripped(archive: &[u8], dest: &Path) -> PluginManagerResult<usize> {
    let mut archive = tar::Archive::new(GzDecoder::new(archive));
    let mut written = 0;

    for entry in archive.entries().map_err(|e| extraction_error(&e))? {
        let mut entry = entry.map_err(|e| extraction_error(&e))?;
        let path = entry.path().map_err(|e| extraction_error(&e))?.into_owned();

        let Some(relative) = strip_leading_component(&path)? else {
            continue;
        };

        let entry_type = entry.header().entry_type();
        let target = dest.join(&relative);

        if entry_type.is_dir() {
            std::fs::create_dir_all(&target)?;
        } else if entry_type.is_file() || entry_type.is_contiguous() {
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }
            entry.unpack(&target).map_err(|e| extraction_error(&e))?;
        } else {
            tracing::warn!(path = %path.display(), ?entry_type, "skipping archive entry");
            continue;
        }

        written += 1;
    }

    Ok(written)
}

/// Strips the wrapping folder from an archive path.
///
/// Returns `None` for the wrapping folder itself.
fn strip_leading_component(path: &Path) -> PluginManagerResult<Option<PathBuf>> {
    let mut normal = Vec::new();

    for component in path.components() {
        match component {
            Component::Normal(part) => normal.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(PluginManagerError::Extraction {
                    reason: format!("unsafe path in archive: {}", path.display()),
                });
            }
        }
    }

    if normal.len() < 2 {
        return Ok(None);
    }

    Ok(Some(normal[1..].iter().collect()))
}
