//! Plugin lifecycle orchestration.
//!
//! Each public operation is a short sequential pipeline that bails out on
//! the first failure:
//!
//! - install: resolve → validate name → validate archive URL → checksum
//!   present → compatibility → download + verify → extract → promote
//! - update: find installed → resolve from provenance URL → version check →
//!   download + verify → extract → replace
//! - uninstall: find installed → validate folder → remove
//!
//! There is no locking around the plugins directory. Concurrent operations
//! on the same plugin name race on the filesystem; callers serialize them.

use std::path::PathBuf;

use semver::Version;

use crate::cancel::{CancellationToken, checkpoint};
use crate::compat;
use crate::events::{OperationEvent, OperationHandle, OperationOutcome, ProgressEvent, Reporter};
use crate::extract::{ArchiveExtractor, StagedPlugin};
use crate::fetch::ArchiveFetcher;
use crate::registry::{PackageMetadata, RegistryClient, RegistrySettings};
use crate::storage::{InstalledPlugin, PluginStorage};
use crate::validate::{SourceValidator, ensure_plugin_name};
use crate::{PluginManagerError, PluginManagerResult};

/// Everything the manager needs to know about its environment.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Directory holding installed plugin folders.
    pub plugins_dir: PathBuf,
    /// Registry location and attribute namespace.
    pub registry: RegistrySettings,
    /// Archive origins trusted in addition to the built-in hosts.
    pub trusted_origins: Vec<String>,
    /// Parent of staging directories; the system temp dir when unset.
    pub staging_dir: Option<PathBuf>,
}

impl ManagerConfig {
    /// Creates a configuration with default registry settings.
    #[must_use]
    pub fn new(plugins_dir: PathBuf) -> Self {
        Self {
            plugins_dir,
            registry: RegistrySettings::default(),
            trusted_origins: Vec::new(),
            staging_dir: None,
        }
    }
}

/// Where an install takes its package from.
#[derive(Debug, Clone)]
pub enum InstallSource {
    /// A registry package page URL, resolved first.
    Reference(String),
    /// Metadata the caller already resolved.
    Metadata(PackageMetadata),
}

impl From<&str> for InstallSource {
    fn from(reference: &str) -> Self {
        Self::Reference(reference.to_string())
    }
}

impl From<PackageMetadata> for InstallSource {
    fn from(metadata: PackageMetadata) -> Self {
        Self::Metadata(metadata)
    }
}

/// An operation to run in the background with [`PluginManager::spawn`].
#[derive(Debug, Clone)]
pub enum Operation {
    /// Install a package, checking it against `host_version` if given.
    Install {
        source: InstallSource,
        host_version: Option<Version>,
    },
    /// Update the installed plugin `name` if the registry has a newer version.
    Update {
        name: String,
        host_version: Option<Version>,
    },
    /// Remove the installed plugin `name`.
    Uninstall { name: String },
    /// List installed plugins.
    List,
    /// Resolve registry metadata for a package page URL without installing.
    Resolve { reference: String },
}

/// Installs, updates, lists and uninstalls registry plugins.
#[derive(Debug, Clone)]
pub struct PluginManager {
    storage: PluginStorage,
    registry: RegistryClient,
    fetcher: ArchiveFetcher,
    extractor: ArchiveExtractor,
    validator: SourceValidator,
}

/// Builds the HTTP client shared by the registry client and the fetcher.
///
/// # Panics
///
/// Panics if the HTTP client cannot be built.
#[must_use]
pub fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .user_agent(concat!(
            env!("CARGO_PKG_NAME"),
            "/",
            env!("CARGO_PKG_VERSION")
        ))
        .build()
        .expect("failed to build HTTP client")
}

impl PluginManager {
    /// Creates a manager with its own HTTP client.
    #[must_use]
    pub fn new(config: ManagerConfig) -> Self {
        Self::with_client(config, http_client())
    }

    /// Creates a manager using the given HTTP client.
    #[must_use]
    pub fn with_client(config: ManagerConfig, client: reqwest::Client) -> Self {
        let extractor = match config.staging_dir {
            Some(dir) => ArchiveExtractor::with_staging_root(dir),
            None => ArchiveExtractor::new(),
        };

        Self {
            storage: PluginStorage::new(config.plugins_dir),
            registry: RegistryClient::new(client.clone(), config.registry),
            fetcher: ArchiveFetcher::new(client),
            extractor,
            validator: SourceValidator::with_origins(config.trusted_origins),
        }
    }

    /// Returns the plugin storage.
    #[must_use]
    pub fn storage(&self) -> &PluginStorage {
        &self.storage
    }

    /// Resolves a registry package page URL into package metadata.
    ///
    /// # Errors
    ///
    /// Returns an error if the reference is invalid, the request fails or
    /// the token is cancelled.
    pub async fn resolve_metadata(
        &self,
        reference: &str,
        reporter: &Reporter,
        cancel: &CancellationToken,
    ) -> PluginManagerResult<PackageMetadata> {
        checkpoint(cancel, "metadata fetch")?;
        reporter.info(format!("Fetching metadata for {reference}"));

        let metadata = self.registry.fetch_package_metadata(reference, cancel).await?;
        reporter.info(format!(
            "Resolved {} v{} from {}",
            metadata.name, metadata.version, metadata.repository_name
        ));

        Ok(metadata)
    }

    /// Installs a plugin into the plugins directory.
    ///
    /// # Errors
    ///
    /// Returns an error if any stage fails; nothing is promoted in that case.
    pub async fn install(
        &self,
        source: InstallSource,
        host_version: Option<&Version>,
        reporter: &Reporter,
        cancel: &CancellationToken,
    ) -> PluginManagerResult<InstalledPlugin> {
        checkpoint(cancel, "install")?;

        let metadata = match source {
            InstallSource::Reference(reference) => {
                let metadata = self.resolve_metadata(&reference, reporter, cancel).await?;
                checkpoint(cancel, "install")?;
                metadata
            }
            InstallSource::Metadata(metadata) => metadata,
        };

        ensure_plugin_name(&metadata.name)?;

        let destination = self.storage.plugin_path(&metadata.name);
        if destination.exists() {
            return Err(PluginManagerError::AlreadyInstalled {
                name: metadata.name,
            });
        }

        let staged = self
            .stage_package(&metadata, host_version, reporter, cancel)
            .await?;

        reporter.info(format!("Installing to {}", destination.display()));
        self.storage.ensure_plugins_dir()?;
        self.storage.promote(staged.path(), &destination)?;

        let plugin = self.storage.get(&metadata.name)?;
        tracing::info!("Installed {} v{}", metadata.name, metadata.version);

        Ok(plugin)
    }

    /// Updates an installed plugin to the registry's latest version.
    ///
    /// # Errors
    ///
    /// Returns [`PluginManagerError::NoUpdateAvailable`] if the registry
    /// version is not newer, or an error if any stage fails. The installed
    /// folder is untouched unless the new version was fully staged.
    pub async fn update(
        &self,
        name: &str,
        host_version: Option<&Version>,
        reporter: &Reporter,
        cancel: &CancellationToken,
    ) -> PluginManagerResult<InstalledPlugin> {
        ensure_plugin_name(name)?;
        checkpoint(cancel, "update")?;

        let installed = self
            .storage
            .find(name)?
            .ok_or_else(|| PluginManagerError::PluginNotFound {
                name: name.to_string(),
            })?;

        if installed.provenance.url.is_empty() {
            return Err(PluginManagerError::InvalidMetadata {
                name: name.to_string(),
                reason: "no registry URL recorded for installed plugin".to_string(),
            });
        }

        reporter.info(format!("Checking {} for updates", installed.provenance.url));
        let metadata = self
            .registry
            .fetch_package_metadata(&installed.provenance.url, cancel)
            .await?;
        checkpoint(cancel, "update")?;

        let current = version_of(name, &installed.provenance.version)?;
        let available = version_of(&metadata.name, &metadata.version)?;

        if available <= current {
            return Err(PluginManagerError::NoUpdateAvailable {
                name: name.to_string(),
                installed: current.to_string(),
                available: available.to_string(),
            });
        }

        reporter.info(format!("Updating {name} from {current} to {available}"));

        let staged = self
            .stage_package(&metadata, host_version, reporter, cancel)
            .await?;

        reporter.info(format!("Replacing {}", installed.path.display()));
        self.storage.replace(&installed.path, staged.path())?;

        let plugin = self.storage.get(&installed.folder_name)?;
        tracing::info!("Updated {name} {current} -> {available}");

        Ok(plugin)
    }

    /// Removes an installed plugin.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is invalid, the plugin is not installed,
    /// or its folder is not a managed plugin folder.
    pub fn uninstall(&self, name: &str, reporter: &Reporter) -> PluginManagerResult<()> {
        ensure_plugin_name(name)?;

        let plugin_dir = match self.storage.find(name)? {
            Some(plugin) => plugin.path,
            None => {
                // An unmanaged folder of that name is refused by `remove`, not reported missing.
                let candidate = self.storage.plugin_path(name);
                if !candidate.exists() {
                    return Err(PluginManagerError::PluginNotFound {
                        name: name.to_string(),
                    });
                }
                candidate
            }
        };

        reporter.info(format!("Removing {}", plugin_dir.display()));
        self.storage.remove(&plugin_dir)?;
        tracing::info!("Uninstalled {name}");

        Ok(())
    }

    /// Lists installed plugins.
    ///
    /// # Errors
    ///
    /// Returns an error if the plugins directory cannot be read.
    pub fn list(&self, reporter: &Reporter) -> PluginManagerResult<Vec<InstalledPlugin>> {
        reporter.info(format!(
            "Listing plugins in {}",
            self.storage.plugins_dir().display()
        ));
        self.storage.list()
    }

    /// Runs `operation` as a background task.
    ///
    /// The returned handle streams progress and exactly one terminal event,
    /// and can cancel the operation.
    pub fn spawn(&self, operation: Operation) -> OperationHandle {
        let (reporter, events) = Reporter::channel();
        let cancel = CancellationToken::new();

        let manager = self.clone();
        let token = cancel.clone();
        let task = tokio::spawn(async move {
            let result = manager.run(operation, &reporter, &token).await;
            reporter.finish(result);
        });

        OperationHandle::new(events, cancel, task)
    }

    async fn run(
        &self,
        operation: Operation,
        reporter: &Reporter,
        cancel: &CancellationToken,
    ) -> PluginManagerResult<OperationOutcome> {
        match operation {
            Operation::Install {
                source,
                host_version,
            } => self
                .install(source, host_version.as_ref(), reporter, cancel)
                .await
                .map(OperationOutcome::Installed),
            Operation::Update { name, host_version } => self
                .update(&name, host_version.as_ref(), reporter, cancel)
                .await
                .map(OperationOutcome::Updated),
            Operation::Uninstall { name } => {
                checkpoint(cancel, "uninstall")?;
                self.uninstall(&name, reporter)
                    .map(|()| OperationOutcome::Uninstalled(name))
            }
            Operation::List => self.list(reporter).map(OperationOutcome::Listed),
            Operation::Resolve { reference } => self
                .resolve_metadata(&reference, reporter, cancel)
                .await
                .map(OperationOutcome::Resolved),
        }
    }

    /// Validates, downloads, verifies and extracts a package.
    async fn stage_package(
        &self,
        metadata: &PackageMetadata,
        host_version: Option<&Version>,
        reporter: &Reporter,
        cancel: &CancellationToken,
    ) -> PluginManagerResult<StagedPlugin> {
        ensure_plugin_name(&metadata.name)?;

        let archive_url =
            metadata
                .archive_url
                .as_deref()
                .ok_or_else(|| PluginManagerError::InvalidMetadata {
                    name: metadata.name.clone(),
                    reason: "missing archive URL".to_string(),
                })?;
        self.validator.ensure_archive_source_url(archive_url)?;

        let checksum = metadata.archive_checksum.as_deref().ok_or_else(|| {
            PluginManagerError::InvalidMetadata {
                name: metadata.name.clone(),
                reason: "missing archive checksum".to_string(),
            }
        })?;

        if let Some(host_version) = host_version {
            reporter.info(format!("Checking compatibility with {host_version}"));
            check_compatibility(metadata, host_version)?;
        }

        checkpoint(cancel, "download")?;
        reporter.info(format!("Downloading {archive_url}"));
        let archive = self
            .fetcher
            .fetch_and_verify(archive_url, checksum, cancel)
            .await?;
        reporter.progress(
            ProgressEvent::info("Downloaded and verified archive")
                .with_data(serde_json::json!({ "bytes": archive.len() })),
        );

        reporter.info(format!("Extracting {}", metadata.name));
        let extractor = self.extractor.clone();
        let owned_metadata = metadata.clone();
        let staged = tokio::task::spawn_blocking(move || {
            extractor.extract(&archive, &owned_metadata)
        })
        .await??;
        reporter.info("Extraction complete");

        // Dropping `staged` here discards the staging directory.
        checkpoint(cancel, "extraction")?;

        Ok(staged)
    }
}

fn version_of(name: &str, version: &str) -> PluginManagerResult<Version> {
    compat::parse_version(version).map_err(|err| PluginManagerError::InvalidMetadata {
        name: name.to_string(),
        reason: format!("invalid version {version:?}: {err}"),
    })
}

/// Checks the package's declared compatibility range against the host version.
///
/// Packages that declare no range are treated as compatible.
///
/// # Errors
///
/// Returns [`PluginManagerError::Incompatible`] if the host version is outside
/// the range, or [`PluginManagerError::InvalidMetadata`] if the range is malformed.
pub fn check_compatibility(
    metadata: &PackageMetadata,
    host_version: &Version,
) -> PluginManagerResult<()> {
    let Some(range) = metadata.compatible_version_range.as_deref() else {
        return Ok(());
    };

    let compatible =
        compat::satisfies(host_version, range).map_err(|err| PluginManagerError::InvalidMetadata {
            name: metadata.name.clone(),
            reason: format!("invalid compatibility range {range:?}: {err}"),
        })?;

    if !compatible {
        return Err(PluginManagerError::Incompatible {
            name: metadata.name.clone(),
            host_version: host_version.to_string(),
            range: range.to_string(),
        });
    }

    Ok(())
}
