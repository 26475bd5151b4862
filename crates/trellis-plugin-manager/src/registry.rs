//! Registry client.
//!
//! Packages are addressed by their registry page URL, for example
//! `https://artifacthub.io/packages/trellis/<repo>/<name>`. The matching API
//! endpoint is obtained by swapping the page prefix for the API prefix.
//! Distribution details live in the response's `data` object under
//! namespaced keys such as `trellis/plugin/archive-url`.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::cancel::{CancellationToken, run_cancellable};
use crate::{PluginManagerError, PluginManagerResult};

/// Default registry package page prefix.
pub const DEFAULT_PAGE_PREFIX: &str = "https://artifacthub.io/packages/trellis/";

/// Default registry API prefix.
pub const DEFAULT_API_PREFIX: &str = "https://artifacthub.io/api/v1/packages/trellis/";

/// Default namespace of the `data` attribute keys.
pub const DEFAULT_NAMESPACE: &str = "trellis";

const ARCHIVE_URL_ATTR: &str = "archive-url";
const ARCHIVE_CHECKSUM_ATTR: &str = "archive-checksum";
const DISTRO_COMPAT_ATTR: &str = "distro-compat";
const VERSION_COMPAT_ATTR: &str = "version-compat";

/// Where the registry lives and how its package attributes are keyed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrySettings {
    /// Prefix every accepted package reference must start with.
    pub page_prefix: String,
    /// API prefix substituted for `page_prefix`.
    pub api_prefix: String,
    /// Namespace of the `data` keys (`<namespace>/plugin/<attr>`).
    pub namespace: String,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            page_prefix: DEFAULT_PAGE_PREFIX.to_string(),
            api_prefix: DEFAULT_API_PREFIX.to_string(),
            namespace: DEFAULT_NAMESPACE.to_string(),
        }
    }
}

impl RegistrySettings {
    /// Translates a package page URL into its API URL.
    ///
    /// Returns `None` if `reference` is not under the page prefix.
    #[must_use]
    pub fn api_url(&self, reference: &str) -> Option<String> {
        let rest = reference.strip_prefix(&self.page_prefix)?;
        if rest.is_empty() {
            return None;
        }
        Some(format!("{}{rest}", self.api_prefix))
    }

    /// Builds the package page URL for a repository and package name.
    #[must_use]
    pub fn registry_url(&self, repo_name: &str, package_name: &str) -> String {
        format!("{}{repo_name}/{package_name}", self.page_prefix)
    }

    fn data_key(&self, attr: &str) -> String {
        format!("{}/plugin/{attr}", self.namespace)
    }
}

/// Package response from the registry API.
#[derive(Debug, Deserialize)]
struct PackageResponse {
    name: String,
    display_name: Option<String>,
    version: String,
    #[serde(default)]
    repository: RepositoryInfo,
    #[serde(default)]
    data: HashMap<String, serde_json::Value>,
}

/// Repository the package is published in.
#[derive(Debug, Default, Deserialize)]
struct RepositoryInfo {
    #[serde(default)]
    name: String,
    user_alias: Option<String>,
}

/// Point-in-time snapshot of a registry package entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageMetadata {
    /// Unique package identifier. Untrusted until validated.
    pub name: String,
    /// Human-facing title.
    pub display_title: String,
    /// Semantic version string.
    pub version: String,
    /// Where the archive is downloaded from.
    pub archive_url: Option<String>,
    /// Hex digest of the archive, optionally `sha256:`-prefixed.
    pub archive_checksum: Option<String>,
    /// Host versions the plugin supports.
    pub compatible_version_range: Option<String>,
    /// Distributions the plugin supports. Informational.
    pub distro_compat: Option<String>,
    /// Registry repository name.
    pub repository_name: String,
    /// Publisher alias.
    pub author_alias: String,
    /// Package page URL, as recorded in provenance.
    pub registry_url: String,
}

impl PackageMetadata {
    fn from_response(response: PackageResponse, settings: &RegistrySettings) -> Self {
        let attr = |name: &str| {
            response
                .data
                .get(&settings.data_key(name))
                .and_then(serde_json::Value::as_str)
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(ToString::to_string)
        };

        let archive_url = attr(ARCHIVE_URL_ATTR);
        let archive_checksum = attr(ARCHIVE_CHECKSUM_ATTR);
        let compatible_version_range = attr(VERSION_COMPAT_ATTR);
        let distro_compat = attr(DISTRO_COMPAT_ATTR);

        let registry_url = settings.registry_url(&response.repository.name, &response.name);

        Self {
            display_title: response
                .display_name
                .filter(|title| !title.is_empty())
                .unwrap_or_else(|| response.name.clone()),
            name: response.name,
            version: response.version,
            archive_url,
            archive_checksum,
            compatible_version_range,
            distro_compat,
            repository_name: response.repository.name,
            author_alias: response.repository.user_alias.unwrap_or_default(),
            registry_url,
        }
    }
}

/// Resolves package references against the registry API.
#[derive(Debug, Clone)]
pub struct RegistryClient {
    client: reqwest::Client,
    settings: RegistrySettings,
}

impl RegistryClient {
    /// Creates a registry client using the given HTTP client.
    #[must_use]
    pub fn new(client: reqwest::Client, settings: RegistrySettings) -> Self {
        Self { client, settings }
    }

    /// Returns the registry settings.
    #[must_use]
    pub fn settings(&self) -> &RegistrySettings {
        &self.settings
    }

    /// Fetches package metadata for a registry package page URL.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The reference is not a registry package page URL
    /// - The token is cancelled (no request is issued if it already is)
    /// - The request fails or the registry answers with a non-success status
    /// - The response is not valid package JSON
    pub async fn fetch_package_metadata(
        &self,
        reference: &str,
        cancel: &CancellationToken,
    ) -> PluginManagerResult<PackageMetadata> {
        let api_url =
            self.settings
                .api_url(reference)
                .ok_or_else(|| PluginManagerError::InvalidUrl {
                    url: reference.to_string(),
                    expected_prefix: self.settings.page_prefix.clone(),
                })?;

        tracing::debug!(%api_url, "fetching package metadata");

        let response = run_cancellable(cancel, "metadata fetch", self.client.get(&api_url).send())
            .await?
            .map_err(|source| PluginManagerError::Request {
                url: api_url.clone(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(PluginManagerError::HttpStatus {
                url: api_url,
                status,
            });
        }

        let bytes = run_cancellable(cancel, "metadata fetch", response.bytes())
            .await?
            .map_err(|source| PluginManagerError::Request {
                url: api_url.clone(),
                source,
            })?;
        let body: PackageResponse =
            serde_json::from_slice(&bytes).map_err(|err| PluginManagerError::InvalidMetadata {
                name: reference.to_string(),
                reason: format!("registry response is not package JSON: {err}"),
            })?;

        let metadata = PackageMetadata::from_response(body, &self.settings);
        tracing::debug!(name = %metadata.name, version = %metadata.version, "resolved package");

        Ok(metadata)
    }
}
