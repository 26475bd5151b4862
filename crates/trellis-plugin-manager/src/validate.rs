//! Validation of untrusted plugin names and archive source URLs.
//!
//! Plugin names come straight from registry metadata and end up as folder
//! names under the plugins directory, so anything that could walk out of it
//! is rejected. Archive URLs are restricted to release/archive endpoints of
//! known source-hosting providers.

use std::sync::LazyLock;

use regex::Regex;

use crate::{PluginManagerError, PluginManagerResult};

/// Origin always trusted for fixture archives used by integration suites.
pub const FIXTURE_ORIGIN: &str = "https://fixtures.trellis.dev";

/// Release and archive endpoints of the supported hosting providers.
static TRUSTED_ARCHIVE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        // https://github.com/<owner>/<repo>/releases/download/<tag>/<asset>
        // https://github.com/<owner>/<repo>/archive/<ref>.tar.gz
        r"^https://github\.com/[^/]+/[^/]+/(releases/download|archive)/.+$",
        // GitLab allows nested groups before the `-/` separator.
        r"^https://gitlab\.com/[^/]+(/[^/]+)+/-/(releases|archive)/.+$",
        r"^https://bitbucket\.org/[^/]+/[^/]+/(downloads|get)/.+$",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).expect("static archive pattern is valid"))
    .collect()
});

/// Returns true if `name` is safe to use as a folder name under the plugins directory.
pub fn validate_plugin_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && !name.contains('/')
        && !name.contains('\\')
        && !name.contains("..")
        && !name.contains('\0')
}

/// Like [`validate_plugin_name`], but returns an error describing the rejected name.
///
/// # Errors
///
/// Returns [`PluginManagerError::InvalidPluginName`] if the name is unsafe.
pub fn ensure_plugin_name(name: &str) -> PluginManagerResult<()> {
    if validate_plugin_name(name) {
        Ok(())
    } else {
        Err(PluginManagerError::InvalidPluginName {
            name: name.to_string(),
        })
    }
}

/// Returns true if `url` points at a trusted archive host, using the built-in list only.
pub fn validate_archive_source_url(url: &str) -> bool {
    SourceValidator::default().validate_archive_source_url(url)
}

/// Archive URL allow-list, optionally extended with extra trusted origins.
#[derive(Debug, Clone, Default)]
pub struct SourceValidator {
    extra_origins: Vec<String>,
}

impl SourceValidator {
    /// Creates a validator that also trusts the given origins (`scheme://host[:port]`).
    #[must_use]
    pub fn with_origins<I, S>(origins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let extra_origins = origins
            .into_iter()
            .map(|origin| origin.as_ref().trim_end_matches('/').to_string())
            .filter(|origin| !origin.is_empty())
            .collect();

        Self { extra_origins }
    }

    /// Returns true if `url` is allowed as an archive source.
    pub fn validate_archive_source_url(&self, url: &str) -> bool {
        if TRUSTED_ARCHIVE_PATTERNS.iter().any(|re| re.is_match(url)) {
            return true;
        }

        std::iter::once(FIXTURE_ORIGIN)
            .chain(self.extra_origins.iter().map(String::as_str))
            .any(|origin| is_under_origin(url, origin))
    }

    /// Like [`Self::validate_archive_source_url`], but returns an error.
    ///
    /// # Errors
    ///
    /// Returns [`PluginManagerError::UntrustedArchiveUrl`] if the URL is not allowed.
    pub fn ensure_archive_source_url(&self, url: &str) -> PluginManagerResult<()> {
        if self.validate_archive_source_url(url) {
            Ok(())
        } else {
            Err(PluginManagerError::UntrustedArchiveUrl {
                url: url.to_string(),
            })
        }
    }
}

/// Checks that `url` is a path under `origin`, not merely sharing a string prefix.
fn is_under_origin(url: &str, origin: &str) -> bool {
    url.strip_prefix(origin)
        .is_some_and(|rest| rest.starts_with('/') && !rest.split('/').any(|seg| seg == ".."))
}
