//! Error types for the plugin manager.

use std::path::PathBuf;

/// Result type for plugin manager operations.
pub type PluginManagerResult<T> = Result<T, PluginManagerError>;

/// Broad classification of a [`PluginManagerError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad name, bad URL, malformed reference or metadata.
    InvalidInput,
    /// The plugin does not support the host version.
    Incompatible,
    /// The archive digest did not match.
    Integrity,
    /// Plugin or package absent.
    NotFound,
    /// The registry has nothing newer than what is installed.
    NoUpdate,
    /// The operation was cancelled through its token.
    Cancelled,
    /// Filesystem failure.
    Io,
    /// Transport failure or non-success HTTP status.
    Network,
}

/// Plugin manager error types.
#[derive(Debug, thiserror::Error)]
pub enum PluginManagerError {
    /// Plugin name could escape the plugins directory.
    #[error("invalid plugin name: {name:?} (must not contain '/', '\\' or '..')")]
    InvalidPluginName { name: String },

    /// Package reference is not a registry package page.
    #[error("invalid package URL: {url} (expected a URL starting with {expected_prefix})")]
    InvalidUrl { url: String, expected_prefix: String },

    /// Archive URL is not hosted on a trusted origin.
    #[error("untrusted archive URL: {url}")]
    UntrustedArchiveUrl { url: String },

    /// Registry metadata is missing a required field or is malformed.
    #[error("invalid package metadata for {name}: {reason}")]
    InvalidMetadata { name: String, reason: String },

    /// Plugin does not support the host version.
    #[error("plugin {name} is not compatible with version {host_version} (requires {range})")]
    Incompatible {
        name: String,
        host_version: String,
        range: String,
    },

    /// Downloaded archive does not match the declared checksum.
    #[error("checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    /// Declared checksum uses an algorithm other than SHA-256.
    #[error("unsupported checksum algorithm: {algorithm}")]
    UnsupportedDigest { algorithm: String },

    /// Plugin not installed.
    #[error("plugin not found: {name}")]
    PluginNotFound { name: String },

    /// A folder with the plugin's name already exists.
    #[error("plugin already installed: {name} (use update instead)")]
    AlreadyInstalled { name: String },

    /// Registry version is not newer than the installed one.
    #[error("no updates available for {name} (installed {installed}, registry {available})")]
    NoUpdateAvailable {
        name: String,
        installed: String,
        available: String,
    },

    /// Folder is not a managed plugin folder.
    #[error("invalid plugin folder: {path}")]
    InvalidPluginFolder { path: PathBuf },

    /// Operation cancelled.
    #[error("{stage} cancelled")]
    Cancelled { stage: &'static str },

    /// Request could not be sent or the body could not be read.
    #[error("request to {url} failed")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// Server answered with a non-success status.
    #[error("request to {url} failed with status {status}")]
    HttpStatus {
        url: String,
        status: reqwest::StatusCode,
    },

    /// Archive could not be unpacked.
    #[error("failed to extract archive: {reason}")]
    Extraction { reason: String },

    /// Manifest is not valid JSON or has unexpected field types.
    #[error("failed to parse plugin manifest {path}")]
    ManifestParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Manifest could not be serialized.
    #[error("failed to serialize plugin manifest {path}")]
    ManifestSerialize {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Manifest could not be written.
    #[error("failed to write plugin manifest {path}")]
    ManifestWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to create a directory.
    #[error("failed to create directory: {path}")]
    DirectoryCreation {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to copy a staged plugin into place.
    #[error("failed to move plugin from {from} to {to}")]
    Promote {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Blocking task panicked or was aborted.
    #[error("background task failed")]
    Task(#[from] tokio::task::JoinError),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PluginManagerError {
    /// Returns the broad kind of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidPluginName { .. }
            | Self::InvalidUrl { .. }
            | Self::UntrustedArchiveUrl { .. }
            | Self::InvalidMetadata { .. }
            | Self::AlreadyInstalled { .. }
            | Self::InvalidPluginFolder { .. } => ErrorKind::InvalidInput,
            Self::Incompatible { .. } => ErrorKind::Incompatible,
            Self::ChecksumMismatch { .. } | Self::UnsupportedDigest { .. } => ErrorKind::Integrity,
            Self::PluginNotFound { .. } => ErrorKind::NotFound,
            Self::HttpStatus { status, .. } if *status == reqwest::StatusCode::NOT_FOUND => {
                ErrorKind::NotFound
            }
            Self::NoUpdateAvailable { .. } => ErrorKind::NoUpdate,
            Self::Cancelled { .. } => ErrorKind::Cancelled,
            Self::Request { .. } | Self::HttpStatus { .. } => ErrorKind::Network,
            Self::Extraction { .. }
            | Self::ManifestParse { .. }
            | Self::ManifestSerialize { .. }
            | Self::ManifestWrite { .. }
            | Self::DirectoryCreation { .. }
            | Self::Promote { .. }
            | Self::Task(_)
            | Self::Io(_) => ErrorKind::Io,
        }
    }

    /// Returns true if this error came from a cancelled token.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancelled_display() {
        let err = PluginManagerError::Cancelled { stage: "download" };
        assert_eq!(err.to_string(), "download cancelled");
        assert!(err.is_cancelled());
        assert_eq!(err.kind(), ErrorKind::Cancelled);
    }

    #[test]
    fn test_kind_classification() {
        let err = PluginManagerError::ChecksumMismatch {
            expected: "aa".to_string(),
            actual: "bb".to_string(),
        };
        assert_eq!(err.kind(), ErrorKind::Integrity);

        let err = PluginManagerError::InvalidPluginName {
            name: "../x".to_string(),
        };
        assert_eq!(err.kind(), ErrorKind::InvalidInput);

        let err = PluginManagerError::HttpStatus {
            url: "https://example.com".to_string(),
            status: reqwest::StatusCode::BAD_GATEWAY,
        };
        assert_eq!(err.kind(), ErrorKind::Network);
    }
}
