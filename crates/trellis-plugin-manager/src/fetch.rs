//! Archive download and integrity verification.
//!
//! The archive is buffered fully in memory and hashed before anything is
//! written to disk. No size cap is applied here; archive size is bounded by
//! the registry's own limits.

use futures::StreamExt;
use sha2::{Digest, Sha256};

use crate::cancel::{CancellationToken, checkpoint, run_cancellable};
use crate::{PluginManagerError, PluginManagerResult};

/// Digest algorithm archives are verified with.
pub const CHECKSUM_ALGORITHM: &str = "sha256";

const STAGE: &str = "download";

/// Returns the lowercase hex SHA-256 digest of `bytes`.
pub fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Normalizes a registry-declared checksum to lowercase hex.
///
/// Accepts an optional algorithm prefix (`sha256:`, any case).
///
/// # Errors
///
/// Returns [`PluginManagerError::UnsupportedDigest`] if the prefix names another algorithm.
pub fn normalize_checksum(declared: &str) -> PluginManagerResult<String> {
    let declared = declared.trim();

    let digest = match declared.split_once(':') {
        Some((algorithm, digest)) if algorithm.eq_ignore_ascii_case(CHECKSUM_ALGORITHM) => digest,
        Some((algorithm, _)) => {
            return Err(PluginManagerError::UnsupportedDigest {
                algorithm: algorithm.to_string(),
            });
        }
        None => declared,
    };

    Ok(digest.trim().to_ascii_lowercase())
}

/// Verifies `bytes` against a registry-declared checksum.
///
/// # Errors
///
/// Returns [`PluginManagerError::ChecksumMismatch`] if the digests differ.
pub fn verify_checksum(bytes: &[u8], declared: &str) -> PluginManagerResult<()> {
    let expected = normalize_checksum(declared)?;
    let actual = sha256_hex(bytes);

    if actual != expected {
        return Err(PluginManagerError::ChecksumMismatch { expected, actual });
    }

    Ok(())
}

/// Downloads archives and checks them against their declared digest.
#[derive(Debug, Clone)]
pub struct ArchiveFetcher {
    client: reqwest::Client,
}

impl ArchiveFetcher {
    /// Creates a fetcher using the given HTTP client.
    #[must_use]
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Downloads `url` and returns its bytes once they match `expected_checksum`.
    ///
    /// The token is consulted before the request, after the response headers
    /// arrive, while the body streams, and once the body is complete.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The token is cancelled at any checkpoint
    /// - The request fails or the server answers with a non-success status
    /// - The digest does not match
    pub async fn fetch_and_verify(
        &self,
        url: &str,
        expected_checksum: &str,
        cancel: &CancellationToken,
    ) -> PluginManagerResult<Vec<u8>> {
        // Reject an unsupported digest before spending a download on it.
        normalize_checksum(expected_checksum)?;

        let response = run_cancellable(cancel, STAGE, self.client.get(url).send())
            .await?
            .map_err(|source| PluginManagerError::Request {
                url: url.to_string(),
                source,
            })?;

        checkpoint(cancel, STAGE)?;

        let status = response.status();
        if !status.is_success() {
            return Err(PluginManagerError::HttpStatus {
                url: url.to_string(),
                status,
            });
        }

        let capacity = response
            .content_length()
            .and_then(|len| usize::try_from(len).ok())
            .unwrap_or_default();
        tracing::debug!(url, content_length = capacity, "downloading archive");

        let mut bytes = Vec::with_capacity(capacity);
        let mut stream = response.bytes_stream();

        while let Some(chunk) = run_cancellable(cancel, STAGE, stream.next()).await? {
            let chunk = chunk.map_err(|source| PluginManagerError::Request {
                url: url.to_string(),
                source,
            })?;
            bytes.extend_from_slice(&chunk);
        }

        checkpoint(cancel, STAGE)?;

        verify_checksum(&bytes, expected_checksum)?;
        tracing::debug!(url, size = bytes.len(), "archive checksum verified");

        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // sha256("hello world")
    const HELLO_DIGEST: &str = "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9";

    #[test]
    fn test_sha256_hex() {
        assert_eq!(sha256_hex(b"hello world"), HELLO_DIGEST);
    }

    #[test]
    fn test_normalize_checksum() {
        assert_eq!(normalize_checksum("ABCdef").unwrap(), "abcdef");
        assert_eq!(normalize_checksum("sha256:ABCdef").unwrap(), "abcdef");
        assert_eq!(normalize_checksum("SHA256:abcdef").unwrap(), "abcdef");
        assert_eq!(normalize_checksum("  Sha256:abcdef \n").unwrap(), "abcdef");
    }

    #[test]
    fn test_normalize_checksum_rejects_other_algorithms() {
        let err = normalize_checksum("md5:abcdef").unwrap_err();
        assert!(matches!(
            err,
            PluginManagerError::UnsupportedDigest { ref algorithm } if algorithm == "md5"
        ));
    }

    #[test]
    fn test_verify_checksum_accepts_case_and_prefix() {
        let upper = HELLO_DIGEST.to_uppercase();
        assert!(verify_checksum(b"hello world", HELLO_DIGEST).is_ok());
        assert!(verify_checksum(b"hello world", &upper).is_ok());
        assert!(verify_checksum(b"hello world", &format!("sha256:{upper}")).is_ok());
    }

    #[test]
    fn test_verify_checksum_rejects_any_bit_flip() {
        let original = b"hello world".to_vec();

        for byte in 0..original.len() {
            for bit in 0..8 {
                let mut flipped = original.clone();
                flipped[byte] ^= 1 << bit;
                let err = verify_checksum(&flipped, HELLO_DIGEST).unwrap_err();
                assert!(matches!(err, PluginManagerError::ChecksumMismatch { .. }));
            }
        }
    }

    #[test]
    fn test_verify_checksum_mismatch_reports_digests() {
        let err = verify_checksum(b"hello", "sha256:DEADBEEF").unwrap_err();
        match err {
            PluginManagerError::ChecksumMismatch { expected, actual } => {
                assert_eq!(expected, "deadbeef");
                assert_eq!(actual, sha256_hex(b"hello"));
            }
            other => panic!("expected checksum mismatch, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_fetch_with_cancelled_token() {
        let fetcher = ArchiveFetcher::new(reqwest::Client::new());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = fetcher
            .fetch_and_verify("http://127.0.0.1:9/archive.tar.gz", HELLO_DIGEST, &cancel)
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(err.to_string(), "download cancelled");
    }
}
