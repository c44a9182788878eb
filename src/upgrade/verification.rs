use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use std::path::Path;
use tokio::io::AsyncReadExt;
use tracing::{debug, info};

use crate::core::UpdateError;

/// Incremental SHA-256 check of a download.
///
/// The digest is fed chunk by chunk while the body streams to disk, so a
/// corrupted installer is rejected before it is renamed into place and never
/// reaches `ReadyToInstall`.
///
/// Expected checksums are accepted as bare hex or with a `sha256:` prefix, in
/// either case.
///
/// # Examples
///
/// ```rust
/// use branchbook_updater::upgrade::verification::ChecksumVerifier;
/// use std::path::Path;
///
/// let mut verifier = ChecksumVerifier::new(
///     "sha256:2CF24DBA5FB0A30E26E83B2AC5B9E29E1B161E5C1FA7425E73043362938B9824",
/// )
/// .unwrap();
/// verifier.update(b"hello");
/// assert!(verifier.finish(Path::new("hello.txt")).is_ok());
/// ```
#[derive(Clone)]
pub struct ChecksumVerifier {
    expected: String,
    hasher: Sha256,
}

impl ChecksumVerifier {
    pub fn new(expected: &str) -> Result<Self, UpdateError> {
        let expected = normalize(expected);
        match hex::decode(&expected) {
            Ok(bytes) if bytes.len() == 32 => Ok(Self {
                expected,
                hasher: Sha256::new(),
            }),
            _ => Err(UpdateError::RegistryResponse {
                reason: format!("'{expected}' is not a SHA-256 checksum"),
            }),
        }
    }

    pub fn update(&mut self, chunk: &[u8]) {
        self.hasher.update(chunk);
    }

    /// Compare the digest of everything fed so far with the expected value.
    pub fn finish(self, path: &Path) -> Result<String, UpdateError> {
        let actual = hex::encode(self.hasher.finalize());
        if actual != self.expected {
            return Err(UpdateError::ChecksumMismatch {
                path: path.display().to_string(),
                expected: self.expected,
                actual,
            });
        }
        debug!("Checksum verified for {}", path.display());
        Ok(actual)
    }
}

fn normalize(checksum: &str) -> String {
    let trimmed = checksum.trim();
    let bare = trimmed
        .strip_prefix("sha256:")
        .or_else(|| trimmed.strip_prefix("SHA256:"))
        .unwrap_or(trimmed);
    bare.to_ascii_lowercase()
}

/// Hex SHA-256 of a file on disk, read in fixed-size blocks.
pub async fn compute_sha256(path: &Path) -> Result<String> {
    info!("Computing SHA-256 for {}", path.display());

    let mut file = tokio::fs::File::open(path)
        .await
        .with_context(|| format!("Failed to open {}", path.display()))?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; 64 * 1024];
    loop {
        let read = file
            .read(&mut buf)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        if read == 0 {
            break;
        }
        hasher.update(&buf[..read]);
    }

    Ok(hex::encode(hasher.finalize()))
}
