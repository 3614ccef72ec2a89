//! Whole-file digest plugins.
//!
//! [`Blake3Digest`] hashes through a memory map when possible, falling back
//! to streaming reads. [`Sha1Digest`] streams the file and exists so indexes
//! written with `sha1` fingerprints keep working. For both, the digest of
//! empty input is degenerate.

use std::fs::{self, File};
use std::io::{self, BufReader};
use std::path::Path;

use sha1::{Digest, Sha1};

use super::{Fingerprint, FingerprintError, FingerprintPlugin};
use crate::matching::Classification;

/// Identifier of the digest plugin.
pub const DIGEST_PLUGIN_ID: &str = "blake3";

/// Identifier of the SHA-1 digest plugin.
pub const SHA1_PLUGIN_ID: &str = "sha1";

/// SHA-1 of empty input.
const SHA1_EMPTY: &str = "da39a3ee5e6b4b0d3255bfef95601890afd80709";

fn require_regular_file(path: &Path) -> Result<(), FingerprintError> {
    let metadata = fs::metadata(path).map_err(|e| FingerprintError::unreadable(path, e))?;
    if metadata.is_file() {
        Ok(())
    } else {
        Err(FingerprintError::unreadable(
            path,
            io::Error::new(io::ErrorKind::InvalidInput, "not a regular file"),
        ))
    }
}

/// Whole-file BLAKE3 digest.
#[derive(Debug, Clone)]
pub struct Blake3Digest {
    empty_digest: String,
}

impl Blake3Digest {
    /// Create the plugin.
    #[must_use]
    pub fn new() -> Self {
        Self {
            empty_digest: blake3::hash(b"").to_hex().to_string(),
        }
    }
}

impl Default for Blake3Digest {
    fn default() -> Self {
        Self::new()
    }
}

impl FingerprintPlugin for Blake3Digest {
    fn id(&self) -> &'static str {
        DIGEST_PLUGIN_ID
    }

    fn description(&self) -> &'static str {
        "BLAKE3 digest of the whole file; finds byte-identical files under other names"
    }

    fn compute(&self, path: &Path) -> Result<Fingerprint, FingerprintError> {
        require_regular_file(path)?;

        let mut hasher = blake3::Hasher::new();
        hasher
            .update_mmap(path)
            .map_err(|e| FingerprintError::unreadable(path, e))?;
        Ok(hasher.finalize().to_hex().to_string())
    }

    fn label(&self) -> Classification {
        Classification::Renamed
    }

    fn is_degenerate(&self, fingerprint: &str) -> bool {
        fingerprint == self.empty_digest
    }

    fn requires_byte_equality(&self) -> bool {
        true
    }
}

/// Whole-file SHA-1 digest.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha1Digest;

impl Sha1Digest {
    /// Create the plugin.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl FingerprintPlugin for Sha1Digest {
    fn id(&self) -> &'static str {
        SHA1_PLUGIN_ID
    }

    fn description(&self) -> &'static str {
        "SHA-1 digest of the whole file; reads indexes fingerprinted with sha1"
    }

    fn compute(&self, path: &Path) -> Result<Fingerprint, FingerprintError> {
        require_regular_file(path)?;

        let file = File::open(path).map_err(|e| FingerprintError::unreadable(path, e))?;
        let mut hasher = Sha1::new();
        io::copy(&mut BufReader::new(file), &mut hasher)
            .map_err(|e| FingerprintError::unreadable(path, e))?;
        Ok(hasher.finalize().iter().map(|b| format!("{b:02x}")).collect())
    }

    fn label(&self) -> Classification {
        Classification::Renamed
    }

    fn is_degenerate(&self, fingerprint: &str) -> bool {
        fingerprint.eq_ignore_ascii_case(SHA1_EMPTY)
    }

    fn requires_byte_equality(&self) -> bool {
        true
    }
}
