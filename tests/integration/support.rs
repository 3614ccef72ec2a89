//! Shared fixtures for the integration tests.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use dirmatch::index::{BuildOptions, DirectoryIndex};
use dirmatch::matching::Classification;
use dirmatch::plugins::{
    Blake3Digest, Fingerprint, FingerprintError, FingerprintPlugin, MediaChecksum,
    PayloadDigester, PluginHandle,
};

/// Write `content` at `root/rel`, creating parent directories.
pub fn write(root: &Path, rel: &str, content: impl AsRef<[u8]>) -> PathBuf {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(&path, content).unwrap();
    path
}

pub fn digest() -> Vec<PluginHandle> {
    vec![Arc::new(Blake3Digest::new())]
}

pub fn media() -> Vec<PluginHandle> {
    vec![Arc::new(MediaChecksum::new(Arc::new(TagStrippingDigester)))]
}

pub fn build(root: &Path, plugins: &[PluginHandle]) -> DirectoryIndex {
    DirectoryIndex::build(root, plugins, &BuildOptions::default()).unwrap()
}

/// Stand-in for ffmpeg: the "payload" of a fake audio file is every line
/// that is not a `TAG:` line.
pub struct TagStrippingDigester;

impl PayloadDigester for TagStrippingDigester {
    fn payload_digest(&self, path: &Path) -> io::Result<Option<String>> {
        let content = fs::read_to_string(path)?;
        let payload: Vec<&str> = content.lines().filter(|l| !l.starts_with("TAG:")).collect();
        if payload.is_empty() {
            return Ok(Some(self.empty_payload_digest().to_string()));
        }
        Ok(Some(
            blake3::hash(payload.join("\n").as_bytes()).to_hex().to_string(),
        ))
    }
}

/// BLAKE3 digest that counts how often it is computed.
pub struct CountingDigest {
    inner: Blake3Digest,
    calls: AtomicUsize,
}

impl CountingDigest {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: Blake3Digest::new(),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.calls.store(0, Ordering::SeqCst);
    }
}

impl FingerprintPlugin for CountingDigest {
    fn id(&self) -> &'static str {
        self.inner.id()
    }

    fn description(&self) -> &'static str {
        "counting digest"
    }

    fn compute(&self, path: &Path) -> Result<Fingerprint, FingerprintError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.compute(path)
    }

    fn label(&self) -> Classification {
        self.inner.label()
    }

    fn is_degenerate(&self, fingerprint: &str) -> bool {
        self.inner.is_degenerate(fingerprint)
    }

    fn requires_byte_equality(&self) -> bool {
        self.inner.requires_byte_equality()
    }
}

/// BLAKE3 digest that cannot read any file with the given name.
pub struct FailingDigest {
    inner: Blake3Digest,
    unreadable: &'static str,
}

impl FailingDigest {
    pub fn new(unreadable: &'static str) -> Arc<Self> {
        Arc::new(Self {
            inner: Blake3Digest::new(),
            unreadable,
        })
    }
}

impl FingerprintPlugin for FailingDigest {
    fn id(&self) -> &'static str {
        self.inner.id()
    }

    fn description(&self) -> &'static str {
        "failing digest"
    }

    fn compute(&self, path: &Path) -> Result<Fingerprint, FingerprintError> {
        if path.file_name().is_some_and(|n| n == self.unreadable) {
            return Err(FingerprintError::unreadable(
                path,
                io::Error::from(io::ErrorKind::PermissionDenied),
            ));
        }
        self.inner.compute(path)
    }

    fn label(&self) -> Classification {
        self.inner.label()
    }

    fn is_degenerate(&self, fingerprint: &str) -> bool {
        self.inner.is_degenerate(fingerprint)
    }

    fn requires_byte_equality(&self) -> bool {
        self.inner.requires_byte_equality()
    }
}
