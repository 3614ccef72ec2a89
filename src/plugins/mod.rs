//! Fingerprint plugins.
//!
//! A plugin turns a file into a content-derived key and uses that key to find
//! equivalent files in a [`DirectoryIndex`]. Three plugins are built in:
//!
//! * [`digest::Blake3Digest`] (`blake3`): whole-file cryptographic digest.
//!   Hits are confirmed byte-for-byte and labelled [`Classification::Renamed`].
//! * [`digest::Sha1Digest`] (`sha1`): the same with SHA-1, for indexes
//!   fingerprinted that way.
//! * [`media::MediaChecksum`] (`media_checksum`): digest of the audio payload
//!   only, so retagged files still match. Hits are labelled
//!   [`Classification::Modified`].
//!
//! Plugins are registered statically in a [`PluginRegistry`]; there is no
//! runtime discovery.
//!
//! # Example
//!
//! ```no_run
//! use dirmatch::plugins::PluginRegistry;
//!
//! let registry = PluginRegistry::builtin();
//! let plugins = registry.select(&["blake3".to_string()]).unwrap();
//! assert_eq!(plugins[0].id(), "blake3");
//! ```

pub mod digest;
pub mod media;

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::index::{DirectoryIndex, IndexEntry};
use crate::matching::Classification;
use crate::scanner::files_identical;

pub use digest::{Blake3Digest, Sha1Digest};
pub use media::{FfmpegDigester, MediaChecksum, PayloadDigester};

/// Opaque fingerprint value, hex encoded by the built-in plugins.
pub type Fingerprint = String;

/// Shared handle to a plugin.
pub type PluginHandle = Arc<dyn FingerprintPlugin>;

/// Errors produced while fingerprinting a single file.
#[derive(thiserror::Error, Debug)]
pub enum FingerprintError {
    /// The file does not exist or cannot be read.
    #[error("Unable to read {path}: {source}")]
    Unreadable {
        /// File that could not be read
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: io::Error,
    },

    /// The plugin does not apply to this kind of file.
    ///
    /// This is an expected outcome, not a failure.
    #[error("{plugin} does not apply to {path}")]
    Inapplicable {
        /// Identifier of the plugin
        plugin: &'static str,
        /// File the plugin was asked about
        path: PathBuf,
    },
}

impl FingerprintError {
    /// Build an [`FingerprintError::Unreadable`] for `path`.
    #[must_use]
    pub fn unreadable(path: &Path, source: io::Error) -> Self {
        Self::Unreadable {
            path: path.to_path_buf(),
            source,
        }
    }

    /// Whether this is the silent "does not apply" outcome.
    #[must_use]
    pub fn is_inapplicable(&self) -> bool {
        matches!(self, Self::Inapplicable { .. })
    }
}

/// One index entry found equivalent to a candidate by a plugin.
#[derive(Debug, Clone, Copy)]
pub struct PluginMatch<'i> {
    /// Classification the plugin assigns to the hit
    pub label: Classification,
    /// The equivalent reference entry
    pub entry: &'i IndexEntry,
}

/// A pluggable fingerprint capability.
pub trait FingerprintPlugin: Send + Sync {
    /// Stable identifier, used as the feature name and the persisted entry key.
    fn id(&self) -> &'static str;

    /// One-line description for the `plugins` listing.
    fn description(&self) -> &'static str;

    /// Compute the fingerprint of a file from its content alone.
    ///
    /// # Errors
    ///
    /// [`FingerprintError::Unreadable`] when the file cannot be opened, and
    /// [`FingerprintError::Inapplicable`] when the plugin does not handle this
    /// kind of file.
    fn compute(&self, path: &Path) -> Result<Fingerprint, FingerprintError>;

    /// Classification assigned to hits of this plugin.
    fn label(&self) -> Classification;

    /// Whether a fingerprint describes empty or trivial content.
    ///
    /// Degenerate fingerprints collide for unrelated files (every zero-byte
    /// file has the same digest) and never count as evidence of equality.
    fn is_degenerate(&self, fingerprint: &str) -> bool;

    /// Whether hits must be confirmed with a byte-for-byte comparison.
    fn requires_byte_equality(&self) -> bool;

    /// Find index entries sharing this file's fingerprint.
    ///
    /// Hits are returned in index order. When byte confirmation is required,
    /// a hit is kept only if the reference file can be read and has the same
    /// content; a reference that is gone or unreadable never confirms.
    ///
    /// # Errors
    ///
    /// Propagates the errors of [`FingerprintPlugin::compute`] for the
    /// candidate.
    fn find_matches<'i>(
        &self,
        path: &Path,
        index: &'i DirectoryIndex,
    ) -> Result<Vec<PluginMatch<'i>>, FingerprintError> {
        let fingerprint = self.compute(path)?;
        if self.is_degenerate(&fingerprint) {
            log::trace!(
                "{}: degenerate fingerprint for {}, not matching",
                self.id(),
                path.display()
            );
            return Ok(Vec::new());
        }

        let mut matches = Vec::new();
        for entry in index.find_by_fingerprint(self.id(), Some(&fingerprint)) {
            if self.requires_byte_equality() {
                let reference = index.absolute_path(entry);
                match files_identical(path, &reference) {
                    Ok(true) => {}
                    Ok(false) => {
                        log::debug!(
                            "{}: fingerprint collision between {} and {}",
                            self.id(),
                            path.display(),
                            reference.display()
                        );
                        continue;
                    }
                    Err(e) => {
                        log::warn!(
                            "{}: cannot confirm {} against {}: {}",
                            self.id(),
                            path.display(),
                            reference.display(),
                            e
                        );
                        continue;
                    }
                }
            }
            matches.push(PluginMatch {
                label: self.label(),
                entry,
            });
        }
        Ok(matches)
    }
}

impl std::fmt::Debug for dyn FingerprintPlugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FingerprintPlugin")
            .field("id", &self.id())
            .finish()
    }
}

/// Errors raised while selecting plugins.
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum PluginError {
    /// No registered plugin has the requested identifier.
    #[error("Unknown plugin '{name}'{}", suggestion.as_ref().map(|s| format!(" (did you mean '{s}'?)")).unwrap_or_default())]
    Unknown {
        /// The requested identifier
        name: String,
        /// Closest registered identifier, if any is close enough
        suggestion: Option<String>,
    },
}

/// Statically registered set of plugins.
#[derive(Debug, Clone)]
pub struct PluginRegistry {
    plugins: Vec<PluginHandle>,
}

impl PluginRegistry {
    /// Registry holding the given plugins, in order.
    #[must_use]
    pub fn new(plugins: Vec<PluginHandle>) -> Self {
        Self { plugins }
    }

    /// The built-in plugins, with ffmpeg looked up on `PATH`.
    #[must_use]
    pub fn builtin() -> Self {
        Self::with_ffmpeg(Path::new(media::DEFAULT_FFMPEG))
    }

    /// The built-in plugins, running the given ffmpeg executable.
    #[must_use]
    pub fn with_ffmpeg(ffmpeg: &Path) -> Self {
        Self::new(vec![
            Arc::new(Blake3Digest::new()),
            Arc::new(Sha1Digest::new()),
            Arc::new(MediaChecksum::new(Arc::new(FfmpegDigester::new(ffmpeg)))),
        ])
    }

    /// Look up a plugin by identifier.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<PluginHandle> {
        self.plugins.iter().find(|p| p.id() == id).cloned()
    }

    /// All registered plugins.
    pub fn list(&self) -> impl Iterator<Item = &PluginHandle> {
        self.plugins.iter()
    }

    /// Resolve identifiers into plugins, dropping repeats.
    ///
    /// # Errors
    ///
    /// [`PluginError::Unknown`] for the first identifier that is not
    /// registered, with a suggestion when one is close.
    pub fn select(&self, ids: &[String]) -> Result<Vec<PluginHandle>, PluginError> {
        let mut selected: Vec<PluginHandle> = Vec::new();
        for id in ids {
            let plugin = self.get(id).ok_or_else(|| PluginError::Unknown {
                name: id.clone(),
                suggestion: self.suggest(id),
            })?;
            if !selected.iter().any(|p| p.id() == plugin.id()) {
                selected.push(plugin);
            }
        }
        Ok(selected)
    }

    fn suggest(&self, name: &str) -> Option<String> {
        self.plugins
            .iter()
            .map(|p| (p.id(), strsim::jaro_winkler(name, p.id())))
            .filter(|(_, score)| *score > 0.8)
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(id, _)| id.to_string())
    }
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}
