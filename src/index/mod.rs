//! Persistent snapshot of a reference tree.
//!
//! A [`DirectoryIndex`] records every regular file under a root together with
//! its modification time, size and the fingerprints of the enabled plugins.
//! Snapshots are built with [`DirectoryIndex::build`], brought up to date with
//! [`DirectoryIndex::refresh`] and stored as JSON with
//! [`DirectoryIndex::save`] / [`DirectoryIndex::load`].
//!
//! # Example
//!
//! ```no_run
//! use dirmatch::index::{BuildOptions, DirectoryIndex};
//! use dirmatch::plugins::PluginRegistry;
//! use std::path::Path;
//!
//! let plugins = PluginRegistry::builtin().select(&["blake3".to_string()]).unwrap();
//! let index = DirectoryIndex::build(Path::new("/music"), &plugins, &BuildOptions::default()).unwrap();
//! index.save(Path::new("music.json")).unwrap();
//!
//! for entry in index.find_by_name("song.mp3") {
//!     println!("{}", entry.relative_path);
//! }
//! ```

pub mod builder;
pub mod persist;

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::plugins::PluginHandle;
use crate::progress::ProgressCallback;
use crate::scanner::path_utils::{join_relative, normalize_name};
use crate::scanner::WalkerConfig;

pub use builder::RefreshStats;

/// One file of an indexed tree.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntry {
    /// Base name as spelled on disk
    pub name: String,
    /// Containing directory relative to the root, empty at the root
    pub folder: String,
    /// Path relative to the root, `/`-separated; unique within an index
    pub relative_path: String,
    /// Modification time in epoch seconds
    pub modified: Option<f64>,
    /// Size in bytes
    pub size: Option<u64>,
    /// Plugin id to fingerprint; a missing key means not fingerprinted
    pub fingerprints: BTreeMap<String, String>,
}

impl IndexEntry {
    /// Fingerprint recorded for a plugin.
    #[must_use]
    pub fn fingerprint(&self, plugin_id: &str) -> Option<&str> {
        self.fingerprints.get(plugin_id).map(String::as_str)
    }

    /// Whether `current` describes the same unchanged file.
    ///
    /// Requires both modification times to be known and equal. Sizes are
    /// compared only when both snapshots recorded one.
    #[must_use]
    pub fn is_unchanged(&self, current: &IndexEntry) -> bool {
        let same_mtime = matches!(
            (self.modified, current.modified),
            (Some(a), Some(b)) if a == b
        );
        let same_size = match (self.size, current.size) {
            (Some(a), Some(b)) => a == b,
            _ => true,
        };
        same_mtime && same_size
    }
}

/// Errors raised by index operations.
#[derive(thiserror::Error, Debug)]
pub enum IndexError {
    /// The root does not exist.
    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),

    /// The root is not a directory.
    #[error("Not a directory: {0}")]
    NotADirectory(PathBuf),

    /// A requested plugin was not enabled when the index was built.
    #[error("Index of {root} has no '{feature}' fingerprints; refresh it with --plugin {feature}")]
    MissingFeature {
        /// The missing plugin id
        feature: String,
        /// Root of the index
        root: PathBuf,
    },

    /// A persisted index failed validation.
    #[error("Corrupt index {path}: {reason}")]
    Corrupt {
        /// The index file
        path: PathBuf,
        /// What is wrong with it
        reason: String,
    },

    /// Reading or writing a file failed.
    #[error("I/O error on {path}: {source}")]
    Io {
        /// The file or directory
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The operation was cancelled before completion.
    #[error("Interrupted")]
    Interrupted,
}

impl IndexError {
    pub(crate) fn corrupt(path: &Path, reason: impl Into<String>) -> Self {
        Self::Corrupt {
            path: path.to_path_buf(),
            reason: reason.into(),
        }
    }

    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Options for [`DirectoryIndex::build`] and [`DirectoryIndex::refresh`].
#[derive(Clone)]
pub struct BuildOptions {
    /// Traversal settings
    pub walker: WalkerConfig,
    /// Number of threads used for fingerprinting.
    /// Default is 4 to prevent disk thrashing.
    pub io_threads: usize,
    /// Optional shutdown flag for graceful termination
    pub shutdown_flag: Option<Arc<AtomicBool>>,
    /// Optional progress callback
    pub progress: Option<Arc<dyn ProgressCallback>>,
}

impl std::fmt::Debug for BuildOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuildOptions")
            .field("walker", &self.walker)
            .field("io_threads", &self.io_threads)
            .field("shutdown_flag", &self.shutdown_flag)
            .field("progress", &self.progress.as_ref().map(|_| "<callback>"))
            .finish()
    }
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            walker: WalkerConfig::default(),
            io_threads: 4,
            shutdown_flag: None,
            progress: None,
        }
    }
}

impl BuildOptions {
    /// Set the traversal settings.
    #[must_use]
    pub fn with_walker(mut self, walker: WalkerConfig) -> Self {
        self.walker = walker;
        self
    }

    /// Set the number of fingerprinting threads.
    #[must_use]
    pub fn with_io_threads(mut self, threads: usize) -> Self {
        self.io_threads = threads.max(1);
        self
    }

    /// Set the shutdown flag for graceful termination.
    #[must_use]
    pub fn with_shutdown_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown_flag = Some(flag);
        self
    }

    /// Set the progress callback.
    #[must_use]
    pub fn with_progress_callback(mut self, callback: Arc<dyn ProgressCallback>) -> Self {
        self.progress = Some(callback);
        self
    }

    pub(crate) fn is_shutdown_requested(&self) -> bool {
        self.shutdown_flag
            .as_ref()
            .is_some_and(|f| f.load(Ordering::SeqCst))
    }
}

/// Snapshot of a directory tree.
#[derive(Debug, Clone)]
pub struct DirectoryIndex {
    root: PathBuf,
    indexed_on: DateTime<Utc>,
    features: Vec<String>,
    entries: Vec<IndexEntry>,
    by_name: HashMap<String, Vec<usize>>,
    by_fingerprint: HashMap<String, HashMap<String, Vec<usize>>>,
}

impl DirectoryIndex {
    /// Assemble an index from validated parts.
    pub(crate) fn from_parts(
        root: PathBuf,
        indexed_on: DateTime<Utc>,
        features: Vec<String>,
        entries: Vec<IndexEntry>,
    ) -> Self {
        let mut index = Self {
            root,
            indexed_on,
            features,
            entries,
            by_name: HashMap::new(),
            by_fingerprint: HashMap::new(),
        };
        index.rebuild_lookups();
        index
    }

    fn rebuild_lookups(&mut self) {
        self.by_name.clear();
        self.by_fingerprint.clear();
        for (idx, entry) in self.entries.iter().enumerate() {
            self.by_name
                .entry(normalize_name(&entry.name).into_owned())
                .or_default()
                .push(idx);
            for (plugin, fingerprint) in &entry.fingerprints {
                self.by_fingerprint
                    .entry(plugin.clone())
                    .or_default()
                    .entry(fingerprint.clone())
                    .or_default()
                    .push(idx);
            }
        }
    }

    /// Absolute root the index was built against.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// When the index was created or last refreshed.
    #[must_use]
    pub fn indexed_on(&self) -> DateTime<Utc> {
        self.indexed_on
    }

    /// Plugin ids whose fingerprints the index carries.
    #[must_use]
    pub fn features(&self) -> &[String] {
        &self.features
    }

    /// Whether fingerprints of a plugin were computed for this index.
    #[must_use]
    pub fn has_feature(&self, plugin_id: &str) -> bool {
        self.features.iter().any(|f| f == plugin_id)
    }

    /// Check that every plugin is enabled in this index.
    ///
    /// # Errors
    ///
    /// [`IndexError::MissingFeature`] naming the first plugin that is not.
    pub fn require_features(&self, plugins: &[PluginHandle]) -> Result<(), IndexError> {
        match plugins.iter().find(|p| !self.has_feature(p.id())) {
            Some(plugin) => Err(IndexError::MissingFeature {
                feature: plugin.id().to_string(),
                root: self.root.clone(),
            }),
            None => Ok(()),
        }
    }

    /// Entries in traversal order.
    #[must_use]
    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the index has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sum of the recorded file sizes.
    #[must_use]
    pub fn total_size(&self) -> u64 {
        self.entries.iter().filter_map(|e| e.size).sum()
    }

    /// Location of an entry on disk.
    #[must_use]
    pub fn absolute_path(&self, entry: &IndexEntry) -> PathBuf {
        join_relative(&self.root, &entry.relative_path)
    }

    /// Entries with this base name, in index order.
    #[must_use]
    pub fn find_by_name(&self, name: &str) -> Vec<&IndexEntry> {
        self.lookup(self.by_name.get(normalize_name(name).as_ref()))
    }

    /// Entries whose fingerprint for `plugin_id` equals `fingerprint`.
    ///
    /// `None` never matches anything.
    #[must_use]
    pub fn find_by_fingerprint(&self, plugin_id: &str, fingerprint: Option<&str>) -> Vec<&IndexEntry> {
        let Some(fingerprint) = fingerprint else {
            return Vec::new();
        };
        self.lookup(
            self.by_fingerprint
                .get(plugin_id)
                .and_then(|by_value| by_value.get(fingerprint)),
        )
    }

    fn lookup(&self, positions: Option<&Vec<usize>>) -> Vec<&IndexEntry> {
        positions
            .map(|positions| positions.iter().map(|&i| &self.entries[i]).collect())
            .unwrap_or_default()
    }
}
