//! Resolution of a single candidate file against an index.
//!
//! Rules, in order:
//! 1. Entries with the same name whose content is byte-identical: `Matched`.
//! 2. Fingerprint hits of every enabled plugin, in plugin order. A hit under
//!    the candidate's own name is `Matched`, otherwise the plugin's label.
//! 3. Otherwise a single `Missing`.
//!
//! Results keep index order, so `results[0]` is the first discovered entry.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use super::{Classification, MatchResult, MatchSource};
use crate::index::DirectoryIndex;
use crate::plugins::{FingerprintError, PluginHandle};
use crate::scanner::files_identical;
use crate::scanner::path_utils::{file_name_key, names_equal};

/// Errors that prevent a candidate from being classified.
#[derive(thiserror::Error, Debug)]
pub enum MatchError {
    /// The candidate cannot be read.
    #[error("{path}: {source}")]
    Unreadable {
        /// The candidate
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: io::Error,
    },

    /// The candidate is not a regular file.
    #[error("{0}: not a regular file")]
    NotAFile(PathBuf),

    /// A plugin failed on the candidate.
    #[error(transparent)]
    Fingerprint(#[from] FingerprintError),
}

/// Classifies candidate files against one index.
#[derive(Debug)]
pub struct Matcher<'i> {
    index: &'i DirectoryIndex,
    plugins: Vec<PluginHandle>,
}

impl<'i> Matcher<'i> {
    /// Create a matcher over `index`.
    ///
    /// Plugins whose feature the index does not carry are left out.
    #[must_use]
    pub fn new(index: &'i DirectoryIndex, plugins: &[PluginHandle]) -> Self {
        let plugins = plugins
            .iter()
            .filter(|p| {
                let enabled = index.has_feature(p.id());
                if !enabled {
                    log::debug!(
                        "Plugin {} is not enabled in the index of {}, not using it",
                        p.id(),
                        index.root().display()
                    );
                }
                enabled
            })
            .cloned()
            .collect();
        Self { index, plugins }
    }

    /// The index candidates are matched against.
    #[must_use]
    pub fn index(&self) -> &'i DirectoryIndex {
        self.index
    }

    /// Plugins in use, in resolution order.
    #[must_use]
    pub fn plugins(&self) -> &[PluginHandle] {
        &self.plugins
    }

    /// Classify `candidate`.
    ///
    /// The returned list is never empty.
    ///
    /// # Errors
    ///
    /// [`MatchError`] when the candidate cannot be read or fingerprinted.
    pub fn resolve(&self, candidate: &Path) -> Result<Vec<MatchResult<'i>>, MatchError> {
        let metadata = std::fs::metadata(candidate).map_err(|e| MatchError::Unreadable {
            path: candidate.to_path_buf(),
            source: e,
        })?;
        if !metadata.is_file() {
            return Err(MatchError::NotAFile(candidate.to_path_buf()));
        }
        let name =
            file_name_key(candidate).ok_or_else(|| MatchError::NotAFile(candidate.to_path_buf()))?;
        File::open(candidate).map_err(|e| MatchError::Unreadable {
            path: candidate.to_path_buf(),
            source: e,
        })?;

        let by_name = self.match_by_name(candidate, &name);
        if !by_name.is_empty() {
            return Ok(by_name);
        }

        let by_plugin = self.match_by_plugins(candidate, &name)?;
        if !by_plugin.is_empty() {
            return Ok(by_plugin);
        }

        Ok(vec![MatchResult::missing()])
    }

    fn match_by_name(&self, candidate: &Path, name: &str) -> Vec<MatchResult<'i>> {
        let mut results = Vec::new();
        for entry in self.index.find_by_name(name) {
            let reference = self.index.absolute_path(entry);
            match files_identical(candidate, &reference) {
                Ok(true) => results.push(MatchResult::found(
                    Classification::Matched,
                    entry,
                    MatchSource::NameAndContent,
                )),
                Ok(false) => {}
                Err(e) => log::warn!(
                    "Cannot compare {} with reference {}: {}",
                    candidate.display(),
                    reference.display(),
                    e
                ),
            }
        }
        results
    }

    fn match_by_plugins(
        &self,
        candidate: &Path,
        name: &str,
    ) -> Result<Vec<MatchResult<'i>>, MatchError> {
        let mut results = Vec::new();
        for plugin in &self.plugins {
            let hits = match plugin.find_matches(candidate, self.index) {
                Ok(hits) => hits,
                Err(e @ FingerprintError::Inapplicable { .. }) => {
                    log::trace!("{}", e);
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            for hit in hits {
                let classification = if names_equal(&hit.entry.name, name) {
                    Classification::Matched
                } else {
                    hit.label
                };
                results.push(MatchResult::found(
                    classification,
                    hit.entry,
                    MatchSource::Plugin(plugin.id()),
                ));
            }
        }
        Ok(results)
    }
}
