//! Full builds and incremental refreshes of a [`DirectoryIndex`].
//!
//! Both operations walk the tree sequentially, then fingerprint on a
//! dedicated rayon pool of `io_threads` workers. Each (entry, plugin) job is
//! independent; results are merged back by entry position so traversal order
//! survives parallelism.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::Utc;
use rayon::prelude::*;

use super::{BuildOptions, DirectoryIndex, IndexEntry, IndexError};
use crate::plugins::{Fingerprint, FingerprintError, PluginHandle};
use crate::scanner::path_utils::{join_relative, RelativeKey};
use crate::scanner::Walker;

/// Counters reported by [`DirectoryIndex::refresh`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshStats {
    /// Files whose mtime and size did not change
    pub unchanged: usize,
    /// Files present before whose mtime or size changed
    pub changed: usize,
    /// Files that are new since the previous snapshot
    pub added: usize,
    /// Files of the previous snapshot that no longer exist
    pub removed: usize,
    /// Fingerprints computed during the refresh
    pub recomputed: usize,
    /// Fingerprints carried over from the previous snapshot
    pub reused_fingerprints: usize,
}

/// One fingerprint to compute: entry position and plugin position.
type Job = (usize, usize);

impl DirectoryIndex {
    /// Index every regular file under `root`.
    ///
    /// # Errors
    ///
    /// * [`IndexError::PathNotFound`] / [`IndexError::NotADirectory`] /
    ///   [`IndexError::Io`] when the root cannot be used
    /// * [`IndexError::Interrupted`] when the shutdown flag is raised
    ///
    /// Unreadable files are skipped or left without fingerprints, with a
    /// warning; they never fail the build.
    pub fn build(
        root: &Path,
        plugins: &[PluginHandle],
        options: &BuildOptions,
    ) -> Result<Self, IndexError> {
        let root = canonical_root(root)?;
        log::info!("Indexing {}", root.display());

        let mut entries = collect_entries(&root, options)?;
        let jobs: Vec<Job> = (0..entries.len())
            .flat_map(|e| (0..plugins.len()).map(move |p| (e, p)))
            .collect();
        fingerprint_entries(&root, &mut entries, &jobs, plugins, options)?;

        log::info!(
            "Indexed {} files under {} ({} plugin(s))",
            entries.len(),
            root.display(),
            plugins.len()
        );
        Ok(Self::from_parts(
            root,
            Utc::now(),
            plugins.iter().map(|p| p.id().to_string()).collect(),
            entries,
        ))
    }

    /// Bring the index up to date with the tree on disk.
    ///
    /// Fingerprints of files whose modification time (and size, when both
    /// snapshots know it) did not change are carried over for plugins that
    /// were already enabled; everything else is recomputed. Afterwards the
    /// enabled features are exactly `plugins`, as if the index had been
    /// rebuilt from scratch.
    ///
    /// The index is left untouched when an error is returned.
    ///
    /// # Errors
    ///
    /// Same as [`DirectoryIndex::build`].
    pub fn refresh(
        &mut self,
        plugins: &[PluginHandle],
        options: &BuildOptions,
    ) -> Result<RefreshStats, IndexError> {
        let root = canonical_root(&self.root)?;
        log::info!("Refreshing index of {}", root.display());

        let mut entries = collect_entries(&root, options)?;
        let previous: HashMap<&str, &IndexEntry> = self
            .entries
            .iter()
            .map(|e| (e.relative_path.as_str(), e))
            .collect();

        let mut stats = RefreshStats::default();
        let mut jobs: Vec<Job> = Vec::new();
        let mut still_present = 0;

        for (entry_idx, entry) in entries.iter_mut().enumerate() {
            let prior = previous.get(entry.relative_path.as_str());
            if prior.is_some() {
                still_present += 1;
            }

            match prior {
                Some(old) if old.is_unchanged(entry) => {
                    stats.unchanged += 1;
                    for (plugin_idx, plugin) in plugins.iter().enumerate() {
                        let id = plugin.id();
                        match old.fingerprint(id).filter(|_| self.has_feature(id)) {
                            Some(fingerprint) => {
                                entry
                                    .fingerprints
                                    .insert(id.to_string(), fingerprint.to_string());
                                stats.reused_fingerprints += 1;
                            }
                            None => jobs.push((entry_idx, plugin_idx)),
                        }
                    }
                }
                Some(_) => {
                    stats.changed += 1;
                    jobs.extend((0..plugins.len()).map(|p| (entry_idx, p)));
                }
                None => {
                    stats.added += 1;
                    jobs.extend((0..plugins.len()).map(|p| (entry_idx, p)));
                }
            }
        }
        stats.removed = self.entries.len() - still_present;

        stats.recomputed = fingerprint_entries(&root, &mut entries, &jobs, plugins, options)?;

        self.root = root;
        self.indexed_on = Utc::now();
        self.features = plugins.iter().map(|p| p.id().to_string()).collect();
        self.entries = entries;
        self.rebuild_lookups();

        log::info!(
            "Refreshed index: {} unchanged, {} changed, {} added, {} removed, {} fingerprint(s) reused, {} computed",
            stats.unchanged,
            stats.changed,
            stats.added,
            stats.removed,
            stats.reused_fingerprints,
            stats.recomputed
        );
        Ok(stats)
    }
}

fn canonical_root(root: &Path) -> Result<PathBuf, IndexError> {
    let metadata = std::fs::metadata(root).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => IndexError::PathNotFound(root.to_path_buf()),
        _ => IndexError::io(root, e),
    })?;
    if !metadata.is_dir() {
        return Err(IndexError::NotADirectory(root.to_path_buf()));
    }
    std::fs::canonicalize(root).map_err(|e| IndexError::io(root, e))
}

/// Walk `root` and record one entry per regular file, in traversal order.
fn collect_entries(root: &Path, options: &BuildOptions) -> Result<Vec<IndexEntry>, IndexError> {
    let mut walker = Walker::new(root, options.walker.clone());
    if let Some(flag) = &options.shutdown_flag {
        walker = walker.with_shutdown_flag(flag.clone());
    }

    if let Some(progress) = &options.progress {
        progress.on_phase_start("walking", 0);
    }

    let mut entries = Vec::new();
    for result in walker.walk() {
        let file = match result {
            Ok(file) => file,
            Err(e) => {
                log::warn!("Skipping unreadable entry: {}", e);
                continue;
            }
        };

        let Some(key) = RelativeKey::new(root, &file.path) else {
            if file.path.to_str().is_none() {
                log::warn!("Skipping {}: name is not valid UTF-8", file.path.display());
            } else {
                log::warn!("Skipping {}: not below {}", file.path.display(), root.display());
            }
            continue;
        };

        if let Some(progress) = &options.progress {
            progress.on_progress(entries.len() + 1, &key.path);
        }
        entries.push(IndexEntry {
            name: key.name,
            folder: key.folder,
            relative_path: key.path,
            modified: file.modified_epoch_secs(),
            size: Some(file.size),
            fingerprints: BTreeMap::new(),
        });
    }

    if let Some(progress) = &options.progress {
        progress.on_phase_end("walking");
    }

    if options.is_shutdown_requested() {
        log::info!("Indexing interrupted while walking {}", root.display());
        return Err(IndexError::Interrupted);
    }
    Ok(entries)
}

/// Run the fingerprint jobs and store the results into `entries`.
///
/// Returns the number of jobs executed.
fn fingerprint_entries(
    root: &Path,
    entries: &mut [IndexEntry],
    jobs: &[Job],
    plugins: &[PluginHandle],
    options: &BuildOptions,
) -> Result<usize, IndexError> {
    if jobs.is_empty() {
        return Ok(0);
    }

    if let Some(progress) = &options.progress {
        progress.on_phase_start("fingerprinting", jobs.len());
    }

    let snapshot: &[IndexEntry] = entries;
    let completed = AtomicUsize::new(0);
    let run = || -> Vec<Option<(usize, &'static str, Fingerprint)>> {
        jobs.par_iter()
            .map(|&(entry_idx, plugin_idx)| {
                if options.is_shutdown_requested() {
                    return None;
                }
                let entry = &snapshot[entry_idx];
                let plugin = &plugins[plugin_idx];
                let path = join_relative(root, &entry.relative_path);

                let outcome = match plugin.compute(&path) {
                    Ok(fingerprint) => Some((entry_idx, plugin.id(), fingerprint)),
                    Err(e @ FingerprintError::Inapplicable { .. }) => {
                        log::trace!("{}", e);
                        None
                    }
                    Err(e) => {
                        log::warn!("{}: {}", plugin.id(), e);
                        None
                    }
                };

                if let Some(progress) = &options.progress {
                    let done = completed.fetch_add(1, Ordering::Relaxed) + 1;
                    progress.on_progress(done, &entry.relative_path);
                    progress.on_item_completed(entry.size.unwrap_or(0));
                }
                outcome
            })
            .collect()
    };

    let results = match rayon::ThreadPoolBuilder::new()
        .num_threads(options.io_threads.max(1))
        .build()
    {
        Ok(pool) => pool.install(run),
        Err(e) => {
            log::warn!("Failed to create fingerprint thread pool ({}), using the global pool", e);
            run()
        }
    };

    if let Some(progress) = &options.progress {
        progress.on_phase_end("fingerprinting");
    }

    if options.is_shutdown_requested() {
        log::info!("Fingerprinting interrupted under {}", root.display());
        return Err(IndexError::Interrupted);
    }

    for (entry_idx, plugin_id, fingerprint) in results.into_iter().flatten() {
        entries[entry_idx]
            .fingerprints
            .insert(plugin_id.to_string(), fingerprint);
    }
    Ok(jobs.len())
}
