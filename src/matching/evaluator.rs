//! Evaluation of a whole target tree.
//!
//! The [`Evaluator`] walks the target, classifies each file with a
//! [`Matcher`] and, when configured, deletes files that have a reference
//! counterpart. Per-file problems are reported in the yielded
//! [`Evaluation`]s and never stop the walk.
//!
//! # Example
//!
//! ```no_run
//! use dirmatch::index::{BuildOptions, DirectoryIndex};
//! use dirmatch::matching::{Evaluator, EvaluatorConfig, Matcher, Outcome};
//! use std::path::Path;
//!
//! let index = DirectoryIndex::build(Path::new("/ref"), &[], &BuildOptions::default()).unwrap();
//! let evaluator = Evaluator::new(Matcher::new(&index, &[]), EvaluatorConfig::default());
//! for evaluation in evaluator.evaluate(Path::new("/target")).unwrap() {
//!     if let Outcome::Classified { result, .. } = &evaluation.outcome {
//!         println!("{}: {}", result.classification, evaluation.path.display());
//!     }
//! }
//! ```

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;

use super::{Classification, MatchError, MatchResult, Matcher};
use crate::actions::delete::{delete_verified, DeleteConfig, DeleteError, DeleteResult, FileSnapshot};
use crate::scanner::{FileEntry, ScanError, Walker, WalkerConfig};

/// Settings for an [`Evaluator`].
#[derive(Debug, Clone, Default)]
pub struct EvaluatorConfig {
    /// Traversal settings for the target tree
    pub walker: WalkerConfig,
    /// Delete files with a counterpart; `None` only reports
    pub delete: Option<DeleteConfig>,
    /// Optional shutdown flag for graceful termination
    pub shutdown_flag: Option<Arc<AtomicBool>>,
}

impl EvaluatorConfig {
    /// Set the traversal settings.
    #[must_use]
    pub fn with_walker(mut self, walker: WalkerConfig) -> Self {
        self.walker = walker;
        self
    }

    /// Delete files that have a counterpart.
    #[must_use]
    pub fn with_delete(mut self, delete: DeleteConfig) -> Self {
        self.delete = Some(delete);
        self
    }

    /// Set the shutdown flag for graceful termination.
    #[must_use]
    pub fn with_shutdown_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown_flag = Some(flag);
        self
    }

    fn is_shutdown_requested(&self) -> bool {
        self.shutdown_flag
            .as_ref()
            .is_some_and(|f| f.load(Ordering::SeqCst))
    }
}

/// Errors that stop an evaluation before any file is looked at.
#[derive(thiserror::Error, Debug)]
pub enum EvaluateError {
    /// The target does not exist.
    #[error("Target not found: {0}")]
    TargetNotFound(PathBuf),

    /// Deleting inside the target could remove reference files.
    #[error("Refusing to delete: target {target} overlaps the indexed directory {root}")]
    OverlapsReference {
        /// The target
        target: PathBuf,
        /// Root of the reference index
        root: PathBuf,
    },

    /// The target could not be inspected.
    #[error("I/O error on {path}: {source}")]
    Io {
        /// The target
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },
}

/// Reason a target file could not be evaluated.
#[derive(thiserror::Error, Debug)]
pub enum EvaluationError {
    /// Walking reported an error for this path.
    #[error(transparent)]
    Scan(#[from] ScanError),

    /// Matching failed.
    #[error(transparent)]
    Match(#[from] MatchError),

    /// The file could not be snapshotted for deletion.
    #[error(transparent)]
    Snapshot(#[from] DeleteError),
}

/// What happened to one target file.
#[derive(Debug)]
pub enum Outcome<'i> {
    /// The file was classified.
    Classified {
        /// Primary match result
        result: MatchResult<'i>,
        /// Deletion outcome; `None` when nothing was deleted or attempted
        deletion: Option<Result<DeleteResult, DeleteError>>,
    },
    /// The file could not be evaluated.
    Failed(EvaluationError),
}

/// One evaluated target file.
#[derive(Debug)]
pub struct Evaluation<'i> {
    /// Path of the target file
    pub path: PathBuf,
    /// What happened to it
    pub outcome: Outcome<'i>,
}

/// Walks a target tree and classifies its files.
#[derive(Debug)]
pub struct Evaluator<'i> {
    matcher: Matcher<'i>,
    config: EvaluatorConfig,
}

impl<'i> Evaluator<'i> {
    /// Create an evaluator.
    #[must_use]
    pub fn new(matcher: Matcher<'i>, config: EvaluatorConfig) -> Self {
        Self { matcher, config }
    }

    /// The matcher in use.
    #[must_use]
    pub fn matcher(&self) -> &Matcher<'i> {
        &self.matcher
    }

    /// Evaluate every file under `target`, or `target` itself if it is a file.
    ///
    /// The tree is listed up front; files are then classified (and deleted)
    /// one at a time as the iterator is consumed. Iteration stops early when
    /// the shutdown flag is raised.
    ///
    /// # Errors
    ///
    /// [`EvaluateError`] when the target does not exist, or deletion is
    /// requested and the target overlaps the indexed directory.
    pub fn evaluate(
        &self,
        target: &Path,
    ) -> Result<Box<dyn Iterator<Item = Evaluation<'i>> + '_>, EvaluateError> {
        let metadata = std::fs::metadata(target).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => EvaluateError::TargetNotFound(target.to_path_buf()),
            _ => EvaluateError::Io {
                path: target.to_path_buf(),
                source: e,
            },
        })?;
        self.check_overlap(target)?;

        if !metadata.is_dir() {
            log::debug!("Evaluating single file {}", target.display());
            let path = target.to_path_buf();
            return Ok(Box::new(
                std::iter::once(path)
                    .filter(move |_| !self.config.is_shutdown_requested())
                    .map(move |path| self.evaluate_file(path)),
            ));
        }

        let mut walker = Walker::new(target, self.config.walker.clone());
        if let Some(flag) = &self.config.shutdown_flag {
            walker = walker.with_shutdown_flag(flag.clone());
        }
        let listing: Vec<Result<FileEntry, ScanError>> = walker.walk().collect();
        log::debug!("Evaluating {} entries under {}", listing.len(), target.display());

        Ok(Box::new(listing.into_iter().map_while(move |item| {
            if self.config.is_shutdown_requested() {
                log::debug!("Evaluator: Shutdown requested, stopping iteration");
                return None;
            }
            Some(match item {
                Ok(file) => self.evaluate_file(file.path),
                Err(e) => {
                    log::warn!("Unable to evaluate: {}", e);
                    Evaluation {
                        path: e.path().to_path_buf(),
                        outcome: Outcome::Failed(e.into()),
                    }
                }
            })
        })))
    }

    fn check_overlap(&self, target: &Path) -> Result<(), EvaluateError> {
        if self.config.delete.is_none() {
            return Ok(());
        }
        let target = std::fs::canonicalize(target).map_err(|e| EvaluateError::Io {
            path: target.to_path_buf(),
            source: e,
        })?;
        let root = self.matcher.index().root();
        let root = std::fs::canonicalize(root).unwrap_or_else(|_| root.to_path_buf());

        if root.starts_with(&target) || target.starts_with(&root) {
            return Err(EvaluateError::OverlapsReference { target, root });
        }
        Ok(())
    }

    fn evaluate_file(&self, path: PathBuf) -> Evaluation<'i> {
        let snapshot = match self.config.delete {
            Some(_) => match FileSnapshot::capture(&path) {
                Ok(snapshot) => Some(snapshot),
                Err(e) => return Self::failed(path, e.into()),
            },
            None => None,
        };

        let result = match self.matcher.resolve(&path) {
            Ok(results) => results.into_iter().next().unwrap_or_else(MatchResult::missing),
            Err(e) => return Self::failed(path, e.into()),
        };

        let deletion = match (&self.config.delete, snapshot) {
            (Some(config), Some(snapshot)) if result.classification.has_counterpart() => {
                let deletion = delete_verified(&snapshot, config);
                if let Err(e) = &deletion {
                    log::warn!("Failed to delete {}: {}", path.display(), e);
                }
                Some(deletion)
            }
            _ => None,
        };

        Evaluation {
            path,
            outcome: Outcome::Classified { result, deletion },
        }
    }

    fn failed(path: PathBuf, error: EvaluationError) -> Evaluation<'i> {
        log::warn!("Unable to evaluate {}: {}", path.display(), error);
        Evaluation {
            path,
            outcome: Outcome::Failed(error),
        }
    }
}

/// Totals over an evaluation run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EvaluationSummary {
    /// Files looked at
    pub evaluated: usize,
    /// Files without counterpart
    pub missing: usize,
    /// Files with a same-name counterpart
    pub matched: usize,
    /// Files found under another name
    pub renamed: usize,
    /// Files whose payload matched
    pub modified: usize,
    /// Files that could not be evaluated
    pub failed: usize,
    /// Files deleted
    pub deleted: usize,
    /// Deletions that failed
    pub delete_failed: usize,
    /// Bytes freed by deletion
    pub bytes_freed: u64,
    /// Whether the run was cut short
    pub interrupted: bool,
}

impl EvaluationSummary {
    /// Account for one evaluation.
    pub fn record(&mut self, evaluation: &Evaluation<'_>) {
        self.evaluated += 1;
        match &evaluation.outcome {
            Outcome::Classified { result, deletion } => {
                match result.classification {
                    Classification::Missing => self.missing += 1,
                    Classification::Matched => self.matched += 1,
                    Classification::Renamed => self.renamed += 1,
                    Classification::Modified => self.modified += 1,
                }
                match deletion {
                    Some(Ok(deleted)) => {
                        self.deleted += 1;
                        self.bytes_freed += deleted.size;
                    }
                    Some(Err(_)) => self.delete_failed += 1,
                    None => {}
                }
            }
            Outcome::Failed(_) => self.failed += 1,
        }
    }

    /// Whether any file failed to evaluate or delete.
    #[must_use]
    pub fn has_failures(&self) -> bool {
        self.failed > 0 || self.delete_failed > 0
    }
}
