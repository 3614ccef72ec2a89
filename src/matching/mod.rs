//! Classification of target files against a reference index.
//!
//! [`Matcher`] resolves one candidate file; [`Evaluator`] walks a target tree,
//! resolves every file and optionally deletes the confirmed ones.

pub mod evaluator;
pub mod matcher;

use std::fmt;

use serde::Serialize;

use crate::index::IndexEntry;

pub use evaluator::{
    EvaluateError, Evaluation, EvaluationError, EvaluationSummary, Evaluator, EvaluatorConfig,
    Outcome,
};
pub use matcher::{MatchError, Matcher};

/// How a target file relates to the reference tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Classification {
    /// No counterpart in the reference
    Missing,
    /// Same name and same content, or a plugin hit under the same name
    Matched,
    /// Byte-identical content under a different name
    Renamed,
    /// Equivalent payload with differing metadata
    Modified,
}

impl Classification {
    /// Name used in output lines.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Missing => "Missing",
            Self::Matched => "Matched",
            Self::Renamed => "Renamed",
            Self::Modified => "Modified",
        }
    }

    /// Whether a reference counterpart exists.
    #[must_use]
    pub fn has_counterpart(self) -> bool {
        !matches!(self, Self::Missing)
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mechanism that justified a classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchSource {
    /// Equal name confirmed by byte comparison
    NameAndContent,
    /// Fingerprint hit of the named plugin
    Plugin(&'static str),
}

impl fmt::Display for MatchSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NameAndContent => f.write_str("name"),
            Self::Plugin(id) => f.write_str(id),
        }
    }
}

/// Outcome of matching one target file.
#[derive(Debug, Clone, Copy)]
pub struct MatchResult<'i> {
    /// The classification
    pub classification: Classification,
    /// Reference entry that justified it; `None` when Missing
    pub matched_entry: Option<&'i IndexEntry>,
    /// Mechanism that produced it; `None` when Missing
    pub source: Option<MatchSource>,
}

impl<'i> MatchResult<'i> {
    /// The result for a file without counterpart.
    #[must_use]
    pub fn missing() -> Self {
        Self {
            classification: Classification::Missing,
            matched_entry: None,
            source: None,
        }
    }

    /// A result justified by `entry`.
    #[must_use]
    pub fn found(classification: Classification, entry: &'i IndexEntry, source: MatchSource) -> Self {
        Self {
            classification,
            matched_entry: Some(entry),
            source: Some(source),
        }
    }
}
