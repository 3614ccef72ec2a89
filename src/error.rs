//! Structured error handling and exit codes.

use serde::Serialize;

use crate::matching::EvaluationSummary;

/// Exit codes for dirmatch.
///
/// - 0: Success
/// - 1: General error (unreadable root, corrupt index, unknown plugin, ...)
/// - 3: Partial success (some files failed to evaluate or delete)
/// - 130: Interrupted by user (Ctrl+C)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ExitCode {
    /// Completed normally.
    Success = 0,
    /// An error stopped the operation.
    GeneralError = 1,
    /// Completed, but some files could not be evaluated or deleted.
    PartialSuccess = 3,
    /// Interrupted by user (Ctrl+C).
    Interrupted = 130,
}

impl ExitCode {
    /// Get the numeric exit code.
    #[must_use]
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Get the machine-readable code prefix.
    #[must_use]
    pub fn code_prefix(self) -> &'static str {
        match self {
            Self::Success => "DM000",
            Self::GeneralError => "DM001",
            Self::PartialSuccess => "DM003",
            Self::Interrupted => "DM130",
        }
    }

    /// Exit code of a completed comparison.
    #[must_use]
    pub fn from_summary(summary: &EvaluationSummary) -> Self {
        if summary.interrupted {
            Self::Interrupted
        } else if summary.has_failures() {
            Self::PartialSuccess
        } else {
            Self::Success
        }
    }
}

/// Structured error information for JSON output.
#[derive(Debug, Serialize)]
pub struct StructuredError {
    /// The error code (e.g., "DM001")
    pub code: String,
    /// The exit code number
    pub exit_code: i32,
    /// Human-readable error message, including its causes
    pub message: String,
    /// Whether the operation was interrupted
    pub interrupted: bool,
}

impl StructuredError {
    /// Create a new structured error from an anyhow error and an exit code.
    #[must_use]
    pub fn new(err: &anyhow::Error, exit_code: ExitCode) -> Self {
        Self {
            code: exit_code.code_prefix().to_string(),
            exit_code: exit_code.as_i32(),
            message: format!("{err:#}"),
            interrupted: exit_code == ExitCode::Interrupted,
        }
    }
}
