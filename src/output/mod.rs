//! Output formatters for comparison results.
//!
//! - [`text`]: one `<Classification>:<path>-->...` line per file
//! - [`json`]: one JSON object per file, then a summary object

pub mod json;
pub mod text;

use std::io::Write;

pub use json::{JsonEvaluation, JsonOutput};
pub use text::TextOutput;

use crate::error::ExitCode;
use crate::matching::{Evaluation, EvaluationSummary};

/// Errors that can occur while writing results.
#[derive(thiserror::Error, Debug)]
pub enum OutputError {
    /// JSON serialization error
    #[error("JSON serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error during writing
    #[error("I/O error while writing results: {0}")]
    Io(#[from] std::io::Error),
}

/// Selected output formatter.
#[derive(Debug, Clone, Copy)]
pub enum Reporter {
    /// Text lines, optionally colored
    Text(TextOutput),
    /// JSON lines
    Json(JsonOutput),
}

impl Reporter {
    /// Report one evaluation.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    pub fn evaluation(
        &self,
        writer: &mut dyn Write,
        evaluation: &Evaluation<'_>,
    ) -> Result<(), OutputError> {
        match self {
            Self::Text(text) => text.write_evaluation(writer, evaluation)?,
            Self::Json(json) => json.write_evaluation(writer, evaluation)?,
        }
        Ok(())
    }

    /// Report the totals.
    ///
    /// Text summaries go to stderr so stdout stays one line per file.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    pub fn summary(
        &self,
        writer: &mut dyn Write,
        summary: &EvaluationSummary,
        exit_code: ExitCode,
        quiet: bool,
    ) -> Result<(), OutputError> {
        match self {
            Self::Text(text) => {
                if !quiet {
                    eprintln!("{}", text.format_summary(summary));
                }
            }
            Self::Json(json) => json.write_summary(writer, summary, exit_code)?,
        }
        Ok(())
    }
}
