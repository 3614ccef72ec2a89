//! JSON-lines output for scripting and automation.
//!
//! # Output Schema
//!
//! One object per evaluated file, then one summary object:
//!
//! ```json
//! {"path":"/target/c.txt","classification":"Renamed","matched":"a.txt","source":"blake3"}
//! {"path":"/target/new.txt","classification":"Missing"}
//! {"path":"/target/copy.txt","classification":"Matched","matched":"copy.txt","source":"name","deleted":true}
//! {"path":"/target/locked","error":"permission denied: /target/locked"}
//! {"summary":{"evaluated":4,"missing":1,"matched":1,"renamed":1,"modified":0,"failed":1,
//!   "deleted":1,"delete_failed":0,"bytes_freed":12,"interrupted":false,
//!   "exit_code":3,"exit_code_name":"DM003"}}
//! ```

use std::io::Write;

use serde::Serialize;

use super::OutputError;
use crate::error::ExitCode;
use crate::matching::{Classification, Evaluation, EvaluationSummary, Outcome};

/// A single evaluated file in JSON format.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct JsonEvaluation {
    /// Target file path
    pub path: String,
    /// Classification, absent when evaluation failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub classification: Option<Classification>,
    /// Relative path of the matched reference entry
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched: Option<String>,
    /// Mechanism that produced the match
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// Whether the file was deleted; absent when deletion was not attempted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted: Option<bool>,
    /// Evaluation or deletion error
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl JsonEvaluation {
    /// Convert an evaluation.
    #[must_use]
    pub fn from_evaluation(evaluation: &Evaluation<'_>) -> Self {
        let path = evaluation.path.to_string_lossy().into_owned();
        match &evaluation.outcome {
            Outcome::Classified { result, deletion } => Self {
                path,
                classification: Some(result.classification),
                matched: result.matched_entry.map(|e| e.relative_path.clone()),
                source: result.source.map(|s| s.to_string()),
                deleted: deletion.as_ref().map(Result::is_ok),
                error: deletion
                    .as_ref()
                    .and_then(|d| d.as_ref().err())
                    .map(ToString::to_string),
            },
            Outcome::Failed(error) => Self {
                path,
                classification: None,
                matched: None,
                source: None,
                deleted: None,
                error: Some(error.to_string()),
            },
        }
    }
}

/// Summary record in JSON format.
#[derive(Debug, Clone, Serialize)]
pub struct JsonSummary {
    /// Evaluation totals
    #[serde(flatten)]
    pub totals: EvaluationSummary,
    /// The exit code number
    pub exit_code: i32,
    /// The machine-readable exit code name (e.g., "DM000")
    pub exit_code_name: String,
}

#[derive(Serialize)]
struct SummaryRecord<'a> {
    summary: &'a JsonSummary,
}

/// Writer of JSON lines.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonOutput;

impl JsonOutput {
    /// Create a JSON-lines writer.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Write one evaluation as a line.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or writing fails.
    pub fn write_evaluation<W: Write + ?Sized>(
        &self,
        writer: &mut W,
        evaluation: &Evaluation<'_>,
    ) -> Result<(), OutputError> {
        let record = JsonEvaluation::from_evaluation(evaluation);
        writeln!(writer, "{}", serde_json::to_string(&record)?)?;
        Ok(())
    }

    /// Write the summary line.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or writing fails.
    pub fn write_summary<W: Write + ?Sized>(
        &self,
        writer: &mut W,
        summary: &EvaluationSummary,
        exit_code: ExitCode,
    ) -> Result<(), OutputError> {
        let summary = JsonSummary {
            totals: summary.clone(),
            exit_code: exit_code.as_i32(),
            exit_code_name: exit_code.code_prefix().to_string(),
        };
        writeln!(
            writer,
            "{}",
            serde_json::to_string(&SummaryRecord { summary: &summary })?
        )?;
        Ok(())
    }
}
