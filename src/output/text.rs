//! Line-oriented text output.
//!
//! One line per target file:
//!
//! ```text
//! Missing:/target/new.txt-->|
//! Renamed:/target/c.txt-->/a.txt
//! Unable to evaluate:/target/locked.bin: permission denied
//! ```

use std::io::{self, Write};

use bytesize::ByteSize;
use yansi::Paint;

use crate::matching::{Classification, Evaluation, EvaluationSummary, Outcome};

/// Plain or colored classification lines.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextOutput {
    color: bool,
}

impl TextOutput {
    /// Create a formatter; `color` enables ANSI styling of classifications.
    #[must_use]
    pub fn new(color: bool) -> Self {
        Self { color }
    }

    fn paint(&self, classification: Classification) -> String {
        let label = classification.as_str();
        if !self.color {
            return label.to_string();
        }
        match classification {
            Classification::Missing => label.red().to_string(),
            Classification::Matched => label.green().to_string(),
            Classification::Renamed => label.cyan().to_string(),
            Classification::Modified => label.yellow().to_string(),
        }
    }

    /// Render the line(s) for one evaluation.
    #[must_use]
    pub fn format_evaluation(&self, evaluation: &Evaluation<'_>) -> String {
        let path = evaluation.path.display();
        match &evaluation.outcome {
            Outcome::Classified { result, deletion } => {
                let label = self.paint(result.classification);
                let mut line = match result.matched_entry {
                    Some(entry) => format!("{label}:{path}-->/{}", entry.relative_path),
                    None => format!("{label}:{path}-->|"),
                };
                if let Some(Err(e)) = deletion {
                    line.push_str(&format!("\nUnable to delete:{path}: {e}"));
                }
                line
            }
            Outcome::Failed(error) => format!("Unable to evaluate:{path}: {error}"),
        }
    }

    /// Write the line(s) for one evaluation.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    pub fn write_evaluation<W: Write + ?Sized>(
        &self,
        writer: &mut W,
        evaluation: &Evaluation<'_>,
    ) -> io::Result<()> {
        writeln!(writer, "{}", self.format_evaluation(evaluation))
    }

    /// Human-readable totals.
    #[must_use]
    pub fn format_summary(&self, summary: &EvaluationSummary) -> String {
        let mut text = format!(
            "{} files: {} matched, {} renamed, {} modified, {} missing",
            summary.evaluated, summary.matched, summary.renamed, summary.modified, summary.missing
        );
        if summary.failed > 0 {
            text.push_str(&format!(", {} failed", summary.failed));
        }
        if summary.deleted > 0 || summary.delete_failed > 0 {
            text.push_str(&format!(
                "; deleted {} ({} freed)",
                summary.deleted,
                ByteSize::b(summary.bytes_freed)
            ));
            if summary.delete_failed > 0 {
                text.push_str(&format!(", {} deletion(s) failed", summary.delete_failed));
            }
        }
        if summary.interrupted {
            text.push_str(" (interrupted)");
        }
        text
    }
}
