//! Output formatting for run summaries
//!
//! Summaries go to stdout, logs go to stderr, so `--format json` output can be
//! piped straight into other tools.

use anyhow::{Context, Result};
use serde::Serialize;

use crate::analysis::FrequencyTable;
use crate::pipeline::{ImageOutcome, RunSummary};

/// Output format enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// JSON format (machine-readable)
    Json,
    /// Human-readable formatted text
    Human,
}

#[derive(Debug, Serialize)]
struct ImageReport<'a> {
    image: &'a str,
    state: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    record: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    executables: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    unaccounted: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<String>,
}

impl<'a> ImageReport<'a> {
    fn new(image: &'a str, outcome: &ImageOutcome) -> Self {
        let mut report = Self {
            image,
            state: outcome.state().name(),
            record: None,
            executables: None,
            unaccounted: None,
            detail: None,
        };
        match outcome {
            ImageOutcome::Persisted {
                path,
                executables,
                unaccounted,
            } => {
                report.record = Some(path.display().to_string());
                report.executables = Some(*executables);
                report.unaccounted = Some(*unaccounted);
            }
            ImageOutcome::Skipped(reason) => report.detail = Some(reason.to_string()),
            ImageOutcome::Failed(error) => {
                report.detail = Some(format!("{}: {}", error.stage(), error))
            }
        }
        report
    }
}

#[derive(Debug, Serialize)]
struct SummaryReport<'a> {
    images: Vec<ImageReport<'a>>,
    cancelled: Vec<&'a str>,
    persisted: usize,
    skipped: usize,
    failed: usize,
    elapsed_ms: u128,
}

/// Output formatter for run summaries
pub struct OutputFormatter {
    format: OutputFormat,
}

impl OutputFormatter {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    pub fn format_summary(&self, summary: &RunSummary) -> Result<String> {
        match self.format {
            OutputFormat::Json => self.format_summary_json(summary),
            OutputFormat::Human => Ok(self.format_summary_human(summary)),
        }
    }

    /// Formats the top `limit` rows of a frequency table
    pub fn format_ranking(&self, table: &FrequencyTable, limit: usize) -> Result<String> {
        let rows: Vec<_> = table.ranked().into_iter().take(limit).collect();
        match self.format {
            OutputFormat::Json => {
                let rows: Vec<_> = rows
                    .iter()
                    .map(|(binary, count)| serde_json::json!({ "binary": binary, "count": count }))
                    .collect();
                serde_json::to_string_pretty(&rows).context("Failed to serialize ranking to JSON")
            }
            OutputFormat::Human => {
                let mut output = String::new();
                for (binary, count) in rows {
                    output.push_str(&format!("{:>6}  {}\n", count, binary));
                }
                Ok(output)
            }
        }
    }

    fn format_summary_json(&self, summary: &RunSummary) -> Result<String> {
        let report = SummaryReport {
            images: summary
                .results
                .iter()
                .map(|(image, outcome)| ImageReport::new(image.as_str(), outcome))
                .collect(),
            cancelled: summary.cancelled.iter().map(|i| i.as_str()).collect(),
            persisted: summary.persisted(),
            skipped: summary.skipped(),
            failed: summary.failed(),
            elapsed_ms: summary.elapsed.as_millis(),
        };
        serde_json::to_string_pretty(&report).context("Failed to serialize run summary to JSON")
    }

    fn format_summary_human(&self, summary: &RunSummary) -> String {
        let mut output = String::new();

        let width = summary
            .results
            .iter()
            .map(|(image, _)| image.as_str().len())
            .chain(summary.cancelled.iter().map(|image| image.as_str().len()))
            .max()
            .unwrap_or(0);

        for (image, outcome) in &summary.results {
            output.push_str(&format!("{:<width$}  {}\n", image.as_str(), outcome, width = width));
        }
        for image in &summary.cancelled {
            output.push_str(&format!("{:<width$}  cancelled\n", image.as_str(), width = width));
        }

        if !output.is_empty() {
            output.push('\n');
        }
        output.push_str(&format!(
            "{} persisted, {} skipped, {} failed",
            summary.persisted(),
            summary.skipped(),
            summary.failed()
        ));
        if summary.was_cancelled() {
            output.push_str(&format!(", {} cancelled", summary.cancelled.len()));
        }
        output.push_str(&format!(" in {:.1}s\n", summary.elapsed.as_secs_f64()));
        output
    }
}
