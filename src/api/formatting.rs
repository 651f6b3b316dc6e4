//! Calibration report output formatting
//!
//! Human-readable tables, JSON for downstream tooling and CSV for logging
//! or plotting the per-anchor estimates and errors.

use crate::core::Coordinates;
use crate::validation::accuracy::{AnchorReport, CalibrationReport};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Output format selectable from the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Text,
    Json,
    Csv,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            "csv" => Ok(OutputFormat::Csv),
            other => Err(format!("unknown output format '{}', expected text, json or csv", other)),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OutputFormat::Text => "text",
            OutputFormat::Json => "json",
            OutputFormat::Csv => "csv",
        };
        f.write_str(name)
    }
}

impl OutputFormat {
    /// Render a report with the default formatter of this format
    pub fn render(&self, report: &CalibrationReport) -> Result<String, serde_json::Error> {
        match self {
            OutputFormat::Text => Ok(TextFormatter::new().format_text(report)),
            OutputFormat::Json => JsonFormatter::pretty().format_json(report),
            OutputFormat::Csv => Ok(CsvFormatter::new().format_csv(report)),
        }
    }
}

/// Fixed-width table formatter
pub struct TextFormatter {
    /// Digits after the decimal point
    pub precision: usize,
    /// Append the per-axis spread of every anchor
    pub include_spread: bool,
}

impl Default for TextFormatter {
    fn default() -> Self {
        Self {
            precision: 2,
            include_spread: false,
        }
    }
}

impl TextFormatter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_spread() -> Self {
        Self {
            include_spread: true,
            ..Self::default()
        }
    }

    /// Format the report as a table, one anchor per row
    pub fn format_text(&self, report: &CalibrationReport) -> String {
        let p = self.precision;
        let mut output = String::new();

        output.push_str(&format!(
            "{:<12} {:>5} {:>9} {:>9} {:>9} {:>9} {:>9} {:>9} {:>9}",
            "anchor", "fixed", "x", "y", "z", "error", "x_error", "y_error", "z_error"
        ));
        if self.include_spread {
            output.push_str(&format!(" {:>9} {:>9} {:>9}", "x_std", "y_std", "z_std"));
        }
        output.push('\n');

        for anchor in &report.anchors {
            output.push_str(&format!(
                "{:<12} {:>5} {:>9.p$} {:>9.p$} {:>9.p$}",
                anchor.id,
                if anchor.fixed { "yes" } else { "no" },
                anchor.estimate.x,
                anchor.estimate.y,
                anchor.estimate.z,
            ));
            match &anchor.error {
                Some(error) => output.push_str(&format!(
                    " {:>9.p$} {:>9.p$} {:>9.p$} {:>9.p$}",
                    error.euclidean, error.axis.x, error.axis.y, error.axis.z
                )),
                None => output.push_str(&format!(" {:>9} {:>9} {:>9} {:>9}", "-", "-", "-", "-")),
            }
            if self.include_spread {
                output.push_str(&format!(
                    " {:>9.p$} {:>9.p$} {:>9.p$}",
                    anchor.spread.x, anchor.spread.y, anchor.spread.z
                ));
            }
            output.push('\n');
        }

        let stats = &report.statistics;
        output.push_str(&format!("\nSamples: {}\n", report.sample_count));
        if stats.count > 0 {
            output.push_str(&format!(
                "Error over {} solved anchors: mean {:.p$} m, rmse {:.p$} m, max {:.p$} m\n",
                stats.count, stats.mean, stats.rmse, stats.max
            ));
        } else {
            output.push_str("No ground truth for solved anchors\n");
        }

        output
    }
}

/// JSON formatter for structured output
#[derive(Default)]
pub struct JsonFormatter {
    /// Pretty print JSON
    pub pretty: bool,
}

impl JsonFormatter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a pretty-printing JSON formatter
    pub fn pretty() -> Self {
        Self { pretty: true }
    }

    pub fn format_json(&self, report: &CalibrationReport) -> Result<String, serde_json::Error> {
        if self.pretty {
            serde_json::to_string_pretty(report)
        } else {
            serde_json::to_string(report)
        }
    }
}

/// CSV formatter, one row per anchor
pub struct CsvFormatter {
    /// Include header row
    pub include_header: bool,
}

impl Default for CsvFormatter {
    fn default() -> Self {
        Self { include_header: true }
    }
}

impl CsvFormatter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn header(&self) -> String {
        "anchor_id,fixed,x,y,z,error,x_error,y_error,z_error".to_string()
    }

    /// Format one anchor. Error columns stay empty without ground truth.
    pub fn format_row(&self, anchor: &AnchorReport) -> String {
        let error = match &anchor.error {
            Some(e) => format!("{:.6},{:.6},{:.6},{:.6}", e.euclidean, e.axis.x, e.axis.y, e.axis.z),
            None => ",,,".to_string(),
        };
        format!(
            "{},{},{},{}",
            anchor.id,
            anchor.fixed,
            coordinates_csv(&anchor.estimate),
            error
        )
    }

    pub fn format_csv(&self, report: &CalibrationReport) -> String {
        let mut output = String::new();
        if self.include_header {
            output.push_str(&self.header());
            output.push('\n');
        }
        for anchor in &report.anchors {
            output.push_str(&self.format_row(anchor));
            output.push('\n');
        }
        output
    }
}

fn coordinates_csv(p: &Coordinates) -> String {
    format!("{:.6},{:.6},{:.6}", p.x, p.y, p.z)
}
