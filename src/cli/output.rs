//! Output formatting for command results
//!
//! Results go to stdout in JSON, YAML or a short human-readable form. Diagnostics never
//! pass through here; they are logged to stderr.

use anyhow::{Context, Result};
use serde::Serialize;
use std::path::PathBuf;

use crate::content::ContentKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// JSON format (machine-readable)
    Json,
    /// YAML format
    Yaml,
    /// `Yes`/`No` style answers
    Human,
}

/// Answer of the `is-packed` command
#[derive(Debug, Clone, Serialize)]
pub struct IsPackedReport {
    pub path: PathBuf,
    pub spec: PathBuf,
    pub kind: ContentKind,
    pub packed: bool,
}

impl IsPackedReport {
    pub fn new(path: PathBuf, spec: PathBuf, kind: ContentKind) -> Self {
        Self {
            path,
            spec,
            packed: kind.is_packed(),
            kind,
        }
    }
}

pub struct OutputFormatter {
    format: OutputFormat,
}

impl OutputFormatter {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    pub fn format_is_packed(&self, report: &IsPackedReport) -> Result<String> {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(report)
                .context("Failed to serialize is-packed result to JSON"),
            OutputFormat::Yaml => serde_yaml::to_string(report)
                .context("Failed to serialize is-packed result to YAML"),
            OutputFormat::Human => Ok(if report.packed { "Yes" } else { "No" }.to_string()),
        }
    }
}
