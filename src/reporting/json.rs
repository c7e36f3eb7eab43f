//! Machine-readable run report.

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

use crate::core::aggregate::RunReport;

/// Serializes the report as pretty-printed JSON and writes it to `output_path`.
pub fn write_json_report(report: &RunReport, output_path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(report).context("Failed to serialize run report")?;
    fs::write(output_path, json)
        .with_context(|| format!("Failed to write JSON report to {}", output_path.display()))?;
    Ok(())
}
