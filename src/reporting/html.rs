//! # HTML Reporting Module / HTML 报告模块
//!
//! This module renders the run report as a standalone HTML page with summary
//! statistics, a results table, and collapsible output for failed entries.
//!
//! 此模块将运行报告渲染为独立的 HTML 页面，包含汇总统计、结果表格以及
//! 失败条目的可折叠输出。

use anyhow::{Context, Result};
use maud::{DOCTYPE, Markup, PreEscaped, html};
use std::fs;
use std::path::Path;

use crate::core::aggregate::RunReport;
use crate::core::models::ExecutionResult;
use crate::infra::t;

/// Embedded CSS styles for HTML reports / HTML 报告的嵌入式 CSS 样式
const HTML_STYLE: &str = r#"
body { font-family: -apple-system, "Segoe UI", Helvetica, Arial, sans-serif; margin: 2em; color: #24292f; }
h1 { font-weight: 600; }
.summary-container { display: flex; gap: 1.5em; margin: 1.5em 0; }
.summary-item { display: flex; flex-direction: column; align-items: center; padding: 0.8em 1.4em; border: 1px solid #d0d7de; border-radius: 6px; }
.summary-item .count { font-size: 1.8em; font-weight: 600; }
.passed-text { color: #1a7f37; } .failed-text { color: #cf222e; } .skipped-text { color: #6e7781; }
table { border-collapse: collapse; width: 100%; }
th, td { border-bottom: 1px solid #d0d7de; padding: 0.5em 0.8em; text-align: left; vertical-align: top; }
.status-cell { display: inline-block; padding: 0.1em 0.6em; border-radius: 1em; font-size: 0.9em; }
.status-Passed { background: #dafbe1; } .status-Failed { background: #ffebe9; }
.status-Setup-Failed { background: #fff1e5; } .status-Timeout { background: #fbefff; }
.status-Allowed-Failure { background: #fff8c5; } .status-Skipped { background: #eaeef2; }
.output-toggle { cursor: pointer; color: #0969da; font-size: 0.85em; margin-top: 0.3em; }
.output-content { background: #f6f8fa; padding: 1em; overflow-x: auto; max-height: 40em; }
.warning { color: #9a6700; font-size: 0.85em; }
"#;

/// Embedded JavaScript for HTML report interactivity / HTML 报告交互性的嵌入式 JavaScript
const HTML_SCRIPT: &str = r#"
function toggleOutput(id) {
  var row = document.getElementById(id);
  row.style.display = row.style.display === 'none' ? 'table-row' : 'none';
}
"#;

/// Renders the report as an HTML document.
pub fn render_html_report(report: &RunReport, locale: &str) -> Markup {
    let totals = &report.totals;
    html! {
        (DOCTYPE)
        html {
            head {
                meta charset="utf-8";
                title { (t!("html_report.title", locale = locale)) }
                style { (PreEscaped(HTML_STYLE)) }
            }
            body {
                h1 { (t!("html_report.main_header", locale = locale)) }
                p {
                    (t!("html_report.trigger", locale = locale, event = report.trigger.to_string()))
                    " · "
                    (report.started_at.format("%Y-%m-%d %H:%M:%S UTC").to_string())
                }
                div class="summary-container" {
                    (summary_item(totals.total, "", &t!("html_report.summary.total", locale = locale)))
                    (summary_item(totals.succeeded, "passed-text", &t!("html_report.summary.passed", locale = locale)))
                    (summary_item(totals.failed(), "failed-text", &t!("html_report.summary.failed", locale = locale)))
                    (summary_item(totals.skipped + totals.cancelled, "skipped-text", &t!("html_report.summary.skipped", locale = locale)))
                }
                table {
                    thead {
                        tr {
                            th { (t!("html_report.table.header.name", locale = locale)) }
                            th class="status-col" { (t!("html_report.table.header.status", locale = locale)) }
                            th class="duration-cell" { (t!("html_report.table.header.duration", locale = locale)) }
                            th { (t!("html_report.table.header.coverage", locale = locale)) }
                        }
                    }
                    tbody {
                        @for result in &report.results {
                            (result_rows(result, locale))
                        }
                    }
                }
                script { (PreEscaped(HTML_SCRIPT)) }
            }
        }
    }
}

fn summary_item(count: usize, class: &str, label: &str) -> Markup {
    html! {
        div class="summary-item" {
            span class={ "count " (class) } { (count) }
            span class="label" { (label) }
        }
    }
}

fn result_rows(result: &ExecutionResult, locale: &str) -> Markup {
    let output_id = format!("output-{}", result.entry.index);
    html! {
        tr {
            td {
                (result.name())
                @for warning in &result.warnings {
                    div class="warning" { (warning.to_string()) }
                }
            }
            td class="status-col" {
                div class={ "status-cell " (result.status_class()) } { (result.status_str(locale)) }
                @if !result.is_success() && !result.output.is_empty() {
                    div class="output-toggle" onclick={ "toggleOutput('" (output_id) "')" } {
                        (t!("html_report.toggle_output", locale = locale))
                    }
                }
            }
            td class="duration-cell" { (format!("{:.2}s", result.duration.as_secs_f64())) }
            td {
                @if let Some(report) = &result.coverage_report {
                    (report.display().to_string())
                }
                @if let Some(reference) = &result.upload_reference {
                    br;
                    (reference)
                }
            }
        }
        @if !result.is_success() && !result.output.is_empty() {
            tr id=(output_id) style="display:none;" {
                td colspan="4" { pre class="output-content" { (result.output) } }
            }
        }
    }
}

/// Writes the HTML report to `output_path`.
///
/// 将 HTML 报告写入 `output_path`。
pub fn generate_html_report(report: &RunReport, output_path: &Path, locale: &str) -> Result<()> {
    let markup = render_html_report(report, locale);
    fs::write(output_path, markup.into_string())
        .with_context(|| format!("Failed to write HTML report to {}", output_path.display()))?;
    Ok(())
}
