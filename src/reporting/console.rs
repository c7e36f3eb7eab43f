//! # Console Reporting Module / 控制台报告模块
//!
//! This module prints the run summary and the details of unexpected failures
//! to the console, with color coding and internationalization support.
//!
//! 此模块在控制台打印运行摘要与意外失败的详细信息，支持彩色输出和国际化。

use colored::*;

use crate::core::aggregate::RunReport;
use crate::core::models::{EntryState, ExecutionResult, FailureReason};
use crate::infra::command::tail_lines;
use crate::infra::t;

/// Lines of captured output shown per failure in the console.
const FAILURE_OUTPUT_LINES: usize = 60;

/// Prints a formatted summary of the run to the console.
///
/// 在控制台打印格式化的运行摘要。
///
/// # Output Format / 输出格式
/// ```text
/// --- Run Summary ---
///   - Passed             | 3.9                                      |      12.31s
///   - Failed             | 3.12-dev                                 |      40.02s
///   - Setup Failed       | pypy-3.9-v7.3.11                         |       3.10s  (1 warning)
/// ```
pub fn print_summary(report: &RunReport, locale: &str) {
    println!("\n{}", t!("report.summary_banner", locale = locale).bold());

    for result in &report.results {
        let status_str = result.status_str(locale);
        let duration_str = match result.state {
            EntryState::Skipped | EntryState::Cancelled => "N/A".to_string(),
            _ => format!("{:.2}s", result.duration.as_secs_f64()),
        };
        let warnings_str = match result.warnings.len() {
            0 => String::new(),
            count => t!("report.warning_count", locale = locale, count = count).to_string(),
        };

        let status_colored = match result.state {
            EntryState::Succeeded => status_str.green(),
            EntryState::Failed(_) if result.entry.allow_failure => status_str.yellow(),
            EntryState::Failed(_) => status_str.red(),
            EntryState::Skipped | EntryState::Cancelled => status_str.dimmed(),
        };

        println!(
            "  - {:<18} | {:<40} | {:>10} {}",
            status_colored,
            result.name(),
            duration_str,
            warnings_str.yellow()
        );
    }

    let totals = &report.totals;
    println!(
        "\n{}",
        t!(
            "report.totals",
            locale = locale,
            total = totals.total,
            passed = totals.succeeded,
            failed = totals.failed(),
            skipped = totals.skipped + totals.cancelled
        )
    );
}

/// Prints every warning attached to a result, grouped by entry.
pub fn print_warnings(results: &[ExecutionResult], locale: &str) {
    let with_warnings: Vec<_> = results.iter().filter(|r| !r.warnings.is_empty()).collect();
    if with_warnings.is_empty() {
        return;
    }
    println!("\n{}", t!("report.warnings_banner", locale = locale).yellow().bold());
    for result in with_warnings {
        for warning in &result.warnings {
            println!("  - {}: {}", result.name().cyan(), warning);
        }
    }
}

/// Prints detailed information about unexpected failures.
/// Shows the tail of the captured output for each required entry that did
/// not succeed, labelled with the phase family that failed.
///
/// 打印意外失败的详细信息。对每个未成功的必需条目，显示捕获输出的末尾部分。
pub fn print_unexpected_failure_details(unexpected_failures: &[&ExecutionResult], locale: &str) {
    if unexpected_failures.is_empty() {
        return;
    }

    println!("\n{}", t!("report.unexpected_failure_banner", locale = locale).red().bold());
    println!("{}", "-".repeat(80));

    for (i, result) in unexpected_failures.iter().enumerate() {
        println!(
            "[{}/{}] {} '{}' ({})",
            i + 1,
            unexpected_failures.len(),
            t!("report.failure_header", locale = locale).red(),
            result.name().cyan(),
            result.status_str(locale)
        );

        let log_header = match result.failure_reason() {
            Some(FailureReason::TestFailure) => t!("report.test_log", locale = locale),
            Some(FailureReason::DependencyFailure) => t!("report.dependency_log", locale = locale),
            Some(FailureReason::SetupFailure) => t!("report.setup_log", locale = locale),
            None => t!("report.not_executed", locale = locale),
        };
        println!("\n--- {} ---\n", log_header.yellow());
        if result.output.trim().is_empty() {
            println!("{}", t!("report.no_output", locale = locale).dimmed());
        } else {
            println!("{}", tail_lines(&result.output, FAILURE_OUTPUT_LINES));
        }
        if let Some(code) = result.exit_code {
            println!("\n{}", t!("report.exit_code", locale = locale, code = code));
        }
        println!("\n{}", "-".repeat(80));
    }
}
