//! # Run Command Module / 运行命令模块
//!
//! This module implements the `run` command, which expands the matrix, runs
//! every entry assigned to this runner and reports the run verdict.
//!
//! 此模块实现了 `run` 命令：展开矩阵，运行分配给本运行器的每个条目，
//! 并报告运行结论。

use anyhow::{Context, Result};
use chrono::Utc;
use colored::*;
use std::{path::{Path, PathBuf}, sync::Arc};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::{
    core::{
        aggregate::RunReport,
        config::{self, PipelineConfig},
        execution::Pipeline,
        planner,
        toolchain::Credential,
        trigger::TriggerEvent,
    },
    infra::{fs, t},
    reporting::{
        generate_html_report, print_summary, print_unexpected_failure_details, print_warnings,
        write_json_report,
    },
};

/// Arguments of the `run` command.
#[derive(Debug, Clone)]
pub struct RunArgs {
    pub config: PathBuf,
    pub project_dir: PathBuf,
    pub jobs: Option<usize>,
    pub event: TriggerEvent,
    pub toolchain_token: Option<String>,
    pub total_runners: Option<usize>,
    pub runner_index: Option<usize>,
    pub html: Option<PathBuf>,
    pub json: Option<PathBuf>,
    /// Language given on the command line; overrides the configuration file.
    pub language: Option<String>,
}

/// Executes the run command with the provided arguments.
///
/// # Errors
/// A `ConfigurationError` in the chain for an invalid configuration, any other
/// error for runtime problems or a failed verdict.
pub async fn execute(args: RunArgs) -> Result<()> {
    let mut config = load_config(&args.config)?;
    if let Some(language) = &args.language {
        config.language = language.clone();
    }
    let locale = config.language.clone();
    rust_i18n::set_locale(&locale);

    let project_root = fs::absolute_path(&args.project_dir).with_context(|| {
        t!("run.project_dir_not_found", locale = &locale, path = args.project_dir.display()).to_string()
    })?;
    println!(
        "{}",
        t!("run.project_root_detected", locale = &locale, path = project_root.display())
    );
    println!(
        "{}",
        t!("run.loading_config", locale = &locale, path = args.config.display())
    );

    if !config.triggers.matches(&args.event) {
        println!(
            "{}",
            t!("run.trigger_not_matched", locale = &locale, event = args.event.to_string()).yellow()
        );
        return Ok(());
    }

    let plan = planner::plan_execution(&config, args.total_runners, args.runner_index)?;

    if plan.allowed_failure_count > 0 {
        println!(
            "{}",
            t!("run.allowed_failures_found", locale = &locale, count = plan.allowed_failure_count).yellow()
        );
    }
    if let (Some(total), Some(index)) = (args.total_runners, args.runner_index) {
        println!(
            "{}",
            t!(
                "run.running_as_split_runner",
                locale = &locale,
                index = index + 1,
                total = total,
                count = plan.entries.len(),
                all = plan.total_entries
            )
            .bold()
        );
    } else {
        println!(
            "{}",
            t!("run.running_as_single_runner", locale = &locale, count = plan.entries.len()).bold()
        );
    }

    if plan.entries.is_empty() {
        println!("{}", t!("run.no_entries_to_run", locale = &locale).green());
        return Ok(());
    }

    let credential = resolve_credential(&config, args.toolchain_token.as_deref());
    if config.toolchain.is_some() && credential.is_none() {
        println!("{}", t!("run.no_credential", locale = &locale).yellow());
    }

    let stop_token = setup_signal_handler(&locale);
    let jobs = args.jobs.unwrap_or(num_cpus::get() / 2 + 1);
    info!(jobs = jobs, entries = plan.entries.len(), event = %args.event, "starting matrix run");

    let started_at = Utc::now();
    let pipeline = Arc::new(Pipeline::from_config(&config, project_root, jobs, credential));
    let results = pipeline.run_matrix(plan.entries, stop_token).await;
    let report = RunReport::new(args.event.clone(), started_at, Utc::now(), results);

    print_summary(&report, &locale);
    print_warnings(&report.results, &locale);

    if let Some(report_path) = &args.html {
        println!("\n{}", t!("run.generating_html", locale = &locale, path = report_path.display()));
        if let Err(e) = generate_html_report(&report, report_path, &locale) {
            eprintln!("{} {:#}", t!("run.html_failed", locale = &locale).red(), e);
        }
    }
    if let Some(report_path) = &args.json {
        println!("{}", t!("run.generating_json", locale = &locale, path = report_path.display()));
        if let Err(e) = write_json_report(&report, report_path) {
            eprintln!("{} {:#}", t!("run.json_failed", locale = &locale).red(), e);
        }
    }

    if report.verdict.is_success() {
        println!("\n{}", t!("run.verdict_succeeded", locale = &locale).green().bold());
        Ok(())
    } else {
        print_unexpected_failure_details(&report.unexpected_failures(), &locale);
        anyhow::bail!(t!(
            "run.verdict_failed",
            locale = &locale,
            count = report.unexpected_failures().len()
        )
        .to_string());
    }
}

/// Loads the configuration, keeping the `ConfigurationError` in the chain.
pub(crate) fn load_config(path: &Path) -> Result<PipelineConfig> {
    let config = config::load_pipeline_config(path)?;
    Ok(config)
}

/// The command-line token wins over the configured environment variable.
fn resolve_credential(config: &PipelineConfig, token: Option<&str>) -> Option<Credential> {
    token
        .filter(|token| !token.trim().is_empty())
        .map(Credential::new)
        .or_else(|| {
            config
                .toolchain
                .as_ref()
                .and_then(|toolchain| Credential::from_env(&toolchain.credential_env))
        })
}

/// Sets up a signal handler for graceful shutdown.
fn setup_signal_handler(locale: &str) -> CancellationToken {
    let token = CancellationToken::new();
    let token_clone = token.clone();
    let locale = locale.to_string();

    tokio::spawn(async move {
        match signal::ctrl_c().await {
            Ok(()) => {
                println!("\n{}", t!("run.shutdown_signal", locale = &locale).yellow());
                token_clone.cancel();
            }
            Err(e) => warn!(error = %e, "failed to listen for Ctrl-C"),
        }
    });

    token
}
