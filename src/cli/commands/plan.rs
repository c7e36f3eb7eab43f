//! # Plan Command Module / 计划命令模块
//!
//! Prints the entries a run would execute, without provisioning anything.
//!
//! 打印一次运行将执行的条目，不准备任何环境。

use anyhow::Result;
use colored::*;
use std::path::Path;

use crate::cli::commands::run::load_config;
use crate::core::planner;
use crate::infra::t;

pub fn execute(
    config_path: &Path,
    total_runners: Option<usize>,
    runner_index: Option<usize>,
    language: Option<&str>,
) -> Result<()> {
    let config = load_config(config_path)?;
    let locale = language.unwrap_or(&config.language).to_string();
    let plan = planner::plan_execution(&config, total_runners, runner_index)?;

    println!(
        "{}",
        t!(
            "plan.header",
            locale = &locale,
            count = plan.entries.len(),
            total = plan.total_entries
        )
        .bold()
    );
    for entry in &plan.entries {
        let marker = if entry.allow_failure {
            t!("plan.allow_failure_marker", locale = &locale).yellow().to_string()
        } else {
            String::new()
        };
        println!("  [{:>3}] {} {}", entry.index, entry.name().cyan(), marker);
    }
    Ok(())
}
