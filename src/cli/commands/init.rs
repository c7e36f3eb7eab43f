//! # Pipeline Initialization Module / 流水线初始化模块
//!
//! This module provides functionality for initializing a new pipeline
//! configuration through an interactive command-line wizard. It helps users
//! create a `CiMatrix.toml` file with a runtime matrix, an optional EDA
//! toolchain and the test session settings.
//!
//! 此模块通过交互式命令行向导提供初始化新流水线配置的功能。
//! 它帮助用户创建包含运行时矩阵、可选 EDA 工具链以及测试会话设置的 `CiMatrix.toml` 文件。
//!
//! ## Features / 功能特性
//!
//! - **Interactive Wizard**: Step-by-step guidance for configuration setup
//! - **Overwrite Protection**: Confirmation prompts before overwriting existing configurations
//!
//! - **交互式向导**: 配置设置的逐步指导
//! - **覆盖保护**: 覆盖现有配置前的确认提示

use anyhow::{Context, Result};
use colored::*;
use dialoguer::{Confirm, Input, MultiSelect, theme::ColorfulTheme};
use std::fs;
use std::path::Path;

use crate::core::config::{
    Axis, DEFAULT_CONFIG_FILE, MatrixSpec, PipelineConfig, ToolRequirement, ToolchainConfig,
    UploadConfig,
};
use crate::core::models::AxisValue;
use crate::infra::t;

/// Runtime versions tested by default, including a nightly and an alternate interpreter.
pub const DEFAULT_PYTHON_VERSIONS: [&str; 5] = ["3.9", "3.10", "3.11", "3.12-dev", "pypy-3.9-v7.3.11"];

const DEFAULT_TOOLCHAIN_FETCH: &str = "sh -c \"cd {dest} && gh release download --repo YosysHQ/oss-cad-suite-build --pattern 'oss-cad-suite-linux-x64-*.tgz' && tar -xzf oss-cad-suite-linux-x64-*.tgz --strip-components=1\"";

/// The configuration written by `init --non-interactive`.
pub fn default_pipeline_config(language: &str) -> Result<PipelineConfig> {
    let mut config: PipelineConfig = toml::from_str("[matrix]\n")
        .context("Failed to build the default configuration")?;
    config.language = language.to_string();
    config.matrix = MatrixSpec {
        axes: vec![Axis {
            name: "python-version".to_string(),
            values: DEFAULT_PYTHON_VERSIONS.iter().map(|v| AxisValue::from(*v)).collect(),
        }],
        ..MatrixSpec::default()
    };
    config.toolchain = Some(default_toolchain());
    config.upload = Some(UploadConfig {
        command: "codecov --file {coverage}".to_string(),
        timeout_secs: 300,
    });
    Ok(config)
}

fn default_toolchain() -> ToolchainConfig {
    ToolchainConfig {
        name: "oss-cad-suite".to_string(),
        fetch: DEFAULT_TOOLCHAIN_FETCH.to_string(),
        bin_subdir: "bin".into(),
        credential_env: "GITHUB_TOKEN".to_string(),
        share: true,
        tools: vec![ToolRequirement {
            name: "yosys".to_string(),
            min_version: Some("0.10".to_string()),
        }],
    }
}

/// Runs the interactive wizard to generate a `CiMatrix.toml` file.
///
/// 运行交互式向导以生成 `CiMatrix.toml` 文件。
pub fn run_init_wizard(language: &str, non_interactive: bool) -> Result<()> {
    let config_path = Path::new(DEFAULT_CONFIG_FILE);
    let theme = ColorfulTheme::default();
    let path_str = config_path.display().to_string();

    if non_interactive {
        if config_path.exists() {
            println!("{}", t!("init.exists_skipped", locale = language, path = &path_str).yellow());
            return Ok(());
        }
        return write_config(config_path, &default_pipeline_config(language)?, language);
    }

    println!("\n{}", t!("init.wizard_welcome", locale = language).cyan().bold());
    println!("{}", t!("init.wizard_description", locale = language));

    if config_path.exists() {
        let confirmation = Confirm::with_theme(&theme)
            .with_prompt(t!("init.overwrite_prompt", locale = language, path = &path_str))
            .default(false)
            .interact()
            .context(t!("init.user_confirmation_failed", locale = language).to_string())?;
        if !confirmation {
            println!("{}", t!("init.aborted", locale = language));
            return Ok(());
        }
    }

    let mut config = default_pipeline_config(language)?;

    let versions: String = Input::with_theme(&theme)
        .with_prompt(t!("init.versions_prompt", locale = language))
        .default(DEFAULT_PYTHON_VERSIONS.join(", "))
        .interact_text()
        .context(t!("init.user_confirmation_failed", locale = language).to_string())?;
    let values: Vec<AxisValue> = versions
        .split(',')
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(AxisValue::from)
        .collect();
    if values.is_empty() {
        println!("{}", t!("init.no_versions", locale = language).yellow());
    } else {
        config.matrix.axes[0].values = values;
    }

    let with_toolchain = Confirm::with_theme(&theme)
        .with_prompt(t!("init.toolchain_prompt", locale = language))
        .default(true)
        .interact()
        .context(t!("init.user_confirmation_failed", locale = language).to_string())?;
    if !with_toolchain {
        config.toolchain = None;
    }

    let flag_options = ["--coverage", "--codecov"];
    let selections = MultiSelect::with_theme(&theme)
        .with_prompt(t!("init.flags_prompt", locale = language))
        .items(&flag_options)
        .defaults(&[true, true])
        .interact()
        .context(t!("init.user_confirmation_failed", locale = language).to_string())?;
    config.run.flags = selections
        .into_iter()
        .map(|i| flag_options[i].to_string())
        .collect();
    if !config.run.flags.iter().any(|f| f == "--coverage") {
        config.upload = None;
    }

    config.fail_fast = Confirm::with_theme(&theme)
        .with_prompt(t!("init.fail_fast_prompt", locale = language))
        .default(false)
        .interact()
        .context(t!("init.user_confirmation_failed", locale = language).to_string())?;

    write_config(config_path, &config, language)
}

fn write_config(path: &Path, config: &PipelineConfig, language: &str) -> Result<()> {
    let path_str = path.display().to_string();
    let toml_string = toml::to_string_pretty(config)
        .context(t!("init.serialize_failed", locale = language).to_string())?;

    fs::write(path, toml_string)
        .with_context(|| t!("init.write_failed", locale = language, path = &path_str).to_string())?;

    println!(
        "\n{} {}",
        "✔".green(),
        t!("init.success_created", locale = language, path = &path_str).bold()
    );
    println!("{}", t!("init.usage_hint", locale = language));

    Ok(())
}
