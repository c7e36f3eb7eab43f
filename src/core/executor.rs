//! # Run Executor Module / 运行执行模块
//!
//! Invokes the test driver inside a fully prepared environment and captures
//! its exit code, combined output and coverage artifact. Also hosts the
//! best-effort coverage upload step.
//!
//! 在准备好的环境中调用测试驱动，捕获退出码、合并输出和覆盖率产物。
//! 同时包含尽力而为的覆盖率上传步骤。

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::core::config::{RunConfig, UploadConfig};
use crate::core::environment::EnvironmentHandle;
use crate::core::error::{RunError, UploadError};
use crate::infra::command::{self, CommandLine};

/// What the driver did. The executor never interprets a non-zero exit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    pub success: bool,
    pub exit_code: Option<i32>,
    pub output: String,
    /// Coverage report left in the workspace by the driver, if any.
    pub coverage: Option<PathBuf>,
}

/// Runs the named test session in an environment.
#[async_trait]
pub trait Runner: Send + Sync {
    /// # Errors
    /// [`RunError`] only if the driver could not be started.
    async fn run(&self, env: &EnvironmentHandle) -> Result<RunOutcome, RunError>;
}

/// Runs `<driver> -s <session> -- <flags...>`.
pub struct SessionRunner {
    config: RunConfig,
}

impl SessionRunner {
    pub fn new(config: RunConfig) -> Self {
        Self { config }
    }

    pub fn command_line(&self) -> CommandLine {
        session_command(&self.config)
    }
}

/// The driver invocation for a run configuration.
pub fn session_command(config: &RunConfig) -> CommandLine {
    let mut args = vec!["-s".to_string(), config.session.clone()];
    if !config.flags.is_empty() {
        args.push("--".to_string());
        args.extend(config.flags.iter().cloned());
    }
    CommandLine {
        program: config.driver.clone(),
        args,
    }
}

#[async_trait]
impl Runner for SessionRunner {
    async fn run(&self, env: &EnvironmentHandle) -> Result<RunOutcome, RunError> {
        let line = self.command_line();
        debug!(command = %line, workspace = %env.workspace().display(), "running test session");

        let (status, output) = command::spawn_and_capture(env.command(&line)).await;
        let status = status.map_err(|source| RunError::Spawn {
            program: line.program.clone(),
            source,
        })?;

        let coverage_path = env.workspace().join(&self.config.coverage_report);
        let coverage = coverage_path.is_file().then_some(coverage_path);

        Ok(RunOutcome {
            success: status.success(),
            exit_code: status.code(),
            output: format!("$ {line}\n{output}"),
            coverage,
        })
    }
}

/// Sends a coverage report to an external reporting service.
#[async_trait]
pub trait Uploader: Send + Sync {
    /// Returns a reference to the uploaded report.
    async fn upload(&self, env: &EnvironmentHandle, report: Option<&Path>) -> Result<String, UploadError>;
}

/// Uploads with a command template; `{coverage}` is the report path.
pub struct CommandUploader {
    config: UploadConfig,
}

impl CommandUploader {
    pub fn new(config: UploadConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Uploader for CommandUploader {
    async fn upload(&self, env: &EnvironmentHandle, report: Option<&Path>) -> Result<String, UploadError> {
        let report = report.ok_or(UploadError::MissingReport)?;
        let report_str = report.to_string_lossy().to_string();
        let line = command::render_command(&self.config.command, &[("coverage", &report_str)])
            .map_err(|message| UploadError::Template { message })?;

        let (status, output) = command::spawn_and_capture(env.command(&line)).await;
        let status = status.map_err(|source| UploadError::Spawn {
            program: line.program.clone(),
            source,
        })?;
        if !status.success() {
            return Err(UploadError::Failed {
                exit_code: status.code(),
                output,
            });
        }
        // The last non-empty line usually carries the report URL.
        let reference = output
            .lines()
            .rev()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .map(str::to_string)
            .unwrap_or(report_str);
        Ok(reference)
    }
}
