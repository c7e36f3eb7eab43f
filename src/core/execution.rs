//! # Pipeline Execution Engine Module / 流水线执行引擎模块
//!
//! This module drives every matrix entry through its phases
//! (provision, install toolchain, resolve dependencies, run) and turns the
//! outcome into exactly one [`ExecutionResult`]. Entries run as independent
//! tokio tasks bounded by the job count. Timeouts, fail-fast and shutdown
//! requests are handled here, and an entry's environment is always torn down
//! before its result is reported.
//!
//! 此模块驱动每个矩阵条目依次经历各阶段（准备环境、安装工具链、解析依赖、运行），
//! 并将结果转换为唯一的 [`ExecutionResult`]。条目作为独立的 tokio 任务运行，
//! 并受并行数限制。超时、快速失败和关闭请求都在此处理，
//! 条目的环境总是在其结果上报之前被清理。

use colored::*;
use futures::{StreamExt, stream};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::core::config::{PackageRequirement, PipelineConfig, UploadConfig};
use crate::core::dependencies::{PipResolver, Resolver};
use crate::core::environment::{CommandProvisioner, EnvironmentHandle, Provisioner};
use crate::core::error::{EntryError, UploadError};
use crate::core::executor::{CommandUploader, RunOutcome, Runner, SessionRunner, Uploader};
use crate::core::models::{
    EntryState, EntryWarning, ExecutionResult, FailureReason, MatrixEntry, Phase,
};
use crate::core::toolchain::{CommandInstaller, Credential, ToolchainStage};
use crate::infra::command::tail_lines;
use crate::infra::retry::RetryPolicy;
use crate::infra::{fs, t};

/// The external tools an entry is driven through.
#[derive(Clone)]
pub struct Capabilities {
    pub provisioner: Arc<dyn Provisioner>,
    /// `None` when the project declares no toolchain.
    pub toolchain: Option<Arc<ToolchainStage>>,
    pub resolver: Arc<dyn Resolver>,
    pub runner: Arc<dyn Runner>,
    pub uploader: Option<Arc<dyn Uploader>>,
}

/// Run-wide knobs that are not part of any single capability.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub jobs: usize,
    pub fail_fast: bool,
    pub entry_timeout: Duration,
    /// Limit for the best-effort upload, which runs after the entry timeout stops counting.
    pub upload_timeout: Duration,
    /// Coverage reports are copied here before an environment is removed.
    pub artifacts_dir: PathBuf,
    pub packages: Vec<PackageRequirement>,
    pub locale: String,
}

impl PipelineSettings {
    pub fn from_config(config: &PipelineConfig, project_root: &Path, jobs: usize) -> Self {
        Self {
            jobs: jobs.max(1),
            fail_fast: config.fail_fast,
            entry_timeout: config.entry_timeout(),
            upload_timeout: config
                .upload
                .as_ref()
                .map_or(DEFAULT_UPLOAD_TIMEOUT, UploadConfig::timeout),
            artifacts_dir: project_root.join(&config.artifacts_dir),
            packages: config.dependencies.packages.clone(),
            locale: config.language.clone(),
        }
    }
}

const DEFAULT_UPLOAD_TIMEOUT: Duration = Duration::from_secs(300);

/// A configured pipeline, ready to run matrix entries.
pub struct Pipeline {
    capabilities: Capabilities,
    settings: PipelineSettings,
}

impl Pipeline {
    pub fn new(capabilities: Capabilities, settings: PipelineSettings) -> Self {
        Self {
            capabilities,
            settings,
        }
    }

    /// Wires the command-backed capabilities described by `config`.
    pub fn from_config(
        config: &PipelineConfig,
        project_root: PathBuf,
        jobs: usize,
        credential: Option<Credential>,
    ) -> Self {
        let retry = RetryPolicy::from(config.retry);
        let settings = PipelineSettings::from_config(config, &project_root, jobs);

        let toolchain = config.toolchain.as_ref().map(|toolchain| {
            let installer = Arc::new(CommandInstaller::new(toolchain.clone(), retry));
            Arc::new(ToolchainStage::new(installer, toolchain, credential))
        });
        let uploader = config
            .upload
            .as_ref()
            .map(|upload| Arc::new(CommandUploader::new(upload.clone())) as Arc<dyn Uploader>);

        let capabilities = Capabilities {
            provisioner: Arc::new(CommandProvisioner::new(
                config.environment.clone(),
                project_root,
                retry,
            )),
            toolchain,
            resolver: Arc::new(PipResolver::new(config.dependencies.clone())),
            runner: Arc::new(SessionRunner::new(config.run.clone())),
            uploader,
        };
        Self::new(capabilities, settings)
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Runs one entry to a terminal state. Never fails: every error is folded
    /// into the returned result.
    pub async fn run_entry(&self, entry: MatrixEntry) -> ExecutionResult {
        let locale = self.settings.locale.as_str();
        let name = entry.name();
        println!("{}", t!("run.entry_started", locale = locale, name = &name).blue());

        let start = Instant::now();
        let (phase_tx, phase_rx) = watch::channel(Phase::Pending);
        let mut warnings = Vec::new();

        let execution = self.execute_phases(&entry, &phase_tx, &mut warnings);
        let outcome = tokio::time::timeout(self.settings.entry_timeout, execution).await;

        let mut result = ExecutionResult::bare(entry, EntryState::Succeeded);

        match outcome {
            Ok(Ok((env, run))) => {
                // The classification is final here; the steps below only add artifacts.
                if !run.success {
                    result.state = EntryState::Failed(FailureReason::TestFailure);
                }
                result.coverage_report = run
                    .coverage
                    .as_deref()
                    .and_then(|report| self.persist_coverage(&result.entry, report));
                if let Some(uploader) = self.capabilities.uploader.as_deref().filter(|_| run.success) {
                    result.upload_reference = self
                        .upload(uploader, &env, result.coverage_report.as_deref(), &mut warnings)
                        .await;
                }
                env.teardown();
                result.exit_code = run.exit_code;
                result.output = run.output;
            }
            Ok(Err(e)) => {
                result.state = EntryState::Failed(e.reason());
                result.exit_code = e.exit_code();
                result.output = match e.output() {
                    Some(output) if !output.trim().is_empty() => format!("{e}\n{output}"),
                    _ => e.to_string(),
                };
            }
            Err(_) => {
                let phase = *phase_rx.borrow();
                warn!(entry = %name, phase = ?phase, timeout_secs = self.settings.entry_timeout.as_secs(), "entry timed out");
                result.state = EntryState::Failed(phase.timeout_reason());
                result.timed_out = true;
                result.output = t!(
                    "run.entry_timeout_message",
                    locale = locale,
                    timeout = self.settings.entry_timeout.as_secs(),
                    phase = format!("{phase:?}")
                )
                .to_string();
            }
        }
        result.warnings = warnings;
        result.duration = start.elapsed();
        let duration = result.duration;

        let secs = format!("{:.2}", duration.as_secs_f64());
        if result.is_success() {
            println!("{}", t!("run.entry_passed", locale = locale, name = &name, duration = &secs).green());
        } else if result.entry.allow_failure {
            println!("{}", t!("run.entry_allowed_failure", locale = locale, name = &name, duration = &secs).yellow());
        } else {
            let status = result.status_str(locale);
            println!("{}", t!("run.entry_failed", locale = locale, name = &name, status = status, duration = &secs).red());
        }
        result
    }

    /// Walks the entry through its phases up to the end of the test session,
    /// handing back the still-live environment with the driver's outcome.
    /// Dropping the returned future (on timeout or abort) drops the
    /// environment handle, which removes it.
    async fn execute_phases(
        &self,
        entry: &MatrixEntry,
        phase: &watch::Sender<Phase>,
        warnings: &mut Vec<EntryWarning>,
    ) -> Result<(EnvironmentHandle, RunOutcome), EntryError> {
        enter_phase(phase, entry, Phase::Provisioning);
        let mut env = self.capabilities.provisioner.provision(entry).await?;

        enter_phase(phase, entry, Phase::Installing);
        if let Some(stage) = &self.capabilities.toolchain {
            let install = stage.install_into(&mut env).await?;
            if !install.handle.authenticated() {
                warnings.push(EntryWarning::DegradedMode(
                    t!("run.degraded_mode", locale = self.settings.locale.as_str(), toolchain = install.handle.name())
                        .to_string(),
                ));
            }
        }

        enter_phase(phase, entry, Phase::Resolving);
        self.capabilities
            .resolver
            .install(&env, &self.settings.packages)
            .await?;
        self.capabilities.resolver.infer_version(&env).await?;

        enter_phase(phase, entry, Phase::Running);
        let outcome = self.capabilities.runner.run(&env).await?;
        Ok((env, outcome))
    }

    fn persist_coverage(&self, entry: &MatrixEntry, report: &Path) -> Option<PathBuf> {
        let file_name = report
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "coverage.xml".to_string());
        let target = format!("{}-{}", entry.slug(), file_name);
        match fs::persist_artifact(report, &self.settings.artifacts_dir, &target) {
            Ok(path) => Some(path),
            Err(e) => {
                warn!(entry = %entry.name(), error = %e, "failed to persist coverage report");
                None
            }
        }
    }

    async fn upload(
        &self,
        uploader: &dyn Uploader,
        env: &EnvironmentHandle,
        report: Option<&Path>,
        warnings: &mut Vec<EntryWarning>,
    ) -> Option<String> {
        let timeout = self.settings.upload_timeout;
        let attempt = tokio::time::timeout(timeout, uploader.upload(env, report))
            .await
            .unwrap_or(Err(UploadError::TimedOut {
                secs: timeout.as_secs(),
            }));
        match attempt {
            Ok(reference) => Some(reference),
            Err(e) => {
                let detail = match &e {
                    UploadError::Failed { output, .. } => {
                        format!("{e}: {}", tail_lines(output, 3))
                    }
                    _ => e.to_string(),
                };
                warn!(error = %detail, "coverage upload failed");
                warnings.push(EntryWarning::Upload(detail));
                None
            }
        }
    }

    /// Runs `entries` concurrently and returns one result per entry, ordered
    /// by expansion index.
    ///
    /// `stop_token` aborts in-flight entries (reported `Cancelled`); with
    /// fail-fast enabled, the first required failure stops every unfinished
    /// entry (reported `Skipped`).
    pub async fn run_matrix(
        self: Arc<Self>,
        entries: Vec<MatrixEntry>,
        stop_token: CancellationToken,
    ) -> Vec<ExecutionResult> {
        let fast_fail_token = CancellationToken::new();
        let fail_fast = self.settings.fail_fast;
        let jobs = self.settings.jobs.max(1);

        let mut results = stream::iter(entries.into_iter().map(|entry| {
            let pipeline = Arc::clone(&self);
            let stop_token = stop_token.clone();
            let fast_fail_token = fast_fail_token.clone();

            async move {
                if stop_token.is_cancelled() {
                    return ExecutionResult::bare(entry, EntryState::Cancelled);
                }
                if fast_fail_token.is_cancelled() {
                    return ExecutionResult::bare(entry, EntryState::Skipped);
                }

                let task_entry = entry.clone();
                let mut handle = tokio::spawn(async move { pipeline.run_entry(task_entry).await });

                let result = tokio::select! {
                    biased;
                    // A finished entry keeps its own result even if a token fired meanwhile.
                    joined = &mut handle => match joined {
                        Ok(result) => result,
                        Err(e) => {
                            warn!(entry = %entry.name(), error = %e, "entry task ended abnormally");
                            let mut result = ExecutionResult::bare(entry, EntryState::Failed(FailureReason::SetupFailure));
                            result.output = format!("entry task ended abnormally: {e}");
                            result
                        }
                    },
                    _ = stop_token.cancelled() => {
                        handle.abort();
                        // Wait for the task to unwind so its environment is gone.
                        let _ = (&mut handle).await;
                        ExecutionResult::bare(entry, EntryState::Cancelled)
                    }
                    _ = fast_fail_token.cancelled() => {
                        handle.abort();
                        let _ = (&mut handle).await;
                        ExecutionResult::bare(entry, EntryState::Skipped)
                    }
                };

                if fail_fast && result.is_failure() && !result.entry.allow_failure {
                    debug!(entry = %result.name(), "fail-fast triggered");
                    fast_fail_token.cancel();
                }
                result
            }
        }))
        .buffer_unordered(jobs)
        .collect::<Vec<ExecutionResult>>()
        .await;

        results.sort_by_key(|r| r.entry.index);
        results
    }
}

fn enter_phase(phase: &watch::Sender<Phase>, entry: &MatrixEntry, next: Phase) {
    debug!(entry = %entry.name(), phase = ?next, "entering phase");
    phase.send_replace(next);
}
