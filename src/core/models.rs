//! # Data Models Module / 数据模型模块
//!
//! This module defines the core data structures used throughout the pipeline:
//! axis values, expanded matrix entries, per-entry phases and terminal states,
//! warnings, and the immutable per-entry execution result.
//!
//! 此模块定义了整个流水线中使用的核心数据结构：轴取值、展开后的矩阵条目、
//! 条目阶段与终止状态、警告，以及不可变的条目执行结果。

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::infra::t;

/// An opaque identifier naming one runtime version to test against.
/// Values such as `3.12-dev` or `pypy-3.9-v7.3.11` are never parsed.
/// 命名一个待测运行时版本的不透明标识符，从不解析。
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AxisValue(String);

impl AxisValue {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AxisValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AxisValue {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// One axis name bound to one value inside an entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AxisAssignment {
    pub axis: String,
    pub value: AxisValue,
}

/// One concrete combination of axis values, executed as an independent run.
/// 一个具体的轴取值组合，作为独立的运行执行。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatrixEntry {
    /// Position in the expanded matrix. Reports are ordered by it.
    pub index: usize,
    /// Assignments in axis declaration order.
    pub values: Vec<AxisAssignment>,
    /// A failure of this entry does not fail the run.
    #[serde(default)]
    pub allow_failure: bool,
}

impl MatrixEntry {
    /// Human-readable name, e.g. `3.9` or `3.11, ubuntu`.
    pub fn name(&self) -> String {
        self.values
            .iter()
            .map(|a| a.value.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// File-system friendly identifier, unique within a run.
    pub fn slug(&self) -> String {
        let sanitized = self
            .name()
            .chars()
            .map(|c| if c.is_alphanumeric() || c == '.' { c } else { '_' })
            .collect::<String>();
        format!("{:03}-{}", self.index, sanitized)
    }
}

/// Sequential phases an entry walks through before reaching a terminal state.
/// 条目在到达终止状态之前依次经历的阶段。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    Pending,
    Provisioning,
    Installing,
    Resolving,
    Running,
}

impl Phase {
    /// Classification of a timeout that fired while this phase was active.
    pub fn timeout_reason(self) -> FailureReason {
        match self {
            Phase::Running => FailureReason::TestFailure,
            _ => FailureReason::SetupFailure,
        }
    }
}

/// Why an entry failed. Distinguishes environment problems from test failures.
/// 条目失败的原因，区分环境问题与测试失败。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureReason {
    /// The runtime, workspace, toolchain or version inference could not be set up.
    SetupFailure,
    /// A declared package could not be installed.
    DependencyFailure,
    /// The test driver exited non-zero.
    TestFailure,
}

/// Terminal state of one entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "reason")]
pub enum EntryState {
    Succeeded,
    Failed(FailureReason),
    /// Not executed because fail-fast stopped the run.
    Skipped,
    /// Aborted by a shutdown request.
    Cancelled,
}

/// Non-terminal problems attached to a result without changing its state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "message")]
pub enum EntryWarning {
    /// The toolchain was fetched without a credential.
    DegradedMode(String),
    /// The best-effort coverage upload failed.
    Upload(String),
}

impl fmt::Display for EntryWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryWarning::DegradedMode(msg) => write!(f, "degraded mode: {msg}"),
            EntryWarning::Upload(msg) => write!(f, "upload: {msg}"),
        }
    }
}

/// Outcome of one matrix entry. Immutable once produced.
/// 一个矩阵条目的执行结果，生成后不可变。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub entry: MatrixEntry,
    pub state: EntryState,
    /// Exit code of the last external process that decided the state.
    pub exit_code: Option<i32>,
    /// Captured driver output, or the error detail for setup failures.
    pub output: String,
    /// Persisted coverage report, if the driver produced one.
    pub coverage_report: Option<PathBuf>,
    /// Reference printed by the upload step, if it succeeded.
    pub upload_reference: Option<String>,
    #[serde(default)]
    pub warnings: Vec<EntryWarning>,
    pub duration: Duration,
    /// The per-entry timeout fired.
    #[serde(default)]
    pub timed_out: bool,
}

impl ExecutionResult {
    /// A result that carries only a terminal state, with no process output.
    pub fn bare(entry: MatrixEntry, state: EntryState) -> Self {
        Self {
            entry,
            state,
            exit_code: None,
            output: String::new(),
            coverage_report: None,
            upload_reference: None,
            warnings: Vec::new(),
            duration: Duration::ZERO,
            timed_out: false,
        }
    }

    pub fn is_success(&self) -> bool {
        self.state == EntryState::Succeeded
    }

    pub fn is_failure(&self) -> bool {
        matches!(self.state, EntryState::Failed(_))
    }

    /// A non-success state on an entry that is required for the verdict.
    pub fn is_unexpected_failure(&self) -> bool {
        !self.entry.allow_failure && !self.is_success()
    }

    /// A failure on an entry whose failures are tolerated.
    pub fn is_allowed_failure(&self) -> bool {
        self.entry.allow_failure && self.is_failure()
    }

    pub fn failure_reason(&self) -> Option<FailureReason> {
        match self.state {
            EntryState::Failed(reason) => Some(reason),
            _ => None,
        }
    }

    pub fn name(&self) -> String {
        self.entry.name()
    }

    /// Gets the CSS class used by the HTML report for this status.
    pub fn status_class(&self) -> &'static str {
        match self.state {
            EntryState::Succeeded => "status-Passed",
            EntryState::Failed(_) if self.entry.allow_failure => "status-Allowed-Failure",
            EntryState::Failed(_) if self.timed_out => "status-Timeout",
            EntryState::Failed(FailureReason::TestFailure) => "status-Failed",
            EntryState::Failed(_) => "status-Setup-Failed",
            EntryState::Skipped | EntryState::Cancelled => "status-Skipped",
        }
    }

    /// Localized status label for display.
    /// 以字符串形式获取结果状态以供显示。
    pub fn status_str(&self, locale: &str) -> String {
        match self.state {
            EntryState::Succeeded => t!("report.status_passed", locale = locale).to_string(),
            EntryState::Failed(_) if self.entry.allow_failure => {
                t!("report.status_allowed_failure", locale = locale).to_string()
            }
            EntryState::Failed(_) if self.timed_out => {
                t!("report.status_timeout", locale = locale).to_string()
            }
            EntryState::Failed(FailureReason::SetupFailure) => {
                t!("report.status_setup_failed", locale = locale).to_string()
            }
            EntryState::Failed(FailureReason::DependencyFailure) => {
                t!("report.status_dependency_failed", locale = locale).to_string()
            }
            EntryState::Failed(FailureReason::TestFailure) => {
                t!("report.status_failed", locale = locale).to_string()
            }
            EntryState::Skipped => t!("report.status_skipped", locale = locale).to_string(),
            EntryState::Cancelled => t!("report.status_cancelled", locale = locale).to_string(),
        }
    }
}
