//! # Configuration Module / 配置模块
//!
//! Parsing of the pipeline configuration file (`CiMatrix.toml`). Every section
//! except `[matrix]` has defaults matching the reference pipeline: a
//! `python-version` axis, a `uv`-provisioned virtual environment, a
//! `nox -s test -- --coverage --codecov` test session and a shared EDA toolchain.
//!
//! 解析流水线配置文件（`CiMatrix.toml`）。除 `[matrix]` 外每个部分都有默认值。

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::core::error::ConfigurationError;
use crate::core::models::AxisValue;
use crate::core::trigger::TriggerConfig;
use crate::infra::retry::RetryPolicy;

/// Name of the configuration file looked up by default.
pub const DEFAULT_CONFIG_FILE: &str = "CiMatrix.toml";

/// A named dimension of the matrix with its ordered values.
/// 矩阵的一个具名维度及其有序取值。
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Axis {
    pub name: String,
    pub values: Vec<AxisValue>,
}

/// A partial (or, for includes, complete) assignment of axis values.
pub type MatrixRule = BTreeMap<String, AxisValue>;

/// The `[matrix]` section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct MatrixSpec {
    /// Axes in declaration order. The first axis varies slowest.
    #[serde(default)]
    pub axes: Vec<Axis>,
    /// Extra combinations appended after the Cartesian product.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub include: Vec<MatrixRule>,
    /// Combinations removed from the product; keys match partially.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exclude: Vec<MatrixRule>,
    /// Combinations whose failure does not fail the run.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allow_failure: Vec<MatrixRule>,
}

/// The `[environment]` section: how a runtime is provisioned for an entry.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct EnvironmentConfig {
    /// Provisioning command template. `{<axis-name>}`, `{env_dir}` and
    /// `{workspace}` are substituted after shell-style splitting.
    pub provision: String,
    /// Interpreter executable expected in the runtime's bin directory.
    pub interpreter: String,
    /// Bin directory of the runtime, relative to the environment root.
    pub bin_subdir: PathBuf,
    /// User-local executable directory prepended to the search path.
    pub user_bin_dir: String,
    /// Variable exporting the resolved working directory to later steps.
    pub workdir_env: String,
    /// Copy the checkout into a private workspace per entry.
    pub isolate_workspace: bool,
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            provision: "uv venv --python {python-version} {env_dir}".to_string(),
            interpreter: "python".to_string(),
            bin_subdir: PathBuf::from(if cfg!(windows) { "Scripts" } else { "bin" }),
            user_bin_dir: "~/.local/bin".to_string(),
            workdir_env: "CI_WORKSPACE".to_string(),
            isolate_workspace: true,
        }
    }
}

/// A tool the installed toolchain must provide.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ToolRequirement {
    pub name: String,
    /// Minimum `major.minor` version, probed with `<tool> -V`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_version: Option<String>,
}

/// The `[toolchain]` section. Absent means the install phase is a no-op.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ToolchainConfig {
    pub name: String,
    /// Fetch command template; `{dest}` is the install root.
    pub fetch: String,
    /// Executable directory, relative to the install root.
    #[serde(default = "default_toolchain_bin")]
    pub bin_subdir: PathBuf,
    /// Variable holding the optional credential used to raise the fetch quota.
    #[serde(default = "default_credential_env")]
    pub credential_env: String,
    /// Install once per run and share read-only between entries.
    #[serde(default = "default_true")]
    pub share: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolRequirement>,
}

/// A package the test driver needs, with the minimum version never to go below.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct PackageRequirement {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<String>,
}

impl PackageRequirement {
    /// Renders the requirement as a pip specifier, e.g. `setuptools>=61`.
    pub fn specifier(&self) -> String {
        match &self.min {
            Some(min) => format!("{}>={}", self.name, min),
            None => self.name.clone(),
        }
    }
}

/// The `[dependencies]` section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct DependencyConfig {
    /// Command deriving the project version from repository history. Empty disables it.
    pub version_probe: String,
    pub packages: Vec<PackageRequirement>,
}

impl Default for DependencyConfig {
    fn default() -> Self {
        Self {
            version_probe: "python -m setuptools_scm".to_string(),
            packages: vec![
                PackageRequirement {
                    name: "setuptools".to_string(),
                    min: Some("61".to_string()),
                },
                PackageRequirement {
                    name: "setuptools_scm".to_string(),
                    min: None,
                },
                PackageRequirement {
                    name: "nox".to_string(),
                    min: None,
                },
            ],
        }
    }
}

/// The `[run]` section: how the test driver is invoked.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct RunConfig {
    pub driver: String,
    pub session: String,
    pub flags: Vec<String>,
    /// Coverage artifact emitted by the driver, relative to the workspace.
    pub coverage_report: PathBuf,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            driver: "nox".to_string(),
            session: "test".to_string(),
            flags: vec!["--coverage".to_string(), "--codecov".to_string()],
            coverage_report: PathBuf::from("coverage.xml"),
        }
    }
}

/// The `[upload]` section: best-effort coverage upload.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct UploadConfig {
    /// Upload command template; `{coverage}` is the persisted report path.
    pub command: String,
    /// Limit for one upload. Counted apart from the entry timeout.
    #[serde(default = "default_upload_timeout")]
    pub timeout_secs: u64,
}

impl UploadConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// The `[retry]` section, applied to provisioning and toolchain fetches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    pub attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            attempts: 1,
            initial_backoff_ms: 500,
            max_backoff_ms: 5000,
        }
    }
}

impl From<RetryConfig> for RetryPolicy {
    fn from(config: RetryConfig) -> Self {
        RetryPolicy {
            attempts: config.attempts.max(1),
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
        }
    }
}

/// Represents the whole pipeline configuration, loaded from a TOML file.
/// 代表从 TOML 文件加载的整个流水线配置。
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PipelineConfig {
    /// The language for the runner's output messages (e.g., "en", "zh-CN").
    /// 运行器输出消息的语言。
    #[serde(default = "default_language")]
    pub language: String,

    /// Skip unfinished entries after the first required failure.
    #[serde(default)]
    pub fail_fast: bool,

    #[serde(default = "default_entry_timeout")]
    pub entry_timeout_secs: u64,

    /// Where coverage reports are persisted after an entry's teardown.
    #[serde(default = "default_artifacts_dir")]
    pub artifacts_dir: PathBuf,

    #[serde(default)]
    pub triggers: TriggerConfig,

    pub matrix: MatrixSpec,

    #[serde(default)]
    pub environment: EnvironmentConfig,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub toolchain: Option<ToolchainConfig>,

    #[serde(default)]
    pub dependencies: DependencyConfig,

    #[serde(default)]
    pub run: RunConfig,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upload: Option<UploadConfig>,

    #[serde(default)]
    pub retry: RetryConfig,
}

impl PipelineConfig {
    /// Per-entry timeout as a `Duration`.
    pub fn entry_timeout(&self) -> Duration {
        Duration::from_secs(self.entry_timeout_secs)
    }

    /// Checks field-level constraints that serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.entry_timeout_secs == 0 {
            return Err(ConfigurationError::InvalidField {
                field: "entry_timeout_secs",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.run.driver.trim().is_empty() {
            return Err(ConfigurationError::InvalidField {
                field: "run.driver",
                reason: "must not be empty".to_string(),
            });
        }
        if self.run.session.trim().is_empty() {
            return Err(ConfigurationError::InvalidField {
                field: "run.session",
                reason: "must not be empty".to_string(),
            });
        }
        if self.environment.provision.trim().is_empty() {
            return Err(ConfigurationError::InvalidField {
                field: "environment.provision",
                reason: "must not be empty".to_string(),
            });
        }
        if self.upload.as_ref().is_some_and(|upload| upload.timeout_secs == 0) {
            return Err(ConfigurationError::InvalidField {
                field: "upload.timeout_secs",
                reason: "must be greater than zero".to_string(),
            });
        }
        if let Some(toolchain) = &self.toolchain {
            if toolchain.fetch.trim().is_empty() {
                return Err(ConfigurationError::InvalidField {
                    field: "toolchain.fetch",
                    reason: "must not be empty".to_string(),
                });
            }
        }
        Ok(())
    }
}

/// Reads, parses and validates a pipeline configuration file.
pub fn load_pipeline_config(path: &Path) -> Result<PipelineConfig, ConfigurationError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigurationError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let config: PipelineConfig =
        toml::from_str(&content).map_err(|source| ConfigurationError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
    config.validate()?;
    Ok(config)
}

fn default_language() -> String {
    "en".to_string()
}

fn default_entry_timeout() -> u64 {
    3600
}

fn default_upload_timeout() -> u64 {
    300
}

fn default_artifacts_dir() -> PathBuf {
    PathBuf::from("ci-artifacts")
}

fn default_toolchain_bin() -> PathBuf {
    PathBuf::from("bin")
}

fn default_credential_env() -> String {
    "GITHUB_TOKEN".to_string()
}

fn default_true() -> bool {
    true
}
