//! # Error Taxonomy Module / 错误分类模块
//!
//! Typed errors for every stage of the pipeline. Only [`ConfigurationError`]
//! is fatal to a whole run; every other error is scoped to the matrix entry
//! that raised it and is folded into that entry's result.
//!
//! 流水线各阶段的类型化错误。只有 [`ConfigurationError`] 会终止整个运行；
//! 其他错误都只作用于引发它的矩阵条目，并被记录到该条目的结果中。

use std::path::PathBuf;

use thiserror::Error;

use crate::core::models::FailureReason;

/// Malformed or empty matrix specification. Aborts the run before any entry starts.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("failed to read configuration file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse configuration file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("the matrix declares no axes")]
    EmptyMatrix,

    #[error("matrix axis '{axis}' has no values")]
    EmptyAxis { axis: String },

    #[error("matrix axis '{axis}' is declared more than once")]
    DuplicateAxis { axis: String },

    #[error("{rule} rule references unknown axis '{axis}'")]
    UnknownAxis { rule: &'static str, axis: String },

    #[error("include rule must set a value for every axis, missing '{axis}'")]
    IncompleteInclude { axis: String },

    #[error("{rule} rule is empty")]
    EmptyRule { rule: &'static str },

    #[error("the matrix expands to zero entries after exclusions")]
    NoEntries,

    #[error("invalid runner split: {reason}")]
    InvalidSplit { reason: String },

    #[error("invalid value for '{field}': {reason}")]
    InvalidField { field: &'static str, reason: String },
}

/// The runtime for an axis value could not be materialized.
#[derive(Debug, Error)]
pub enum ProvisioningError {
    #[error("failed to prepare environment directory: {source}")]
    Workspace { source: std::io::Error },

    #[error("failed to copy checkout into environment workspace: {message}")]
    CopyCheckout { message: String },

    #[error("invalid provisioning command: {message}")]
    Template { message: String },

    #[error("failed to launch provisioning command '{program}': {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[error("runtime '{value}' could not be provisioned (exit code {exit_code:?})")]
    Unresolvable {
        value: String,
        exit_code: Option<i32>,
        output: String,
    },

    #[error("provisioned runtime has no interpreter at {}", path.display())]
    MissingInterpreter { path: PathBuf },

    #[error("version inference failed on a shallow checkout; fetch the full history with tags")]
    ShallowHistory { output: String },

    #[error("version inference failed (exit code {exit_code:?})")]
    VersionInference {
        exit_code: Option<i32>,
        output: String,
    },
}

/// The external binary toolchain could not be obtained or is unusable.
#[derive(Debug, Error)]
pub enum ToolchainFetchError {
    #[error("invalid toolchain fetch command: {message}")]
    Template { message: String },

    #[error("failed to prepare toolchain directory: {source}")]
    Directory { source: std::io::Error },

    #[error("failed to launch toolchain fetch '{program}': {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[error("toolchain '{name}' fetch failed (exit code {exit_code:?})")]
    Fetch {
        name: String,
        exit_code: Option<i32>,
        output: String,
    },

    #[error(
        "could not find required tool {tool} in {location}; place it in PATH or set the {env_var} environment variable"
    )]
    ToolNotFound {
        tool: String,
        location: String,
        env_var: String,
    },

    #[error("tool {tool} reports version {found}, but at least {required} is required")]
    VersionTooOld {
        tool: String,
        found: String,
        required: String,
    },

    #[error("could not determine the version of {tool}: {output}")]
    UnknownVersion { tool: String, output: String },
}

/// A declared package could not be installed into an environment.
#[derive(Debug, Error)]
pub enum DependencyInstallError {
    #[error("failed to launch package installer '{program}': {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[error("package installation failed (exit code {exit_code:?})")]
    Install {
        exit_code: Option<i32>,
        output: String,
    },
}

/// The test driver could not be launched at all. A driver that runs and
/// exits non-zero is not an error; it is a `TestFailure` classification.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("failed to launch test driver '{program}': {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },
}

/// Best-effort report upload failure. Never changes an entry's classification.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("no coverage report was produced, nothing to upload")]
    MissingReport,

    #[error("invalid upload command: {message}")]
    Template { message: String },

    #[error("failed to launch upload command '{program}': {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[error("upload did not finish within {secs}s")]
    TimedOut { secs: u64 },

    #[error("upload command exited with code {exit_code:?}")]
    Failed {
        exit_code: Option<i32>,
        output: String,
    },
}

/// Any error that ends a single entry early. Caught at the entry boundary.
#[derive(Debug, Error)]
pub enum EntryError {
    #[error(transparent)]
    Provisioning(#[from] ProvisioningError),
    #[error(transparent)]
    Toolchain(#[from] ToolchainFetchError),
    #[error(transparent)]
    Dependency(#[from] DependencyInstallError),
    #[error(transparent)]
    Run(#[from] RunError),
}

impl EntryError {
    /// Maps the error onto the terminal failure classification of its entry.
    pub fn reason(&self) -> FailureReason {
        match self {
            EntryError::Provisioning(_) | EntryError::Toolchain(_) => FailureReason::SetupFailure,
            EntryError::Dependency(_) => FailureReason::DependencyFailure,
            EntryError::Run(_) => FailureReason::TestFailure,
        }
    }

    /// Captured process output attached to the error, if any.
    pub fn output(&self) -> Option<&str> {
        match self {
            EntryError::Provisioning(
                ProvisioningError::Unresolvable { output, .. }
                | ProvisioningError::ShallowHistory { output }
                | ProvisioningError::VersionInference { output, .. },
            ) => Some(output),
            EntryError::Toolchain(ToolchainFetchError::Fetch { output, .. }) => Some(output),
            EntryError::Dependency(DependencyInstallError::Install { output, .. }) => Some(output),
            _ => None,
        }
    }

    /// Exit code of the failed external process, if one ran.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            EntryError::Provisioning(
                ProvisioningError::Unresolvable { exit_code, .. }
                | ProvisioningError::VersionInference { exit_code, .. },
            ) => *exit_code,
            EntryError::Toolchain(ToolchainFetchError::Fetch { exit_code, .. }) => *exit_code,
            EntryError::Dependency(DependencyInstallError::Install { exit_code, .. }) => *exit_code,
            _ => None,
        }
    }
}
