//! # Dependency Resolution Module / 依赖解析模块
//!
//! Installs the packages the test driver needs into one environment's
//! interpreter, then derives the project version from repository history.
//!
//! 将测试驱动所需的包安装到单个环境的解释器中，然后根据仓库历史推断项目版本。

use async_trait::async_trait;
use tracing::{debug, info};

use crate::core::config::{DependencyConfig, PackageRequirement};
use crate::core::environment::EnvironmentHandle;
use crate::core::error::{DependencyInstallError, ProvisioningError};
use crate::infra::command::{self, CommandLine};

/// Installs packages into, and inspects the project from, an environment.
#[async_trait]
pub trait Resolver: Send + Sync {
    /// Installs `packages` into the handle's interpreter only.
    async fn install(
        &self,
        env: &EnvironmentHandle,
        packages: &[PackageRequirement],
    ) -> Result<(), DependencyInstallError>;

    /// Derives the project version. `Ok(None)` when inference is disabled.
    ///
    /// # Errors
    /// [`ProvisioningError::ShallowHistory`] when the checkout lacks the
    /// history the probe needs, [`ProvisioningError::VersionInference`] otherwise.
    async fn infer_version(&self, env: &EnvironmentHandle) -> Result<Option<String>, ProvisioningError>;
}

/// Resolves dependencies with `<interpreter> -m pip` and a configurable version probe.
pub struct PipResolver {
    config: DependencyConfig,
}

impl PipResolver {
    pub fn new(config: DependencyConfig) -> Self {
        Self { config }
    }
}

/// Builds the install command line: `<interpreter> -m pip install --upgrade <specs...>`.
pub fn pip_install_command(env: &EnvironmentHandle, packages: &[PackageRequirement]) -> CommandLine {
    let mut args = vec![
        "-m".to_string(),
        "pip".to_string(),
        "install".to_string(),
        "--upgrade".to_string(),
    ];
    args.extend(packages.iter().map(PackageRequirement::specifier));
    CommandLine {
        program: env.interpreter().to_string_lossy().to_string(),
        args,
    }
}

#[async_trait]
impl Resolver for PipResolver {
    async fn install(
        &self,
        env: &EnvironmentHandle,
        packages: &[PackageRequirement],
    ) -> Result<(), DependencyInstallError> {
        if packages.is_empty() {
            return Ok(());
        }
        let line = pip_install_command(env, packages);
        debug!(command = %line, "installing packages");
        let (status, output) = command::spawn_and_capture(env.command(&line)).await;
        let status = status.map_err(|source| DependencyInstallError::Spawn {
            program: line.program.clone(),
            source,
        })?;
        if !status.success() {
            return Err(DependencyInstallError::Install {
                exit_code: status.code(),
                output,
            });
        }
        Ok(())
    }

    async fn infer_version(&self, env: &EnvironmentHandle) -> Result<Option<String>, ProvisioningError> {
        if self.config.version_probe.trim().is_empty() {
            return Ok(None);
        }
        let line = command::render_command(&self.config.version_probe, &[])
            .map_err(|message| ProvisioningError::Template { message })?;
        let (status, output) = command::spawn_and_capture(env.command(&line)).await;
        let status = status.map_err(|source| ProvisioningError::Spawn {
            program: line.program.clone(),
            source,
        })?;
        if status.success() {
            let version = output.lines().last().unwrap_or_default().trim().to_string();
            info!(version = %version, "project version inferred");
            return Ok(Some(version));
        }
        if is_shallow_checkout(env).await {
            return Err(ProvisioningError::ShallowHistory { output });
        }
        Err(ProvisioningError::VersionInference {
            exit_code: status.code(),
            output,
        })
    }
}

/// `true` only when git positively reports a shallow repository.
async fn is_shallow_checkout(env: &EnvironmentHandle) -> bool {
    let line = CommandLine {
        program: "git".to_string(),
        args: vec!["rev-parse".to_string(), "--is-shallow-repository".to_string()],
    };
    let (status, output) = command::spawn_and_capture(env.command(&line)).await;
    matches!(status, Ok(s) if s.success()) && output.trim() == "true"
}
