//! # Environment Provisioning Module / 环境准备模块
//!
//! One isolated runtime environment per matrix entry. A handle owns a private
//! root directory (removed when the handle is dropped), a private workspace,
//! an ordered search path and the variables exported to later steps. Nothing
//! in a handle is shared with another entry except read-only toolchain paths.
//!
//! 每个矩阵条目拥有一个隔离的运行时环境。句柄拥有私有根目录（句柄被丢弃时删除）、
//! 私有工作区、有序的搜索路径以及导出给后续步骤的变量。

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::env;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, info, warn};

use crate::core::config::EnvironmentConfig;
use crate::core::error::ProvisioningError;
use crate::core::models::MatrixEntry;
use crate::core::toolchain::ToolchainHandle;
use crate::infra::command::{self, CommandLine};
use crate::infra::fs;
use crate::infra::retry::{RetryPolicy, with_retry};

/// An isolated runtime context bound to one matrix entry.
pub struct EnvironmentHandle {
    root: PathBuf,
    workspace: PathBuf,
    bin_dir: PathBuf,
    interpreter: PathBuf,
    search_path: Vec<PathBuf>,
    vars: BTreeMap<String, String>,
    toolchains: BTreeMap<String, ToolchainHandle>,
    /// Deletes `root` on drop. `None` for handles over caller-owned directories.
    guard: Option<TempDir>,
}

impl EnvironmentHandle {
    /// Creates a handle over an already materialized runtime.
    ///
    /// The search path starts as `search_path`; callers apply the path
    /// augmentation contract with [`prepend_path`](Self::prepend_path).
    pub fn new(
        root: PathBuf,
        workspace: PathBuf,
        bin_dir: PathBuf,
        interpreter: PathBuf,
        search_path: Vec<PathBuf>,
    ) -> Self {
        Self {
            root,
            workspace,
            bin_dir,
            interpreter,
            search_path,
            vars: BTreeMap::new(),
            toolchains: BTreeMap::new(),
            guard: None,
        }
    }

    /// Ties the lifetime of the root directory to this handle.
    pub fn with_guard(mut self, guard: TempDir) -> Self {
        self.guard = Some(guard);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn workspace(&self) -> &Path {
        &self.workspace
    }

    pub fn bin_dir(&self) -> &Path {
        &self.bin_dir
    }

    pub fn interpreter(&self) -> &Path {
        &self.interpreter
    }

    pub fn search_path(&self) -> &[PathBuf] {
        &self.search_path
    }

    pub fn vars(&self) -> &BTreeMap<String, String> {
        &self.vars
    }

    /// A directory private to this environment, for per-entry installs.
    pub fn private_dir(&self, name: &str) -> PathBuf {
        match &self.guard {
            Some(guard) => guard.path().join(name),
            None => self.root.join(name),
        }
    }

    /// The toolchain named `name`, if it has been made available here.
    pub fn toolchain(&self, name: &str) -> Option<&ToolchainHandle> {
        self.toolchains.get(name)
    }

    /// Records that `handle` is available on this environment's search path.
    pub fn record_toolchain(&mut self, handle: ToolchainHandle) {
        self.toolchains.insert(handle.name().to_string(), handle);
    }

    pub fn has_path(&self, dir: &Path) -> bool {
        self.search_path.iter().any(|p| p == dir)
    }

    /// Puts `dir` first on the search path, moving it if already present.
    pub fn prepend_path(&mut self, dir: PathBuf) {
        self.search_path.retain(|p| p != &dir);
        self.search_path.insert(0, dir);
    }

    /// Adds `dir` to the end of the search path unless it is already there.
    /// Existing entries are never reordered. Returns `true` if the path changed.
    pub fn append_path(&mut self, dir: PathBuf) -> bool {
        if self.has_path(&dir) {
            return false;
        }
        self.search_path.push(dir);
        true
    }

    /// Exports a variable to every process started from this environment.
    pub fn set_var(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(key.into(), value.into());
    }

    /// The search path joined with the platform separator.
    pub fn joined_search_path(&self) -> OsString {
        env::join_paths(&self.search_path).unwrap_or_else(|e| {
            warn!(error = %e, "search path contains a separator, falling back to host PATH");
            env::var_os("PATH").unwrap_or_default()
        })
    }

    /// Looks `program` up on the handle's search path.
    pub fn resolve_program(&self, program: &str) -> Option<PathBuf> {
        find_executable(program, &self.search_path)
    }

    /// Builds a command running in the workspace with this environment applied.
    /// The child is killed if the returned command's future is dropped.
    pub fn command(&self, line: &CommandLine) -> tokio::process::Command {
        let program = self
            .resolve_program(&line.program)
            .unwrap_or_else(|| PathBuf::from(&line.program));
        let mut cmd = tokio::process::Command::new(program);
        cmd.args(&line.args)
            .current_dir(&self.workspace)
            .env("PATH", self.joined_search_path())
            .env("VIRTUAL_ENV", &self.root)
            .envs(&self.vars)
            .kill_on_drop(true);
        cmd
    }

    /// Removes the environment's root directory now, reporting failures.
    pub fn teardown(mut self) {
        if let Some(guard) = self.guard.take() {
            let path = guard.path().to_path_buf();
            if let Err(e) = guard.close() {
                warn!(path = %path.display(), error = %e, "failed to remove environment");
            } else {
                debug!(path = %path.display(), "environment removed");
            }
        }
    }
}

impl std::fmt::Debug for EnvironmentHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnvironmentHandle")
            .field("root", &self.root)
            .field("workspace", &self.workspace)
            .field("interpreter", &self.interpreter)
            .field("search_path", &self.search_path)
            .finish_non_exhaustive()
    }
}

/// Searches `dirs` in order for an executable file named `program`.
/// A `program` containing a path separator is returned as-is if it exists.
pub fn find_executable(program: &str, dirs: &[PathBuf]) -> Option<PathBuf> {
    let direct = Path::new(program);
    if direct.components().count() > 1 {
        return direct.is_file().then(|| direct.to_path_buf());
    }
    let candidates = executable_names(program);
    dirs.iter()
        .flat_map(|dir| candidates.iter().map(move |name| dir.join(name)))
        .find(|candidate| candidate.is_file())
}

fn executable_names(program: &str) -> Vec<String> {
    if cfg!(windows) && Path::new(program).extension().is_none() {
        vec![format!("{program}.exe"), format!("{program}.bat"), program.to_string()]
    } else {
        vec![program.to_string()]
    }
}

/// The host search path, as inherited by the orchestrator.
pub fn host_search_path() -> Vec<PathBuf> {
    env::var_os("PATH")
        .map(|path| env::split_paths(&path).collect())
        .unwrap_or_default()
}

/// Materializes one isolated environment per matrix entry.
#[async_trait]
pub trait Provisioner: Send + Sync {
    /// Creates the environment for `entry`.
    ///
    /// # Errors
    /// [`ProvisioningError`] if the entry's runtime cannot be resolved.
    async fn provision(&self, entry: &MatrixEntry) -> Result<EnvironmentHandle, ProvisioningError>;
}

/// Provisions runtimes with an external command (by default `uv venv`).
///
/// Axis values are passed verbatim to the command; resolving a nightly or
/// alternate-implementation identifier is entirely up to that service.
pub struct CommandProvisioner {
    config: EnvironmentConfig,
    project_root: PathBuf,
    retry: RetryPolicy,
}

impl CommandProvisioner {
    pub fn new(config: EnvironmentConfig, project_root: PathBuf, retry: RetryPolicy) -> Self {
        Self {
            config,
            project_root,
            retry,
        }
    }

    fn user_bin_dir(&self) -> Option<PathBuf> {
        match shellexpand::full(&self.config.user_bin_dir) {
            Ok(expanded) if !expanded.trim().is_empty() => Some(PathBuf::from(expanded.as_ref())),
            Ok(_) => None,
            Err(e) => {
                warn!(error = %e, "could not expand user bin directory, skipping it");
                None
            }
        }
    }

    fn prepare_workspace(&self, root: &Path) -> Result<PathBuf, ProvisioningError> {
        if !self.config.isolate_workspace {
            return Ok(self.project_root.clone());
        }
        let workspace = root.join("workspace");
        fs::copy_dir_all(&self.project_root, &workspace).map_err(|e| {
            ProvisioningError::CopyCheckout {
                message: format!("{e:#}"),
            }
        })?;
        Ok(workspace)
    }

    async fn run_provision_command(
        &self,
        entry: &MatrixEntry,
        env_dir: &Path,
        workspace: &Path,
        search_path: &[PathBuf],
    ) -> Result<(), ProvisioningError> {
        let env_dir_str = env_dir.to_string_lossy().to_string();
        let workspace_str = workspace.to_string_lossy().to_string();
        let mut vars: Vec<(&str, &str)> = entry
            .values
            .iter()
            .map(|a| (a.axis.as_str(), a.value.as_str()))
            .collect();
        vars.push(("env_dir", &env_dir_str));
        vars.push(("workspace", &workspace_str));

        let line = command::render_command(&self.config.provision, &vars)
            .map_err(|message| ProvisioningError::Template { message })?;
        let joined = env::join_paths(search_path).unwrap_or_default();

        with_retry(&self.retry, "provision", |attempt| {
            let line = line.clone();
            let joined = joined.clone();
            async move {
                debug!(entry = %entry.name(), attempt = attempt, command = %line, "provisioning runtime");
                let mut cmd = tokio::process::Command::new(&line.program);
                cmd.args(&line.args)
                    .current_dir(workspace)
                    .env("PATH", joined)
                    .kill_on_drop(true);
                let (status, output) = command::spawn_and_capture(cmd).await;
                let status = status.map_err(|source| ProvisioningError::Spawn {
                    program: line.program.clone(),
                    source,
                })?;
                if status.success() {
                    Ok(())
                } else {
                    Err(ProvisioningError::Unresolvable {
                        value: entry.name(),
                        exit_code: status.code(),
                        output,
                    })
                }
            }
        })
        .await
    }
}

#[async_trait]
impl Provisioner for CommandProvisioner {
    async fn provision(&self, entry: &MatrixEntry) -> Result<EnvironmentHandle, ProvisioningError> {
        let guard = fs::create_env_dir(&entry.slug())
            .map_err(|source| ProvisioningError::Workspace { source })?;
        let root = guard.path().to_path_buf();
        let env_dir = root.join("env");
        let workspace = self.prepare_workspace(&root)?;

        // The user-local directory goes in front of the host path before any
        // installation step runs.
        let mut search_path = host_search_path();
        if let Some(user_bin) = self.user_bin_dir() {
            search_path.retain(|p| p != &user_bin);
            search_path.insert(0, user_bin);
        }

        self.run_provision_command(entry, &env_dir, &workspace, &search_path)
            .await?;

        let bin_dir = env_dir.join(&self.config.bin_subdir);
        let interpreter = find_executable(&self.config.interpreter, std::slice::from_ref(&bin_dir))
            .ok_or_else(|| ProvisioningError::MissingInterpreter {
                path: bin_dir.join(&self.config.interpreter),
            })?;

        let mut handle = EnvironmentHandle::new(env_dir, workspace.clone(), bin_dir.clone(), interpreter, search_path)
            .with_guard(guard);
        handle.prepend_path(bin_dir);
        handle.set_var(
            self.config.workdir_env.clone(),
            workspace.to_string_lossy().to_string(),
        );

        info!(
            entry = %entry.name(),
            interpreter = %handle.interpreter().display(),
            workspace = %handle.workspace().display(),
            "environment provisioned"
        );
        Ok(handle)
    }
}
