//! # Toolchain Installation Module / 工具链安装模块
//!
//! Fetches the external EDA toolchain and exposes its executables on an
//! environment's search path. In shared mode the toolchain is installed once
//! per run behind an async install-once cell and then only read; in per-entry
//! mode each environment receives a private copy.
//!
//! 获取外部 EDA 工具链，并将其可执行文件加入环境的搜索路径。共享模式下工具链
//! 每次运行只安装一次（异步一次性初始化），之后只读；按条目模式下每个环境各有一份。

use async_trait::async_trait;
use std::cmp::Ordering;
use std::env;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::core::config::{ToolRequirement, ToolchainConfig};
use crate::core::environment::{EnvironmentHandle, find_executable};
use crate::core::error::ToolchainFetchError;
use crate::infra::command::{self, CommandLine};
use crate::infra::fs;
use crate::infra::retry::{RetryPolicy, with_retry};

/// A read-only reference to an installed external binary set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolchainHandle {
    name: String,
    root: PathBuf,
    bin_dir: PathBuf,
    authenticated: bool,
}

impl ToolchainHandle {
    pub fn new(name: impl Into<String>, root: PathBuf, bin_dir: PathBuf, authenticated: bool) -> Self {
        Self {
            name: name.into(),
            root,
            bin_dir,
            authenticated,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn bin_dir(&self) -> &Path {
        &self.bin_dir
    }

    /// `false` when the fetch ran without a credential (anonymous rate limits).
    pub fn authenticated(&self) -> bool {
        self.authenticated
    }
}

/// An optional secret used to raise the download quota of the fetch.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Reads the credential from `var`. Unset or blank means absent.
    pub fn from_env(var: &str) -> Option<Self> {
        env::var(var)
            .ok()
            .filter(|token| !token.trim().is_empty())
            .map(Self)
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(***)")
    }
}

/// Fetches a toolchain into a destination directory.
#[async_trait]
pub trait Installer: Send + Sync {
    /// Downloads and unpacks the toolchain under `dest`.
    ///
    /// # Errors
    /// [`ToolchainFetchError`] if the binary set cannot be obtained.
    async fn fetch(
        &self,
        dest: &Path,
        credential: Option<&Credential>,
    ) -> Result<ToolchainHandle, ToolchainFetchError>;
}

/// Fetches the toolchain with an external command, e.g. a release downloader.
/// The credential is exported to the command under the configured variable.
pub struct CommandInstaller {
    config: ToolchainConfig,
    retry: RetryPolicy,
}

impl CommandInstaller {
    pub fn new(config: ToolchainConfig, retry: RetryPolicy) -> Self {
        Self { config, retry }
    }
}

#[async_trait]
impl Installer for CommandInstaller {
    async fn fetch(
        &self,
        dest: &Path,
        credential: Option<&Credential>,
    ) -> Result<ToolchainHandle, ToolchainFetchError> {
        let dest_str = dest.to_string_lossy().to_string();
        let line = command::render_command(&self.config.fetch, &[("dest", &dest_str)])
            .map_err(|message| ToolchainFetchError::Template { message })?;
        std::fs::create_dir_all(dest).map_err(|source| ToolchainFetchError::Directory { source })?;

        with_retry(&self.retry, "toolchain fetch", |attempt| {
            let line = line.clone();
            async move {
                debug!(toolchain = %self.config.name, attempt = attempt, command = %line, "fetching toolchain");
                let mut cmd = tokio::process::Command::new(&line.program);
                cmd.args(&line.args).current_dir(dest).kill_on_drop(true);
                match credential {
                    Some(token) => {
                        cmd.env(&self.config.credential_env, token.expose());
                    }
                    None => {
                        cmd.env_remove(&self.config.credential_env);
                    }
                }
                let (status, output) = command::spawn_and_capture(cmd).await;
                let status = status.map_err(|source| ToolchainFetchError::Spawn {
                    program: line.program.clone(),
                    source,
                })?;
                if status.success() {
                    Ok(())
                } else {
                    Err(ToolchainFetchError::Fetch {
                        name: self.config.name.clone(),
                        exit_code: status.code(),
                        output,
                    })
                }
            }
        })
        .await?;

        Ok(ToolchainHandle::new(
            self.config.name.clone(),
            dest.to_path_buf(),
            dest.join(&self.config.bin_subdir),
            credential.is_some(),
        ))
    }
}

struct SharedInstall {
    handle: ToolchainHandle,
    _dir: TempDir,
}

/// Result of making the toolchain available in one environment.
#[derive(Debug, Clone)]
pub struct ToolchainInstall {
    pub handle: ToolchainHandle,
    /// `false` when the environment already had the toolchain (no-op install).
    pub newly_added: bool,
}

/// The install phase of the pipeline: fetch (or reuse) and expose the toolchain.
pub struct ToolchainStage {
    installer: Arc<dyn Installer>,
    name: String,
    share: bool,
    tools: Vec<ToolRequirement>,
    credential: Option<Credential>,
    shared: OnceCell<SharedInstall>,
}

impl ToolchainStage {
    /// Creates the stage. A missing credential is logged once here; every
    /// entry using the resulting handle also carries a degraded-mode warning.
    pub fn new(
        installer: Arc<dyn Installer>,
        config: &ToolchainConfig,
        credential: Option<Credential>,
    ) -> Self {
        if credential.is_none() {
            warn!(
                toolchain = %config.name,
                variable = %config.credential_env,
                "no toolchain credential provided, fetching unauthenticated (anonymous rate limits apply)"
            );
        }
        Self {
            installer,
            name: config.name.clone(),
            share: config.share,
            tools: config.tools.clone(),
            credential,
            shared: OnceCell::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn has_credential(&self) -> bool {
        self.credential.is_some()
    }

    /// Makes the toolchain available in `env`.
    ///
    /// Idempotent: an environment that already carries the toolchain is left
    /// untouched, with no fetch and no duplicate search-path entry. The bin
    /// directory is appended; existing search-path entries keep their order.
    pub async fn install_into(
        &self,
        env: &mut EnvironmentHandle,
    ) -> Result<ToolchainInstall, ToolchainFetchError> {
        if let Some(existing) = env.toolchain(&self.name) {
            if env.has_path(existing.bin_dir()) {
                debug!(toolchain = %self.name, "toolchain already available, skipping install");
                return Ok(ToolchainInstall {
                    handle: existing.clone(),
                    newly_added: false,
                });
            }
        }

        let handle = if self.share {
            self.shared_handle().await?
        } else {
            let dest = env.private_dir(&format!("toolchain-{}", self.name));
            self.installer.fetch(&dest, self.credential.as_ref()).await?
        };

        let newly_added = env.append_path(handle.bin_dir().to_path_buf());
        env.record_toolchain(handle.clone());
        self.verify_tools(env).await?;

        Ok(ToolchainInstall {
            handle,
            newly_added,
        })
    }

    async fn shared_handle(&self) -> Result<ToolchainHandle, ToolchainFetchError> {
        let install = self
            .shared
            .get_or_try_init(|| async {
                let dir = fs::create_toolchain_dir(&self.name)
                    .map_err(|source| ToolchainFetchError::Directory { source })?;
                let handle = self
                    .installer
                    .fetch(dir.path(), self.credential.as_ref())
                    .await?;
                info!(
                    toolchain = %handle.name(),
                    bin_dir = %handle.bin_dir().display(),
                    authenticated = handle.authenticated(),
                    "toolchain installed for this run"
                );
                Ok::<_, ToolchainFetchError>(SharedInstall { handle, _dir: dir })
            })
            .await?;
        Ok(install.handle.clone())
    }

    async fn verify_tools(&self, env: &EnvironmentHandle) -> Result<(), ToolchainFetchError> {
        for tool in &self.tools {
            let path = resolve_tool(&tool.name, env)?;
            if let Some(min) = &tool.min_version {
                check_tool_version(&tool.name, &path, min, env).await?;
            }
        }
        Ok(())
    }
}

/// Name of the variable that overrides the location of `tool`.
/// `yosys` → `YOSYS`, `nextpnr-ice40` → `NEXTPNR_ICE40`, `g++` → `GXX`.
pub fn tool_env_var(tool: &str) -> String {
    tool.to_uppercase().replace('-', "_").replace('+', "X")
}

/// Resolves a required tool: the override variable wins, then the search path.
pub fn resolve_tool(tool: &str, env: &EnvironmentHandle) -> Result<PathBuf, ToolchainFetchError> {
    let var = tool_env_var(tool);
    match env::var(&var) {
        Ok(overridden) if !overridden.is_empty() => {
            find_executable(&overridden, env.search_path()).ok_or_else(|| {
                ToolchainFetchError::ToolNotFound {
                    tool: tool.to_string(),
                    location: overridden.clone(),
                    env_var: var.clone(),
                }
            })
        }
        _ => env
            .resolve_program(tool)
            .ok_or_else(|| ToolchainFetchError::ToolNotFound {
                tool: tool.to_string(),
                location: "PATH".to_string(),
                env_var: var,
            }),
    }
}

async fn check_tool_version(
    tool: &str,
    path: &Path,
    min: &str,
    env: &EnvironmentHandle,
) -> Result<(), ToolchainFetchError> {
    let required = ToolVersion::parse(min).ok_or_else(|| ToolchainFetchError::UnknownVersion {
        tool: tool.to_string(),
        output: format!("invalid minimum version '{min}'"),
    })?;
    let line = CommandLine {
        program: path.to_string_lossy().to_string(),
        args: vec!["-V".to_string()],
    };
    let (status, output) = command::spawn_and_capture(env.command(&line)).await;
    let status = status.map_err(|source| ToolchainFetchError::Spawn {
        program: line.program.clone(),
        source,
    })?;
    let found = status
        .success()
        .then(|| ToolVersion::parse(&output))
        .flatten()
        .ok_or_else(|| ToolchainFetchError::UnknownVersion {
            tool: tool.to_string(),
            output: command::tail_lines(&output, 5),
        })?;
    debug!(tool = tool, version = %found, "probed tool version");
    if found < required {
        return Err(ToolchainFetchError::VersionTooOld {
            tool: tool.to_string(),
            found: found.to_string(),
            required: min.to_string(),
        });
    }
    Ok(())
}

/// A `major.minor[+distance]` tool version, as printed by e.g. `yosys -V`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToolVersion {
    pub major: u32,
    pub minor: u32,
    /// Commits since the last release tag.
    pub distance: u32,
}

impl ToolVersion {
    /// Extracts the first version-looking word from `text`.
    /// `Yosys 0.40+25 (git sha1 ...)` parses as `0.40+25`.
    pub fn parse(text: &str) -> Option<Self> {
        text.split_whitespace().find_map(Self::parse_word)
    }

    fn parse_word(word: &str) -> Option<Self> {
        let word = word.strip_prefix('v').unwrap_or(word);
        let (numbers, distance) = match word.split_once('+') {
            Some((numbers, rest)) => {
                let digits: String = rest.chars().take_while(char::is_ascii_digit).collect();
                (numbers, digits.parse().ok()?)
            }
            None => (word, 0),
        };
        let mut parts = numbers.split('.');
        let major = parts.next()?.parse().ok()?;
        let minor_digits: String = parts
            .next()?
            .chars()
            .take_while(char::is_ascii_digit)
            .collect();
        let minor = minor_digits.parse().ok()?;
        Some(Self {
            major,
            minor,
            distance,
        })
    }
}

impl fmt::Display for ToolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.distance > 0 {
            write!(f, "{}.{}+{}", self.major, self.minor, self.distance)
        } else {
            write!(f, "{}.{}", self.major, self.minor)
        }
    }
}

impl PartialOrd for ToolVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ToolVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.major, self.minor, self.distance).cmp(&(other.major, other.minor, other.distance))
    }
}
