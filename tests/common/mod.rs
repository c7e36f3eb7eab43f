// Shared test helpers: deterministic fake capabilities and fixtures.
#![allow(dead_code)]

use async_trait::async_trait;
use lazy_static::lazy_static;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::{TempDir, tempdir};

use matrix_ci::core::config::{Axis, MatrixSpec, ToolchainConfig};
use matrix_ci::core::environment::{EnvironmentHandle, Provisioner};
use matrix_ci::core::error::{
    DependencyInstallError, ProvisioningError, RunError, ToolchainFetchError, UploadError,
};
use matrix_ci::core::execution::{Capabilities, Pipeline, PipelineSettings};
use matrix_ci::core::executor::{RunOutcome, Runner, Uploader};
use matrix_ci::core::matrix;
use matrix_ci::core::models::{AxisValue, MatrixEntry};
use matrix_ci::core::toolchain::{Credential, Installer, ToolchainHandle, ToolchainStage};
use matrix_ci::core::config::PackageRequirement;
use matrix_ci::core::dependencies::Resolver;

lazy_static! {
    /// Serializes tests that read or write process environment variables.
    pub static ref ENV_LOCK: Mutex<()> = Mutex::new(());
}

/// Variable the fake provisioner exports so later fakes know their entry.
pub const ENTRY_VAR: &str = "FAKE_ENTRY";

pub const SCENARIO_VERSIONS: [&str; 5] = ["3.9", "3.10", "3.11", "3.12-dev", "pypy-3.9-v7.3.11"];

pub fn single_axis(name: &str, values: &[&str]) -> MatrixSpec {
    MatrixSpec {
        axes: vec![Axis {
            name: name.to_string(),
            values: values.iter().map(|v| AxisValue::from(*v)).collect(),
        }],
        ..MatrixSpec::default()
    }
}

pub fn scenario_entries() -> Vec<MatrixEntry> {
    matrix::expand(&single_axis("python-version", &SCENARIO_VERSIONS)).unwrap()
}

fn names(values: &[&str]) -> HashSet<String> {
    values.iter().map(|v| v.to_string()).collect()
}

fn entry_of(env: &EnvironmentHandle) -> String {
    env.vars().get(ENTRY_VAR).cloned().unwrap_or_default()
}

/// Creates a real temporary environment per entry and records its root.
#[derive(Default)]
pub struct FakeProvisioner {
    pub unresolvable: HashSet<String>,
    pub roots: Mutex<Vec<PathBuf>>,
    pub delay: Option<Duration>,
}

impl FakeProvisioner {
    pub fn failing_for(values: &[&str]) -> Self {
        Self {
            unresolvable: names(values),
            ..Self::default()
        }
    }

    pub fn created_roots(&self) -> Vec<PathBuf> {
        self.roots.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provisioner for FakeProvisioner {
    async fn provision(&self, entry: &MatrixEntry) -> Result<EnvironmentHandle, ProvisioningError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.unresolvable.contains(&entry.name()) {
            return Err(ProvisioningError::Unresolvable {
                value: entry.name(),
                exit_code: Some(1),
                output: format!("no runtime matches {}", entry.name()),
            });
        }
        let guard = tempfile::Builder::new()
            .prefix("fake_env_")
            .tempdir()
            .map_err(|source| ProvisioningError::Workspace { source })?;
        let root = guard.path().to_path_buf();
        let workspace = root.join("workspace");
        let bin_dir = root.join("bin");
        fs::create_dir_all(&workspace).map_err(|source| ProvisioningError::Workspace { source })?;
        fs::create_dir_all(&bin_dir).map_err(|source| ProvisioningError::Workspace { source })?;
        self.roots.lock().unwrap().push(root.clone());

        let mut handle = EnvironmentHandle::new(
            root,
            workspace,
            bin_dir.clone(),
            bin_dir.join("python"),
            vec![PathBuf::from("/usr/bin")],
        )
        .with_guard(guard);
        handle.prepend_path(bin_dir);
        handle.set_var(ENTRY_VAR, entry.name());
        Ok(handle)
    }
}

/// Counts fetches; the handle is authenticated iff a credential was given.
#[derive(Default)]
pub struct FakeInstaller {
    pub fetches: AtomicUsize,
    pub fail: bool,
    pub delay: Option<Duration>,
    pub credentials_seen: Mutex<Vec<Option<String>>>,
}

impl FakeInstaller {
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Installer for FakeInstaller {
    async fn fetch(
        &self,
        dest: &Path,
        credential: Option<&Credential>,
    ) -> Result<ToolchainHandle, ToolchainFetchError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.credentials_seen
            .lock()
            .unwrap()
            .push(credential.map(|c| c.expose().to_string()));
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail {
            return Err(ToolchainFetchError::Fetch {
                name: "fake-suite".to_string(),
                exit_code: Some(22),
                output: "HTTP 403 rate limit exceeded".to_string(),
            });
        }
        let bin_dir = dest.join("bin");
        fs::create_dir_all(&bin_dir).map_err(|source| ToolchainFetchError::Directory { source })?;
        Ok(ToolchainHandle::new("fake-suite", dest.to_path_buf(), bin_dir, credential.is_some()))
    }
}

pub fn toolchain_config(share: bool) -> ToolchainConfig {
    ToolchainConfig {
        name: "fake-suite".to_string(),
        fetch: "true".to_string(),
        bin_subdir: "bin".into(),
        credential_env: "FAKE_TOOLCHAIN_TOKEN".to_string(),
        share,
        tools: vec![],
    }
}

pub fn toolchain_stage(installer: Arc<FakeInstaller>, credential: Option<&str>) -> Arc<ToolchainStage> {
    Arc::new(ToolchainStage::new(
        installer,
        &toolchain_config(true),
        credential.map(Credential::new),
    ))
}

/// Fails installation or version inference for selected entries.
#[derive(Default)]
pub struct FakeResolver {
    pub install_fails: HashSet<String>,
    pub shallow: HashSet<String>,
    pub installs: AtomicUsize,
}

impl FakeResolver {
    pub fn shallow_for(values: &[&str]) -> Self {
        Self {
            shallow: names(values),
            ..Self::default()
        }
    }

    pub fn install_failing_for(values: &[&str]) -> Self {
        Self {
            install_fails: names(values),
            ..Self::default()
        }
    }
}

#[async_trait]
impl Resolver for FakeResolver {
    async fn install(
        &self,
        env: &EnvironmentHandle,
        _packages: &[PackageRequirement],
    ) -> Result<(), DependencyInstallError> {
        self.installs.fetch_add(1, Ordering::SeqCst);
        if self.install_fails.contains(&entry_of(env)) {
            return Err(DependencyInstallError::Install {
                exit_code: Some(1),
                output: "ERROR: No matching distribution found for setuptools>=61".to_string(),
            });
        }
        Ok(())
    }

    async fn infer_version(&self, env: &EnvironmentHandle) -> Result<Option<String>, ProvisioningError> {
        if self.shallow.contains(&entry_of(env)) {
            return Err(ProvisioningError::ShallowHistory {
                output: "LookupError: setuptools-scm was unable to detect version".to_string(),
            });
        }
        Ok(Some("0.1.0".to_string()))
    }
}

/// Exits non-zero or hangs for selected entries; may leave a coverage report.
#[derive(Default)]
pub struct FakeRunner {
    pub failing: HashSet<String>,
    pub hanging: HashSet<String>,
    pub delay: Option<Duration>,
    pub write_coverage: bool,
    /// Search path observed by each run, keyed by entry.
    pub seen_paths: Mutex<Vec<(String, Vec<PathBuf>)>>,
}

impl FakeRunner {
    pub fn failing_for(values: &[&str]) -> Self {
        Self {
            failing: names(values),
            ..Self::default()
        }
    }

    pub fn hanging_for(values: &[&str]) -> Self {
        Self {
            hanging: names(values),
            ..Self::default()
        }
    }
}

#[async_trait]
impl Runner for FakeRunner {
    async fn run(&self, env: &EnvironmentHandle) -> Result<RunOutcome, RunError> {
        let entry = entry_of(env);
        self.seen_paths
            .lock()
            .unwrap()
            .push((entry.clone(), env.search_path().to_vec()));
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.hanging.contains(&entry) {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        let coverage = if self.write_coverage {
            let path = env.workspace().join("coverage.xml");
            fs::write(&path, format!("<coverage entry=\"{entry}\"/>")).map_err(|source| RunError::Spawn {
                program: "fake".to_string(),
                source,
            })?;
            Some(path)
        } else {
            None
        };
        let failed = self.failing.contains(&entry);
        Ok(RunOutcome {
            success: !failed,
            exit_code: Some(if failed { 1 } else { 0 }),
            output: format!("session test for {entry}"),
            coverage,
        })
    }
}

/// Fails, never answers, or echoes the report path as the reference.
#[derive(Default)]
pub struct FakeUploader {
    pub fail: bool,
    pub hang: bool,
}

#[async_trait]
impl Uploader for FakeUploader {
    async fn upload(&self, _env: &EnvironmentHandle, report: Option<&Path>) -> Result<String, UploadError> {
        if self.hang {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        if self.fail {
            return Err(UploadError::Failed {
                exit_code: Some(1),
                output: "codecov: upload rejected".to_string(),
            });
        }
        let report = report.ok_or(UploadError::MissingReport)?;
        Ok(format!("https://codecov.example/{}", report.display()))
    }
}

pub fn settings(jobs: usize, artifacts: &TempDir) -> PipelineSettings {
    PipelineSettings {
        jobs,
        fail_fast: false,
        entry_timeout: Duration::from_secs(30),
        upload_timeout: Duration::from_secs(30),
        artifacts_dir: artifacts.path().to_path_buf(),
        packages: vec![],
        locale: "en".to_string(),
    }
}

pub fn capabilities(
    provisioner: Arc<FakeProvisioner>,
    toolchain: Option<Arc<ToolchainStage>>,
    resolver: Arc<FakeResolver>,
    runner: Arc<FakeRunner>,
) -> Capabilities {
    Capabilities {
        provisioner,
        toolchain,
        resolver,
        runner,
        uploader: None,
    }
}

pub fn pipeline(capabilities: Capabilities, settings: PipelineSettings) -> Arc<Pipeline> {
    Arc::new(Pipeline::new(capabilities, settings))
}

pub fn artifacts_dir() -> TempDir {
    tempdir().expect("Failed to create temporary directory")
}

/// Writes `content` as `CiMatrix.toml` in a fresh temporary directory.
pub fn write_config(content: &str) -> (TempDir, PathBuf) {
    let dir = tempdir().expect("Failed to create temporary directory");
    let path = dir.path().join("CiMatrix.toml");
    fs::write(&path, content).expect("Failed to write config");
    (dir, path)
}

pub const VALID_CONFIG: &str = r#"
language = "en"

[matrix]
[[matrix.axes]]
name = "python-version"
values = ["3.9", "3.10", "3.11", "3.12-dev", "pypy-3.9-v7.3.11"]
"#;
