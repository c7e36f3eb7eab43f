//! # File System Operations Module / 文件系统操作模块
//!
//! This module provides utilities for file system operations, such as creating
//! private environment directories, copying a checkout into a workspace and
//! persisting artifacts beyond an environment's lifetime.
//!
//! 此模块提供文件系统操作的实用功能，如创建私有环境目录、
//! 将检出复制到工作区，以及在环境销毁后保留产物。

use anyhow::{Context, Result};
use fs_extra::dir::{CopyOptions, copy};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Creates a unique, temporary root directory for one matrix entry.
/// The directory is deleted when the returned guard is dropped.
///
/// # Arguments
/// * `slug` - File-system friendly entry identifier used in the directory name
pub fn create_env_dir(slug: &str) -> std::io::Result<TempDir> {
    tempfile::Builder::new()
        .prefix(&format!("matrix_ci_{slug}_"))
        .tempdir()
}

/// Creates a temporary directory for a toolchain install shared by a run.
pub fn create_toolchain_dir(name: &str) -> std::io::Result<TempDir> {
    let sanitized = name
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect::<String>();
    tempfile::Builder::new()
        .prefix(&format!("matrix_ci_toolchain_{sanitized}_"))
        .tempdir()
}

/// Copies the entire content of a source directory to a destination directory.
/// `to` must not exist yet; it is created with the content of `from`.
///
/// # Arguments
/// * `from` - Source directory path
/// * `to` - Destination directory path
pub fn copy_dir_all(from: &Path, to: &Path) -> Result<()> {
    let mut options = CopyOptions::new();
    options.overwrite = true;
    options.copy_inside = true;
    copy(from, to, &options)
        .with_context(|| format!("Failed to copy {} to {}", from.display(), to.display()))?;
    Ok(())
}

/// Copies `source` into `dir` under `file_name`, creating `dir` if needed.
/// Returns the path of the copy.
pub fn persist_artifact(source: &Path, dir: &Path, file_name: &str) -> std::io::Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let destination = dir.join(file_name);
    fs::copy(source, &destination)?;
    Ok(destination)
}

/// Gets the absolute path from a potentially relative path.
///
/// # Returns
/// Canonicalized absolute path, or an error if the path doesn't exist
pub fn absolute_path(path: &Path) -> Result<PathBuf> {
    fs::canonicalize(path).with_context(|| format!("Failed to resolve path: {}", path.display()))
}
