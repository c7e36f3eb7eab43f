//! # Infrastructure Module / 基础设施模块
//!
//! This module provides infrastructure services for `matrix-ci`, including
//! command execution, file system operations, retries, logging and i18n support.
//!
//! 此模块为 `matrix-ci` 提供基础设施服务，
//! 包括命令执行、文件系统操作、重试、日志和国际化支持。

pub mod command;
pub mod fs;
pub mod logging;
pub mod retry;

// Re-export i18n functions for easier access
pub use rust_i18n::t;
