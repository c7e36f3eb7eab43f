//! # Matrix CI Library / Matrix CI 库
//!
//! This library provides the core functionality for `matrix-ci`, a
//! configuration-driven CI test-orchestration engine. It expands a runtime
//! version matrix, provisions one isolated environment per entry, installs an
//! external EDA toolchain, runs the test session with coverage and folds the
//! outcomes into a single run verdict.
//!
//! 此库为 `matrix-ci` 提供核心功能，这是一个配置驱动的 CI 测试编排引擎。
//! 它展开运行时版本矩阵，为每个条目准备隔离的环境，安装外部 EDA 工具链，
//! 运行带覆盖率的测试会话，并将结果汇总为单一的运行结论。
//!
//! ## Modules / 模块
//!
//! - `core` - Matrix expansion, environment, toolchain, dependency and run stages
//! - `infra` - Infrastructure services like command execution, retries and logging
//! - `reporting` - Console, HTML and JSON reports
//! - `cli` - Command-line interface and commands
//!
//! - `core` - 矩阵展开、环境、工具链、依赖与运行阶段
//! - `infra` - 基础设施服务，如命令执行、重试和日志
//! - `reporting` - 控制台、HTML 和 JSON 报告
//! - `cli` - 命令行接口和命令

pub mod cli;
pub mod core;
pub mod infra;
pub mod reporting;

// Re-export commonly used items
pub use core::config;
pub use core::models;

// Initialize i18n
rust_i18n::i18n!("locales", fallback = "en");

/// Picks the UI locale from the system locale.
///
/// It attempts to match the full locale (e.g., "zh-CN"), then just the
/// language code (e.g., "en"), and finally falls back to "en".
pub fn detect_locale() -> String {
    let locale = sys_locale::get_locale().unwrap_or_else(|| "en".to_string());
    let available_locales = rust_i18n::available_locales!();

    if available_locales.contains(&locale.as_str()) {
        return locale;
    }
    locale
        .split('-')
        .next()
        .filter(|lang_code| available_locales.contains(lang_code))
        .unwrap_or("en")
        .to_string()
}
