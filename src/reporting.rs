//! # Reporting Module / 报告模块
//!
//! This module renders a finished run in multiple formats: a colorful,
//! localized console summary, a standalone HTML page and a JSON document.
//!
//! 此模块以多种格式呈现已完成的运行：彩色本地化的控制台摘要、
//! 独立的 HTML 页面以及 JSON 文档。

pub mod console;
pub mod html;
pub mod json;

// Re-export common reporting functions
pub use console::{print_summary, print_unexpected_failure_details, print_warnings};
pub use html::generate_html_report;
pub use json::write_json_report;
