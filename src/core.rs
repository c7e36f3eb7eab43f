//! # Core Module / 核心模块
//!
//! This module contains the orchestration engine: configuration and data
//! models, matrix expansion and planning, the per-entry stages and the
//! aggregation of results into a verdict.
//!
//! 此模块包含编排引擎：配置与数据模型、矩阵展开与计划、
//! 各条目阶段以及将结果汇总为结论。

pub mod aggregate;
pub mod config;
pub mod dependencies;
pub mod environment;
pub mod error;
pub mod execution;
pub mod executor;
pub mod matrix;
pub mod models;
pub mod planner;
pub mod toolchain;
pub mod trigger;

// Re-exports
pub use aggregate::{RunReport, RunVerdict, verdict};
pub use config::PipelineConfig;
pub use execution::{Capabilities, Pipeline, PipelineSettings};
pub use models::ExecutionResult;
