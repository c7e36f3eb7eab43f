//! # Execution Planner Module / 执行计划模块
//!
//! This module turns the expanded matrix into the set of entries this runner
//! executes, including splitting the matrix across several hosting runners.
//!
//! 此模块将展开后的矩阵转换为本运行器要执行的条目集合，
//! 包括在多个托管运行器之间拆分矩阵。

use crate::core::config::PipelineConfig;
use crate::core::error::ConfigurationError;
use crate::core::matrix;
use crate::core::models::MatrixEntry;

/// Represents a complete execution plan for a matrix run.
/// 表示矩阵运行的完整执行计划。
#[derive(Debug)]
pub struct ExecutionPlan {
    /// Entries assigned to this runner, in expansion order.
    /// 分配给本运行器的条目，按展开顺序排列。
    pub entries: Vec<MatrixEntry>,
    /// Size of the whole expansion before splitting.
    /// 拆分之前整个展开的大小。
    pub total_entries: usize,
    /// The number of assigned entries that are allowed to fail.
    /// 分配的条目中允许失败的数量。
    pub allowed_failure_count: usize,
    /// Whether the entries are distributed across multiple runners.
    /// 条目是否分布在多个运行器上。
    pub is_distributed: bool,
}

/// Creates an execution plan for the given configuration.
///
/// # Arguments
/// * `config` - The pipeline configuration holding the matrix
/// * `total_runners` - Optional total number of runners for distributed execution
/// * `runner_index` - Optional index of this runner (0-based)
///
/// # Errors
/// Any [`ConfigurationError`] raised by expansion, or an invalid runner split.
pub fn plan_execution(
    config: &PipelineConfig,
    total_runners: Option<usize>,
    runner_index: Option<usize>,
) -> Result<ExecutionPlan, ConfigurationError> {
    let expanded = matrix::expand(&config.matrix)?;
    let total_entries = expanded.len();

    let (entries, is_distributed) = match (total_runners, runner_index) {
        (Some(total), Some(index)) => {
            if total == 0 {
                return Err(ConfigurationError::InvalidSplit {
                    reason: "total runners must be greater than zero".to_string(),
                });
            }
            if index >= total {
                return Err(ConfigurationError::InvalidSplit {
                    reason: "runner index must be less than total runners".to_string(),
                });
            }
            let distributed: Vec<_> = expanded
                .into_iter()
                .filter(|entry| entry.index % total == index)
                .collect();
            (distributed, true)
        }
        (None, None) => (expanded, false),
        _ => {
            return Err(ConfigurationError::InvalidSplit {
                reason: "both --total-runners and --runner-index must be provided".to_string(),
            });
        }
    };

    let allowed_failure_count = entries.iter().filter(|e| e.allow_failure).count();

    Ok(ExecutionPlan {
        entries,
        total_entries,
        allowed_failure_count,
        is_distributed,
    })
}
