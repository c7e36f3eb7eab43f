//! # Result Aggregation Module / 结果汇总模块
//!
//! Folds per-entry results into the run verdict and the run report that the
//! console, JSON and HTML reporters render.
//!
//! 将各条目的结果汇总为运行结论以及供控制台、JSON 和 HTML 报告使用的运行报告。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::models::{EntryState, ExecutionResult, FailureReason};
use crate::core::trigger::TriggerEvent;

/// Aggregate outcome of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunVerdict {
    Succeeded,
    Failed,
}

impl RunVerdict {
    pub fn is_success(self) -> bool {
        self == RunVerdict::Succeeded
    }
}

/// `Succeeded` iff every required entry succeeded. Entries marked
/// `allow_failure` never affect the verdict.
pub fn verdict(results: &[ExecutionResult]) -> RunVerdict {
    if results.iter().any(ExecutionResult::is_unexpected_failure) {
        RunVerdict::Failed
    } else {
        RunVerdict::Succeeded
    }
}

/// Per-state counts over a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunTotals {
    pub total: usize,
    pub succeeded: usize,
    pub setup_failures: usize,
    pub dependency_failures: usize,
    pub test_failures: usize,
    pub skipped: usize,
    pub cancelled: usize,
    pub allowed_failures: usize,
    pub timed_out: usize,
    pub warnings: usize,
}

impl RunTotals {
    pub fn from_results(results: &[ExecutionResult]) -> Self {
        results.iter().fold(
            RunTotals {
                total: results.len(),
                ..RunTotals::default()
            },
            |mut totals, result| {
                match result.state {
                    EntryState::Succeeded => totals.succeeded += 1,
                    EntryState::Failed(FailureReason::SetupFailure) => totals.setup_failures += 1,
                    EntryState::Failed(FailureReason::DependencyFailure) => {
                        totals.dependency_failures += 1
                    }
                    EntryState::Failed(FailureReason::TestFailure) => totals.test_failures += 1,
                    EntryState::Skipped => totals.skipped += 1,
                    EntryState::Cancelled => totals.cancelled += 1,
                }
                if result.is_allowed_failure() {
                    totals.allowed_failures += 1;
                }
                if result.timed_out {
                    totals.timed_out += 1;
                }
                totals.warnings += result.warnings.len();
                totals
            },
        )
    }

    /// All failed entries, whatever the reason.
    pub fn failed(&self) -> usize {
        self.setup_failures + self.dependency_failures + self.test_failures
    }
}

/// Everything known about a finished run.
/// 一次已完成运行的全部信息。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub verdict: RunVerdict,
    pub trigger: TriggerEvent,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub totals: RunTotals,
    /// Ordered by expansion index; one result per planned entry.
    pub results: Vec<ExecutionResult>,
}

impl RunReport {
    pub fn new(
        trigger: TriggerEvent,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
        mut results: Vec<ExecutionResult>,
    ) -> Self {
        results.sort_by_key(|r| r.entry.index);
        Self {
            verdict: verdict(&results),
            trigger,
            started_at,
            finished_at,
            totals: RunTotals::from_results(&results),
            results,
        }
    }

    /// Required entries that did not succeed.
    pub fn unexpected_failures(&self) -> Vec<&ExecutionResult> {
        self.results
            .iter()
            .filter(|r| r.is_unexpected_failure())
            .collect()
    }
}
