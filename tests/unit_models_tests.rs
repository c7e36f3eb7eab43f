//! # Models Module Unit Tests / Models 模块单元测试
//!
//! Entry naming, result classification, the run verdict and run totals.
//!
//! 测试条目命名、结果分类、运行结论与统计。

use chrono::Utc;
use matrix_ci::core::aggregate::{RunReport, RunTotals, RunVerdict, verdict};
use matrix_ci::core::error::{
    DependencyInstallError, EntryError, ProvisioningError, RunError, ToolchainFetchError,
};
use matrix_ci::core::models::{
    AxisAssignment, AxisValue, EntryState, EntryWarning, ExecutionResult, FailureReason,
    MatrixEntry, Phase,
};
use matrix_ci::core::trigger::TriggerEvent;

fn entry(index: usize, value: &str, allow_failure: bool) -> MatrixEntry {
    MatrixEntry {
        index,
        values: vec![AxisAssignment {
            axis: "python-version".to_string(),
            value: AxisValue::from(value),
        }],
        allow_failure,
    }
}

fn result(index: usize, value: &str, allow_failure: bool, state: EntryState) -> ExecutionResult {
    ExecutionResult::bare(entry(index, value, allow_failure), state)
}

#[cfg(test)]
mod entry_tests {
    use super::*;

    #[test]
    fn test_slug_is_file_system_friendly() {
        let entry = entry(7, "pypy-3.9-v7.3.11", false);
        assert_eq!(entry.slug(), "007-pypy_3.9_v7.3.11");
        assert_eq!(entry.name(), "pypy-3.9-v7.3.11");
    }

    #[test]
    fn test_multi_axis_name_and_lookup() {
        let entry = MatrixEntry {
            index: 0,
            values: vec![
                AxisAssignment {
                    axis: "python-version".to_string(),
                    value: AxisValue::from("3.11"),
                },
                AxisAssignment {
                    axis: "os".to_string(),
                    value: AxisValue::from("ubuntu"),
                },
            ],
            allow_failure: false,
        };
        assert_eq!(entry.name(), "3.11, ubuntu");
        assert_eq!(entry.slug(), "000-3.11__ubuntu");
    }

    #[test]
    fn test_timeout_reason_depends_on_phase() {
        assert_eq!(Phase::Running.timeout_reason(), FailureReason::TestFailure);
        for phase in [Phase::Pending, Phase::Provisioning, Phase::Installing, Phase::Resolving] {
            assert_eq!(phase.timeout_reason(), FailureReason::SetupFailure);
        }
    }
}

#[cfg(test)]
mod result_tests {
    use super::*;

    #[test]
    fn test_status_classes() {
        let cases = [
            (result(0, "3.9", false, EntryState::Succeeded), "status-Passed"),
            (
                result(1, "3.10", false, EntryState::Failed(FailureReason::TestFailure)),
                "status-Failed",
            ),
            (
                result(2, "3.11", false, EntryState::Failed(FailureReason::DependencyFailure)),
                "status-Setup-Failed",
            ),
            (
                result(3, "3.12-dev", true, EntryState::Failed(FailureReason::SetupFailure)),
                "status-Allowed-Failure",
            ),
            (result(4, "pypy-3.9-v7.3.11", false, EntryState::Skipped), "status-Skipped"),
        ];
        for (result, class) in cases {
            assert_eq!(result.status_class(), class, "{}", result.name());
        }

        let mut timed_out = result(5, "3.9", false, EntryState::Failed(FailureReason::TestFailure));
        timed_out.timed_out = true;
        assert_eq!(timed_out.status_class(), "status-Timeout");
    }

    #[test]
    fn test_localized_status_labels() {
        let failed = result(0, "3.9", false, EntryState::Failed(FailureReason::SetupFailure));
        assert!(!failed.status_str("en").is_empty());
        assert_ne!(failed.status_str("en"), failed.status_str("zh-CN"));
    }

    #[test]
    fn test_allowed_failure_is_not_unexpected() {
        let allowed = result(0, "3.12-dev", true, EntryState::Failed(FailureReason::TestFailure));
        assert!(allowed.is_allowed_failure());
        assert!(!allowed.is_unexpected_failure());
        assert_eq!(allowed.failure_reason(), Some(FailureReason::TestFailure));

        let skipped = result(1, "3.9", false, EntryState::Skipped);
        assert!(skipped.is_unexpected_failure());
        assert!(!skipped.is_failure());
    }

    #[test]
    fn test_warning_display() {
        let warning = EntryWarning::Upload("upload command exited with code Some(1)".to_string());
        assert!(warning.to_string().starts_with("upload: "));
    }
}

#[cfg(test)]
mod error_classification_tests {
    use super::*;

    #[test]
    fn test_entry_errors_map_to_failure_reasons() {
        let shallow: EntryError = ProvisioningError::ShallowHistory {
            output: "unable to detect version".to_string(),
        }
        .into();
        assert_eq!(shallow.reason(), FailureReason::SetupFailure);
        assert_eq!(shallow.output(), Some("unable to detect version"));

        let fetch: EntryError = ToolchainFetchError::Fetch {
            name: "oss-cad-suite".to_string(),
            exit_code: Some(22),
            output: "HTTP 403".to_string(),
        }
        .into();
        assert_eq!(fetch.reason(), FailureReason::SetupFailure);
        assert_eq!(fetch.exit_code(), Some(22));

        let install: EntryError = DependencyInstallError::Install {
            exit_code: Some(1),
            output: String::new(),
        }
        .into();
        assert_eq!(install.reason(), FailureReason::DependencyFailure);

        let run: EntryError = RunError::Spawn {
            program: "nox".to_string(),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        }
        .into();
        assert_eq!(run.reason(), FailureReason::TestFailure);
        assert_eq!(run.exit_code(), None);
    }

    #[test]
    fn test_missing_tool_message_names_override_variable() {
        let err = ToolchainFetchError::ToolNotFound {
            tool: "yosys".to_string(),
            location: "PATH".to_string(),
            env_var: "YOSYS".to_string(),
        };
        let message = err.to_string();
        assert!(message.contains("yosys"));
        assert!(message.contains("YOSYS"));
    }
}

#[cfg(test)]
mod verdict_tests {
    use super::*;

    #[test]
    fn test_all_required_succeeded() {
        let results = vec![
            result(0, "3.9", false, EntryState::Succeeded),
            result(1, "3.12-dev", true, EntryState::Failed(FailureReason::TestFailure)),
        ];
        assert_eq!(verdict(&results), RunVerdict::Succeeded);
        assert!(verdict(&results).is_success());
    }

    #[test]
    fn test_required_failure_fails_the_run() {
        let results = vec![
            result(0, "3.9", false, EntryState::Succeeded),
            result(1, "3.10", false, EntryState::Failed(FailureReason::SetupFailure)),
        ];
        assert_eq!(verdict(&results), RunVerdict::Failed);
    }

    #[test]
    fn test_cancelled_required_entry_fails_the_run() {
        let results = vec![result(0, "3.9", false, EntryState::Cancelled)];
        assert!(!verdict(&results).is_success());
    }

    #[test]
    fn test_totals_and_report_ordering() {
        let mut timed_out = result(2, "3.11", false, EntryState::Failed(FailureReason::TestFailure));
        timed_out.timed_out = true;
        let mut warned = result(0, "3.9", false, EntryState::Succeeded);
        warned.warnings.push(EntryWarning::DegradedMode("no credential".to_string()));

        let results = vec![
            timed_out,
            result(3, "3.12-dev", true, EntryState::Failed(FailureReason::DependencyFailure)),
            warned,
            result(1, "3.10", false, EntryState::Skipped),
        ];
        let totals = RunTotals::from_results(&results);
        assert_eq!(totals.total, 4);
        assert_eq!(totals.succeeded, 1);
        assert_eq!(totals.test_failures, 1);
        assert_eq!(totals.dependency_failures, 1);
        assert_eq!(totals.skipped, 1);
        assert_eq!(totals.allowed_failures, 1);
        assert_eq!(totals.timed_out, 1);
        assert_eq!(totals.warnings, 1);
        assert_eq!(totals.failed(), 2);

        let now = Utc::now();
        let report = RunReport::new(TriggerEvent::Manual, now, now, results);
        let order: Vec<_> = report.results.iter().map(|r| r.entry.index).collect();
        assert_eq!(order, vec![0, 1, 2, 3]);
        assert_eq!(report.verdict, RunVerdict::Failed);
        let unexpected: Vec<_> = report.unexpected_failures().iter().map(|r| r.name()).collect();
        assert_eq!(unexpected, vec!["3.10", "3.11"]);
    }
}
