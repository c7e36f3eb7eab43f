//! # Matrix Expansion Unit Tests / 矩阵展开单元测试
//!
//! Entry counts, ordering, rule handling and configuration errors of
//! `core::matrix::expand`.
//!
//! 测试 `core::matrix::expand` 的条目数量、顺序、规则处理与配置错误。

mod common;

use common::single_axis;
use matrix_ci::core::config::{Axis, MatrixRule, MatrixSpec};
use matrix_ci::core::error::ConfigurationError;
use matrix_ci::core::matrix::{expand, product_size};
use matrix_ci::core::models::AxisValue;

fn axis(name: &str, values: &[&str]) -> Axis {
    Axis {
        name: name.to_string(),
        values: values.iter().map(|v| AxisValue::from(*v)).collect(),
    }
}

fn rule(pairs: &[(&str, &str)]) -> MatrixRule {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), AxisValue::from(*v)))
        .collect()
}

fn two_axes() -> MatrixSpec {
    MatrixSpec {
        axes: vec![
            axis("python-version", &["3.9", "3.10", "3.11"]),
            axis("os", &["ubuntu", "windows"]),
        ],
        ..MatrixSpec::default()
    }
}

#[cfg(test)]
mod expansion_tests {
    use super::*;

    #[test]
    fn test_single_axis_keeps_declaration_order() {
        let entries = expand(&single_axis(
            "python-version",
            &["3.9", "3.10", "3.11", "3.12-dev", "pypy-3.9-v7.3.11"],
        ))
        .unwrap();

        let names: Vec<_> = entries.iter().map(|e| e.name()).collect();
        assert_eq!(names, vec!["3.9", "3.10", "3.11", "3.12-dev", "pypy-3.9-v7.3.11"]);
        for (i, entry) in entries.iter().enumerate() {
            assert_eq!(entry.index, i);
            assert!(!entry.allow_failure);
        }
    }

    #[test]
    fn test_entry_count_equals_product_size() {
        let spec = two_axes();
        let entries = expand(&spec).unwrap();
        assert_eq!(entries.len(), product_size(&spec.axes));
        assert_eq!(entries.len(), 6);
    }

    #[test]
    fn test_first_axis_varies_slowest() {
        let entries = expand(&two_axes()).unwrap();
        let names: Vec<_> = entries.iter().map(|e| e.name()).collect();
        assert_eq!(
            names,
            vec![
                "3.9, ubuntu",
                "3.9, windows",
                "3.10, ubuntu",
                "3.10, windows",
                "3.11, ubuntu",
                "3.11, windows",
            ]
        );
        assert_eq!(entries[3].values[1].axis, "os");
        assert_eq!(entries[3].values[1].value.as_str(), "windows");
    }

    #[test]
    fn test_values_are_opaque() {
        let entries = expand(&single_axis("python-version", &["pypy-3.9-v7.3.11"])).unwrap();
        assert_eq!(entries[0].values[0].value.as_str(), "pypy-3.9-v7.3.11");
        assert_eq!(entries[0].slug(), "000-pypy_3.9_v7.3.11");
    }

    #[test]
    fn test_partial_exclude_removes_all_matches() {
        let mut spec = two_axes();
        spec.exclude = vec![rule(&[("os", "windows")])];
        let entries = expand(&spec).unwrap();
        assert_eq!(entries.len(), 3);
        assert!(entries.iter().all(|e| e.values[1].value.as_str() == "ubuntu"));
        let indices: Vec<_> = entries.iter().map(|e| e.index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
    }

    #[test]
    fn test_include_appends_new_combination_only() {
        let mut spec = two_axes();
        spec.include = vec![
            rule(&[("python-version", "3.12-dev"), ("os", "ubuntu")]),
            rule(&[("python-version", "3.9"), ("os", "ubuntu")]),
        ];
        let entries = expand(&spec).unwrap();
        assert_eq!(entries.len(), 7);
        assert_eq!(entries[6].name(), "3.12-dev, ubuntu");
    }

    #[test]
    fn test_include_restores_excluded_combination() {
        let mut spec = two_axes();
        spec.exclude = vec![rule(&[("os", "windows")])];
        spec.include = vec![rule(&[("python-version", "3.11"), ("os", "windows")])];
        let entries = expand(&spec).unwrap();
        assert_eq!(entries.len(), 4);
        assert_eq!(entries.last().unwrap().name(), "3.11, windows");
    }

    #[test]
    fn test_allow_failure_rule_marks_entries() {
        let mut spec = single_axis("python-version", &["3.11", "3.12-dev"]);
        spec.allow_failure = vec![rule(&[("python-version", "3.12-dev")])];
        let entries = expand(&spec).unwrap();
        assert!(!entries[0].allow_failure);
        assert!(entries[1].allow_failure);
    }
}

#[cfg(test)]
mod error_tests {
    use super::*;

    #[test]
    fn test_empty_axis_list_is_rejected() {
        let err = expand(&MatrixSpec::default()).unwrap_err();
        assert!(matches!(err, ConfigurationError::EmptyMatrix));
    }

    #[test]
    fn test_axis_without_values_is_rejected() {
        let err = expand(&single_axis("python-version", &[])).unwrap_err();
        assert!(matches!(err, ConfigurationError::EmptyAxis { axis } if axis == "python-version"));
    }

    #[test]
    fn test_duplicate_axis_is_rejected() {
        let spec = MatrixSpec {
            axes: vec![axis("os", &["ubuntu"]), axis("os", &["windows"])],
            ..MatrixSpec::default()
        };
        assert!(matches!(
            expand(&spec).unwrap_err(),
            ConfigurationError::DuplicateAxis { .. }
        ));
    }

    #[test]
    fn test_rule_with_unknown_axis_is_rejected() {
        let mut spec = two_axes();
        spec.exclude = vec![rule(&[("arch", "arm64")])];
        let err = expand(&spec).unwrap_err();
        assert!(matches!(
            err,
            ConfigurationError::UnknownAxis { rule: "exclude", ref axis } if axis == "arch"
        ));
    }

    #[test]
    fn test_empty_rule_is_rejected() {
        let mut spec = two_axes();
        spec.allow_failure = vec![MatrixRule::new()];
        assert!(matches!(
            expand(&spec).unwrap_err(),
            ConfigurationError::EmptyRule { rule: "allow_failure" }
        ));
    }

    #[test]
    fn test_incomplete_include_is_rejected() {
        let mut spec = two_axes();
        spec.include = vec![rule(&[("python-version", "3.12-dev")])];
        assert!(matches!(
            expand(&spec).unwrap_err(),
            ConfigurationError::IncompleteInclude { axis } if axis == "os"
        ));
    }

    #[test]
    fn test_excluding_everything_is_rejected() {
        let mut spec = single_axis("python-version", &["3.9"]);
        spec.exclude = vec![rule(&[("python-version", "3.9")])];
        assert!(matches!(expand(&spec).unwrap_err(), ConfigurationError::NoEntries));
    }
}
