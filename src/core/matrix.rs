//! # Matrix Expansion Module / 矩阵展开模块
//!
//! Turns the declared axes and rules into the ordered list of entries to run.
//! Expansion is a pure function of the matrix specification; the fail-fast
//! policy never affects which entries are produced.
//!
//! 将声明的轴与规则转换为有序的待运行条目列表。展开是矩阵规范的纯函数，
//! fail-fast 策略不影响生成哪些条目。

use std::collections::HashSet;

use crate::core::config::{Axis, MatrixRule, MatrixSpec};
use crate::core::error::ConfigurationError;
use crate::core::models::{AxisAssignment, MatrixEntry};

/// Expands a matrix specification into ordered entries.
///
/// The Cartesian product is produced first, with the first axis varying
/// slowest. Exclusions are removed, then include rules that describe a
/// combination not yet present are appended. Finally every entry matching an
/// `allow_failure` rule is flagged.
///
/// # Errors
/// Returns a [`ConfigurationError`] for an empty axis list, an axis without
/// values, duplicated axis names, rules naming unknown axes, incomplete
/// include rules, or an expansion with no entries left.
pub fn expand(spec: &MatrixSpec) -> Result<Vec<MatrixEntry>, ConfigurationError> {
    validate_axes(&spec.axes)?;
    validate_rules(&spec.axes, &spec.exclude, "exclude")?;
    validate_rules(&spec.axes, &spec.allow_failure, "allow_failure")?;
    validate_rules(&spec.axes, &spec.include, "include")?;
    for rule in &spec.include {
        if let Some(axis) = spec.axes.iter().find(|a| !rule.contains_key(&a.name)) {
            return Err(ConfigurationError::IncompleteInclude {
                axis: axis.name.clone(),
            });
        }
    }

    let mut combinations: Vec<Vec<AxisAssignment>> = cartesian_product(&spec.axes)
        .into_iter()
        .filter(|combo| !spec.exclude.iter().any(|rule| rule_matches(rule, combo)))
        .collect();

    for rule in &spec.include {
        let combo: Vec<AxisAssignment> = spec
            .axes
            .iter()
            .map(|axis| AxisAssignment {
                axis: axis.name.clone(),
                value: rule[&axis.name].clone(),
            })
            .collect();
        if !combinations.contains(&combo) {
            combinations.push(combo);
        }
    }

    if combinations.is_empty() {
        return Err(ConfigurationError::NoEntries);
    }

    Ok(combinations
        .into_iter()
        .enumerate()
        .map(|(index, values)| {
            let allow_failure = spec
                .allow_failure
                .iter()
                .any(|rule| rule_matches(rule, &values));
            MatrixEntry {
                index,
                values,
                allow_failure,
            }
        })
        .collect())
}

/// Number of combinations in the plain Cartesian product of `axes`.
pub fn product_size(axes: &[Axis]) -> usize {
    if axes.is_empty() {
        return 0;
    }
    axes.iter().map(|a| a.values.len()).product()
}

fn validate_axes(axes: &[Axis]) -> Result<(), ConfigurationError> {
    if axes.is_empty() {
        return Err(ConfigurationError::EmptyMatrix);
    }
    let mut seen = HashSet::new();
    for axis in axes {
        if !seen.insert(axis.name.as_str()) {
            return Err(ConfigurationError::DuplicateAxis {
                axis: axis.name.clone(),
            });
        }
        if axis.values.is_empty() {
            return Err(ConfigurationError::EmptyAxis {
                axis: axis.name.clone(),
            });
        }
    }
    Ok(())
}

fn validate_rules(
    axes: &[Axis],
    rules: &[MatrixRule],
    rule: &'static str,
) -> Result<(), ConfigurationError> {
    for r in rules {
        if r.is_empty() {
            return Err(ConfigurationError::EmptyRule { rule });
        }
        if let Some(unknown) = r.keys().find(|k| !axes.iter().any(|a| &a.name == *k)) {
            return Err(ConfigurationError::UnknownAxis {
                rule,
                axis: unknown.clone(),
            });
        }
    }
    Ok(())
}

fn cartesian_product(axes: &[Axis]) -> Vec<Vec<AxisAssignment>> {
    axes.iter().fold(vec![Vec::new()], |acc, axis| {
        acc.into_iter()
            .flat_map(|prefix| {
                axis.values.iter().map(move |value| {
                    let mut combo = prefix.clone();
                    combo.push(AxisAssignment {
                        axis: axis.name.clone(),
                        value: value.clone(),
                    });
                    combo
                })
            })
            .collect()
    })
}

fn rule_matches(rule: &MatrixRule, combo: &[AxisAssignment]) -> bool {
    rule.iter().all(|(axis, value)| {
        combo
            .iter()
            .any(|assignment| &assignment.axis == axis && &assignment.value == value)
    })
}

