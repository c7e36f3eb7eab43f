//! # Trigger Module / 触发器模块
//!
//! Decides whether an incoming event starts a matrix run. Each matching event
//! produces one independent expansion and run.
//!
//! 判断传入事件是否启动矩阵运行。每个匹配的事件都会产生一次独立的展开与运行。

use serde::{Deserialize, Serialize};
use std::fmt;

/// The `[triggers]` section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct TriggerConfig {
    /// Branches whose pushes start a run. A trailing `*` matches any suffix.
    pub push_branches: Vec<String>,
    /// Run on every pull-request event.
    pub pull_request: bool,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            push_branches: vec!["main".to_string()],
            pull_request: true,
        }
    }
}

/// An event delivered by the hosting CI service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum TriggerEvent {
    Push { branch: String },
    PullRequest,
    /// Explicit invocation; always runs.
    Manual,
}

impl fmt::Display for TriggerEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TriggerEvent::Push { branch } => write!(f, "push ({branch})"),
            TriggerEvent::PullRequest => f.write_str("pull-request"),
            TriggerEvent::Manual => f.write_str("manual"),
        }
    }
}

impl TriggerConfig {
    /// Returns `true` if `event` should start a run.
    pub fn matches(&self, event: &TriggerEvent) -> bool {
        match event {
            TriggerEvent::Manual => true,
            TriggerEvent::PullRequest => self.pull_request,
            TriggerEvent::Push { branch } => self
                .push_branches
                .iter()
                .any(|pattern| branch_matches(pattern, branch)),
        }
    }
}

fn branch_matches(pattern: &str, branch: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => branch.starts_with(prefix),
        None => pattern == branch,
    }
}
