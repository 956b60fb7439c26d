//! Pipeline node types.
//!
//! A node represents one shell command. Its status is driven exclusively by
//! the scheduling state machine; the layout hints are opaque to the engine
//! and only round-trip for the editor.

use serde::{Deserialize, Serialize};
use shellflow_core::NodeId;

/// Lifecycle status of a node.
///
/// The wire representation matches the persisted graph format: the idle
/// state serializes as the empty string.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeStatus {
    /// No execution pending or recorded.
    #[default]
    #[serde(rename = "")]
    Idle,
    /// Scheduled for execution; a runner should pick it up.
    #[serde(rename = "run")]
    Run,
    /// A runner reported execution start.
    #[serde(rename = "running")]
    Running,
    /// The most recent execution exited zero.
    #[serde(rename = "ran")]
    Ran,
    /// The most recent execution exited non-zero.
    #[serde(rename = "fail")]
    Fail,
}

impl NodeStatus {
    /// Returns true while the node is owned by an active run.
    #[must_use]
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Run | Self::Running)
    }

    /// Returns the wire string for this status.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "",
            Self::Run => "run",
            Self::Running => "running",
            Self::Ran => "ran",
            Self::Fail => "fail",
        }
    }
}

impl std::fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for NodeStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "" => Ok(Self::Idle),
            "run" => Ok(Self::Run),
            "running" => Ok(Self::Running),
            "ran" => Ok(Self::Ran),
            "fail" => Ok(Self::Fail),
            other => Err(format!("invalid node status '{other}'")),
        }
    }
}

/// A pipeline node: one shell command plus its execution record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    /// Unique identifier within the workspace.
    pub id: NodeId,
    /// The shell command; multiline allowed.
    pub label: String,
    /// Current lifecycle status.
    #[serde(default)]
    pub status: NodeStatus,
    /// Combined stdout/stderr of the most recent execution.
    #[serde(default)]
    pub log: String,
    /// Editor layout hint, opaque to the engine.
    #[serde(default)]
    pub x: String,
    /// Editor layout hint, opaque to the engine.
    #[serde(default)]
    pub y: String,
}

impl Node {
    /// Creates a new idle node with a fresh id.
    #[must_use]
    pub fn new(label: impl Into<String>, x: impl Into<String>, y: impl Into<String>) -> Self {
        Self {
            id: NodeId::new(),
            label: label.into(),
            status: NodeStatus::default(),
            log: String::new(),
            x: x.into(),
            y: y.into(),
        }
    }
}
