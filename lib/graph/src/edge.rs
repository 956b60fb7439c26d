//! Dependency edge types.
//!
//! An edge declares that its target depends on its source. The edge status
//! is a readiness latch: the scheduler sets it to `to_run` when the source
//! finishes, and clears it when the target enters `run`.

use serde::{Deserialize, Serialize};
use shellflow_core::{EdgeId, NodeId};

/// The readiness latch on an edge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum EdgeStatus {
    /// Not yet satisfied for the current run.
    #[default]
    #[serde(rename = "")]
    Clear,
    /// The source has satisfied this edge; the target may become ready.
    #[serde(rename = "to_run")]
    ToRun,
}

impl EdgeStatus {
    /// Returns the wire string for this status.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Clear => "",
            Self::ToRun => "to_run",
        }
    }
}

impl std::fmt::Display for EdgeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EdgeStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "" => Ok(Self::Clear),
            "to_run" => Ok(Self::ToRun),
            other => Err(format!("invalid edge status '{other}'")),
        }
    }
}

/// Dependency semantics of an edge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum EdgeType {
    /// The target waits for every incoming blocking edge within the run.
    #[default]
    #[serde(rename = "blocking")]
    Blocking,
    /// A single latch triggers the target immediately; supports re-triggering.
    #[serde(rename = "non-blocking")]
    NonBlocking,
}

impl EdgeType {
    /// Returns the wire string for this edge type.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Blocking => "blocking",
            Self::NonBlocking => "non-blocking",
        }
    }
}

impl std::fmt::Display for EdgeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EdgeType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "blocking" => Ok(Self::Blocking),
            "non-blocking" => Ok(Self::NonBlocking),
            other => Err(format!("invalid edge type '{other}'")),
        }
    }
}

/// A directed dependency from a producer node to a consumer node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    /// Unique identifier within the workspace.
    pub id: EdgeId,
    /// The producer node.
    pub source: NodeId,
    /// The consumer node.
    pub target: NodeId,
    /// Readiness latch, managed by the scheduler.
    #[serde(default)]
    pub status: EdgeStatus,
    /// Dependency semantics; files persisted before the field existed read
    /// as blocking.
    #[serde(default)]
    pub edge_type: EdgeType,
}

impl Edge {
    /// Creates a new cleared edge with a fresh id.
    #[must_use]
    pub fn new(source: NodeId, target: NodeId, edge_type: EdgeType) -> Self {
        Self {
            id: EdgeId::new(),
            source,
            target,
            status: EdgeStatus::default(),
            edge_type,
        }
    }

    /// Creates a blocking edge, the default dependency kind.
    #[must_use]
    pub fn blocking(source: NodeId, target: NodeId) -> Self {
        Self::new(source, target, EdgeType::Blocking)
    }
}
