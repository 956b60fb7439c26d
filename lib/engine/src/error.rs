//! Error types for the engine crate.

use shellflow_core::{NodeId, RunId, WorkspaceId};
use shellflow_graph::{GraphError, NodeStatus, StorageError};
use std::fmt;

/// Errors surfaced on a mutation's apply-latch.
#[derive(Debug)]
pub enum EngineError {
    /// Structural graph operation failed.
    Graph(GraphError),
    /// The storage driver failed persistently.
    Storage(StorageError),
    /// The requested node status change is not a legal transition.
    InvalidTransition {
        node_id: NodeId,
        from: NodeStatus,
        to: NodeStatus,
    },
    /// A `run` transition was requested for a node no active run covers.
    NoActiveRun { node_id: NodeId },
    /// The node is already owned by another active run.
    NodeBusy { node_id: NodeId, run_id: RunId },
    /// Run creation was rejected; no state was changed.
    RunRejected { reason: String },
    /// The run is not registered.
    RunNotFound { run_id: RunId },
    /// The run exhausted its re-trigger budget.
    TriggerBudgetExhausted { run_id: RunId },
    /// Mutations are suspended after a persistent storage failure.
    Suspended,
    /// No workspace context exists for this id.
    WorkspaceNotFound { workspace_id: WorkspaceId },
    /// The workspace worker is gone; the mutation was not applied.
    WorkerUnavailable,
    /// A mutation handler failed unexpectedly; the record was dropped.
    Internal { reason: String },
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Graph(e) => write!(f, "graph error: {e}"),
            Self::Storage(e) => write!(f, "storage error: {e}"),
            Self::InvalidTransition { node_id, from, to } => {
                write!(
                    f,
                    "invalid status transition for {node_id}: '{from}' -> '{to}'"
                )
            }
            Self::NoActiveRun { node_id } => {
                write!(f, "no active run covers node {node_id}")
            }
            Self::NodeBusy { node_id, run_id } => {
                write!(f, "node {node_id} is owned by active run {run_id}")
            }
            Self::RunRejected { reason } => write!(f, "run rejected: {reason}"),
            Self::RunNotFound { run_id } => write!(f, "run not found: {run_id}"),
            Self::TriggerBudgetExhausted { run_id } => {
                write!(f, "re-trigger budget exhausted for run {run_id}")
            }
            Self::Suspended => {
                write!(f, "mutations suspended until a client acknowledges")
            }
            Self::WorkspaceNotFound { workspace_id } => {
                write!(f, "workspace not found: {workspace_id}")
            }
            Self::WorkerUnavailable => write!(f, "workspace worker is unavailable"),
            Self::Internal { reason } => write!(f, "internal engine error: {reason}"),
        }
    }
}

impl std::error::Error for EngineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Graph(e) => Some(e),
            Self::Storage(e) => Some(e),
            _ => None,
        }
    }
}

impl From<GraphError> for EngineError {
    fn from(e: GraphError) -> Self {
        Self::Graph(e)
    }
}

impl From<StorageError> for EngineError {
    fn from(e: StorageError) -> Self {
        Self::Storage(e)
    }
}
