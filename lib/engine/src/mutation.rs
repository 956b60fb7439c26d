//! Mutation records carried by the modification queue.
//!
//! Every state change and every worker-acknowledged read flows through the
//! queue as one of these tagged records, so the worker can apply them in a
//! single serialized order. The origin tag is used only for audit and event
//! attribution; the optional latch lets the enqueueing handler await the
//! apply result synchronously.

use crate::error::EngineError;
use shellflow_core::{ClientId, EdgeId, NodeId, RunId, RunnerId};
use shellflow_graph::{EdgeStatus, EdgeType, NodeStatus, storage::NodeLinkGraph};
use tokio::sync::oneshot;

/// Who enqueued a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// An editor client, via the HTTP surface or realtime channel.
    Client(ClientId),
    /// A runner reporting execution progress.
    Runner(RunnerId),
    /// The engine itself (lifecycle and control records).
    Engine,
}

impl std::fmt::Display for Origin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Client(id) => write!(f, "{id}"),
            Self::Runner(id) => write!(f, "{id}"),
            Self::Engine => f.write_str("engine"),
        }
    }
}

/// Identifies an edge either directly or by its endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeSelector {
    /// By edge id.
    ById(EdgeId),
    /// By `(source, target)` pair; the first matching edge is taken.
    ByEndpoints { source: NodeId, target: NodeId },
}

/// A queued mutation or control operation.
#[derive(Debug, Clone)]
pub enum Mutation {
    /// Create a node.
    AddNode { label: String, x: String, y: String },
    /// Remove a node and all incident edges.
    RemoveNode { node_id: NodeId },
    /// Create an edge between existing nodes.
    AddEdge {
        source: NodeId,
        target: NodeId,
        edge_type: EdgeType,
    },
    /// Remove an edge.
    RemoveEdge { selector: EdgeSelector },
    /// Change a node status; drives the scheduling state machine.
    EditNodeStatus {
        node_id: NodeId,
        status: NodeStatus,
        run_id: Option<RunId>,
    },
    /// Change an edge readiness latch.
    EditEdgeStatus { edge_id: EdgeId, status: EdgeStatus },
    /// Move a node in the editor layout.
    EditPosition { node_id: NodeId, x: String, y: String },
    /// Replace a node's shell command.
    EditLabel { node_id: NodeId, label: String },
    /// Replace the graph-level wrapper template.
    EditWrapper { wrapper: Option<String> },
    /// Change an edge's dependency semantics.
    EditEdgeType {
        source: NodeId,
        target: NodeId,
        edge_type: EdgeType,
    },
    /// Store a node's captured execution output.
    SaveNodeLog { node_id: NodeId, log: String },
    /// Create a run over an optional explicit selection.
    StartRun {
        nodes: Option<Vec<NodeId>>,
        wrapper: Option<String>,
    },
    /// Cancel an active run.
    CancelRun { run_id: RunId },
    /// Worker-acknowledged graph snapshot.
    Snapshot,
    /// Worker-acknowledged read of one node's log.
    ReadNodeLog { node_id: NodeId },
    /// Clear a storage-failure suspension (sent on client connect).
    Acknowledge,
    /// Shut the worker down if no run is active.
    TeardownIfIdle,
}

impl Mutation {
    /// Returns true for reads and control records that never change the
    /// graph and therefore bypass the suspension gate.
    #[must_use]
    pub fn is_control(&self) -> bool {
        matches!(
            self,
            Self::Snapshot | Self::ReadNodeLog { .. } | Self::Acknowledge | Self::TeardownIfIdle
        )
    }
}

/// The worker's reply on a record's apply-latch.
#[derive(Debug)]
pub enum Outcome {
    /// The mutation was applied (or was an accepted no-op).
    Applied,
    /// A node was created.
    NodeCreated { node_id: NodeId },
    /// A run was accepted and seeded.
    RunStarted { run_id: RunId },
    /// Graph snapshot at a worker-acknowledged checkpoint.
    Snapshot { graph: NodeLinkGraph },
    /// A node's captured log.
    NodeLog { log: String },
    /// Whether the worker actually shut down.
    TornDown { torn_down: bool },
}

/// One queue entry: the operation, its origin, and an optional latch.
#[derive(Debug)]
pub struct MutationRecord {
    /// The operation to apply.
    pub mutation: Mutation,
    /// Who enqueued it.
    pub origin: Origin,
    /// Latch the enqueueing handler awaits; `None` for fire-and-forget.
    pub reply: Option<oneshot::Sender<Result<Outcome, EngineError>>>,
}

impl MutationRecord {
    /// Creates a record with an apply-latch and returns the receiving end.
    #[must_use]
    pub fn new(
        mutation: Mutation,
        origin: Origin,
    ) -> (Self, oneshot::Receiver<Result<Outcome, EngineError>>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                mutation,
                origin,
                reply: Some(tx),
            },
            rx,
        )
    }

    /// Creates a record nobody waits on.
    #[must_use]
    pub fn fire_and_forget(mutation: Mutation, origin: Origin) -> Self {
        Self {
            mutation,
            origin,
            reply: None,
        }
    }
}
