//! Domain events emitted by the graph worker.
//!
//! Events carry the workspace id, a per-workspace monotonically increasing
//! sequence number assigned by the bus, and a timestamp. The serialized
//! form matches the event-log layout: `{workspace_id, seq, ts, kind,
//! payload}`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shellflow_core::{EdgeId, NodeId, RunId, WorkspaceId};
use shellflow_graph::{EdgeStatus, NodeStatus, storage::NodeLinkGraph};

/// A sequenced event as delivered to subscribers and the event log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// The workspace the event belongs to.
    pub workspace_id: WorkspaceId,
    /// Per-workspace sequence number, monotonically increasing.
    pub seq: u64,
    /// Server-assigned timestamp.
    pub ts: DateTime<Utc>,
    /// The event kind and payload.
    #[serde(flatten)]
    pub kind: EventKind,
}

/// The typed event kinds of the scheduling engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    /// A node entered `run` and should be picked up by a runner.
    NodeReady {
        node_id: NodeId,
        label: String,
        wrapper: Option<String>,
        run_id: RunId,
    },
    /// A runner reported execution start.
    NodeStarted { node_id: NodeId, run_id: RunId },
    /// A runner reported a zero exit.
    NodeFinished { node_id: NodeId, run_id: RunId },
    /// A runner reported a non-zero exit.
    NodeFailed { node_id: NodeId, run_id: RunId },
    /// No node of the run is `run` or `running` any more.
    RunComplete { run_id: RunId },
    /// The graph changed; carries a full snapshot or a status delta.
    GraphUpdated { update: GraphUpdate },
    /// A mutation was rejected and dropped without changing state.
    GraphRejected { reason: String },
    /// Run creation was rejected without changing state.
    RunRejected { reason: String },
}

impl EventKind {
    /// Returns the run this event belongs to, if any.
    #[must_use]
    pub fn run_id(&self) -> Option<RunId> {
        match self {
            Self::NodeReady { run_id, .. }
            | Self::NodeStarted { run_id, .. }
            | Self::NodeFinished { run_id, .. }
            | Self::NodeFailed { run_id, .. }
            | Self::RunComplete { run_id } => Some(*run_id),
            _ => None,
        }
    }

    /// Returns the node this event concerns, if any.
    #[must_use]
    pub fn node_id(&self) -> Option<NodeId> {
        match self {
            Self::NodeReady { node_id, .. }
            | Self::NodeStarted { node_id, .. }
            | Self::NodeFinished { node_id, .. }
            | Self::NodeFailed { node_id, .. } => Some(*node_id),
            _ => None,
        }
    }
}

/// Payload of a `GRAPH_UPDATED` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "scope", rename_all = "snake_case")]
pub enum GraphUpdate {
    /// Full node-link snapshot after a structural mutation.
    Full { graph: NodeLinkGraph },
    /// A single node status changed.
    NodeStatus { node_id: NodeId, status: NodeStatus },
    /// A single edge status changed.
    EdgeStatus { edge_id: EdgeId, status: EdgeStatus },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn event_log_layout() {
        let run_id = RunId::new();
        let event = Event {
            workspace_id: WorkspaceId::from_path(&PathBuf::from("/tmp/p.json")),
            seq: 7,
            ts: Utc::now(),
            kind: EventKind::RunComplete { run_id },
        };

        let json = serde_json::to_value(&event).expect("serialize");
        assert_eq!(json["seq"], 7);
        assert_eq!(json["kind"], "RUN_COMPLETE");
        assert!(json["payload"]["run_id"].is_string());
        assert!(json["workspace_id"].is_string());
        assert!(json["ts"].is_string());
    }

    #[test]
    fn kind_names_are_screaming_snake() {
        let kind = EventKind::NodeReady {
            node_id: NodeId::new(),
            label: "echo hi".to_string(),
            wrapper: None,
            run_id: RunId::new(),
        };
        let json = serde_json::to_value(&kind).expect("serialize");
        assert_eq!(json["kind"], "NODE_READY");
    }

    #[test]
    fn accessors_cover_node_events() {
        let node_id = NodeId::new();
        let run_id = RunId::new();
        let kind = EventKind::NodeFailed { node_id, run_id };
        assert_eq!(kind.node_id(), Some(node_id));
        assert_eq!(kind.run_id(), Some(run_id));

        let rejected = EventKind::RunRejected {
            reason: "cycle".to_string(),
        };
        assert_eq!(rejected.node_id(), None);
        assert_eq!(rejected.run_id(), None);
    }
}
