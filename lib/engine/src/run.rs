//! Run registry and run controller.
//!
//! A run is a bounded execution episode over an allowed node set. The run
//! table tracks every active run plus the `active_node_run` partial
//! function enforcing at-most-one active run per node. The controller
//! performs the deterministic selection, the acyclicity rejection, root
//! seeding, the completion sweep, and cancellation; the edge-level
//! propagation rules live in [`crate::scheduler`].

use crate::error::EngineError;
use crate::event::{EventKind, GraphUpdate};
use crate::scheduler;
use shellflow_core::{NodeId, RunId};
use shellflow_graph::{NodeStatus, PipelineGraph};
use std::collections::{BTreeMap, HashMap, HashSet};

/// State registered for one active run.
#[derive(Debug, Clone)]
pub struct RunHandle {
    /// The nodes this run may propagate through.
    pub nodes: HashSet<NodeId>,
    /// Wrapper template delivered with every `NODE_READY` of this run.
    pub wrapper: Option<String>,
    /// `NODE_READY` emissions so far.
    pub entries: usize,
    /// Re-trigger cap: twice the allowed set size.
    pub max_entries: usize,
}

impl RunHandle {
    /// Creates a handle over an allowed set.
    #[must_use]
    pub fn new(nodes: HashSet<NodeId>, wrapper: Option<String>) -> Self {
        let max_entries = nodes.len() * 2;
        Self {
            nodes,
            wrapper,
            entries: 0,
            max_entries,
        }
    }

    /// Returns true if the node belongs to this run's allowed set.
    #[must_use]
    pub fn contains(&self, node_id: NodeId) -> bool {
        self.nodes.contains(&node_id)
    }

    /// Returns true while further `NODE_READY` emissions are permitted.
    #[must_use]
    pub fn has_budget(&self) -> bool {
        self.entries < self.max_entries
    }
}

/// Active runs plus node ownership for one workspace.
///
/// Runs are kept in id order so lookups that scan runs (e.g. resolving the
/// run covering a node) are deterministic.
#[derive(Debug, Default)]
pub struct RunTable {
    runs: BTreeMap<RunId, RunHandle>,
    node_owner: HashMap<NodeId, RunId>,
}

impl RunTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true when no run is active.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    /// Returns true if the run is registered.
    #[must_use]
    pub fn contains(&self, run_id: RunId) -> bool {
        self.runs.contains_key(&run_id)
    }

    /// Returns a run handle.
    #[must_use]
    pub fn run(&self, run_id: RunId) -> Option<&RunHandle> {
        self.runs.get(&run_id)
    }

    /// Returns a mutable run handle.
    pub fn run_mut(&mut self, run_id: RunId) -> Option<&mut RunHandle> {
        self.runs.get_mut(&run_id)
    }

    /// Registers a run.
    pub fn insert(&mut self, run_id: RunId, handle: RunHandle) {
        self.runs.insert(run_id, handle);
    }

    /// Removes a run and every ownership entry pointing at it.
    pub fn remove(&mut self, run_id: RunId) -> Option<RunHandle> {
        let handle = self.runs.remove(&run_id);
        if handle.is_some() {
            self.node_owner.retain(|_, owner| *owner != run_id);
        }
        handle
    }

    /// The ids of all active runs, in id order.
    #[must_use]
    pub fn run_ids(&self) -> Vec<RunId> {
        self.runs.keys().copied().collect()
    }

    /// The run currently owning a node, if any (`active_node_run`).
    #[must_use]
    pub fn owner(&self, node_id: NodeId) -> Option<RunId> {
        self.node_owner.get(&node_id).copied()
    }

    /// Records ownership of a node.
    pub fn set_owner(&mut self, node_id: NodeId, run_id: RunId) {
        self.node_owner.insert(node_id, run_id);
    }

    /// Clears ownership of a node.
    pub fn clear_owner(&mut self, node_id: NodeId) -> Option<RunId> {
        self.node_owner.remove(&node_id)
    }

    /// The first active run whose allowed set contains the node.
    #[must_use]
    pub fn covering(&self, node_id: NodeId) -> Option<RunId> {
        self.runs
            .iter()
            .find(|(_, handle)| handle.contains(node_id))
            .map(|(run_id, _)| *run_id)
    }

    /// The first active run whose allowed set contains both nodes.
    #[must_use]
    pub fn covering_pair(&self, a: NodeId, b: NodeId) -> Option<RunId> {
        self.runs
            .iter()
            .find(|(_, handle)| handle.contains(a) && handle.contains(b))
            .map(|(run_id, _)| *run_id)
    }
}

/// Creates a run: deterministic selection, rejection checks, registration
/// and root seeding, all applied atomically within one queue record.
///
/// Selection: an explicit non-empty set (filtered to existing nodes), else
/// the set of failed nodes (resume), else every node.
///
/// # Errors
///
/// Returns `RunRejected` when the selection is empty, a selected node is
/// owned by another active run, or the induced blocking subgraph is cyclic.
/// No state is changed on rejection.
pub fn start_run(
    graph: &mut PipelineGraph,
    table: &mut RunTable,
    selection: Option<Vec<NodeId>>,
    wrapper_override: Option<String>,
) -> Result<(RunId, Vec<EventKind>), EngineError> {
    let allowed: HashSet<NodeId> = match selection {
        Some(nodes) if !nodes.is_empty() => nodes
            .into_iter()
            .filter(|node_id| graph.contains_node(*node_id))
            .collect(),
        _ => {
            let failed: HashSet<NodeId> = graph
                .nodes()
                .filter(|node| node.status == NodeStatus::Fail)
                .map(|node| node.id)
                .collect();
            if failed.is_empty() {
                graph.nodes().map(|node| node.id).collect()
            } else {
                failed
            }
        }
    };

    if allowed.is_empty() {
        return Err(EngineError::RunRejected {
            reason: "no runnable nodes selected".to_string(),
        });
    }

    let mut busy: Vec<NodeId> = allowed
        .iter()
        .copied()
        .filter(|node_id| table.owner(*node_id).is_some())
        .collect();
    busy.sort();
    if let Some(node_id) = busy.first() {
        return Err(EngineError::RunRejected {
            reason: format!("node {node_id} is owned by another active run"),
        });
    }

    if !graph.blocking_is_acyclic(&allowed) {
        return Err(EngineError::RunRejected {
            reason: "blocking dependencies form a cycle in the selected set".to_string(),
        });
    }

    let roots = graph.blocking_roots(&allowed);
    if roots.is_empty() {
        return Err(EngineError::RunRejected {
            reason: "selection has no root node".to_string(),
        });
    }

    let run_id = RunId::new();
    let wrapper = wrapper_override.or_else(|| graph.wrapper().map(str::to_owned));
    table.insert(run_id, RunHandle::new(allowed, wrapper));

    let mut events = Vec::new();
    for root in roots {
        // Failed roots (resume) and previously-ran roots alike restart from
        // a clean slate.
        if let Some(node) = graph.node_mut(root) {
            node.status = NodeStatus::Idle;
        }
        table.clear_owner(root);
        match scheduler::enter_run(graph, table, root, Some(run_id)) {
            Ok(mut seeded) => events.append(&mut seeded),
            Err(err) => {
                tracing::error!(%run_id, node_id = %root, error = %err, "failed to seed root");
            }
        }
    }

    Ok((run_id, events))
}

/// Declares finished runs complete: a run with no allowed-set node in `run`
/// or `running` emits `RUN_COMPLETE` exactly once and is deregistered.
#[must_use]
pub fn completion_sweep(graph: &PipelineGraph, table: &mut RunTable) -> Vec<EventKind> {
    let finished: Vec<RunId> = table
        .run_ids()
        .into_iter()
        .filter(|run_id| {
            table.run(*run_id).is_some_and(|handle| {
                !handle.nodes.iter().any(|node_id| {
                    graph
                        .node(*node_id)
                        .is_some_and(|node| node.status.is_active())
                })
            })
        })
        .collect();

    let mut events = Vec::new();
    for run_id in finished {
        table.remove(run_id);
        events.push(EventKind::RunComplete { run_id });
    }
    events
}

/// Cancels a run: every `run`/`running` node it owns is cleared to idle.
/// The run stays registered so the next completion sweep emits its single
/// `RUN_COMPLETE`; later runner callbacks carrying this `run_id` are
/// discarded once the sweep deregisters it.
///
/// # Errors
///
/// Returns `RunNotFound` for an unregistered run.
pub fn cancel_run(
    graph: &mut PipelineGraph,
    table: &mut RunTable,
    run_id: RunId,
) -> Result<Vec<EventKind>, EngineError> {
    let handle = table
        .run(run_id)
        .ok_or(EngineError::RunNotFound { run_id })?;
    let mut owned: Vec<NodeId> = handle
        .nodes
        .iter()
        .copied()
        .filter(|node_id| table.owner(*node_id) == Some(run_id))
        .collect();
    owned.sort();

    let mut events = Vec::new();
    for node_id in owned {
        if let Some(node) = graph.node_mut(node_id)
            && node.status.is_active()
        {
            node.status = NodeStatus::Idle;
            events.push(EventKind::GraphUpdated {
                update: GraphUpdate::NodeStatus {
                    node_id,
                    status: NodeStatus::Idle,
                },
            });
        }
        table.clear_owner(node_id);
    }
    Ok(events)
}
