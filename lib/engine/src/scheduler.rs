//! The scheduling state machine.
//!
//! Transitions live on (node-status, edge-status) pairs and are triggered
//! only by status mutations; everything else is structural. Entering `run`
//! atomically clears the node's incoming in-run edges and emits
//! `NODE_READY`; a finished node latches its outgoing in-run edges `to_run`
//! and re-evaluates each target. Edges with an endpoint outside the active
//! run's node set are invisible to the evaluation.

use crate::error::EngineError;
use crate::event::EventKind;
use crate::run::RunTable;
use shellflow_core::{EdgeId, NodeId, RunId};
use shellflow_graph::{EdgeStatus, EdgeType, GraphError, NodeStatus, PipelineGraph};

/// Applies a node status change and its scheduling side effects.
///
/// `run_id` is the caller-supplied run scope: runner callbacks always carry
/// one, client edits may omit it. A callback whose run no longer owns the
/// node is discarded as stale (no-op, no events). An edit that repeats the
/// current status is an accepted no-op, except for `run`, which is always a
/// (re-)entry.
///
/// # Errors
///
/// Returns an error for unknown nodes, illegal transitions, `run` requests
/// no active run covers, ownership conflicts, and exhausted re-trigger
/// budgets. Errors leave the graph and run table untouched.
pub fn set_node_status(
    graph: &mut PipelineGraph,
    table: &mut RunTable,
    node_id: NodeId,
    status: NodeStatus,
    run_id: Option<RunId>,
) -> Result<Vec<EventKind>, EngineError> {
    let current = graph
        .node(node_id)
        .ok_or(GraphError::NodeNotFound { node_id })?
        .status;

    match status {
        NodeStatus::Run => enter_run(graph, table, node_id, run_id),
        NodeStatus::Running => {
            if current == NodeStatus::Running {
                return Ok(Vec::new());
            }
            if current != NodeStatus::Run {
                return Err(invalid(node_id, current, status));
            }
            let owner = table
                .owner(node_id)
                .ok_or(EngineError::NoActiveRun { node_id })?;
            if stale(run_id, owner) {
                return Ok(Vec::new());
            }
            if let Some(node) = graph.node_mut(node_id) {
                node.status = NodeStatus::Running;
            }
            Ok(vec![EventKind::NodeStarted {
                node_id,
                run_id: owner,
            }])
        }
        NodeStatus::Ran => {
            if current == NodeStatus::Ran {
                return Ok(Vec::new());
            }
            if current != NodeStatus::Running {
                return Err(invalid(node_id, current, status));
            }
            on_finished(graph, table, node_id, run_id)
        }
        NodeStatus::Fail => {
            if current == NodeStatus::Fail {
                return Ok(Vec::new());
            }
            if current != NodeStatus::Running {
                return Err(invalid(node_id, current, status));
            }
            let owner = table
                .owner(node_id)
                .ok_or(EngineError::NoActiveRun { node_id })?;
            if stale(run_id, owner) {
                return Ok(Vec::new());
            }
            if let Some(node) = graph.node_mut(node_id) {
                node.status = NodeStatus::Fail;
            }
            table.clear_owner(node_id);
            // No propagation: downstream blocking nodes stay unreached.
            Ok(vec![EventKind::NodeFailed {
                node_id,
                run_id: owner,
            }])
        }
        NodeStatus::Idle => {
            if current == NodeStatus::Idle {
                return Ok(Vec::new());
            }
            if let Some(node) = graph.node_mut(node_id) {
                node.status = NodeStatus::Idle;
            }
            table.clear_owner(node_id);
            Ok(Vec::new())
        }
    }
}

/// Applies an edge status change.
///
/// Latching an edge `to_run` by hand is supported: the target's readiness is
/// evaluated within the active run covering both endpoints, if one exists.
/// The clear-all-incoming step only ever runs when a node enters `run`.
///
/// # Errors
///
/// Returns an error if the edge does not exist.
pub fn set_edge_status(
    graph: &mut PipelineGraph,
    table: &mut RunTable,
    edge_id: EdgeId,
    status: EdgeStatus,
) -> Result<Vec<EventKind>, EngineError> {
    let edge = graph
        .edge(edge_id)
        .ok_or(GraphError::EdgeNotFound { edge_id })?;
    if edge.status == status {
        return Ok(Vec::new());
    }
    let (source, target) = (edge.source, edge.target);
    if let Some(edge) = graph.edge_mut(edge_id) {
        edge.status = status;
    }

    let mut events = Vec::new();
    if status == EdgeStatus::ToRun
        && let Some(run_id) = table.covering_pair(source, target)
    {
        match evaluate_readiness(graph, table, target, run_id) {
            Ok(mut triggered) => events.append(&mut triggered),
            Err(err) => {
                tracing::warn!(node_id = %target, error = %err, "manual latch did not trigger");
            }
        }
    }
    Ok(events)
}

/// Transitions a node into `run` under a run.
///
/// Side effects, atomic with the transition: ownership is recorded, the
/// run's entry counter advances, every incoming edge whose source lies in
/// the run's node set is cleared, and `NODE_READY` is emitted.
///
/// # Errors
///
/// Returns an error when no run covers the node, the node is owned by a
/// different run, or the run's re-trigger budget is exhausted.
pub(crate) fn enter_run(
    graph: &mut PipelineGraph,
    table: &mut RunTable,
    node_id: NodeId,
    run_id: Option<RunId>,
) -> Result<Vec<EventKind>, EngineError> {
    if !graph.contains_node(node_id) {
        return Err(GraphError::NodeNotFound { node_id }.into());
    }
    let run_id = match run_id {
        Some(run_id) => {
            if !table.contains(run_id) {
                return Err(EngineError::RunNotFound { run_id });
            }
            run_id
        }
        None => table
            .covering(node_id)
            .ok_or(EngineError::NoActiveRun { node_id })?,
    };

    let wrapper = {
        let Some(handle) = table.run(run_id) else {
            return Err(EngineError::RunNotFound { run_id });
        };
        if !handle.contains(node_id) {
            return Err(EngineError::NoActiveRun { node_id });
        }
        if let Some(owner) = table.owner(node_id)
            && owner != run_id
        {
            return Err(EngineError::NodeBusy {
                node_id,
                run_id: owner,
            });
        }
        if !handle.has_budget() {
            return Err(EngineError::TriggerBudgetExhausted { run_id });
        }
        handle.wrapper.clone()
    };

    let incoming_in_run: Vec<EdgeId> = {
        let Some(handle) = table.run(run_id) else {
            return Err(EngineError::RunNotFound { run_id });
        };
        graph
            .incoming_edges(node_id)
            .filter(|edge| handle.contains(edge.source))
            .map(|edge| edge.id)
            .collect()
    };
    for edge_id in incoming_in_run {
        if let Some(edge) = graph.edge_mut(edge_id) {
            edge.status = EdgeStatus::Clear;
        }
    }

    let label = match graph.node_mut(node_id) {
        Some(node) => {
            node.status = NodeStatus::Run;
            node.label.clone()
        }
        None => return Err(GraphError::NodeNotFound { node_id }.into()),
    };
    table.set_owner(node_id, run_id);
    if let Some(handle) = table.run_mut(run_id) {
        handle.entries += 1;
    }

    Ok(vec![EventKind::NodeReady {
        node_id,
        label,
        wrapper,
        run_id,
    }])
}

/// Re-evaluates a target node after one of its incoming edges latched.
///
/// Rule 1: any in-run non-blocking edge with `to_run` triggers immediately.
/// Rule 2: otherwise all in-run blocking edges must be latched (and at
/// least one must exist). Ownership conflicts and exhausted budgets drop
/// the trigger with a warning instead of failing the mutation.
pub(crate) fn evaluate_readiness(
    graph: &mut PipelineGraph,
    table: &mut RunTable,
    node_id: NodeId,
    run_id: RunId,
) -> Result<Vec<EventKind>, EngineError> {
    let ready = {
        let Some(handle) = table.run(run_id) else {
            return Ok(Vec::new());
        };
        if !handle.contains(node_id) || !graph.contains_node(node_id) {
            return Ok(Vec::new());
        }

        let mut non_blocking_latched = false;
        let mut blocking_total = 0usize;
        let mut blocking_latched = 0usize;
        for edge in graph
            .incoming_edges(node_id)
            .filter(|edge| handle.contains(edge.source))
        {
            match edge.edge_type {
                EdgeType::NonBlocking => {
                    if edge.status == EdgeStatus::ToRun {
                        non_blocking_latched = true;
                    }
                }
                EdgeType::Blocking => {
                    blocking_total += 1;
                    if edge.status == EdgeStatus::ToRun {
                        blocking_latched += 1;
                    }
                }
            }
        }
        non_blocking_latched || (blocking_total > 0 && blocking_total == blocking_latched)
    };

    if !ready {
        return Ok(Vec::new());
    }
    match enter_run(graph, table, node_id, Some(run_id)) {
        Ok(events) => Ok(events),
        Err(
            err @ (EngineError::NodeBusy { .. } | EngineError::TriggerBudgetExhausted { .. }),
        ) => {
            tracing::warn!(node_id = %node_id, error = %err, "dropping readiness trigger");
            Ok(Vec::new())
        }
        Err(err) => Err(err),
    }
}

/// A node finished successfully: latch outgoing in-run edges and evaluate
/// each distinct target.
fn on_finished(
    graph: &mut PipelineGraph,
    table: &mut RunTable,
    node_id: NodeId,
    run_id: Option<RunId>,
) -> Result<Vec<EventKind>, EngineError> {
    let owner = table
        .owner(node_id)
        .ok_or(EngineError::NoActiveRun { node_id })?;
    if stale(run_id, owner) {
        return Ok(Vec::new());
    }

    if let Some(node) = graph.node_mut(node_id) {
        node.status = NodeStatus::Ran;
    }
    table.clear_owner(node_id);

    let mut events = vec![EventKind::NodeFinished {
        node_id,
        run_id: owner,
    }];

    let outgoing_in_run: Vec<(EdgeId, NodeId)> = {
        let Some(handle) = table.run(owner) else {
            return Ok(events);
        };
        graph
            .outgoing_edges(node_id)
            .filter(|edge| handle.contains(edge.target))
            .map(|edge| (edge.id, edge.target))
            .collect()
    };

    let mut targets: Vec<NodeId> = Vec::new();
    for (edge_id, target) in outgoing_in_run {
        if let Some(edge) = graph.edge_mut(edge_id) {
            edge.status = EdgeStatus::ToRun;
        }
        if !targets.contains(&target) {
            targets.push(target);
        }
    }
    targets.sort();

    for target in targets {
        let mut triggered = evaluate_readiness(graph, table, target, owner)?;
        events.append(&mut triggered);
    }
    Ok(events)
}

fn invalid(node_id: NodeId, from: NodeStatus, to: NodeStatus) -> EngineError {
    EngineError::InvalidTransition { node_id, from, to }
}

fn stale(requested: Option<RunId>, owner: RunId) -> bool {
    requested.is_some_and(|run_id| run_id != owner)
}
