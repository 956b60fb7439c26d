//! The graph worker: single cooperative consumer of a workspace's
//! modification queue.
//!
//! For each record the worker applies the mutation, runs the scheduling
//! hook when a status changed, asks the storage driver to save, and emits
//! the resulting events. After the queue drains it performs the completion
//! sweep. All mutation and emission happens on this task, which makes every
//! workspace's history linearizable in queue order.

use crate::bus::EventBus;
use crate::error::EngineError;
use crate::event::{EventKind, GraphUpdate};
use crate::mutation::{EdgeSelector, Mutation, MutationRecord, Origin, Outcome};
use crate::run::{self, RunTable};
use crate::scheduler;
use shellflow_core::WorkspaceId;
use shellflow_graph::{
    Edge, GraphError, GraphStorage, Node, PipelineGraph, storage::NodeLinkGraph,
};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Owns a workspace's graph and run table and applies queued mutations.
pub struct GraphWorker {
    workspace_id: WorkspaceId,
    path: PathBuf,
    graph: PipelineGraph,
    table: RunTable,
    bus: EventBus,
    storage: Arc<dyn GraphStorage>,
    rx: mpsc::UnboundedReceiver<MutationRecord>,
    suspended: bool,
    shutdown: bool,
}

impl GraphWorker {
    /// Creates a worker over a loaded graph.
    #[must_use]
    pub fn new(
        workspace_id: WorkspaceId,
        path: PathBuf,
        graph: PipelineGraph,
        bus: EventBus,
        storage: Arc<dyn GraphStorage>,
        rx: mpsc::UnboundedReceiver<MutationRecord>,
    ) -> Self {
        Self {
            workspace_id,
            path,
            graph,
            table: RunTable::new(),
            bus,
            storage,
            rx,
            suspended: false,
            shutdown: false,
        }
    }

    /// Consumes the queue until teardown or until every sender is dropped.
    pub async fn run(mut self) {
        tracing::debug!(workspace_id = %self.workspace_id, "graph worker started");
        while !self.shutdown {
            let Some(record) = self.rx.recv().await else {
                break;
            };
            self.process(record);
            while !self.shutdown {
                match self.rx.try_recv() {
                    Ok(record) => self.process(record),
                    Err(_) => break,
                }
            }
            self.sweep();
        }
        tracing::debug!(workspace_id = %self.workspace_id, "graph worker stopped");
    }

    fn process(&mut self, mut record: MutationRecord) {
        let reply = record.reply.take();
        let origin = record.origin;
        let result = self.handle(record.mutation, origin);
        match (reply, result) {
            (Some(latch), result) => {
                // The enqueueing handler may have timed out and dropped the
                // receiver; the mutation stays applied either way.
                let _ = latch.send(result);
            }
            (None, Err(err)) => {
                tracing::warn!(%origin, error = %err, "fire-and-forget mutation failed");
            }
            (None, Ok(_)) => {}
        }
    }

    fn handle(&mut self, mutation: Mutation, origin: Origin) -> Result<Outcome, EngineError> {
        match &mutation {
            Mutation::Snapshot => {
                return Ok(Outcome::Snapshot {
                    graph: NodeLinkGraph::capture(&self.graph),
                });
            }
            Mutation::ReadNodeLog { node_id } => {
                let node = self
                    .graph
                    .node(*node_id)
                    .ok_or(GraphError::NodeNotFound { node_id: *node_id })?;
                return Ok(Outcome::NodeLog {
                    log: node.log.clone(),
                });
            }
            Mutation::Acknowledge => {
                if self.suspended {
                    self.suspended = false;
                    tracing::info!(workspace_id = %self.workspace_id, "suspension acknowledged");
                }
                return Ok(Outcome::Applied);
            }
            Mutation::TeardownIfIdle => {
                let idle = self.table.is_empty();
                if idle {
                    self.shutdown = true;
                }
                return Ok(Outcome::TornDown { torn_down: idle });
            }
            _ => {}
        }

        if self.suspended {
            return Err(EngineError::Suspended);
        }

        // Runner callbacks for runs that are no longer active are discarded.
        if let Mutation::EditNodeStatus {
            run_id: Some(run_id),
            ..
        } = &mutation
            && !self.table.contains(*run_id)
        {
            tracing::debug!(%run_id, %origin, "discarding callback for inactive run");
            return Ok(Outcome::Applied);
        }

        let applied = catch_unwind(AssertUnwindSafe(|| self.apply(mutation)));
        let (outcome, events, dirty) = match applied {
            Ok(Ok(result)) => result,
            Ok(Err(err)) => {
                match &err {
                    EngineError::Graph(source) => {
                        self.bus.publish(EventKind::GraphRejected {
                            reason: source.to_string(),
                        });
                    }
                    EngineError::RunRejected { reason } => {
                        self.bus.publish(EventKind::RunRejected {
                            reason: reason.clone(),
                        });
                    }
                    _ => {}
                }
                return Err(err);
            }
            Err(_) => {
                let reason = "mutation handler panicked; record dropped".to_string();
                tracing::error!(workspace_id = %self.workspace_id, %origin, "{reason}");
                self.bus.publish(EventKind::GraphRejected {
                    reason: reason.clone(),
                });
                return Err(EngineError::Internal { reason });
            }
        };

        if dirty {
            self.persist()?;
        }

        let terminal = events.iter().any(|event| {
            matches!(
                event,
                EventKind::NodeFinished { .. } | EventKind::NodeFailed { .. }
            )
        });
        for kind in events {
            self.bus.publish(kind);
        }
        if terminal {
            self.sweep();
        }
        Ok(outcome)
    }

    /// Applies one mutation. Returns the outcome, the events to emit, and
    /// whether the graph changed (and therefore needs saving). Errors leave
    /// graph and run table untouched.
    #[allow(clippy::too_many_lines)]
    fn apply(
        &mut self,
        mutation: Mutation,
    ) -> Result<(Outcome, Vec<EventKind>, bool), EngineError> {
        match mutation {
            Mutation::AddNode { label, x, y } => {
                let node_id = self.graph.add_node(Node::new(label, x, y))?;
                Ok((
                    Outcome::NodeCreated { node_id },
                    vec![self.full_update()],
                    true,
                ))
            }
            Mutation::RemoveNode { node_id } => {
                self.graph.remove_node(node_id)?;
                self.table.clear_owner(node_id);
                Ok((Outcome::Applied, vec![self.full_update()], true))
            }
            Mutation::AddEdge {
                source,
                target,
                edge_type,
            } => {
                if edge_type == shellflow_graph::EdgeType::Blocking
                    && self.graph.blocking_cycle_with(source, target)
                {
                    return Err(GraphError::BlockingCycle { source, target }.into());
                }
                self.graph.add_edge(Edge::new(source, target, edge_type))?;
                Ok((Outcome::Applied, vec![self.full_update()], true))
            }
            Mutation::RemoveEdge { selector } => {
                let edge_id = match selector {
                    EdgeSelector::ById(edge_id) => edge_id,
                    EdgeSelector::ByEndpoints { source, target } => self
                        .graph
                        .edge_between(source, target)
                        .map(|edge| edge.id)
                        .ok_or(GraphError::EdgeBetweenNotFound { source, target })?,
                };
                self.graph.remove_edge(edge_id)?;
                Ok((Outcome::Applied, vec![self.full_update()], true))
            }
            Mutation::EditNodeStatus {
                node_id,
                status,
                run_id,
            } => {
                let before = self
                    .graph
                    .node(node_id)
                    .ok_or(GraphError::NodeNotFound { node_id })?
                    .status;
                let mut events = scheduler::set_node_status(
                    &mut self.graph,
                    &mut self.table,
                    node_id,
                    status,
                    run_id,
                )?;
                let after = self.graph.node(node_id).map_or(before, |node| node.status);
                if after != before {
                    events.insert(
                        0,
                        EventKind::GraphUpdated {
                            update: GraphUpdate::NodeStatus {
                                node_id,
                                status: after,
                            },
                        },
                    );
                }
                let dirty = after != before || !events.is_empty();
                Ok((Outcome::Applied, events, dirty))
            }
            Mutation::EditEdgeStatus { edge_id, status } => {
                let before = self
                    .graph
                    .edge(edge_id)
                    .ok_or(GraphError::EdgeNotFound { edge_id })?
                    .status;
                let mut events =
                    scheduler::set_edge_status(&mut self.graph, &mut self.table, edge_id, status)?;
                let after = self.graph.edge(edge_id).map_or(before, |edge| edge.status);
                if after != before {
                    events.insert(
                        0,
                        EventKind::GraphUpdated {
                            update: GraphUpdate::EdgeStatus {
                                edge_id,
                                status: after,
                            },
                        },
                    );
                }
                let dirty = after != before || !events.is_empty();
                Ok((Outcome::Applied, events, dirty))
            }
            Mutation::EditPosition { node_id, x, y } => {
                let node = self
                    .graph
                    .node_mut(node_id)
                    .ok_or(GraphError::NodeNotFound { node_id })?;
                if node.x == x && node.y == y {
                    return Ok((Outcome::Applied, Vec::new(), false));
                }
                node.x = x;
                node.y = y;
                Ok((Outcome::Applied, vec![self.full_update()], true))
            }
            Mutation::EditLabel { node_id, label } => {
                let node = self
                    .graph
                    .node_mut(node_id)
                    .ok_or(GraphError::NodeNotFound { node_id })?;
                if node.label == label {
                    return Ok((Outcome::Applied, Vec::new(), false));
                }
                node.label = label;
                Ok((Outcome::Applied, vec![self.full_update()], true))
            }
            Mutation::EditWrapper { wrapper } => {
                if self.graph.wrapper() == wrapper.as_deref() {
                    return Ok((Outcome::Applied, Vec::new(), false));
                }
                self.graph.set_wrapper(wrapper);
                Ok((Outcome::Applied, vec![self.full_update()], true))
            }
            Mutation::EditEdgeType {
                source,
                target,
                edge_type,
            } => {
                let edge = self
                    .graph
                    .edge_between(source, target)
                    .ok_or(GraphError::EdgeBetweenNotFound { source, target })?;
                if edge.edge_type == edge_type {
                    return Ok((Outcome::Applied, Vec::new(), false));
                }
                let edge_id = edge.id;
                if edge_type == shellflow_graph::EdgeType::Blocking
                    && self.graph.blocking_cycle_with(source, target)
                {
                    return Err(GraphError::BlockingCycle { source, target }.into());
                }
                if let Some(edge) = self.graph.edge_mut(edge_id) {
                    edge.edge_type = edge_type;
                }
                Ok((Outcome::Applied, vec![self.full_update()], true))
            }
            Mutation::SaveNodeLog { node_id, log } => {
                let node = self
                    .graph
                    .node_mut(node_id)
                    .ok_or(GraphError::NodeNotFound { node_id })?;
                if node.log == log {
                    return Ok((Outcome::Applied, Vec::new(), false));
                }
                node.log = log;
                Ok((Outcome::Applied, vec![self.full_update()], true))
            }
            Mutation::StartRun { nodes, wrapper } => {
                let (run_id, events) =
                    run::start_run(&mut self.graph, &mut self.table, nodes, wrapper)?;
                Ok((Outcome::RunStarted { run_id }, events, true))
            }
            Mutation::CancelRun { run_id } => {
                let events = run::cancel_run(&mut self.graph, &mut self.table, run_id)?;
                let dirty = !events.is_empty();
                Ok((Outcome::Applied, events, dirty))
            }
            Mutation::Snapshot
            | Mutation::ReadNodeLog { .. }
            | Mutation::Acknowledge
            | Mutation::TeardownIfIdle => Ok((Outcome::Applied, Vec::new(), false)),
        }
    }

    fn full_update(&self) -> EventKind {
        EventKind::GraphUpdated {
            update: GraphUpdate::Full {
                graph: NodeLinkGraph::capture(&self.graph),
            },
        }
    }

    fn persist(&mut self) -> Result<(), EngineError> {
        match self.storage.save(&self.graph, &self.path) {
            Ok(()) => Ok(()),
            Err(first) => {
                tracing::warn!(
                    workspace_id = %self.workspace_id,
                    error = %first,
                    "graph save failed; retrying once"
                );
                match self.storage.save(&self.graph, &self.path) {
                    Ok(()) => Ok(()),
                    Err(second) => {
                        self.suspended = true;
                        self.bus.publish(EventKind::GraphRejected {
                            reason: format!("graph save failed: {second}"),
                        });
                        Err(EngineError::Storage(second))
                    }
                }
            }
        }
    }

    fn sweep(&mut self) {
        let events = run::completion_sweep(&self.graph, &mut self.table);
        for kind in events {
            self.bus.publish(kind);
        }
    }
}
