//! In-memory pipeline graph store.
//!
//! Nodes live in an id-keyed arena with a separate edge table and
//! incoming/outgoing adjacency indexes, so edges are plain
//! `(source, target)` id pairs and no back-references exist. The store has
//! no locks: mutation is the sole privilege of the workspace worker.
//!
//! Cycle queries build a transient petgraph `DiGraph` over the blocking
//! subgraph and defer to `petgraph::algo::is_cyclic_directed`.

use crate::edge::{Edge, EdgeType};
use crate::error::GraphError;
use crate::node::Node;
use petgraph::algo::is_cyclic_directed;
use petgraph::graph::DiGraph;
use shellflow_core::{EdgeId, NodeId};
use std::collections::{HashMap, HashSet};

/// The directed graph of one workspace.
#[derive(Debug, Clone, Default)]
pub struct PipelineGraph {
    nodes: HashMap<NodeId, Node>,
    edges: HashMap<EdgeId, Edge>,
    incoming: HashMap<NodeId, Vec<EdgeId>>,
    outgoing: HashMap<NodeId, Vec<EdgeId>>,
    wrapper: Option<String>,
}

impl PipelineGraph {
    /// Creates a new empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of nodes in the graph.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Returns the number of edges in the graph.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Returns all nodes, in arbitrary order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// Returns all edges, in arbitrary order.
    pub fn edges(&self) -> impl Iterator<Item = &Edge> {
        self.edges.values()
    }

    /// Returns a reference to a node by its ID.
    #[must_use]
    pub fn node(&self, node_id: NodeId) -> Option<&Node> {
        self.nodes.get(&node_id)
    }

    /// Returns a mutable reference to a node by its ID.
    pub fn node_mut(&mut self, node_id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(&node_id)
    }

    /// Returns true if the node exists.
    #[must_use]
    pub fn contains_node(&self, node_id: NodeId) -> bool {
        self.nodes.contains_key(&node_id)
    }

    /// Returns a reference to an edge by its ID.
    #[must_use]
    pub fn edge(&self, edge_id: EdgeId) -> Option<&Edge> {
        self.edges.get(&edge_id)
    }

    /// Returns a mutable reference to an edge by its ID.
    pub fn edge_mut(&mut self, edge_id: EdgeId) -> Option<&mut Edge> {
        self.edges.get_mut(&edge_id)
    }

    /// Returns the first edge connecting `source` to `target`, if any.
    #[must_use]
    pub fn edge_between(&self, source: NodeId, target: NodeId) -> Option<&Edge> {
        self.outgoing
            .get(&source)
            .into_iter()
            .flatten()
            .filter_map(|id| self.edges.get(id))
            .find(|edge| edge.target == target)
    }

    /// Returns the graph-level wrapper template.
    #[must_use]
    pub fn wrapper(&self) -> Option<&str> {
        self.wrapper.as_deref()
    }

    /// Replaces the graph-level wrapper template.
    pub fn set_wrapper(&mut self, wrapper: Option<String>) {
        self.wrapper = wrapper;
    }

    /// Adds a node to the graph.
    ///
    /// # Errors
    ///
    /// Returns an error if a node with the same id already exists.
    pub fn add_node(&mut self, node: Node) -> Result<NodeId, GraphError> {
        let node_id = node.id;
        if self.nodes.contains_key(&node_id) {
            return Err(GraphError::DuplicateNode { node_id });
        }
        self.nodes.insert(node_id, node);
        Ok(node_id)
    }

    /// Removes a node and every edge incident to it.
    ///
    /// # Errors
    ///
    /// Returns an error if the node does not exist.
    pub fn remove_node(&mut self, node_id: NodeId) -> Result<Node, GraphError> {
        let node = self
            .nodes
            .remove(&node_id)
            .ok_or(GraphError::NodeNotFound { node_id })?;

        let mut incident: Vec<EdgeId> = Vec::new();
        incident.extend(self.incoming.remove(&node_id).unwrap_or_default());
        incident.extend(self.outgoing.remove(&node_id).unwrap_or_default());
        for edge_id in incident {
            if let Some(edge) = self.edges.remove(&edge_id) {
                self.unindex(&edge);
            }
        }

        Ok(node)
    }

    /// Adds an edge between two existing nodes.
    ///
    /// # Errors
    ///
    /// Returns an error if either endpoint is missing or the edge id is
    /// already taken.
    pub fn add_edge(&mut self, edge: Edge) -> Result<EdgeId, GraphError> {
        if !self.nodes.contains_key(&edge.source) {
            return Err(GraphError::NodeNotFound {
                node_id: edge.source,
            });
        }
        if !self.nodes.contains_key(&edge.target) {
            return Err(GraphError::NodeNotFound {
                node_id: edge.target,
            });
        }
        if self.edges.contains_key(&edge.id) {
            return Err(GraphError::DuplicateEdge { edge_id: edge.id });
        }

        let edge_id = edge.id;
        self.outgoing.entry(edge.source).or_default().push(edge_id);
        self.incoming.entry(edge.target).or_default().push(edge_id);
        self.edges.insert(edge_id, edge);
        Ok(edge_id)
    }

    /// Removes an edge by its ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the edge does not exist.
    pub fn remove_edge(&mut self, edge_id: EdgeId) -> Result<Edge, GraphError> {
        let edge = self
            .edges
            .remove(&edge_id)
            .ok_or(GraphError::EdgeNotFound { edge_id })?;
        self.unindex(&edge);
        Ok(edge)
    }

    /// Returns the edges arriving at `node_id`.
    pub fn incoming_edges(&self, node_id: NodeId) -> impl Iterator<Item = &Edge> {
        self.incoming
            .get(&node_id)
            .into_iter()
            .flatten()
            .filter_map(|id| self.edges.get(id))
    }

    /// Returns the edges leaving `node_id`.
    pub fn outgoing_edges(&self, node_id: NodeId) -> impl Iterator<Item = &Edge> {
        self.outgoing
            .get(&node_id)
            .into_iter()
            .flatten()
            .filter_map(|id| self.edges.get(id))
    }

    /// Returns true if the blocking subgraph induced over `allowed` is
    /// acyclic. Edges with an endpoint outside `allowed` are invisible.
    #[must_use]
    pub fn blocking_is_acyclic(&self, allowed: &HashSet<NodeId>) -> bool {
        let blocking = self.edges.values().filter(|edge| {
            edge.edge_type == EdgeType::Blocking
                && allowed.contains(&edge.source)
                && allowed.contains(&edge.target)
        });
        !Self::is_cyclic(allowed.iter().copied(), blocking.map(|e| (e.source, e.target)))
    }

    /// Returns true if adding a blocking edge `source -> target` would close
    /// a cycle in the full blocking subgraph. Used as the insertion guard
    /// for `add-edge` and `edit-edge-type`.
    #[must_use]
    pub fn blocking_cycle_with(&self, source: NodeId, target: NodeId) -> bool {
        let blocking = self
            .edges
            .values()
            .filter(|edge| edge.edge_type == EdgeType::Blocking)
            .map(|e| (e.source, e.target))
            .chain(std::iter::once((source, target)));
        Self::is_cyclic(self.nodes.keys().copied(), blocking)
    }

    /// Returns the nodes of `allowed` with zero in-degree in the induced
    /// blocking subgraph. A node whose only blocking predecessors lie
    /// outside `allowed` counts as a root.
    #[must_use]
    pub fn blocking_roots(&self, allowed: &HashSet<NodeId>) -> Vec<NodeId> {
        let mut roots: Vec<NodeId> = allowed
            .iter()
            .copied()
            .filter(|&node_id| {
                self.contains_node(node_id)
                    && !self.incoming_edges(node_id).any(|edge| {
                        edge.edge_type == EdgeType::Blocking && allowed.contains(&edge.source)
                    })
            })
            .collect();
        roots.sort();
        roots
    }

    fn is_cyclic(
        nodes: impl Iterator<Item = NodeId>,
        edges: impl Iterator<Item = (NodeId, NodeId)>,
    ) -> bool {
        let mut digraph: DiGraph<NodeId, ()> = DiGraph::new();
        let mut indices = HashMap::new();
        for node_id in nodes {
            indices.insert(node_id, digraph.add_node(node_id));
        }
        for (source, target) in edges {
            if let (Some(&s), Some(&t)) = (indices.get(&source), indices.get(&target)) {
                digraph.add_edge(s, t, ());
            }
        }
        is_cyclic_directed(&digraph)
    }

    fn unindex(&mut self, edge: &Edge) {
        if let Some(out) = self.outgoing.get_mut(&edge.source) {
            out.retain(|id| *id != edge.id);
        }
        if let Some(inc) = self.incoming.get_mut(&edge.target) {
            inc.retain(|id| *id != edge.id);
        }
    }
}
