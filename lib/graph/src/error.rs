//! Error types for the graph crate.
//!
//! - `GraphError`: structural graph operations (nodes, edges)
//! - `StorageError`: the persistence driver

use shellflow_core::{EdgeId, NodeId};
use std::fmt;

/// Errors from graph store operations.
#[derive(Debug)]
pub enum GraphError {
    /// Node with the given ID was not found in the graph.
    NodeNotFound { node_id: NodeId },
    /// Edge with the given ID was not found in the graph.
    EdgeNotFound { edge_id: EdgeId },
    /// No edge connects the given endpoints.
    EdgeBetweenNotFound { source: NodeId, target: NodeId },
    /// A node with this ID already exists.
    DuplicateNode { node_id: NodeId },
    /// An edge with this ID already exists.
    DuplicateEdge { edge_id: EdgeId },
    /// The mutation would close a cycle in the blocking subgraph.
    BlockingCycle { source: NodeId, target: NodeId },
}

impl fmt::Display for GraphError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NodeNotFound { node_id } => write!(f, "node not found: {node_id}"),
            Self::EdgeNotFound { edge_id } => write!(f, "edge not found: {edge_id}"),
            Self::EdgeBetweenNotFound { source, target } => {
                write!(f, "no edge from {source} to {target}")
            }
            Self::DuplicateNode { node_id } => write!(f, "node already exists: {node_id}"),
            Self::DuplicateEdge { edge_id } => write!(f, "edge already exists: {edge_id}"),
            Self::BlockingCycle { source, target } => {
                write!(f, "blocking edge {source} -> {target} would close a cycle")
            }
        }
    }
}

impl std::error::Error for GraphError {}

/// Errors from the storage driver.
#[derive(Debug)]
pub enum StorageError {
    /// Filesystem operation failed.
    Io {
        path: std::path::PathBuf,
        source: std::io::Error,
    },
    /// The graph file could not be decoded.
    Decode {
        path: std::path::PathBuf,
        source: serde_json::Error,
    },
    /// The graph could not be encoded for writing.
    Encode { source: serde_json::Error },
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "storage i/o failed for {}: {source}", path.display())
            }
            Self::Decode { path, source } => {
                write!(f, "failed to decode graph file {}: {source}", path.display())
            }
            Self::Encode { source } => write!(f, "failed to encode graph: {source}"),
        }
    }
}

impl std::error::Error for StorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Decode { source, .. } | Self::Encode { source } => Some(source),
        }
    }
}
