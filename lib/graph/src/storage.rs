//! Graph persistence.
//!
//! The on-disk format is node-link JSON: a top-level object with `wrapper`,
//! `nodes` and `edges`. Writes go to a temporary sibling file followed by a
//! rename over the target, the sole crash-safety mechanism; no file locking
//! is needed because the workspace worker is the only writer.

use crate::edge::Edge;
use crate::error::StorageError;
use crate::graph::PipelineGraph;
use crate::node::Node;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// The node-link wire form of a graph, shared by the file format and the
/// `get-graph` snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeLinkGraph {
    /// Graph-level wrapper template.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wrapper: Option<String>,
    /// All nodes.
    #[serde(default)]
    pub nodes: Vec<Node>,
    /// All edges.
    #[serde(default)]
    pub edges: Vec<Edge>,
}

impl NodeLinkGraph {
    /// Captures a graph into its wire form. Nodes and edges are sorted by
    /// id so snapshots are deterministic.
    #[must_use]
    pub fn capture(graph: &PipelineGraph) -> Self {
        let mut nodes: Vec<Node> = graph.nodes().cloned().collect();
        nodes.sort_by_key(|node| node.id);
        let mut edges: Vec<Edge> = graph.edges().cloned().collect();
        edges.sort_by_key(|edge| edge.id);
        Self {
            wrapper: graph.wrapper().map(str::to_owned),
            nodes,
            edges,
        }
    }

    /// Rebuilds a graph from its wire form. Edges whose endpoints are
    /// missing from the node list are dropped.
    #[must_use]
    pub fn restore(self) -> PipelineGraph {
        let mut graph = PipelineGraph::new();
        graph.set_wrapper(self.wrapper);
        for node in self.nodes {
            // Duplicate ids in a hand-edited file: first occurrence wins.
            let _ = graph.add_node(node);
        }
        for edge in self.edges {
            let _ = graph.add_edge(edge);
        }
        graph
    }
}

/// Persistence seam for the workspace worker.
///
/// The worker is the only caller; implementations do not need interior
/// locking. A separate in-memory implementation backs the engine tests.
pub trait GraphStorage: Send + Sync {
    /// Loads the graph stored at `path`. A missing file is the empty graph.
    fn load(&self, path: &Path) -> Result<PipelineGraph, StorageError>;

    /// Persists `graph` to `path` atomically.
    fn save(&self, graph: &PipelineGraph, path: &Path) -> Result<(), StorageError>;
}

/// File-backed storage with write-temp + rename replacement.
#[derive(Debug, Default, Clone)]
pub struct FileStorage;

impl FileStorage {
    /// Creates the file storage driver.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn temp_path(path: &Path) -> PathBuf {
        let mut name = path.file_name().map_or_else(
            || std::ffi::OsString::from("graph"),
            std::ffi::OsStr::to_os_string,
        );
        name.push(".tmp");
        path.with_file_name(name)
    }
}

impl GraphStorage for FileStorage {
    fn load(&self, path: &Path) -> Result<PipelineGraph, StorageError> {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(PipelineGraph::new());
            }
            Err(err) => {
                return Err(StorageError::Io {
                    path: path.to_path_buf(),
                    source: err,
                });
            }
        };

        let wire: NodeLinkGraph =
            serde_json::from_slice(&bytes).map_err(|err| StorageError::Decode {
                path: path.to_path_buf(),
                source: err,
            })?;
        Ok(wire.restore())
    }

    fn save(&self, graph: &PipelineGraph, path: &Path) -> Result<(), StorageError> {
        let wire = NodeLinkGraph::capture(graph);
        let bytes = serde_json::to_vec_pretty(&wire)
            .map_err(|err| StorageError::Encode { source: err })?;

        let temp = Self::temp_path(path);
        fs::write(&temp, &bytes).map_err(|err| StorageError::Io {
            path: temp.clone(),
            source: err,
        })?;
        fs::rename(&temp, path).map_err(|err| StorageError::Io {
            path: path.to_path_buf(),
            source: err,
        })
    }
}
