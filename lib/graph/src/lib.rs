//! Pipeline graph model for the shellflow engine.
//!
//! This crate provides the data layer the scheduling engine operates on:
//!
//! - **Graph Model**: nodes carrying shell commands, directed dependency
//!   edges with blocking/non-blocking semantics and a readiness latch
//! - **Graph Store**: an id-keyed arena with adjacency indexes, induced
//!   subgraph queries and blocking-cycle detection
//! - **Storage Driver**: node-link JSON persistence with atomic replacement
//! - **Wrapper Contract**: the shell-quoting substitution offered to runners

pub mod edge;
pub mod error;
pub mod graph;
pub mod node;
pub mod storage;
pub mod wrapper;

pub use edge::{Edge, EdgeStatus, EdgeType};
pub use error::{GraphError, StorageError};
pub use graph::PipelineGraph;
pub use node::{Node, NodeStatus};
pub use storage::{FileStorage, GraphStorage, NodeLinkGraph};
