//! Core domain types for the shellflow workflow engine.
//!
//! This crate provides the strongly-typed identifiers shared by the graph
//! model, the scheduling engine, and the server surface.

pub mod id;

pub use id::{ClientId, EdgeId, NodeId, ParseIdError, RunId, RunnerId, WorkspaceId};
