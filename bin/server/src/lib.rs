//! Server library for the shellflow engine.
//!
//! The surface is deliberately thin: every state-changing request enqueues
//! a mutation on the workspace's queue and awaits its apply-latch; reads go
//! through worker-acknowledged checkpoint records. The realtime channel
//! fans the engine's event stream out to WebSocket clients.

pub mod config;
pub mod error;
pub mod routes;
pub mod ws;

use shellflow_engine::WorkspaceRegistry;
use std::sync::Arc;

/// Shared state injected into every handler.
#[derive(Clone)]
pub struct AppState {
    /// The process-wide workspace registry.
    pub registry: Arc<WorkspaceRegistry>,
    /// Server configuration.
    pub config: Arc<config::ServerConfig>,
}
