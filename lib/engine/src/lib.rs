//! Scheduling engine for shellflow workspaces.
//!
//! Each workspace owns a graph, a modification queue, and a single-threaded
//! graph worker that is the sole mutator. The pieces, leaves first:
//!
//! - **Events**: typed domain events with per-workspace sequence numbers
//! - **Bus**: synchronous pub/sub plus the rotating JSON-lines event log
//! - **Mutations**: the tagged records flowing through the queue, each with
//!   an origin tag and an optional apply-latch
//! - **Scheduler**: the node/edge status state machine and readiness rules
//! - **Run controller**: selection, subset bookkeeping, completion sweep
//! - **Worker**: the queue consumer tying the above together
//! - **Workspaces**: the per-process registry and idle lifecycle

pub mod bus;
pub mod error;
pub mod event;
pub mod mutation;
pub mod run;
pub mod scheduler;
pub mod worker;
pub mod workspace;

pub use bus::{EventBus, EventLog};
pub use error::EngineError;
pub use event::{Event, EventKind, GraphUpdate};
pub use mutation::{EdgeSelector, Mutation, MutationRecord, Origin, Outcome};
pub use run::{RunHandle, RunTable};
pub use worker::GraphWorker;
pub use workspace::{WorkspaceHandle, WorkspaceRegistry};
