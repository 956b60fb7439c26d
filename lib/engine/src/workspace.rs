//! Workspace contexts and their lifecycle.
//!
//! A workspace context is created on first client connect and owns the
//! queue sender, the realtime broadcast channel, and the client count; the
//! graph itself lives inside the worker task. The registry is the only
//! shared map in the process, keyed by workspace id.
//!
//! Idle lifecycle: when the client count reaches zero a grace timer starts;
//! on expiry the worker is asked to tear down, which it only does when no
//! run is active.

use crate::bus::{EventBus, EventLog};
use crate::error::EngineError;
use crate::event::Event;
use crate::mutation::{Mutation, MutationRecord, Origin, Outcome};
use crate::worker::GraphWorker;
use shellflow_core::WorkspaceId;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, mpsc};

/// Capacity of the per-workspace realtime broadcast channel.
const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Handle to a live workspace context.
pub struct WorkspaceHandle {
    id: WorkspaceId,
    path: PathBuf,
    tx: mpsc::UnboundedSender<MutationRecord>,
    events: broadcast::Sender<Event>,
    clients: AtomicUsize,
}

impl WorkspaceHandle {
    /// The workspace id.
    #[must_use]
    pub fn id(&self) -> &WorkspaceId {
        &self.id
    }

    /// The graph-file path backing this workspace.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current connected-client count.
    #[must_use]
    pub fn client_count(&self) -> usize {
        self.clients.load(Ordering::SeqCst)
    }

    /// Subscribes to this workspace's event stream.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }

    /// Enqueues a mutation and awaits its apply-latch.
    ///
    /// # Errors
    ///
    /// Returns the worker's result, or `WorkerUnavailable` when the worker
    /// has shut down.
    pub async fn apply(&self, mutation: Mutation, origin: Origin) -> Result<Outcome, EngineError> {
        let (record, latch) = MutationRecord::new(mutation, origin);
        self.tx
            .send(record)
            .map_err(|_| EngineError::WorkerUnavailable)?;
        latch.await.map_err(|_| EngineError::WorkerUnavailable)?
    }

    /// Enqueues a mutation nobody waits on.
    ///
    /// # Errors
    ///
    /// Returns `WorkerUnavailable` when the worker has shut down.
    pub fn enqueue(&self, mutation: Mutation, origin: Origin) -> Result<(), EngineError> {
        self.tx
            .send(MutationRecord::fire_and_forget(mutation, origin))
            .map_err(|_| EngineError::WorkerUnavailable)
    }

    fn connect_client(&self) -> usize {
        self.clients.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn disconnect_client(&self) -> usize {
        let mut current = self.clients.load(Ordering::SeqCst);
        loop {
            let next = current.saturating_sub(1);
            match self
                .clients
                .compare_exchange(current, next, Ordering::SeqCst, Ordering::SeqCst)
            {
                Ok(_) => return next,
                Err(actual) => current = actual,
            }
        }
    }
}

/// The process-wide registry of workspace contexts.
pub struct WorkspaceRegistry {
    workspaces: Mutex<HashMap<WorkspaceId, Arc<WorkspaceHandle>>>,
    storage: Arc<dyn shellflow_graph::GraphStorage>,
    log: Option<Arc<Mutex<EventLog>>>,
    grace_period: Duration,
    last_activity: Mutex<Instant>,
}

impl WorkspaceRegistry {
    /// Creates a registry over a storage driver and an optional shared
    /// event log.
    #[must_use]
    pub fn new(
        storage: Arc<dyn shellflow_graph::GraphStorage>,
        log: Option<Arc<Mutex<EventLog>>>,
        grace_period: Duration,
    ) -> Self {
        Self {
            workspaces: Mutex::new(HashMap::new()),
            storage,
            log,
            grace_period,
            last_activity: Mutex::new(Instant::now()),
        }
    }

    /// Looks up a live workspace.
    #[must_use]
    pub fn get(&self, id: &WorkspaceId) -> Option<Arc<WorkspaceHandle>> {
        self.workspaces
            .lock()
            .ok()
            .and_then(|map| map.get(id).cloned())
    }

    /// Number of live workspace contexts.
    #[must_use]
    pub fn workspace_count(&self) -> usize {
        self.workspaces.lock().map_or(0, |map| map.len())
    }

    /// Time of the last connect/disconnect, for the idle-exit sweep.
    #[must_use]
    pub fn last_activity(&self) -> Instant {
        self.last_activity
            .lock()
            .map_or_else(|_| Instant::now(), |at| *at)
    }

    /// Connects a client to the workspace for `path`, creating the context
    /// if absent. A connect also acknowledges (clears) a storage-failure
    /// suspension.
    ///
    /// # Errors
    ///
    /// Returns a storage error when the graph file cannot be loaded.
    pub fn connect(&self, path: &Path) -> Result<Arc<WorkspaceHandle>, EngineError> {
        let id = WorkspaceId::from_path(path);
        self.touch();

        let handle = {
            let mut map = self
                .workspaces
                .lock()
                .map_err(|_| EngineError::Internal {
                    reason: "workspace registry poisoned".to_string(),
                })?;
            if let Some(existing) = map.get(&id) {
                existing.clone()
            } else {
                let handle = self.spawn_workspace(id.clone(), path)?;
                map.insert(id.clone(), handle.clone());
                handle
            }
        };

        let clients = handle.connect_client();
        handle.enqueue(Mutation::Acknowledge, Origin::Engine)?;
        tracing::info!(workspace_id = %id, clients, "client connected");
        Ok(handle)
    }

    /// Disconnects a client; at zero clients the idle grace timer starts.
    ///
    /// # Errors
    ///
    /// Returns `WorkspaceNotFound` when no context exists for the id.
    pub fn disconnect(self: &Arc<Self>, id: &WorkspaceId) -> Result<usize, EngineError> {
        let handle = self.get(id).ok_or_else(|| EngineError::WorkspaceNotFound {
            workspace_id: id.clone(),
        })?;
        self.touch();

        let remaining = handle.disconnect_client();
        tracing::info!(workspace_id = %id, clients = remaining, "client disconnected");
        if remaining == 0 {
            let registry = Arc::clone(self);
            let workspace_id = id.clone();
            tokio::spawn(async move {
                registry.idle_sweep(workspace_id).await;
            });
        }
        Ok(remaining)
    }

    fn spawn_workspace(
        &self,
        id: WorkspaceId,
        path: &Path,
    ) -> Result<Arc<WorkspaceHandle>, EngineError> {
        let graph = self.storage.load(path)?;
        let (tx, rx) = mpsc::unbounded_channel();
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        let mut bus = EventBus::new(id.clone(), self.log.clone());
        let bridge = event_tx.clone();
        bus.subscribe(Box::new(move |event| {
            // No receivers is fine; clients may join later.
            let _ = bridge.send(event.clone());
        }));

        let worker = GraphWorker::new(
            id.clone(),
            path.to_path_buf(),
            graph,
            bus,
            self.storage.clone(),
            rx,
        );
        tokio::spawn(worker.run());
        tracing::info!(workspace_id = %id, path = %path.display(), "workspace created");

        Ok(Arc::new(WorkspaceHandle {
            id,
            path: path.to_path_buf(),
            tx,
            events: event_tx,
            clients: AtomicUsize::new(0),
        }))
    }

    async fn idle_sweep(self: Arc<Self>, id: WorkspaceId) {
        tokio::time::sleep(self.grace_period).await;
        let Some(handle) = self.get(&id) else {
            return;
        };
        if handle.client_count() > 0 {
            return;
        }
        match handle.apply(Mutation::TeardownIfIdle, Origin::Engine).await {
            Ok(Outcome::TornDown { torn_down: true }) => {
                if let Ok(mut map) = self.workspaces.lock() {
                    map.remove(&id);
                }
                tracing::info!(workspace_id = %id, "idle workspace torn down");
            }
            Ok(_) => {
                tracing::debug!(workspace_id = %id, "teardown deferred; runs still active");
            }
            Err(err) => {
                tracing::warn!(workspace_id = %id, error = %err, "idle teardown failed");
            }
        }
    }

    fn touch(&self) {
        if let Ok(mut at) = self.last_activity.lock() {
            *at = Instant::now();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{EventKind, GraphUpdate};
    use shellflow_core::{NodeId, RunId, RunnerId};
    use shellflow_graph::{
        EdgeType, NodeStatus, PipelineGraph, StorageError, storage::NodeLinkGraph,
    };
    use std::sync::atomic::AtomicUsize;
    use tokio::time::timeout;

    /// In-memory storage driver; can be told to fail upcoming saves.
    struct MemoryStorage {
        saved: Mutex<HashMap<PathBuf, NodeLinkGraph>>,
        fail_saves: AtomicUsize,
    }

    impl MemoryStorage {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                saved: Mutex::new(HashMap::new()),
                fail_saves: AtomicUsize::new(0),
            })
        }

        fn fail_next_saves(&self, count: usize) {
            self.fail_saves.store(count, Ordering::SeqCst);
        }
    }

    impl shellflow_graph::GraphStorage for MemoryStorage {
        fn load(&self, path: &Path) -> Result<PipelineGraph, StorageError> {
            Ok(self
                .saved
                .lock()
                .expect("lock")
                .get(path)
                .cloned()
                .map_or_else(PipelineGraph::new, NodeLinkGraph::restore))
        }

        fn save(&self, graph: &PipelineGraph, path: &Path) -> Result<(), StorageError> {
            let remaining = self.fail_saves.load(Ordering::SeqCst);
            if remaining > 0 {
                self.fail_saves.store(remaining - 1, Ordering::SeqCst);
                return Err(StorageError::Io {
                    path: path.to_path_buf(),
                    source: std::io::Error::other("injected save failure"),
                });
            }
            self.saved
                .lock()
                .expect("lock")
                .insert(path.to_path_buf(), NodeLinkGraph::capture(graph));
            Ok(())
        }
    }

    struct Harness {
        registry: Arc<WorkspaceRegistry>,
        storage: Arc<MemoryStorage>,
        handle: Arc<WorkspaceHandle>,
        runner: RunnerId,
    }

    impl Harness {
        fn new(path: &str) -> Self {
            Self::with_grace(path, Duration::from_secs(30))
        }

        fn with_grace(path: &str, grace: Duration) -> Self {
            let storage = MemoryStorage::new();
            let registry = Arc::new(WorkspaceRegistry::new(storage.clone(), None, grace));
            let handle = registry.connect(Path::new(path)).expect("connect");
            Self {
                registry,
                storage,
                handle,
                runner: RunnerId::new(),
            }
        }

        async fn add_node(&self, label: &str) -> NodeId {
            let outcome = self
                .handle
                .apply(
                    Mutation::AddNode {
                        label: label.to_string(),
                        x: "0".to_string(),
                        y: "0".to_string(),
                    },
                    Origin::Engine,
                )
                .await
                .expect("add node");
            match outcome {
                Outcome::NodeCreated { node_id } => node_id,
                other => panic!("expected NodeCreated, got {other:?}"),
            }
        }

        async fn add_edge(&self, source: NodeId, target: NodeId, edge_type: EdgeType) {
            self.handle
                .apply(
                    Mutation::AddEdge {
                        source,
                        target,
                        edge_type,
                    },
                    Origin::Engine,
                )
                .await
                .expect("add edge");
        }

        async fn start_run(&self, nodes: Option<Vec<NodeId>>) -> RunId {
            let outcome = self
                .handle
                .apply(
                    Mutation::StartRun {
                        nodes,
                        wrapper: None,
                    },
                    Origin::Engine,
                )
                .await
                .expect("start run");
            match outcome {
                Outcome::RunStarted { run_id } => run_id,
                other => panic!("expected RunStarted, got {other:?}"),
            }
        }

        /// Simulates a runner executing one ready node.
        async fn run_node(&self, node_id: NodeId, run_id: RunId, succeed: bool) {
            for status in [
                NodeStatus::Running,
                if succeed {
                    NodeStatus::Ran
                } else {
                    NodeStatus::Fail
                },
            ] {
                self.handle
                    .apply(
                        Mutation::EditNodeStatus {
                            node_id,
                            status,
                            run_id: Some(run_id),
                        },
                        Origin::Runner(self.runner),
                    )
                    .await
                    .expect("runner callback");
            }
        }

        async fn snapshot(&self) -> NodeLinkGraph {
            match self
                .handle
                .apply(Mutation::Snapshot, Origin::Engine)
                .await
                .expect("snapshot")
            {
                Outcome::Snapshot { graph } => graph,
                other => panic!("expected Snapshot, got {other:?}"),
            }
        }

        async fn status_of(&self, node_id: NodeId) -> NodeStatus {
            self.snapshot()
                .await
                .nodes
                .iter()
                .find(|node| node.id == node_id)
                .expect("node in snapshot")
                .status
        }
    }

    /// Drains events already published, until `RUN_COMPLETE` for the run.
    async fn collect_until_complete(
        rx: &mut broadcast::Receiver<Event>,
        run_id: RunId,
    ) -> Vec<EventKind> {
        let mut kinds = Vec::new();
        loop {
            let event = timeout(Duration::from_secs(2), rx.recv())
                .await
                .expect("timed out waiting for events")
                .expect("event stream closed");
            let done = event.kind == EventKind::RunComplete { run_id };
            kinds.push(event.kind);
            if done {
                return kinds;
            }
        }
    }

    fn scheduling_only(kinds: &[EventKind]) -> Vec<&EventKind> {
        kinds
            .iter()
            .filter(|kind| {
                !matches!(
                    kind,
                    EventKind::GraphUpdated { .. }
                        | EventKind::GraphRejected { .. }
                        | EventKind::RunRejected { .. }
                )
            })
            .collect()
    }

    fn ready_nodes(kinds: &[EventKind]) -> Vec<NodeId> {
        kinds
            .iter()
            .filter_map(|kind| match kind {
                EventKind::NodeReady { node_id, .. } => Some(*node_id),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn s1_linear_pipeline_completes_in_order() {
        let fx = Harness::new("/graphs/s1.json");
        let a = fx.add_node("echo a").await;
        let b = fx.add_node("echo b").await;
        let c = fx.add_node("echo c").await;
        fx.add_edge(a, b, EdgeType::Blocking).await;
        fx.add_edge(b, c, EdgeType::Blocking).await;

        let mut rx = fx.handle.subscribe();
        let run_id = fx.start_run(None).await;
        fx.run_node(a, run_id, true).await;
        fx.run_node(b, run_id, true).await;
        fx.run_node(c, run_id, true).await;

        let kinds = collect_until_complete(&mut rx, run_id).await;
        let scheduling = scheduling_only(&kinds);

        let expected = [
            EventKind::NodeReady {
                node_id: a,
                label: "echo a".to_string(),
                wrapper: None,
                run_id,
            },
            EventKind::NodeStarted { node_id: a, run_id },
            EventKind::NodeFinished { node_id: a, run_id },
            EventKind::NodeReady {
                node_id: b,
                label: "echo b".to_string(),
                wrapper: None,
                run_id,
            },
            EventKind::NodeStarted { node_id: b, run_id },
            EventKind::NodeFinished { node_id: b, run_id },
            EventKind::NodeReady {
                node_id: c,
                label: "echo c".to_string(),
                wrapper: None,
                run_id,
            },
            EventKind::NodeStarted { node_id: c, run_id },
            EventKind::NodeFinished { node_id: c, run_id },
            EventKind::RunComplete { run_id },
        ];
        assert_eq!(scheduling.len(), expected.len());
        for (actual, expected) in scheduling.iter().zip(expected.iter()) {
            assert_eq!(*actual, expected);
        }

        for node_id in [a, b, c] {
            assert_eq!(fx.status_of(node_id).await, NodeStatus::Ran);
        }
    }

    #[tokio::test]
    async fn s2_failure_isolates_one_branch() {
        let fx = Harness::new("/graphs/s2.json");
        let a = fx.add_node("a").await;
        let b = fx.add_node("b").await;
        let c = fx.add_node("c").await;
        let d = fx.add_node("d").await;
        fx.add_edge(a, b, EdgeType::Blocking).await;
        fx.add_edge(a, c, EdgeType::Blocking).await;
        fx.add_edge(c, d, EdgeType::Blocking).await;

        let mut rx = fx.handle.subscribe();
        let run_id = fx.start_run(None).await;
        fx.run_node(a, run_id, true).await;
        fx.run_node(b, run_id, true).await;
        fx.run_node(c, run_id, false).await;

        let kinds = collect_until_complete(&mut rx, run_id).await;
        let ready = ready_nodes(&kinds);
        assert!(ready.contains(&b));
        assert!(ready.contains(&c));
        assert!(!ready.contains(&d), "d must never become ready");
        assert_eq!(
            kinds
                .iter()
                .filter(|kind| matches!(kind, EventKind::RunComplete { .. }))
                .count(),
            1
        );

        assert_eq!(fx.status_of(a).await, NodeStatus::Ran);
        assert_eq!(fx.status_of(b).await, NodeStatus::Ran);
        assert_eq!(fx.status_of(c).await, NodeStatus::Fail);
        assert_eq!(fx.status_of(d).await, NodeStatus::Idle);
    }

    #[tokio::test]
    async fn s3_empty_selection_resumes_failed_nodes_only() {
        let fx = Harness::new("/graphs/s3.json");
        let a = fx.add_node("a").await;
        let b = fx.add_node("b").await;
        let c = fx.add_node("c").await;
        let d = fx.add_node("d").await;
        fx.add_edge(a, b, EdgeType::Blocking).await;
        fx.add_edge(a, c, EdgeType::Blocking).await;
        fx.add_edge(c, d, EdgeType::Blocking).await;

        let run_id = fx.start_run(None).await;
        fx.run_node(a, run_id, true).await;
        fx.run_node(b, run_id, true).await;
        fx.run_node(c, run_id, false).await;

        // Resume: empty selection picks exactly the failed set.
        let mut rx = fx.handle.subscribe();
        let resume_id = fx.start_run(None).await;
        fx.run_node(c, resume_id, true).await;

        let kinds = collect_until_complete(&mut rx, resume_id).await;
        assert_eq!(ready_nodes(&kinds), vec![c]);
        assert_eq!(fx.status_of(c).await, NodeStatus::Ran);
        // Propagation is confined to the resumed set.
        assert_eq!(fx.status_of(d).await, NodeStatus::Idle);
    }

    #[tokio::test]
    async fn s6_blocking_cycle_rejected_with_event() {
        let fx = Harness::new("/graphs/s6.json");
        let a = fx.add_node("a").await;
        let b = fx.add_node("b").await;
        fx.add_edge(a, b, EdgeType::NonBlocking).await;
        fx.add_edge(b, a, EdgeType::NonBlocking).await;
        // Close the cycle in the blocking subgraph directly.
        fx.handle
            .apply(
                Mutation::EditEdgeType {
                    source: a,
                    target: b,
                    edge_type: EdgeType::Blocking,
                },
                Origin::Engine,
            )
            .await
            .expect("edge a->b becomes blocking");

        let mut rx = fx.handle.subscribe();
        let result = fx
            .handle
            .apply(
                Mutation::EditEdgeType {
                    source: b,
                    target: a,
                    edge_type: EdgeType::Blocking,
                },
                Origin::Engine,
            )
            .await;
        assert!(matches!(
            result,
            Err(EngineError::Graph(
                shellflow_graph::GraphError::BlockingCycle { .. }
            ))
        ));
        let event = timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("event")
            .expect("stream open");
        assert!(matches!(event.kind, EventKind::GraphRejected { .. }));
        assert_eq!(fx.status_of(a).await, NodeStatus::Idle);
        assert_eq!(fx.status_of(b).await, NodeStatus::Idle);
    }

    #[tokio::test]
    async fn run_rejection_emits_event_and_changes_nothing() {
        let fx = Harness::new("/graphs/reject.json");
        let mut rx = fx.handle.subscribe();

        let result = fx
            .handle
            .apply(
                Mutation::StartRun {
                    nodes: None,
                    wrapper: None,
                },
                Origin::Engine,
            )
            .await;
        assert!(matches!(result, Err(EngineError::RunRejected { .. })));

        let event = timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("event")
            .expect("stream open");
        assert!(matches!(event.kind, EventKind::RunRejected { .. }));
    }

    #[tokio::test]
    async fn callback_for_completed_run_is_discarded() {
        let fx = Harness::new("/graphs/stale.json");
        let a = fx.add_node("a").await;

        let run_id = fx.start_run(None).await;
        fx.run_node(a, run_id, true).await;

        // The run has completed; a late duplicate callback is a no-op.
        let outcome = fx
            .handle
            .apply(
                Mutation::EditNodeStatus {
                    node_id: a,
                    status: NodeStatus::Fail,
                    run_id: Some(run_id),
                },
                Origin::Runner(fx.runner),
            )
            .await
            .expect("discarded");
        assert!(matches!(outcome, Outcome::Applied));
        assert_eq!(fx.status_of(a).await, NodeStatus::Ran);
    }

    #[tokio::test]
    async fn events_are_sequenced_in_queue_order() {
        let fx = Harness::new("/graphs/seq.json");
        let mut rx = fx.handle.subscribe();

        let a = fx.add_node("a").await;
        let run_id = fx.start_run(None).await;
        fx.run_node(a, run_id, true).await;

        let kinds_with_seq: Vec<(u64, EventKind)> = {
            let mut out = Vec::new();
            loop {
                let event = timeout(Duration::from_secs(2), rx.recv())
                    .await
                    .expect("event")
                    .expect("stream open");
                let done = event.kind == EventKind::RunComplete { run_id };
                out.push((event.seq, event.kind));
                if done {
                    break;
                }
            }
            out
        };

        for window in kinds_with_seq.windows(2) {
            assert!(window[1].0 > window[0].0, "sequence numbers must increase");
        }
    }

    #[tokio::test]
    async fn persistent_save_failure_suspends_until_reconnect() {
        let fx = Harness::new("/graphs/suspend.json");
        fx.add_node("a").await;

        // Both the save and its retry fail.
        fx.storage.fail_next_saves(2);
        let result = fx
            .handle
            .apply(
                Mutation::AddNode {
                    label: "b".to_string(),
                    x: "0".to_string(),
                    y: "0".to_string(),
                },
                Origin::Engine,
            )
            .await;
        assert!(matches!(result, Err(EngineError::Storage(_))));

        // Further mutations are refused while suspended.
        let result = fx
            .handle
            .apply(
                Mutation::AddNode {
                    label: "c".to_string(),
                    x: "0".to_string(),
                    y: "0".to_string(),
                },
                Origin::Engine,
            )
            .await;
        assert!(matches!(result, Err(EngineError::Suspended)));

        // A client connect acknowledges and lifts the suspension.
        fx.registry
            .connect(Path::new("/graphs/suspend.json"))
            .expect("reconnect");
        fx.add_node("d").await;
    }

    #[tokio::test]
    async fn snapshot_reflects_worker_checkpoint() {
        let fx = Harness::new("/graphs/snapshot.json");
        let a = fx.add_node("echo hi").await;

        let snapshot = fx.snapshot().await;
        assert_eq!(snapshot.nodes.len(), 1);
        assert_eq!(snapshot.nodes[0].id, a);

        // The storage driver saw the same state.
        let saved = fx
            .storage
            .saved
            .lock()
            .expect("lock")
            .get(Path::new("/graphs/snapshot.json"))
            .cloned()
            .expect("saved graph");
        assert_eq!(saved.nodes.len(), 1);
    }

    #[tokio::test]
    async fn idle_workspace_tears_down_after_grace_period() {
        let fx = Harness::with_grace("/graphs/idle.json", Duration::from_millis(50));
        assert_eq!(fx.registry.workspace_count(), 1);

        let id = fx.handle.id().clone();
        fx.registry.disconnect(&id).expect("disconnect");

        timeout(Duration::from_secs(2), async {
            while fx.registry.workspace_count() > 0 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("workspace should tear down");
    }

    #[tokio::test]
    async fn active_run_defers_idle_teardown() {
        let fx = Harness::with_grace("/graphs/busy.json", Duration::from_millis(50));
        let a = fx.add_node("a").await;
        let run_id = fx.start_run(None).await;

        let id = fx.handle.id().clone();
        fx.registry.disconnect(&id).expect("disconnect");
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(
            fx.registry.workspace_count(),
            1,
            "teardown must wait for the active run"
        );

        // Finish the run; the workspace stays (no new disconnect), but a
        // fresh disconnect cycle can now tear it down.
        fx.run_node(a, run_id, true).await;
        fx.registry
            .connect(Path::new("/graphs/busy.json"))
            .expect("reconnect");
        fx.registry.disconnect(&id).expect("disconnect again");
        timeout(Duration::from_secs(2), async {
            while fx.registry.workspace_count() > 0 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("workspace should tear down once idle");
    }

    #[tokio::test]
    async fn node_log_round_trips_through_queue() {
        let fx = Harness::new("/graphs/log.json");
        let a = fx.add_node("a").await;

        fx.handle
            .apply(
                Mutation::SaveNodeLog {
                    node_id: a,
                    log: "line 1\nline 2\n".to_string(),
                },
                Origin::Runner(fx.runner),
            )
            .await
            .expect("save log");

        let outcome = fx
            .handle
            .apply(Mutation::ReadNodeLog { node_id: a }, Origin::Engine)
            .await
            .expect("read log");
        match outcome {
            Outcome::NodeLog { log } => assert_eq!(log, "line 1\nline 2\n"),
            other => panic!("expected NodeLog, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn status_delta_updates_are_emitted_for_explicit_edits() {
        let fx = Harness::new("/graphs/delta.json");
        let a = fx.add_node("a").await;
        let run_id = fx.start_run(None).await;

        let mut rx = fx.handle.subscribe();
        fx.handle
            .apply(
                Mutation::EditNodeStatus {
                    node_id: a,
                    status: NodeStatus::Idle,
                    run_id: None,
                },
                Origin::Engine,
            )
            .await
            .expect("clear");

        let event = timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("event")
            .expect("stream open");
        assert_eq!(
            event.kind,
            EventKind::GraphUpdated {
                update: GraphUpdate::NodeStatus {
                    node_id: a,
                    status: NodeStatus::Idle,
                },
            }
        );
        // Clearing the only active node completes the run on the next sweep.
        let event = timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("event")
            .expect("stream open");
        assert_eq!(event.kind, EventKind::RunComplete { run_id });
    }
}
