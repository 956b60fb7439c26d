//! Workspace-scoped HTTP API.
//!
//! Every state-changing handler enqueues a mutation and synchronously
//! awaits its apply-latch with the configured timeout; reads go through
//! `Snapshot`/`ReadNodeLog` queue records so they observe a
//! worker-acknowledged checkpoint.

use crate::AppState;
use crate::error::ApiError;
use axum::extract::{Path as UrlPath, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use shellflow_core::{ClientId, EdgeId, NodeId, RunId, RunnerId, WorkspaceId};
use shellflow_engine::{EdgeSelector, Mutation, Origin, Outcome, WorkspaceHandle};
use shellflow_graph::{EdgeStatus, EdgeType, NodeStatus, storage::NodeLinkGraph};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;

/// Builds the full application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/workspace/{workspace_id}/get-graph", get(get_graph))
        .route("/workspace/{workspace_id}/get-node-log/{id}", get(get_node_log))
        .route("/workspace/{workspace_id}/add-node", post(add_node))
        .route("/workspace/{workspace_id}/remove-node", post(remove_node))
        .route("/workspace/{workspace_id}/add-edge", post(add_edge))
        .route("/workspace/{workspace_id}/remove-edge", post(remove_edge))
        .route("/workspace/{workspace_id}/edit-edge-type", post(edit_edge_type))
        .route("/workspace/{workspace_id}/edit-status", post(edit_status))
        .route(
            "/workspace/{workspace_id}/edit-node-position",
            post(edit_node_position),
        )
        .route(
            "/workspace/{workspace_id}/edit-node-label",
            post(edit_node_label),
        )
        .route("/workspace/{workspace_id}/edit-wrapper", post(edit_wrapper))
        .route("/workspace/{workspace_id}/save-node-log", post(save_node_log))
        .route("/workspace/{workspace_id}/run", post(run_pipeline))
        .route("/workspace/{workspace_id}/client-connect", post(client_connect))
        .route(
            "/workspace/{workspace_id}/client-disconnect",
            post(client_disconnect),
        )
        .route("/ws", get(crate::ws::ws_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn lookup(state: &AppState, workspace_id: &str) -> Result<Arc<WorkspaceHandle>, ApiError> {
    let id: WorkspaceId = workspace_id
        .parse()
        .map_err(|_| ApiError::WorkspaceNotFound {
            workspace_id: workspace_id.to_string(),
        })?;
    state
        .registry
        .get(&id)
        .ok_or_else(|| ApiError::WorkspaceNotFound {
            workspace_id: workspace_id.to_string(),
        })
}

async fn apply(
    state: &AppState,
    handle: &WorkspaceHandle,
    mutation: Mutation,
    origin: Origin,
) -> Result<Outcome, ApiError> {
    let limit = Duration::from_millis(state.config.engine.apply_timeout_ms);
    match tokio::time::timeout(limit, handle.apply(mutation, origin)).await {
        Ok(result) => result.map_err(ApiError::from),
        Err(_) => Err(ApiError::Timeout),
    }
}

fn client_origin(client_id: Option<ClientId>) -> Origin {
    Origin::Client(client_id.unwrap_or_default())
}

fn parse_node_id(raw: &str) -> Result<NodeId, ApiError> {
    raw.parse().map_err(ApiError::bad_request)
}

fn parse_run_id(raw: Option<&str>) -> Result<Option<RunId>, ApiError> {
    raw.map(str::parse).transpose().map_err(ApiError::bad_request)
}

fn parse_edge_type(raw: Option<&str>) -> Result<EdgeType, ApiError> {
    match raw {
        None => Ok(EdgeType::Blocking),
        Some(raw) => raw.parse().map_err(ApiError::bad_request),
    }
}

/// Plain acknowledgement body for mutations without a richer response.
#[derive(Debug, Serialize)]
struct Ack {
    ok: bool,
}

const ACK: Ack = Ack { ok: true };

async fn get_graph(
    State(state): State<AppState>,
    UrlPath(workspace_id): UrlPath<String>,
) -> Result<Json<NodeLinkGraph>, ApiError> {
    let handle = lookup(&state, &workspace_id)?;
    match apply(&state, &handle, Mutation::Snapshot, Origin::Engine).await? {
        Outcome::Snapshot { graph } => Ok(Json(graph)),
        _ => Err(ApiError::Engine(shellflow_engine::EngineError::Internal {
            reason: "unexpected snapshot outcome".to_string(),
        })),
    }
}

#[derive(Debug, Serialize)]
struct NodeLogResponse {
    log: String,
}

async fn get_node_log(
    State(state): State<AppState>,
    UrlPath((workspace_id, id)): UrlPath<(String, String)>,
) -> Result<Json<NodeLogResponse>, ApiError> {
    let handle = lookup(&state, &workspace_id)?;
    let node_id = parse_node_id(&id)?;
    match apply(
        &state,
        &handle,
        Mutation::ReadNodeLog { node_id },
        Origin::Engine,
    )
    .await?
    {
        Outcome::NodeLog { log } => Ok(Json(NodeLogResponse { log })),
        _ => Err(ApiError::Engine(shellflow_engine::EngineError::Internal {
            reason: "unexpected node log outcome".to_string(),
        })),
    }
}

#[derive(Debug, Deserialize)]
struct AddNodeRequest {
    label: String,
    #[serde(default)]
    x: String,
    #[serde(default)]
    y: String,
    client_id: Option<ClientId>,
}

#[derive(Debug, Serialize)]
struct AddNodeResponse {
    node_id: NodeId,
}

async fn add_node(
    State(state): State<AppState>,
    UrlPath(workspace_id): UrlPath<String>,
    Json(req): Json<AddNodeRequest>,
) -> Result<Json<AddNodeResponse>, ApiError> {
    let handle = lookup(&state, &workspace_id)?;
    let outcome = apply(
        &state,
        &handle,
        Mutation::AddNode {
            label: req.label,
            x: req.x,
            y: req.y,
        },
        client_origin(req.client_id),
    )
    .await?;
    match outcome {
        Outcome::NodeCreated { node_id } => Ok(Json(AddNodeResponse { node_id })),
        _ => Err(ApiError::Engine(shellflow_engine::EngineError::Internal {
            reason: "unexpected add-node outcome".to_string(),
        })),
    }
}

#[derive(Debug, Deserialize)]
struct RemoveNodeRequest {
    node_id: String,
    client_id: Option<ClientId>,
}

async fn remove_node(
    State(state): State<AppState>,
    UrlPath(workspace_id): UrlPath<String>,
    Json(req): Json<RemoveNodeRequest>,
) -> Result<Json<Ack>, ApiError> {
    let handle = lookup(&state, &workspace_id)?;
    let node_id = parse_node_id(&req.node_id)?;
    apply(
        &state,
        &handle,
        Mutation::RemoveNode { node_id },
        client_origin(req.client_id),
    )
    .await?;
    Ok(Json(ACK))
}

#[derive(Debug, Deserialize)]
struct AddEdgeRequest {
    source_id: String,
    target_id: String,
    edge_type: Option<String>,
    client_id: Option<ClientId>,
}

async fn add_edge(
    State(state): State<AppState>,
    UrlPath(workspace_id): UrlPath<String>,
    Json(req): Json<AddEdgeRequest>,
) -> Result<Json<Ack>, ApiError> {
    let handle = lookup(&state, &workspace_id)?;
    let source = parse_node_id(&req.source_id)?;
    let target = parse_node_id(&req.target_id)?;
    let edge_type = parse_edge_type(req.edge_type.as_deref())?;
    apply(
        &state,
        &handle,
        Mutation::AddEdge {
            source,
            target,
            edge_type,
        },
        client_origin(req.client_id),
    )
    .await?;
    Ok(Json(ACK))
}

#[derive(Debug, Deserialize)]
struct RemoveEdgeRequest {
    edge_id: Option<String>,
    source_id: Option<String>,
    target_id: Option<String>,
    client_id: Option<ClientId>,
}

async fn remove_edge(
    State(state): State<AppState>,
    UrlPath(workspace_id): UrlPath<String>,
    Json(req): Json<RemoveEdgeRequest>,
) -> Result<Json<Ack>, ApiError> {
    let handle = lookup(&state, &workspace_id)?;
    let selector = match (&req.edge_id, &req.source_id, &req.target_id) {
        (Some(edge_id), _, _) => {
            let edge_id: EdgeId = edge_id.parse().map_err(ApiError::bad_request)?;
            EdgeSelector::ById(edge_id)
        }
        (None, Some(source_id), Some(target_id)) => EdgeSelector::ByEndpoints {
            source: parse_node_id(source_id)?,
            target: parse_node_id(target_id)?,
        },
        _ => {
            return Err(ApiError::bad_request(
                "expected edge_id or source_id + target_id",
            ));
        }
    };
    apply(
        &state,
        &handle,
        Mutation::RemoveEdge { selector },
        client_origin(req.client_id),
    )
    .await?;
    Ok(Json(ACK))
}

#[derive(Debug, Deserialize)]
struct EditEdgeTypeRequest {
    source_id: String,
    target_id: String,
    edge_type: String,
    client_id: Option<ClientId>,
}

async fn edit_edge_type(
    State(state): State<AppState>,
    UrlPath(workspace_id): UrlPath<String>,
    Json(req): Json<EditEdgeTypeRequest>,
) -> Result<Json<Ack>, ApiError> {
    let handle = lookup(&state, &workspace_id)?;
    let source = parse_node_id(&req.source_id)?;
    let target = parse_node_id(&req.target_id)?;
    let edge_type: EdgeType = req.edge_type.parse().map_err(ApiError::bad_request)?;
    apply(
        &state,
        &handle,
        Mutation::EditEdgeType {
            source,
            target,
            edge_type,
        },
        client_origin(req.client_id),
    )
    .await?;
    Ok(Json(ACK))
}

/// Which kind of entity an `edit-status` call targets.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
enum StatusKind {
    Node,
    Edge,
}

#[derive(Debug, Deserialize)]
struct EditStatusRequest {
    kind: StatusKind,
    id: String,
    status: String,
    run_id: Option<String>,
    client_id: Option<ClientId>,
    runner_id: Option<RunnerId>,
}

async fn edit_status(
    State(state): State<AppState>,
    UrlPath(workspace_id): UrlPath<String>,
    Json(req): Json<EditStatusRequest>,
) -> Result<Json<Ack>, ApiError> {
    let handle = lookup(&state, &workspace_id)?;
    let mutation = match req.kind {
        StatusKind::Node => {
            let node_id = parse_node_id(&req.id)?;
            let status: NodeStatus = req.status.parse().map_err(ApiError::bad_request)?;
            let run_id = parse_run_id(req.run_id.as_deref())?;
            Mutation::EditNodeStatus {
                node_id,
                status,
                run_id,
            }
        }
        StatusKind::Edge => {
            let edge_id: EdgeId = req.id.parse().map_err(ApiError::bad_request)?;
            let status: EdgeStatus = req.status.parse().map_err(ApiError::bad_request)?;
            Mutation::EditEdgeStatus { edge_id, status }
        }
    };
    let origin = match req.runner_id {
        Some(runner_id) => Origin::Runner(runner_id),
        None => client_origin(req.client_id),
    };
    apply(&state, &handle, mutation, origin).await?;
    Ok(Json(ACK))
}

#[derive(Debug, Deserialize)]
struct EditPositionRequest {
    node_id: String,
    x: String,
    y: String,
    client_id: Option<ClientId>,
}

async fn edit_node_position(
    State(state): State<AppState>,
    UrlPath(workspace_id): UrlPath<String>,
    Json(req): Json<EditPositionRequest>,
) -> Result<Json<Ack>, ApiError> {
    let handle = lookup(&state, &workspace_id)?;
    let node_id = parse_node_id(&req.node_id)?;
    apply(
        &state,
        &handle,
        Mutation::EditPosition {
            node_id,
            x: req.x,
            y: req.y,
        },
        client_origin(req.client_id),
    )
    .await?;
    Ok(Json(ACK))
}

#[derive(Debug, Deserialize)]
struct EditLabelRequest {
    node_id: String,
    label: String,
    client_id: Option<ClientId>,
}

async fn edit_node_label(
    State(state): State<AppState>,
    UrlPath(workspace_id): UrlPath<String>,
    Json(req): Json<EditLabelRequest>,
) -> Result<Json<Ack>, ApiError> {
    let handle = lookup(&state, &workspace_id)?;
    let node_id = parse_node_id(&req.node_id)?;
    apply(
        &state,
        &handle,
        Mutation::EditLabel {
            node_id,
            label: req.label,
        },
        client_origin(req.client_id),
    )
    .await?;
    Ok(Json(ACK))
}

#[derive(Debug, Deserialize)]
struct EditWrapperRequest {
    wrapper: Option<String>,
    client_id: Option<ClientId>,
}

async fn edit_wrapper(
    State(state): State<AppState>,
    UrlPath(workspace_id): UrlPath<String>,
    Json(req): Json<EditWrapperRequest>,
) -> Result<Json<Ack>, ApiError> {
    let handle = lookup(&state, &workspace_id)?;
    apply(
        &state,
        &handle,
        Mutation::EditWrapper {
            wrapper: req.wrapper,
        },
        client_origin(req.client_id),
    )
    .await?;
    Ok(Json(ACK))
}

#[derive(Debug, Deserialize)]
struct SaveNodeLogRequest {
    node_id: String,
    log: String,
    runner_id: Option<RunnerId>,
}

async fn save_node_log(
    State(state): State<AppState>,
    UrlPath(workspace_id): UrlPath<String>,
    Json(req): Json<SaveNodeLogRequest>,
) -> Result<Json<Ack>, ApiError> {
    let handle = lookup(&state, &workspace_id)?;
    let node_id = parse_node_id(&req.node_id)?;
    let origin = match req.runner_id {
        Some(runner_id) => Origin::Runner(runner_id),
        None => Origin::Client(ClientId::new()),
    };
    apply(
        &state,
        &handle,
        Mutation::SaveNodeLog {
            node_id,
            log: req.log,
        },
        origin,
    )
    .await?;
    Ok(Json(ACK))
}

#[derive(Debug, Deserialize)]
struct RunRequest {
    nodes: Option<Vec<String>>,
    wrapper: Option<String>,
    client_id: Option<ClientId>,
}

#[derive(Debug, Serialize)]
struct RunResponse {
    run_id: RunId,
}

async fn run_pipeline(
    State(state): State<AppState>,
    UrlPath(workspace_id): UrlPath<String>,
    Json(req): Json<RunRequest>,
) -> Result<Json<RunResponse>, ApiError> {
    let handle = lookup(&state, &workspace_id)?;
    let nodes = req
        .nodes
        .map(|raw| raw.iter().map(|id| parse_node_id(id)).collect::<Result<Vec<_>, _>>())
        .transpose()?;
    let outcome = apply(
        &state,
        &handle,
        Mutation::StartRun {
            nodes,
            wrapper: req.wrapper,
        },
        client_origin(req.client_id),
    )
    .await?;
    match outcome {
        Outcome::RunStarted { run_id } => Ok(Json(RunResponse { run_id })),
        _ => Err(ApiError::Engine(shellflow_engine::EngineError::Internal {
            reason: "unexpected run outcome".to_string(),
        })),
    }
}

#[derive(Debug, Default, Deserialize)]
struct ConnectRequest {
    path: Option<String>,
}

#[derive(Debug, Serialize)]
struct ConnectResponse {
    workspace_id: WorkspaceId,
    clients: usize,
}

async fn client_connect(
    State(state): State<AppState>,
    UrlPath(workspace_id): UrlPath<String>,
    body: Option<Json<ConnectRequest>>,
) -> Result<Json<ConnectResponse>, ApiError> {
    let id: WorkspaceId = workspace_id
        .parse()
        .map_err(|_| ApiError::bad_request("invalid workspace id"))?;
    let requested = body.and_then(|Json(req)| req.path).map(PathBuf::from);

    if let Some(path) = &requested
        && WorkspaceId::from_path(path) != id
    {
        return Err(ApiError::bad_request(
            "path does not hash to the workspace id",
        ));
    }

    let path = match (state.registry.get(&id), requested) {
        (Some(handle), _) => handle.path().to_path_buf(),
        (None, Some(path)) => path,
        (None, None) => {
            return Err(ApiError::bad_request(
                "path is required to create a workspace",
            ));
        }
    };

    let handle = state.registry.connect(&path)?;
    Ok(Json(ConnectResponse {
        workspace_id: id,
        clients: handle.client_count(),
    }))
}

#[derive(Debug, Serialize)]
struct DisconnectResponse {
    clients: usize,
}

async fn client_disconnect(
    State(state): State<AppState>,
    UrlPath(workspace_id): UrlPath<String>,
) -> Result<Json<DisconnectResponse>, ApiError> {
    let id: WorkspaceId = workspace_id
        .parse()
        .map_err(|_| ApiError::WorkspaceNotFound {
            workspace_id: workspace_id.clone(),
        })?;
    let clients = state.registry.disconnect(&id)?;
    Ok(Json(DisconnectResponse { clients }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use axum::body::Body;
    use axum::http::{Request, StatusCode, header};
    use serde_json::{Value, json};
    use shellflow_engine::WorkspaceRegistry;
    use shellflow_graph::FileStorage;
    use tower::util::ServiceExt;

    struct TestServer {
        router: Router,
        workspace_id: String,
        // Keeps the graph directory alive for the duration of the test.
        _dir: tempfile::TempDir,
    }

    impl TestServer {
        async fn new() -> Self {
            let dir = tempfile::tempdir().expect("tempdir");
            let path = dir.path().join("pipeline.json");
            let registry = Arc::new(WorkspaceRegistry::new(
                Arc::new(FileStorage::new()),
                None,
                Duration::from_secs(30),
            ));
            let state = AppState {
                registry,
                config: Arc::new(ServerConfig::default()),
            };
            let router = router(state);
            let workspace_id = WorkspaceId::from_path(&path).to_string();

            let server = Self {
                router,
                workspace_id,
                _dir: dir,
            };
            let (status, _) = server
                .post(
                    "client-connect",
                    json!({ "path": path.display().to_string() }),
                )
                .await;
            assert_eq!(status, StatusCode::OK);
            server
        }

        async fn post(&self, endpoint: &str, body: Value) -> (StatusCode, Value) {
            let uri = format!("/workspace/{}/{endpoint}", self.workspace_id);
            let request = Request::builder()
                .method("POST")
                .uri(uri)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .expect("request");
            Self::send(self.router.clone(), request).await
        }

        async fn get(&self, endpoint: &str) -> (StatusCode, Value) {
            let uri = format!("/workspace/{}/{endpoint}", self.workspace_id);
            let request = Request::builder()
                .method("GET")
                .uri(uri)
                .body(Body::empty())
                .expect("request");
            Self::send(self.router.clone(), request).await
        }

        async fn send(router: Router, request: Request<Body>) -> (StatusCode, Value) {
            let response = router.oneshot(request).await.expect("response");
            let status = response.status();
            let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
                .await
                .expect("body");
            let value = if bytes.is_empty() {
                Value::Null
            } else {
                serde_json::from_slice(&bytes).expect("json body")
            };
            (status, value)
        }

        async fn add_node(&self, label: &str) -> String {
            let (status, body) = self
                .post("add-node", json!({ "label": label, "x": "0", "y": "0" }))
                .await;
            assert_eq!(status, StatusCode::OK);
            body["node_id"].as_str().expect("node_id").to_string()
        }

        async fn node_status(&self, node_id: &str) -> String {
            let (status, body) = self.get("get-graph").await;
            assert_eq!(status, StatusCode::OK);
            body["nodes"]
                .as_array()
                .expect("nodes")
                .iter()
                .find(|node| node["id"] == node_id)
                .expect("node present")["status"]
                .as_str()
                .expect("status")
                .to_string()
        }
    }

    #[tokio::test]
    async fn pipeline_runs_end_to_end_over_http() {
        let server = TestServer::new().await;
        let a = server.add_node("echo a").await;
        let b = server.add_node("echo b").await;

        let (status, _) = server
            .post("add-edge", json!({ "source_id": a, "target_id": b }))
            .await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = server.post("run", json!({})).await;
        assert_eq!(status, StatusCode::OK);
        let run_id = body["run_id"].as_str().expect("run_id").to_string();

        // Runner executes a; b becomes ready through propagation.
        for status_name in ["running", "ran"] {
            let (status, _) = server
                .post(
                    "edit-status",
                    json!({ "kind": "node", "id": a, "status": status_name, "run_id": run_id }),
                )
                .await;
            assert_eq!(status, StatusCode::OK);
        }
        assert_eq!(server.node_status(&b).await, "run");

        for status_name in ["running", "ran"] {
            let (status, _) = server
                .post(
                    "edit-status",
                    json!({ "kind": "node", "id": b, "status": status_name, "run_id": run_id }),
                )
                .await;
            assert_eq!(status, StatusCode::OK);
        }

        assert_eq!(server.node_status(&a).await, "ran");
        assert_eq!(server.node_status(&b).await, "ran");
    }

    #[tokio::test]
    async fn unknown_workspace_is_not_found() {
        let server = TestServer::new().await;
        let request = Request::builder()
            .method("GET")
            .uri(format!("/workspace/{}/get-graph", "0".repeat(64)))
            .body(Body::empty())
            .expect("request");
        let (status, body) = TestServer::send(server.router.clone(), request).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["error"].as_str().expect("error").contains("not found"));
    }

    #[tokio::test]
    async fn invalid_status_value_is_a_bad_request() {
        let server = TestServer::new().await;
        let a = server.add_node("echo a").await;
        let (status, body) = server
            .post(
                "edit-status",
                json!({ "kind": "node", "id": a, "status": "finished" }),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().expect("error").contains("invalid"));
    }

    #[tokio::test]
    async fn blocking_cycle_on_add_edge_conflicts() {
        let server = TestServer::new().await;
        let a = server.add_node("a").await;
        let b = server.add_node("b").await;

        let (status, _) = server
            .post("add-edge", json!({ "source_id": a, "target_id": b }))
            .await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = server
            .post("add-edge", json!({ "source_id": b, "target_id": a }))
            .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert!(body["error"].as_str().expect("error").contains("cycle"));

        // The same pair as a non-blocking edge is fine.
        let (status, _) = server
            .post(
                "add-edge",
                json!({ "source_id": b, "target_id": a, "edge_type": "non-blocking" }),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn node_log_round_trips() {
        let server = TestServer::new().await;
        let a = server.add_node("make test").await;

        let (status, _) = server
            .post(
                "save-node-log",
                json!({ "node_id": a, "log": "ok\n" }),
            )
            .await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = server.get(&format!("get-node-log/{a}")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["log"], "ok\n");
    }

    #[tokio::test]
    async fn connect_with_mismatched_path_is_rejected() {
        let server = TestServer::new().await;
        let (status, body) = server
            .post("client-connect", json!({ "path": "/somewhere/else.json" }))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().expect("error").contains("hash"));
    }

    #[tokio::test]
    async fn run_on_empty_workspace_conflicts() {
        let server = TestServer::new().await;
        let (status, body) = server.post("run", json!({})).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert!(body["error"].as_str().expect("error").contains("rejected"));
    }

    #[tokio::test]
    async fn wrapper_survives_to_snapshot() {
        let server = TestServer::new().await;
        server.add_node("true").await;

        let (status, _) = server
            .post("edit-wrapper", json!({ "wrapper": "bash -lc {}" }))
            .await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = server.get("get-graph").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["wrapper"], "bash -lc {}");
    }
}
