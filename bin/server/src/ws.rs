//! Realtime transport bridge.
//!
//! Clients join a workspace-scoped channel with a `subscribe` message and
//! then receive the engine's event stream translated to transport messages.
//! `connect`/`disconnect` mirror the HTTP client-count endpoints so a
//! realtime-only client participates in the idle lifecycle. Events arrive
//! in emission order; a subscriber that lags far enough to drop events
//! simply resubscribes for a fresh cursor.

use crate::AppState;
use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use shellflow_core::{NodeId, RunId, WorkspaceId};
use shellflow_engine::{Event, EventKind, GraphUpdate};
use std::path::PathBuf;
use tokio::sync::broadcast;

/// Client-to-server messages on the realtime channel.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClientMessage {
    /// Join a workspace's event channel.
    Subscribe { workspace_id: String },
    /// Register as a client of the workspace (creates it if needed).
    Connect {
        workspace_id: String,
        path: Option<String>,
    },
    /// Deregister; triggers the idle sweep at zero clients.
    Disconnect { workspace_id: String },
}

/// Server-to-client messages on the realtime channel.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ServerMessage {
    GraphUpdate {
        workspace_id: WorkspaceId,
        update: GraphUpdate,
    },
    NodeReady {
        workspace_id: WorkspaceId,
        node_id: NodeId,
        label: String,
        wrapper: Option<String>,
        run_id: RunId,
    },
    StatusChange {
        workspace_id: WorkspaceId,
        node_id: NodeId,
        status: String,
        run_id: RunId,
    },
    RunComplete {
        workspace_id: WorkspaceId,
        run_id: RunId,
    },
    Error {
        message: String,
    },
}

/// Translates a domain event into its transport message, if it has one.
fn translate(event: &Event) -> Option<ServerMessage> {
    let workspace_id = event.workspace_id.clone();
    match &event.kind {
        EventKind::NodeReady {
            node_id,
            label,
            wrapper,
            run_id,
        } => Some(ServerMessage::NodeReady {
            workspace_id,
            node_id: *node_id,
            label: label.clone(),
            wrapper: wrapper.clone(),
            run_id: *run_id,
        }),
        EventKind::NodeStarted { node_id, run_id } => Some(ServerMessage::StatusChange {
            workspace_id,
            node_id: *node_id,
            status: "running".to_string(),
            run_id: *run_id,
        }),
        EventKind::NodeFinished { node_id, run_id } => Some(ServerMessage::StatusChange {
            workspace_id,
            node_id: *node_id,
            status: "ran".to_string(),
            run_id: *run_id,
        }),
        EventKind::NodeFailed { node_id, run_id } => Some(ServerMessage::StatusChange {
            workspace_id,
            node_id: *node_id,
            status: "fail".to_string(),
            run_id: *run_id,
        }),
        EventKind::RunComplete { run_id } => Some(ServerMessage::RunComplete {
            workspace_id,
            run_id: *run_id,
        }),
        EventKind::GraphUpdated { update } => Some(ServerMessage::GraphUpdate {
            workspace_id,
            update: update.clone(),
        }),
        EventKind::GraphRejected { .. } | EventKind::RunRejected { .. } => None,
    }
}

/// Upgrades the connection and runs the channel loop.
pub async fn ws_handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| handle_socket(state, socket))
}

async fn handle_socket(state: AppState, socket: WebSocket) {
    let (mut sink, mut stream) = socket.split();
    let mut events: Option<broadcast::Receiver<Event>> = None;
    // Workspaces this socket registered as a client of, for cleanup.
    let mut connected: Vec<WorkspaceId> = Vec::new();

    loop {
        tokio::select! {
            incoming = stream.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        let reply = handle_client_message(
                            &state,
                            text.as_str(),
                            &mut events,
                            &mut connected,
                        );
                        if let Some(reply) = reply
                            && send(&mut sink, &reply).await.is_err()
                        {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        tracing::debug!(error = %err, "websocket receive error");
                        break;
                    }
                }
            }
            event = next_event(&mut events) => {
                if let Some(event) = event
                    && let Some(message) = translate(&event)
                    && send(&mut sink, &message).await.is_err()
                {
                    break;
                }
            }
        }
    }

    // A dropped socket counts as a disconnect for every workspace it
    // registered with.
    for workspace_id in connected {
        if let Err(err) = state.registry.disconnect(&workspace_id) {
            tracing::debug!(workspace_id = %workspace_id, error = %err, "cleanup disconnect failed");
        }
    }
}

fn handle_client_message(
    state: &AppState,
    text: &str,
    events: &mut Option<broadcast::Receiver<Event>>,
    connected: &mut Vec<WorkspaceId>,
) -> Option<ServerMessage> {
    let message: ClientMessage = match serde_json::from_str(text) {
        Ok(message) => message,
        Err(err) => {
            return Some(ServerMessage::Error {
                message: format!("malformed message: {err}"),
            });
        }
    };

    match message {
        ClientMessage::Subscribe { workspace_id } => {
            let id: WorkspaceId = match workspace_id.parse() {
                Ok(id) => id,
                Err(err) => {
                    return Some(ServerMessage::Error {
                        message: err.to_string(),
                    });
                }
            };
            match state.registry.get(&id) {
                Some(handle) => {
                    *events = Some(handle.subscribe());
                    None
                }
                None => Some(ServerMessage::Error {
                    message: format!("workspace '{id}' not found"),
                }),
            }
        }
        ClientMessage::Connect { workspace_id, path } => {
            let id: WorkspaceId = match workspace_id.parse() {
                Ok(id) => id,
                Err(err) => {
                    return Some(ServerMessage::Error {
                        message: err.to_string(),
                    });
                }
            };
            let path = match (state.registry.get(&id), path.map(PathBuf::from)) {
                (Some(handle), _) => handle.path().to_path_buf(),
                (None, Some(path)) if WorkspaceId::from_path(&path) == id => path,
                (None, Some(_)) => {
                    return Some(ServerMessage::Error {
                        message: "path does not hash to the workspace id".to_string(),
                    });
                }
                (None, None) => {
                    return Some(ServerMessage::Error {
                        message: "path is required to create a workspace".to_string(),
                    });
                }
            };
            match state.registry.connect(&path) {
                Ok(_) => {
                    connected.push(id);
                    None
                }
                Err(err) => Some(ServerMessage::Error {
                    message: err.to_string(),
                }),
            }
        }
        ClientMessage::Disconnect { workspace_id } => {
            let id: WorkspaceId = match workspace_id.parse() {
                Ok(id) => id,
                Err(err) => {
                    return Some(ServerMessage::Error {
                        message: err.to_string(),
                    });
                }
            };
            connected.retain(|known| known != &id);
            match state.registry.disconnect(&id) {
                Ok(_) => None,
                Err(err) => Some(ServerMessage::Error {
                    message: err.to_string(),
                }),
            }
        }
    }
}

/// Awaits the next event on the subscription, or parks forever when the
/// socket has not subscribed yet. A torn-down workspace ends the
/// subscription; a lagged receiver skips ahead.
async fn next_event(events: &mut Option<broadcast::Receiver<Event>>) -> Option<Event> {
    match events {
        Some(receiver) => match receiver.recv().await {
            Ok(event) => Some(event),
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                tracing::warn!(missed, "realtime subscriber lagged; events dropped");
                None
            }
            Err(broadcast::error::RecvError::Closed) => {
                *events = None;
                None
            }
        },
        None => std::future::pending().await,
    }
}

async fn send(
    sink: &mut (impl futures::Sink<Message, Error = axum::Error> + Unpin),
    message: &ServerMessage,
) -> Result<(), axum::Error> {
    let json = serde_json::to_string(message).map_err(axum::Error::new)?;
    sink.send(Message::Text(json.into())).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::path::Path;

    fn event(kind: EventKind) -> Event {
        Event {
            workspace_id: WorkspaceId::from_path(Path::new("/tmp/ws.json")),
            seq: 0,
            ts: Utc::now(),
            kind,
        }
    }

    #[test]
    fn node_ready_translates_with_wrapper() {
        let node_id = NodeId::new();
        let run_id = RunId::new();
        let message = translate(&event(EventKind::NodeReady {
            node_id,
            label: "echo hi".to_string(),
            wrapper: Some("sh -c {}".to_string()),
            run_id,
        }))
        .expect("translated");

        let json = serde_json::to_value(&message).expect("serialize");
        assert_eq!(json["type"], "node_ready");
        assert_eq!(json["label"], "echo hi");
        assert_eq!(json["wrapper"], "sh -c {}");
    }

    #[test]
    fn terminal_events_become_status_changes() {
        let node_id = NodeId::new();
        let run_id = RunId::new();

        let started = translate(&event(EventKind::NodeStarted { node_id, run_id }))
            .expect("translated");
        let json = serde_json::to_value(&started).expect("serialize");
        assert_eq!(json["type"], "status_change");
        assert_eq!(json["status"], "running");

        let failed =
            translate(&event(EventKind::NodeFailed { node_id, run_id })).expect("translated");
        let json = serde_json::to_value(&failed).expect("serialize");
        assert_eq!(json["status"], "fail");
    }

    #[test]
    fn rejection_events_are_not_fanned_out() {
        assert!(
            translate(&event(EventKind::GraphRejected {
                reason: "bad".to_string(),
            }))
            .is_none()
        );
        assert!(
            translate(&event(EventKind::RunRejected {
                reason: "cycle".to_string(),
            }))
            .is_none()
        );
    }

    #[test]
    fn client_messages_parse() {
        let parsed: ClientMessage = serde_json::from_str(
            &format!(r#"{{"type": "subscribe", "workspace_id": "{}"}}"#, "a".repeat(64)),
        )
        .expect("parse");
        assert!(matches!(parsed, ClientMessage::Subscribe { .. }));
    }
}
