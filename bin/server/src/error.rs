//! API error type and its HTTP mapping.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use shellflow_engine::EngineError;
use shellflow_graph::GraphError;
use std::fmt;

/// Errors returned by the HTTP surface.
#[derive(Debug)]
pub enum ApiError {
    /// No workspace context exists for the id.
    WorkspaceNotFound { workspace_id: String },
    /// The request payload was malformed.
    BadRequest { message: String },
    /// The engine rejected the mutation.
    Engine(EngineError),
    /// The apply-latch timed out; the mutation may still apply eventually.
    Timeout,
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WorkspaceNotFound { workspace_id } => {
                write!(f, "workspace '{workspace_id}' not found")
            }
            Self::BadRequest { message } => write!(f, "bad request: {message}"),
            Self::Engine(e) => write!(f, "{e}"),
            Self::Timeout => write!(f, "timed out waiting for the graph worker"),
        }
    }
}

impl std::error::Error for ApiError {}

impl From<EngineError> for ApiError {
    fn from(e: EngineError) -> Self {
        Self::Engine(e)
    }
}

impl ApiError {
    /// Builds a bad-request error from any displayable cause.
    pub fn bad_request(message: impl fmt::Display) -> Self {
        Self::BadRequest {
            message: message.to_string(),
        }
    }

    fn status_code(&self) -> StatusCode {
        match self {
            Self::WorkspaceNotFound { .. } => StatusCode::NOT_FOUND,
            Self::BadRequest { .. } => StatusCode::BAD_REQUEST,
            Self::Timeout => StatusCode::GATEWAY_TIMEOUT,
            Self::Engine(engine) => match engine {
                EngineError::Graph(graph) => match graph {
                    GraphError::NodeNotFound { .. }
                    | GraphError::EdgeNotFound { .. }
                    | GraphError::EdgeBetweenNotFound { .. } => StatusCode::NOT_FOUND,
                    GraphError::DuplicateNode { .. }
                    | GraphError::DuplicateEdge { .. }
                    | GraphError::BlockingCycle { .. } => StatusCode::CONFLICT,
                },
                EngineError::RunNotFound { .. } | EngineError::WorkspaceNotFound { .. } => {
                    StatusCode::NOT_FOUND
                }
                EngineError::InvalidTransition { .. } | EngineError::NoActiveRun { .. } => {
                    StatusCode::UNPROCESSABLE_ENTITY
                }
                EngineError::RunRejected { .. }
                | EngineError::NodeBusy { .. }
                | EngineError::TriggerBudgetExhausted { .. } => StatusCode::CONFLICT,
                EngineError::Suspended => StatusCode::SERVICE_UNAVAILABLE,
                EngineError::Storage(_)
                | EngineError::WorkerUnavailable
                | EngineError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(serde_json::json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}
