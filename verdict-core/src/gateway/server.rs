//! HTTP gateway server built on axum.

use super::ServerConfig;
use crate::orchestrator::{MISSING_USER_INPUT, Orchestrator};
use crate::stream::StreamEvent;
use crate::types::AnalysisRequest;
use axum::{
    Json, Router,
    body::Body,
    extract::{State, rejection::JsonRejection},
    http::{Response, StatusCode, header},
    response::IntoResponse,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio_stream::{StreamExt, wrappers::UnboundedReceiverStream};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

const INVALID_REQUEST: &str = "INVALID_REQUEST";

/// Shared state for axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    started: Instant,
}

impl AppState {
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        Self {
            orchestrator,
            started: Instant::now(),
        }
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started.elapsed().as_secs()
    }
}

/// Structured error body: `{"error": {"code": ..., "message": ...}}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RoleSummary<'a> {
    id: &'a str,
    display_name: &'a str,
    model_chain: &'a [String],
}

fn error_response(status: StatusCode, code: &str, message: impl Into<String>) -> Response<Body> {
    let body = ErrorBody {
        error: ErrorDetail {
            code: code.to_string(),
            message: message.into(),
        },
    };
    (status, Json(body)).into_response()
}

/// Wrap a session's event channel as a server-sent-events response.
fn sse_response(rx: mpsc::UnboundedReceiver<StreamEvent>) -> Response<Body> {
    let frames = UnboundedReceiverStream::new(rx).filter_map(|event| match event.to_sse_frame() {
        Ok(frame) => Some(Ok::<_, Infallible>(frame)),
        Err(e) => {
            warn!(error = %e, "Dropping unencodable event");
            None
        }
    });

    let mut response = Response::new(Body::from_stream(frames));
    *response.status_mut() = StatusCode::OK;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        header::HeaderValue::from_static("text/event-stream"),
    );
    response.headers_mut().insert(
        header::CACHE_CONTROL,
        header::HeaderValue::from_static("no-cache"),
    );
    response.headers_mut().insert(
        header::CONNECTION,
        header::HeaderValue::from_static("keep-alive"),
    );
    response
}

/// Build the router with `/api/analyze`, `/api/roles` and `/health`.
pub fn router(state: AppState, cors_origins: &[String]) -> Router {
    let mut app = Router::new()
        .route("/api/analyze", post(analyze_handler))
        .route("/api/roles", get(roles_handler))
        .route("/health", get(health_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    if !cors_origins.is_empty() {
        let origins: Vec<_> = cors_origins.iter().filter_map(|o| o.parse().ok()).collect();
        app = app.layer(
            CorsLayer::new()
                .allow_origin(origins)
                .allow_methods([axum::http::Method::GET, axum::http::Method::POST])
                .allow_headers([header::CONTENT_TYPE]),
        );
    }

    app
}

async fn analyze_handler(
    State(state): State<AppState>,
    payload: Result<Json<AnalysisRequest>, JsonRejection>,
) -> Response<Body> {
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => {
            return error_response(StatusCode::BAD_REQUEST, INVALID_REQUEST, rejection.body_text());
        }
    };
    if request.input().is_none() {
        return error_response(
            StatusCode::BAD_REQUEST,
            MISSING_USER_INPUT,
            "userInput is required",
        );
    }
    sse_response(state.orchestrator.start(request))
}

async fn roles_handler(State(state): State<AppState>) -> impl IntoResponse {
    let roles: Vec<RoleSummary<'_>> = state
        .orchestrator
        .roles()
        .all()
        .iter()
        .map(|role| RoleSummary {
            id: &role.id,
            display_name: &role.display_name,
            model_chain: &role.model_chain,
        })
        .collect();
    Json(serde_json::json!({ "roles": roles }))
}

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "roles": state.orchestrator.roles().len(),
        "uptime_secs": state.uptime_secs(),
    }))
}

/// Serve the gateway on the configured address until the process stops.
pub async fn run(config: &ServerConfig, orchestrator: Arc<Orchestrator>) -> Result<(), std::io::Error> {
    let app = router(AppState::new(orchestrator), &config.allowed_origins);
    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(%addr, "Gateway listening");
    axum::serve(listener, app).await?;
    Ok(())
}
