//! JSON-over-HTTP daemon exposing the router to the chat layer.

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::signal;

use crate::config::{Config, RouterConfig};
use crate::errors::ErrorKind;
use crate::router::{Router, RouterError};
use crate::types::{Evidence, SearchHit};

#[derive(Clone)]
struct SharedState {
    router: Arc<Router>,
    default_k: usize,
    default_max_chars: usize,
}

/// Routes and middleware, without binding a socket.
pub fn app(router: Arc<Router>, config: &RouterConfig) -> axum::Router {
    let shared_state = Arc::new(SharedState {
        router,
        default_k: config.default_k,
        default_max_chars: config.default_max_chars,
    });

    axum::Router::new()
        .route("/api/answer", post(answer))
        .route("/api/search/internal", post(search_internal))
        .route("/api/status", get(status))
        .layer(
            tower_http::trace::TraceLayer::new_for_http()
                .make_span_with(
                    tower_http::trace::DefaultMakeSpan::new().level(tracing::Level::INFO),
                )
                .on_response(
                    tower_http::trace::DefaultOnResponse::new().level(tracing::Level::INFO),
                ),
        )
        .with_state(shared_state)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            log::error!("failed to install Ctrl+C handler: {err}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(err) => {
                log::error!("failed to install signal handler: {err}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    log::warn!("shutting down");
}

async fn start_app(router: Arc<Router>, config: RouterConfig, addr: String) -> anyhow::Result<()> {
    let app = app(router, &config);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    log::info!("listening on {addr}");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

/// Serve until Ctrl+C or SIGTERM.
///
/// The caller keeps its own handle on `router`: the blocking HTTP clients
/// inside must not be dropped from within the async runtime.
pub fn start_daemon(router: Arc<Router>, config: &Config, addr: Option<String>) -> anyhow::Result<()> {
    let addr = addr.unwrap_or_else(|| config.server.addr.clone());
    let router_config = config.router.clone();

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async { start_app(router, router_config, addr).await })
}

#[derive(Debug)]
enum HttpError {
    Router(RouterError),
    Worker(String),
}

impl HttpError {
    fn status(&self) -> StatusCode {
        match self {
            HttpError::Router(err) => match err.kind() {
                ErrorKind::Validation => StatusCode::BAD_REQUEST,
                ErrorKind::Configuration => StatusCode::SERVICE_UNAVAILABLE,
                ErrorKind::TransientProvider => StatusCode::BAD_GATEWAY,
                ErrorKind::LookupInconsistency => StatusCode::INTERNAL_SERVER_ERROR,
            },
            HttpError::Worker(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl std::fmt::Display for HttpError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HttpError::Router(err) => write!(f, "{err}"),
            HttpError::Worker(msg) => write!(f, "{msg}"),
        }
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status();
        if status.is_server_error() {
            log::error!("{self:?}");
        }
        (
            status,
            [(axum::http::header::CONTENT_TYPE, "application/json")],
            json!({"error": self.to_string()}).to_string(),
        )
            .into_response()
    }
}

impl From<RouterError> for HttpError {
    fn from(err: RouterError) -> Self {
        Self::Router(err)
    }
}

impl From<tokio::task::JoinError> for HttpError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Worker(format!("request worker failed: {err}"))
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AnswerRequest {
    pub query: String,
    pub k: Option<usize>,
    pub max_chars: Option<usize>,
}

async fn answer(
    State(state): State<Arc<SharedState>>,
    Json(payload): Json<AnswerRequest>,
) -> Result<Json<Evidence>, HttpError> {
    log::debug!("payload: {payload:?}");

    let router = state.router.clone();
    let k = payload.k.unwrap_or(state.default_k);
    let max_chars = payload.max_chars.unwrap_or(state.default_max_chars);

    let evidence =
        tokio::task::spawn_blocking(move || router.get_answer(&payload.query, k, max_chars))
            .await??;

    Ok(Json(evidence))
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct InternalSearchRequest {
    pub query: String,
    pub k: Option<usize>,
}

async fn search_internal(
    State(state): State<Arc<SharedState>>,
    Json(payload): Json<InternalSearchRequest>,
) -> Result<Json<Vec<SearchHit>>, HttpError> {
    log::debug!("payload: {payload:?}");

    let router = state.router.clone();
    let k = payload.k.unwrap_or(state.default_k);

    let hits = tokio::task::spawn_blocking(move || router.search_internal(&payload.query, k))
        .await??;

    Ok(Json(hits))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub index_open: bool,
    pub indexed: usize,
    pub threshold: f32,
}

async fn status(State(state): State<Arc<SharedState>>) -> Json<StatusResponse> {
    let router = &state.router;
    Json(StatusResponse {
        index_open: router.internal().is_open(),
        indexed: router.internal().indexed_count(),
        threshold: router.threshold(),
    })
}
