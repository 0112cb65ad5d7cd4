// src/server/http.rs

//! The HTTP facade: JSON endpoints that turn client requests into backend
//! commands through the multiplexer.

use crate::config::Config;
use crate::core::metrics::gather_metrics;
use crate::core::{MuxError, SearchClient};
use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequest, Request, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::cors::CorsLayer;
use tracing::{debug, error, info};

#[derive(Clone)]
struct AppState {
    client: SearchClient,
}

#[derive(Debug, Default, Deserialize)]
pub struct SearchRequest {
    #[serde(default)]
    pub query: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SnippetRequest {
    #[serde(default)]
    pub index: Option<Value>,
}

/// A JSON request body. A request without a JSON content type reads as an
/// empty object; every other rejection is a 400 `{"error": ...}`.
pub struct JsonBody<T>(pub T);

impl<T, S> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned + Default + Send,
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(JsonBody(value)),
            Err(JsonRejection::MissingJsonContentType(_)) => Ok(JsonBody(T::default())),
            Err(rejection) => {
                debug!("Rejected request body: {}", rejection.body_text());
                Err(error_response(
                    StatusCode::BAD_REQUEST,
                    &rejection.body_text(),
                ))
            }
        }
    }
}

/// Builds the router. The metrics path is only mounted when metrics are
/// enabled; CORS headers are added unless `cors` is off.
pub fn router(client: SearchClient, config: &Config) -> Router {
    let mut app = Router::new()
        .route("/search", post(search_handler))
        .route("/snippet", post(snippet_handler))
        .route("/health", get(health_handler));

    if config.metrics.enabled {
        app = app.route(&config.metrics.path, get(metrics_handler));
    }

    let app = app.with_state(AppState { client });
    if config.cors {
        app.layer(CorsLayer::permissive())
    } else {
        app
    }
}

/// Serves `app` until a shutdown signal arrives.
pub async fn run_http_server(
    listener: TcpListener,
    app: Router,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> anyhow::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!("HTTP facade listening on http://{}", addr);
    }
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_rx.recv().await.ok();
            info!("HTTP facade shutting down.");
        })
        .await?;
    Ok(())
}

async fn search_handler(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<SearchRequest>,
) -> Response {
    let Some(query) = body.query.filter(|q| !q.trim().is_empty()) else {
        return error_response(StatusCode::BAD_REQUEST, "Query is required");
    };

    match state.client.search(&query).await {
        Ok(outcome) => (StatusCode::OK, Json(outcome)).into_response(),
        Err(MuxError::Validation(msg)) => error_response(StatusCode::BAD_REQUEST, &msg),
        Err(e) => {
            error!("Search for {:?} failed: {}", query.trim(), e);
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &format!("Search failed: {e}"),
            )
        }
    }
}

async fn snippet_handler(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<SnippetRequest>,
) -> Response {
    let index = match body.index {
        None | Some(Value::Null) => {
            return error_response(StatusCode::BAD_REQUEST, "Index is required");
        }
        Some(value) => match parse_index(&value) {
            Some(index) => index,
            None => {
                return error_response(
                    StatusCode::BAD_REQUEST,
                    "Index must be a non-negative integer",
                );
            }
        },
    };

    match state.client.get_snippets(index).await {
        Ok(outcome) => (StatusCode::OK, Json(outcome)).into_response(),
        Err(MuxError::Validation(msg)) => error_response(StatusCode::BAD_REQUEST, &msg),
        Err(e) => {
            error!("Snippet lookup for index {} failed: {}", index, e);
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &format!("Failed to get snippets: {e}"),
            )
        }
    }
}

async fn health_handler(State(state): State<AppState>) -> Response {
    let backend = state.client.backend_state();
    (StatusCode::OK, Json(json!({ "backend": backend }))).into_response()
}

async fn metrics_handler() -> impl IntoResponse {
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4")],
        gather_metrics(),
    )
}

/// Accepts a JSON number or a string of digits.
fn parse_index(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    }
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}
