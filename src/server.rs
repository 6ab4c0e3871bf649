//! HTTP proxy in front of the text generator.
//!
//! One generation route (path from config) plus a health check.
//! Upstream failures never leak details: the client always sees the
//! same fixed 500 body.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::config::ServerConfig;
use crate::generation::TextGenerator;

/// Body returned to clients when generation fails.
pub const GENERATION_FAILED: &str = "Failed to generate text";

#[derive(Clone)]
pub struct ProxyState {
    pub generator: Arc<dyn TextGenerator>,
    pub default_prompt: String,
}

// --- Request/Response types ---

#[derive(Debug, Serialize, Deserialize)]
pub struct GenerateResponse {
    pub text: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

/// Build the axum router with the generation route mounted at `route`.
pub fn router(state: ProxyState, route: &str) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route(route, get(handle_generate))
        .route("/health", get(handle_health))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

/// Bind and serve until the process is stopped.
pub async fn serve(state: ProxyState, config: &ServerConfig) -> crate::Result<()> {
    let route = config.route_path();
    let app = router(state, &route);
    let addr = config.bind_addr();

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Server running at http://{addr}{route}");

    axum::serve(listener, app).await?;
    Ok(())
}

// --- Handlers ---

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn handle_generate(
    State(state): State<ProxyState>,
    Query(params): Query<Vec<(String, String)>>,
) -> Response {
    // Repeated `prompt` keys are not an error: the first one is used
    let prompt = params
        .into_iter()
        .find(|(key, _)| key == "prompt")
        .map(|(_, value)| value)
        .filter(|p| !p.trim().is_empty())
        .unwrap_or_else(|| state.default_prompt.clone());

    let preview: String = prompt.chars().take(80).collect();
    info!("GET generate: \"{}\" ({} chars)", preview.replace('\n', " "), prompt.len());

    match state.generator.generate(&prompt).await {
        Ok(text) => Json(GenerateResponse { text }).into_response(),
        Err(e) => {
            error!("Generation failed: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: GENERATION_FAILED.into(),
                }),
            )
                .into_response()
        }
    }
}
