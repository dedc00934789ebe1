/// file: src/api.rs
/// description: HTTP router and query-interface handlers.
/// HTTP API consumed by the conversational front-end.
///
/// Route map:
///   POST /v1/products/search
///   GET  /health
use axum::{
    Router,
    extract::State,
    response::{IntoResponse, Json},
    routing::{get, post},
};
use std::sync::Arc;

use crate::models::{AppError, HealthResponse, Query, SearchRequest, SearchResponse};
use crate::pipeline::Resolver;

// ---------------------------------------------------------------------------
// App state
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct AppState {
    pub resolver: Arc<Resolver>,
    pub catalog_products: usize,
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/v1/products/search", post(search_handler))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// GET /health
// ---------------------------------------------------------------------------

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".into(),
        catalog_products: state.catalog_products,
        remote_discovery: state.resolver.remote_enabled(),
    })
}

// ---------------------------------------------------------------------------
// POST /v1/products/search — synchronous resolution
// ---------------------------------------------------------------------------

async fn search_handler(
    State(state): State<AppState>,
    Json(req): Json<SearchRequest>,
) -> Result<impl IntoResponse, AppError> {
    // The only query-level failure is a contract violation; everything the
    // upstream site does wrong is absorbed inside the resolver.
    let query = Query::new(&req.query, req.category, req.max_price, req.limit)?;
    let resolution = state.resolver.resolve(&query).await;

    Ok(Json(SearchResponse {
        success: true,
        data: resolution,
    }))
}
