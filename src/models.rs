/// file: src/models.rs
/// description: Domain types, API shapes, and AppError mapping.
/// Product, Query, and Resolution types shared by the pipeline and the HTTP
/// surface, plus the crate-level error taxonomy.
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum AppError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("fetch error: {0}")]
    Fetch(#[from] crate::fetch::FetchError),

    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::BadRequest(_) | AppError::InvalidUrl(_) => {
                (StatusCode::BAD_REQUEST, self.to_string())
            }
            _ => (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()),
        };

        #[derive(Serialize)]
        struct Body {
            success: bool,
            error: String,
        }

        (
            status,
            Json(Body {
                success: false,
                error: message,
            }),
        )
            .into_response()
    }
}

// ---------------------------------------------------------------------------
// Product
// ---------------------------------------------------------------------------

/// One resolved product record. `price` of 0.0 means "unknown"; `url` is
/// always absolute by the time a Product leaves the extractor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub name: String,
    #[serde(default)]
    pub price: f64,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

// ---------------------------------------------------------------------------
// Query
// ---------------------------------------------------------------------------

/// A validated product query. Construct through [`Query::new`]; an empty term
/// is the one contract violation that surfaces to the caller.
#[derive(Debug, Clone)]
pub struct Query {
    pub term: String,
    pub category: Option<String>,
    pub max_price: Option<f64>,
    pub limit: usize,
}

impl Query {
    pub const MIN_LIMIT: usize = 1;
    pub const MAX_LIMIT: usize = 20;
    pub const DEFAULT_LIMIT: usize = 5;

    pub fn new(
        term: &str,
        category: Option<String>,
        max_price: Option<f64>,
        limit: Option<usize>,
    ) -> Result<Self, AppError> {
        let term = term.trim();
        if term.is_empty() {
            return Err(AppError::BadRequest("query term must not be empty".into()));
        }
        if let Some(p) = max_price
            && !(p >= 0.0)
        {
            return Err(AppError::BadRequest(format!(
                "maxPrice must be a non-negative number, got {p}"
            )));
        }

        Ok(Self {
            term: term.to_owned(),
            category: category
                .map(|c| c.trim().to_owned())
                .filter(|c| !c.is_empty()),
            max_price,
            limit: limit
                .unwrap_or(Self::DEFAULT_LIMIT)
                .clamp(Self::MIN_LIMIT, Self::MAX_LIMIT),
        })
    }

    /// Deterministic cache key. `namespace` discriminates the subsystem that
    /// produced the cached result (remote discovery vs local catalog).
    pub fn signature(&self, namespace: &str) -> String {
        format!(
            "{}|{}|{}|{}|{}",
            namespace,
            self.term.to_lowercase(),
            self.category
                .as_deref()
                .map(|c| c.to_lowercase())
                .unwrap_or_else(|| "-".into()),
            self.max_price
                .map(|p| p.to_string())
                .unwrap_or_else(|| "-".into()),
            self.limit,
        )
    }

    /// Lowercased whitespace-split tokens of the term, deduplicated in order.
    pub fn tokens(&self) -> Vec<String> {
        let mut seen = std::collections::HashSet::new();
        self.term
            .to_lowercase()
            .split_whitespace()
            .filter(|t| seen.insert(t.to_string()))
            .map(ToOwned::to_owned)
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Resolution provenance
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    Primary,
    Alternate,
    SearchEngine,
    Sitemap,
    Local,
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Source::Primary => write!(f, "primary"),
            Source::Alternate => write!(f, "alternate"),
            Source::SearchEngine => write!(f, "search_engine"),
            Source::Sitemap => write!(f, "sitemap"),
            Source::Local => write!(f, "local"),
        }
    }
}

/// Pipeline output: the ranked products plus where they came from.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Resolution {
    pub products: Vec<Product>,
    pub source: Source,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    pub from_cache: bool,
}

// ---------------------------------------------------------------------------
// HTTP request shapes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
    pub query: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub max_price: Option<f64>,
    #[serde(default)]
    pub limit: Option<usize>,
}

// ---------------------------------------------------------------------------
// HTTP response shapes
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub success: bool,
    pub data: Resolution,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub catalog_products: usize,
    pub remote_discovery: bool,
}
