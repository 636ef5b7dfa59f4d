use anyhow::Result;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use sitesearch_core::{DocId, Document, EngineConfig, Highlight, SearchEngine, SearchError, SearchPage};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Longer queries are rejected as malformed.
pub const MAX_QUERY_CHARS: usize = 1024;

#[derive(Deserialize)]
pub struct SearchParams {
    #[serde(default, alias = "q")]
    pub query: Option<String>,
    pub page: Option<String>,
    #[serde(rename = "pageSize")]
    pub page_size: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    pub query: String,
    pub took_s: f64,
    pub total_matches: usize,
    pub timed_out: bool,
    pub results: Vec<SearchHit>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHit {
    pub doc_id: DocId,
    pub score: f32,
    pub title: String,
    pub url: String,
    /// Escaped excerpt with `<em>` around matches.
    pub snippet: String,
    /// Raw excerpt; `highlights` index into it.
    pub excerpt: String,
    pub highlights: Vec<Highlight>,
}

impl SearchResponse {
    fn new(query: String, took_s: f64, page: SearchPage) -> Self {
        let results = page
            .results
            .into_iter()
            .map(|r| SearchHit {
                doc_id: r.doc_id,
                score: r.score,
                snippet: r.snippet.to_html("em"),
                title: r.title,
                url: r.url,
                excerpt: r.snippet.text,
                highlights: r.snippet.highlights,
            })
            .collect();
        Self { query, took_s, total_matches: page.total_matches, timed_out: page.timed_out, results }
    }
}

/// Error body `{ "error": code }` with the matching status.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
}

impl ApiError {
    fn internal(detail: impl std::fmt::Display) -> Self {
        tracing::error!(%detail, "request failed");
        Self { status: StatusCode::INTERNAL_SERVER_ERROR, code: "Internal" }
    }
}

impl From<SearchError> for ApiError {
    fn from(e: SearchError) -> Self {
        match e {
            e if e.is_validation() => Self { status: StatusCode::BAD_REQUEST, code: e.code() },
            SearchError::NotFound(_) => Self { status: StatusCode::NOT_FOUND, code: "NotFound" },
            other => Self::internal(other),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(serde_json::json!({ "error": self.code }))).into_response()
    }
}

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<SearchEngine>,
}

/// Open the index in `index_dir` and build the router over it.
pub fn build_app(index_dir: &str, config: EngineConfig) -> Result<Router> {
    let engine = SearchEngine::open(index_dir, config)?;
    let stats = engine.stats();
    if stats.documents == 0 {
        tracing::warn!(index_dir, "serving an empty index");
    }
    tracing::info!(documents = stats.documents, terms = stats.terms, "index ready");
    Ok(app(Arc::new(engine)))
}

pub fn app(engine: Arc<SearchEngine>) -> Router {
    // CORS: read CORS_ALLOW_ORIGIN (comma-separated) or allow Any by default
    let cors = match std::env::var("CORS_ALLOW_ORIGIN") {
        Ok(val) => {
            let origins: Vec<_> = val.split(',').filter_map(|s| s.trim().parse().ok()).collect();
            if origins.is_empty() {
                CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any)
            } else {
                CorsLayer::new().allow_origin(AllowOrigin::list(origins)).allow_methods(Any).allow_headers(Any)
            }
        }
        Err(_) => CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any),
    };

    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/search", get(search_handler))
        .route("/doc/:doc_id", get(doc_handler))
        .with_state(AppState { engine })
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

fn parse_paging(raw: Option<&str>, default: i64) -> Result<i64, ApiError> {
    match raw.map(str::trim) {
        None | Some("") => Ok(default),
        Some(s) => s.parse().map_err(|_| ApiError { status: StatusCode::BAD_REQUEST, code: "InvalidPage" }),
    }
}

pub async fn search_handler(State(state): State<AppState>, Query(params): Query<SearchParams>) -> Result<Json<SearchResponse>, ApiError> {
    let start = std::time::Instant::now();
    let default_size = state.engine.config().search.default_page_size as i64;
    let page = parse_paging(params.page.as_deref(), 0)?;
    let page_size = parse_paging(params.page_size.as_deref(), default_size)?;
    let query = params.query.unwrap_or_default();
    if query.chars().count() > MAX_QUERY_CHARS {
        return Err(SearchError::InvalidQuery(format!("query longer than {MAX_QUERY_CHARS} characters")).into());
    }

    // ranking is CPU-bound; keep it off the async workers
    let engine = state.engine.clone();
    let q = query.clone();
    let result = tokio::task::spawn_blocking(move || engine.search(&q, page, page_size))
        .await
        .map_err(ApiError::internal)??;

    Ok(Json(SearchResponse::new(query, start.elapsed().as_secs_f64(), result)))
}

pub async fn doc_handler(State(state): State<AppState>, Path(doc_id): Path<DocId>) -> Result<Json<Document>, ApiError> {
    let doc = state.engine.get(doc_id)?;
    Ok(Json(Document::clone(&doc)))
}
