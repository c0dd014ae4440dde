use anyhow::Result;
use axum::{extract::{Path, Query, State}, http::StatusCode, routing::{get, post}, Json, Router};
use parking_lot::RwLock;
use pubsearch_core::persist::{load_judgments, IndexPaths};
use pubsearch_core::{evaluate, load_corpus, Document, Evaluation, RelevanceJudgments, SearchEngine, SearchHit, SearchMode};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer, AllowOrigin};
use tower_http::trace::TraceLayer;

#[derive(Deserialize)]
pub struct SearchParams {
    pub q: String,
    #[serde(default = "default_k")]
    pub k: usize,
}
fn default_k() -> usize { 10 }

#[derive(Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub mode: SearchMode,
    pub took_s: f64,
    pub total_hits: usize,
    pub results: Vec<SearchHit>,
}

#[derive(Deserialize)]
pub struct EvaluateRequest {
    pub query: String,
    #[serde(default)]
    pub results: Vec<SearchHit>,
}

#[derive(Serialize)]
pub struct RebuildResponse {
    pub num_docs: u32,
    pub num_terms: usize,
}

/// Where the server reads its corpus, index and judgments from.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub index_dir: PathBuf,
    pub corpus_path: PathBuf,
    pub judgments_path: PathBuf,
    /// Required in `X-ADMIN-TOKEN` for rebuilds; rebuilds are refused when unset.
    pub admin_token: Option<String>,
}

#[derive(Clone)]
pub struct AppState {
    pub config: ServerConfig,
    /// Searches share the read lock; a rebuild takes the write lock, so rebuilds never overlap.
    pub engine: Arc<RwLock<SearchEngine>>,
    pub judgments: Arc<RelevanceJudgments>,
}

pub fn build_app(config: ServerConfig) -> Result<Router> {
    let docs = load_corpus(&config.corpus_path)?;
    let engine = SearchEngine::open(IndexPaths::new(&config.index_dir), docs)?;
    let judgments = load_judgments(&config.judgments_path)?;
    let app_state = AppState { config, engine: Arc::new(RwLock::new(engine)), judgments: Arc::new(judgments) };

    // CORS: read CORS_ALLOW_ORIGIN (comma-separated) or allow Any by default
    let cors = match std::env::var("CORS_ALLOW_ORIGIN") {
        Ok(val) => {
            let origins: Vec<_> = val
                .split(',')
                .filter_map(|s| s.trim().parse().ok())
                .collect();
            if origins.is_empty() {
                CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any)
            } else {
                CorsLayer::new().allow_origin(AllowOrigin::list(origins)).allow_methods(Any).allow_headers(Any)
            }
        }
        Err(_) => CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any),
    };

    let app = Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/search", get(search_handler))
        .route("/doc/:doc_id", get(doc_handler))
        .route("/evaluate", post(evaluate_handler))
        .route("/index/rebuild", post(rebuild_handler))
        .with_state(app_state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());
    Ok(app)
}

pub async fn search_handler(State(state): State<AppState>, Query(params): Query<SearchParams>) -> Json<SearchResponse> {
    let start = std::time::Instant::now();
    let k = params.k.clamp(1, 100);
    let outcome = state.engine.read().search(&params.q, k);
    let elapsed = start.elapsed();
    tracing::info!(query = %params.q, mode = ?outcome.mode, hits = outcome.results.len(), "search");
    Json(SearchResponse {
        query: params.q,
        mode: outcome.mode,
        took_s: elapsed.as_secs_f64(),
        total_hits: outcome.results.len(),
        results: outcome.results,
    })
}

pub async fn doc_handler(State(state): State<AppState>, Path(doc_id): Path<u32>) -> Result<Json<Document>, (StatusCode, String)> {
    let engine = state.engine.read();
    match engine.docs().get(doc_id as usize) {
        Some(doc) => Ok(Json(doc.clone())),
        None => Err((StatusCode::NOT_FOUND, format!("no document {doc_id}"))),
    }
}

pub async fn evaluate_handler(State(state): State<AppState>, Json(req): Json<EvaluateRequest>) -> Json<Evaluation> {
    let engine = state.engine.read();
    Json(evaluate(&req.query, &req.results, engine.docs(), &state.judgments))
}

async fn rebuild_handler(State(state): State<AppState>, headers: axum::http::HeaderMap) -> Result<Json<RebuildResponse>, (StatusCode, String)> {
    authorize(&state, &headers)?;
    let corpus_path = state.config.corpus_path.clone();
    let engine = Arc::clone(&state.engine);
    // Loading and indexing block, and the write lock parks searches, so keep both off the async workers.
    let response = tokio::task::spawn_blocking(move || -> Result<RebuildResponse> {
        let docs = load_corpus(&corpus_path)?;
        let mut engine = engine.write();
        let meta = engine.rebuild(docs)?;
        Ok(RebuildResponse { num_docs: meta.num_docs, num_terms: meta.num_terms })
    })
    .await
    .map_err(|e| internal(e.into()))?
    .map_err(internal)?;
    tracing::info!(num_docs = response.num_docs, num_terms = response.num_terms, "index rebuilt");
    Ok(Json(response))
}

fn internal(err: anyhow::Error) -> (StatusCode, String) {
    tracing::error!(error = %err, "rebuild failed");
    (StatusCode::INTERNAL_SERVER_ERROR, format!("{err:#}"))
}

fn authorize(state: &AppState, headers: &axum::http::HeaderMap) -> Result<(), (StatusCode, String)> {
    let required = match &state.config.admin_token {
        Some(t) => t,
        None => return Err((StatusCode::UNAUTHORIZED, "ADMIN_TOKEN not set".into())),
    };
    let provided = headers.get("X-ADMIN-TOKEN").and_then(|v| v.to_str().ok()).unwrap_or("");
    if provided == required {
        Ok(())
    } else {
        Err((StatusCode::UNAUTHORIZED, "invalid admin token".into()))
    }
}
