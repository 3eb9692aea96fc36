use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    response::Json,
    routing::{get, post, put},
    Router,
};
use serde::{Deserialize, Serialize};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::config::{AppConfig, ConfigStore, RetrievalConfig};
use crate::llm::backend_from_config;
use crate::models::{AnswerResult, ApiResponse, ContextPreview, SeedBucketAnalysis};
use crate::services::Assistant;
use crate::store::{SharedStore, StoreSummary};

#[derive(Clone)]
pub struct AppState {
    pub store: SharedStore,
    pub config: Arc<ConfigStore>,
    pub assistant: Assistant,
}

pub async fn serve(config: Arc<ConfigStore>, port: u16) -> anyhow::Result<()> {
    let snapshot = config.current().await;
    let store = SharedStore::open(&snapshot.data_dir).await?;
    let backend = backend_from_config(&snapshot.llm)?;

    let state = AppState {
        store,
        config,
        assistant: Assistant::new(backend),
    };
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;
    tracing::info!("BracketGPT API server listening on port {}", port);

    axum::serve(listener, app).await?;
    Ok(())
}

fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/chat", post(chat_handler))
        .route("/context/preview", post(context_preview_handler))
        .route("/analysis/seed-buckets", post(seed_buckets_handler))
        .route("/data/reload", post(reload_handler))
        .route("/config", get(get_config_handler))
        .route("/config/retrieval", put(update_retrieval_handler))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http().make_span_with(|req: &Request<Body>| {
                    tracing::info_span!(
                        "request",
                        request_id = %uuid::Uuid::new_v4(),
                        method = %req.method(),
                        uri = %req.uri(),
                    )
                }))
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

#[derive(Serialize)]
struct HealthStatus {
    status: &'static str,
    backend: String,
    data: StoreSummary,
}

// GET /health
async fn health_check(State(state): State<AppState>) -> Json<ApiResponse<HealthStatus>> {
    let store = state.store.snapshot().await;
    Json(ApiResponse::success(HealthStatus {
        status: "BracketGPT API is running",
        backend: state.assistant.backend_name().to_string(),
        data: store.summary(),
    }))
}

#[derive(Deserialize)]
struct QueryRequest {
    #[serde(default, alias = "message", alias = "question")]
    query: String,
}

// POST /chat - grounded answer; backend failures come back as reply text
async fn chat_handler(
    State(state): State<AppState>,
    Json(request): Json<QueryRequest>,
) -> Result<Json<ApiResponse<AnswerResult>>, StatusCode> {
    if request.query.trim().is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }
    let store = state.store.snapshot().await;
    let config = state.config.current().await;
    let result = state.assistant.answer(&store, &config, &request.query).await;
    Ok(Json(ApiResponse::success(result)))
}

// POST /context/preview - retrieval only, for tuning
async fn context_preview_handler(
    State(state): State<AppState>,
    Json(request): Json<QueryRequest>,
) -> Json<ApiResponse<ContextPreview>> {
    let store = state.store.snapshot().await;
    let config = state.config.current().await;
    Json(ApiResponse::success(Assistant::context_preview(
        &store,
        &config.retrieval,
        &request.query,
    )))
}

#[derive(Deserialize)]
struct SeedBucketRequest {
    #[serde(default = "default_analysis_request", alias = "query", alias = "message")]
    request: String,
}

fn default_analysis_request() -> String {
    "Give a seed-by-seed breakdown of the field.".to_string()
}

// POST /analysis/seed-buckets
async fn seed_buckets_handler(
    State(state): State<AppState>,
    Json(request): Json<SeedBucketRequest>,
) -> (StatusCode, Json<ApiResponse<SeedBucketAnalysis>>) {
    let store = state.store.snapshot().await;
    let config = state.config.current().await;

    match state
        .assistant
        .seed_bucket_analysis(&store, &config, &request.request)
        .await
    {
        Ok(analysis) => (StatusCode::OK, Json(ApiResponse::success(analysis))),
        Err(e) if e.is_missing_data() => {
            tracing::warn!("Seed bucket analysis rejected: {}", e);
            (StatusCode::UNPROCESSABLE_ENTITY, Json(ApiResponse::error(e.to_string())))
        }
        Err(e) => {
            tracing::error!("Seed bucket analysis failed: {}", e);
            (StatusCode::BAD_GATEWAY, Json(ApiResponse::error(e.to_string())))
        }
    }
}

// POST /data/reload - swap in a fresh snapshot of the data directory
async fn reload_handler(State(state): State<AppState>) -> Result<Json<ApiResponse<StoreSummary>>, StatusCode> {
    match state.store.reload().await {
        Ok(summary) => Ok(Json(ApiResponse::success(summary))),
        Err(e) => {
            tracing::error!("Failed to reload data: {}", e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

// GET /config
async fn get_config_handler(State(state): State<AppState>) -> Json<ApiResponse<AppConfig>> {
    Json(ApiResponse::success(state.config.current().await.redacted()))
}

// PUT /config/retrieval
async fn update_retrieval_handler(
    State(state): State<AppState>,
    Json(retrieval): Json<RetrievalConfig>,
) -> (StatusCode, Json<ApiResponse<RetrievalConfig>>) {
    if let Err(e) = retrieval.validate() {
        return (StatusCode::BAD_REQUEST, Json(ApiResponse::error(e.to_string())));
    }
    match state.config.update_retrieval(retrieval).await {
        Ok(config) => (StatusCode::OK, Json(ApiResponse::success(config.retrieval.clone()))),
        Err(e) => {
            tracing::error!("Failed to update retrieval config: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, Json(ApiResponse::error(e.to_string())))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::testing::ScriptedBackend;
    use crate::store::FactStore;

    fn state_with(dir: &std::path::Path, reply: &str) -> AppState {
        AppState {
            store: SharedStore::new(dir, FactStore::empty()),
            config: Arc::new(ConfigStore::with_config(dir.join("config.json"), AppConfig::default())),
            assistant: Assistant::new(Arc::new(ScriptedBackend::always(reply))),
        }
    }

    #[tokio::test]
    async fn test_chat_returns_backend_reply() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_with(dir.path(), "No data on that one.");
        let Json(resp) = chat_handler(
            State(state),
            Json(QueryRequest { query: "Duke vs Houston".into() }),
        )
        .await
        .unwrap();
        assert!(resp.success);
        assert_eq!(resp.data.unwrap().reply, "No data on that one.");
    }

    #[tokio::test]
    async fn test_chat_rejects_blank_query() {
        let dir = tempfile::tempdir().unwrap();
        let result = chat_handler(State(state_with(dir.path(), "x")), Json(QueryRequest { query: "  ".into() })).await;
        assert_eq!(result.err(), Some(StatusCode::BAD_REQUEST));
    }

    #[tokio::test]
    async fn test_seed_buckets_without_bracket_is_unprocessable() {
        let dir = tempfile::tempdir().unwrap();
        let (status, Json(resp)) = seed_buckets_handler(
            State(state_with(dir.path(), "x")),
            Json(SeedBucketRequest { request: "analyze".into() }),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(!resp.success);
        assert!(resp.error.unwrap().contains("No bracket data"));
    }

    #[tokio::test]
    async fn test_reload_then_analyze() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("bracket.json"),
            r#"{"regions": [{"region": "East", "teams": [{"name": "Duke", "seed": 1}]}]}"#,
        )
        .unwrap();
        let state = state_with(dir.path(), "### SEED_1\nDuke is the top seed.");

        let Json(summary) = reload_handler(State(state.clone())).await.unwrap();
        assert!(summary.data.unwrap().bracket_loaded);

        let (status, Json(resp)) = seed_buckets_handler(
            State(state),
            Json(SeedBucketRequest { request: "analyze".into() }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let analysis = resp.data.unwrap();
        assert!(analysis.validation.ok);
        assert_eq!(analysis.attempts, 1);
    }

    #[tokio::test]
    async fn test_retrieval_update_validates_and_applies() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_with(dir.path(), "x");

        let bad = RetrievalConfig { max_items: 0, ..RetrievalConfig::default() };
        let (status, _) = update_retrieval_handler(State(state.clone()), Json(bad)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let good = RetrievalConfig { max_items: 3, ..RetrievalConfig::default() };
        let (status, _) = update_retrieval_handler(State(state.clone()), Json(good)).await;
        assert_eq!(status, StatusCode::OK);

        let Json(resp) = get_config_handler(State(state)).await;
        assert_eq!(resp.data.unwrap().retrieval.max_items, 3);
        assert!(dir.path().join("config.json").exists());
    }
}
