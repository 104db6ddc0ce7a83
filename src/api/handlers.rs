use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use serde_json::{json, Value};

use crate::{
    error::{AppError, AppResult},
    models::{CacheStatsResponse, CorpusResponse, RecommendRequest, RecommendResponse},
};

use super::AppState;

/// Health check endpoint
pub async fn health_check() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Corpus item ids ordered by corpus index
pub async fn get_corpus(State(state): State<AppState>) -> Json<CorpusResponse> {
    let corpus = state.recommendations.corpus();
    Json(CorpusResponse {
        corpus_ids: corpus.ids().to_vec(),
        corpus_size: corpus.len(),
    })
}

/// Generate recommendations for a user profile
pub async fn recommend(
    State(state): State<AppState>,
    payload: Result<Json<RecommendRequest>, JsonRejection>,
) -> AppResult<Json<RecommendResponse>> {
    let Json(request) = payload.map_err(|e| AppError::InvalidInput(e.body_text()))?;

    tracing::info!(
        profile_entries = request.profile.len(),
        top_k = request.top_k,
        holdout = request.include_profile_holdout,
        contributions = request.include_contribution_analysis,
        niche_boost_factor = request.niche_boost_factor,
        "Recommendation request"
    );

    let response = state.recommendations.recommend(request).await?;
    Ok(Json(response))
}

pub async fn cache_stats(State(state): State<AppState>) -> Json<CacheStatsResponse> {
    let cache = state.recommendations.cache();
    Json(CacheStatsResponse {
        size: cache.len(),
        max_size: cache.max_size(),
    })
}

pub async fn clear_cache(State(state): State<AppState>) -> Json<Value> {
    state.recommendations.cache().clear();
    Json(json!({ "status": "ok", "message": "Cache cleared" }))
}
