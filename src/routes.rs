use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

use crate::hotspots::firms::FirmsClient;
use crate::hotspots::service::{
    FireQuery, FireService, FireServiceError, LocatedResult, PageResult, RawFireQuery,
};
use crate::location::geocoder::ReverseGeocoder;

// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub fires: Arc<FireService<FirmsClient, ReverseGeocoder>>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub version: String,
}

#[derive(Debug, Serialize)]
pub struct CacheClearedResponse {
    pub message: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

fn status_for(error: &FireServiceError) -> StatusCode {
    match error {
        FireServiceError::OverLimit { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        FireServiceError::Upstream(_) | FireServiceError::Enrichment(_) => StatusCode::BAD_GATEWAY,
    }
}

// Route handlers
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: chrono::Utc::now(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

pub async fn list_fires(
    State(state): State<AppState>,
    Query(raw): Query<RawFireQuery>,
) -> Result<Json<PageResult>, StatusCode> {
    let query = FireQuery::from_raw(raw);
    match state.fires.list_fires(&query).await {
        Ok(result) => Ok(Json(result)),
        Err(e) => {
            tracing::error!("fire listing failed: {}", e);
            Err(status_for(&e))
        }
    }
}

pub async fn list_fires_with_location(
    State(state): State<AppState>,
    Query(raw): Query<RawFireQuery>,
) -> Result<Json<LocatedResult>, StatusCode> {
    let query = FireQuery::from_raw(raw);
    match state.fires.list_all_with_location(&query).await {
        Ok(result) => Ok(Json(result)),
        Err(e) => {
            tracing::error!("fire location listing failed: {}", e);
            Err(status_for(&e))
        }
    }
}

pub async fn fire_stats(
    State(state): State<AppState>,
    Query(raw): Query<RawFireQuery>,
) -> Result<Json<Value>, StatusCode> {
    let query = FireQuery::from_raw(raw);
    match state.fires.stats(&query).await {
        Ok(stats) => Ok(Json(stats)),
        Err(e) => {
            tracing::error!("fire stats failed: {}", e);
            Err(status_for(&e))
        }
    }
}

pub async fn weekly_fire_stats(
    State(state): State<AppState>,
    Query(raw): Query<RawFireQuery>,
) -> Result<Json<Value>, StatusCode> {
    let query = FireQuery::from_raw(raw);
    match state.fires.weekly_stats(&query).await {
        Ok(stats) => Ok(Json(stats)),
        Err(e) => {
            tracing::error!("weekly fire stats failed: {}", e);
            Err(status_for(&e))
        }
    }
}

pub async fn clear_cache(State(state): State<AppState>) -> Json<CacheClearedResponse> {
    state.fires.cache().clear_all();
    tracing::info!("cache cleared by request");
    Json(CacheClearedResponse {
        message: "Cache limpo com sucesso".to_string(),
        timestamp: chrono::Utc::now(),
    })
}

// Create the router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/fires", get(list_fires))
        .route("/fires/locations", get(list_fires_with_location))
        .route("/fires/stats", get(fire_stats))
        .route("/fires/weekly-stats", get(weekly_fire_stats))
        .route("/cache/clear", post(clear_cache))
        .with_state(state)
}
