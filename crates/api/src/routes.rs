use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::header,
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use propline_ml::WinClassifier;
use propline_models::{CategoryKey, PredictRequest, PredictionResponse};
use propline_services::{Metrics, PredictorService};
use serde::Serialize;
use tower_http::trace::TraceLayer;

use crate::error::ApiError;

#[derive(Clone)]
pub struct AppState {
    pub predictor: Arc<PredictorService>,
    pub metrics: Metrics,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(predictor: Arc<PredictorService>, metrics: Metrics) -> Self {
        Self {
            predictor,
            metrics,
            started_at: Instant::now(),
        }
    }
}

#[derive(Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
    pub version: String,
    pub uptime_seconds: u64,
}

#[derive(Serialize)]
pub struct ModelInfo {
    pub category: CategoryKey,
    pub label: &'static str,
    pub model_name: String,
    pub trained_at: DateTime<Utc>,
    pub sample_size: usize,
    pub accuracy: f64,
    pub brier_score: f64,
}

pub fn create_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(render_metrics))
        .route("/api/v1/predict", post(predict))
        .route("/api/v1/models", get(list_models))
}

/// Routes plus request tracing, ready to serve.
pub fn app(state: AppState) -> Router {
    create_routes().layer(TraceLayer::new_for_http()).with_state(state)
}

async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: Utc::now().to_rfc3339(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.started_at.elapsed().as_secs(),
    })
}

async fn predict(
    State(state): State<AppState>,
    payload: Result<Json<PredictRequest>, JsonRejection>,
) -> Result<Json<PredictionResponse>, ApiError> {
    let Json(request) = payload?;
    let response = state.predictor.predict(&request).await?;
    Ok(Json(response))
}

/// Models currently held in memory. Categories that were never requested are
/// not listed even when an artifact exists on disk.
async fn list_models(State(state): State<AppState>) -> Json<ApiResponse<Vec<ModelInfo>>> {
    let models: Vec<ModelInfo> = state
        .predictor
        .registry()
        .cached()
        .iter()
        .map(|artifact| {
            let summary = artifact.summary();
            ModelInfo {
                category: artifact.category(),
                label: artifact.category().label(),
                model_name: artifact.model_name().to_string(),
                trained_at: artifact.trained_at(),
                sample_size: summary.sample_size(),
                accuracy: summary.metrics.accuracy,
                brier_score: summary.metrics.brier_score,
            }
        })
        .collect();

    let message = format!("{} models loaded", models.len());
    Json(ApiResponse {
        success: true,
        data: Some(models),
        message: Some(message),
    })
}

async fn render_metrics(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}
