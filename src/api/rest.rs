// =============================================================================
// REST API Endpoints, Axum 0.7
// =============================================================================
//
// Thin handlers over the shared AppState: recommendations are served through
// the single-flight cache, strategy updates go through the guarded registry.
// All routes live under `/api/v1/` except the bare health probe.
//
// CORS: explicit configured origins run with credentials enabled; an empty
// origin list falls back to a permissive wildcard without credentials.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use crate::app_state::AppState;
use crate::engine::EngineError;
use crate::strategy::registry::RegistryError;
use crate::ENGINE_VERSION;

// =============================================================================
// Error mapping
// =============================================================================

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("no market data available")]
    NoData,

    #[error("internal error")]
    Internal,
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::NoData(reason) => {
                warn!(error = %reason, "recommendation unavailable");
                Self::NoData
            }
            EngineError::Cancelled => Self::Internal,
            EngineError::Internal(reason) => {
                warn!(error = %reason, "engine internal failure");
                Self::Internal
            }
        }
    }
}

impl From<RegistryError> for ApiError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::UnknownStrategy(name) => {
                Self::NotFound(format!("unknown strategy: {name}"))
            }
            RegistryError::NegativeWeight(_) => Self::BadRequest(err.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, json!({ "error": msg })),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, json!({ "error": msg })),
            Self::NoData => (StatusCode::SERVICE_UNAVAILABLE, json!({ "error": "no_data" })),
            Self::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({ "error": "internal_error" }),
            ),
        };
        (status, Json(body)).into_response()
    }
}

// =============================================================================
// Router construction
// =============================================================================

/// Build the full router with CORS middleware and shared state.
pub fn router(state: Arc<AppState>, cors_origins: &[String]) -> Router {
    let cors = build_cors(cors_origins);

    Router::new()
        .route("/health", get(health))
        .route("/api/v1/instruments", get(instruments))
        .route("/api/v1/recommendations/:instrument", get(recommendation))
        .route(
            "/api/v1/recommendations/:instrument/refresh",
            post(refresh_recommendation),
        )
        .route("/api/v1/strategies", get(list_strategies))
        .route("/api/v1/strategies/:name", put(update_strategy))
        .layer(cors)
        .with_state(state)
}

fn build_cors(origins: &[String]) -> CorsLayer {
    let methods = [Method::GET, Method::POST, Method::PUT, Method::OPTIONS];
    if origins.is_empty() {
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(methods)
            .allow_headers(Any);
    }

    let parsed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(err) => {
                warn!(origin = %origin, error = %err, "ignoring malformed CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(parsed)
        .allow_methods(methods)
        .allow_headers(Any)
        .allow_credentials(true)
}

// =============================================================================
// Handlers
// =============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        version: ENGINE_VERSION,
    })
}

async fn instruments(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let ids: Vec<&str> = state.instruments.iter().map(|i| i.id.as_str()).collect();
    Json(ids).into_response()
}

#[derive(Deserialize)]
struct RecommendationQuery {
    #[serde(default)]
    as_of: Option<String>,
}

async fn recommendation(
    State(state): State<Arc<AppState>>,
    Path(instrument): Path<String>,
    Query(query): Query<RecommendationQuery>,
) -> Result<Response, ApiError> {
    let instrument = state
        .instrument(&instrument)
        .ok_or_else(|| ApiError::NotFound(format!("instrument not tracked: {instrument}")))?
        .clone();

    let as_of = match &query.as_of {
        Some(raw) => Some(parse_as_of(raw)?),
        None => None,
    };

    let rec = state.recommendation(&instrument, as_of).await?;
    Ok(Json(rec.as_ref()).into_response())
}

async fn refresh_recommendation(
    State(state): State<Arc<AppState>>,
    Path(instrument): Path<String>,
) -> Result<Response, ApiError> {
    let instrument = state
        .instrument(&instrument)
        .ok_or_else(|| ApiError::NotFound(format!("instrument not tracked: {instrument}")))?
        .clone();

    let rec = state.refresh(&instrument).await?;
    info!(instrument = %instrument.id, action = %rec.decision.action, "recommendation refreshed");
    Ok(Json(rec.as_ref()).into_response())
}

async fn list_strategies(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.registry.records()).into_response()
}

#[derive(Deserialize)]
struct StrategyUpdate {
    #[serde(default)]
    enabled: Option<bool>,
    #[serde(default)]
    weight: Option<f64>,
}

async fn update_strategy(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Json(update): Json<StrategyUpdate>,
) -> Result<Response, ApiError> {
    let record = state
        .registry
        .apply_update(&name, update.enabled, update.weight)?;
    info!(
        strategy = %record.name,
        enabled = record.enabled,
        weight = record.weight,
        "strategy updated via API"
    );
    Ok(Json(record).into_response())
}

fn parse_as_of(raw: &str) -> Result<DateTime<Utc>, ApiError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|err| ApiError::BadRequest(format!("malformed as_of timestamp: {err}")))
}
