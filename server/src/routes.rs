use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use crate::{
    config::Config,
    engine::{CacheResponse, FetchCache, FetchError, SlotStatus},
    upstream::{AIR_QUALITY_KEY, WEATHER_KEY},
    utils::{angle_to_cardinal, format_server_time, format_wind_speed, pm25_from_aqi, AqiLevel, ErrorResponse},
};

// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub cache: FetchCache,
}

#[derive(Debug, Default, Deserialize)]
pub struct FetchQuery {
    pub refresh: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub version: String,
}

/// Numbers the display renders directly, derived from the station reading
#[derive(Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AirQualitySummary {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aqi: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<AqiLevel>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pm25: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wind_kmh: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wind_direction: Option<&'static str>,
}

#[derive(Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeatherSummary {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wind_direction: Option<&'static str>,
}

#[derive(Debug, Serialize)]
pub struct DisplayResponse<S> {
    #[serde(flatten)]
    pub response: CacheResponse,
    pub summary: S,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

impl AirQualitySummary {
    pub fn from_payload(payload: &Value) -> Self {
        let aqi = payload
            .pointer("/data/current/pollution/aqius")
            .and_then(Value::as_f64)
            .map(|aqi| aqi.round() as i64);
        let weather = payload.pointer("/data/current/weather");

        Self {
            aqi,
            level: aqi.map(AqiLevel::from_aqi),
            pm25: aqi.and_then(pm25_from_aqi),
            wind_kmh: weather
                .and_then(|w| w.get("ws"))
                .and_then(Value::as_f64)
                .map(format_wind_speed),
            wind_direction: weather
                .and_then(|w| w.get("wd"))
                .and_then(Value::as_f64)
                .map(angle_to_cardinal),
        }
    }
}

impl WeatherSummary {
    pub fn from_payload(payload: &Value) -> Self {
        Self {
            wind_direction: payload
                .pointer("/current/windDirection")
                .and_then(Value::as_f64)
                .map(angle_to_cardinal),
        }
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

pub async fn get_air_quality(
    State(state): State<AppState>,
    Query(params): Query<FetchQuery>,
) -> Result<Json<DisplayResponse<AirQualitySummary>>, ApiError> {
    let response = fetch(&state, AIR_QUALITY_KEY, &params).await?;
    let summary = AirQualitySummary::from_payload(&response.payload);

    Ok(Json(DisplayResponse { response, summary }))
}

pub async fn get_weather(
    State(state): State<AppState>,
    Query(params): Query<FetchQuery>,
) -> Result<Json<DisplayResponse<WeatherSummary>>, ApiError> {
    let response = fetch(&state, WEATHER_KEY, &params).await?;
    let summary = WeatherSummary::from_payload(&response.payload);

    Ok(Json(DisplayResponse { response, summary }))
}

pub async fn get_time(State(state): State<AppState>) -> Result<impl IntoResponse, StatusCode> {
    let now = format_server_time(chrono::Utc::now(), &state.config.app_timezone).map_err(|e| {
        tracing::error!("Failed to format server time: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    Ok((
        [
            (header::CONTENT_TYPE, "text/plain; charset=utf-8"),
            (header::CACHE_CONTROL, "no-cache, no-store, must-revalidate"),
            (header::PRAGMA, "no-cache"),
            (header::EXPIRES, "0"),
        ],
        now,
    ))
}

pub async fn get_cache_status(State(state): State<AppState>) -> Json<Vec<SlotStatus>> {
    Json(state.cache.snapshot().await)
}

async fn fetch(state: &AppState, key: &str, params: &FetchQuery) -> Result<CacheResponse, ApiError> {
    let forced = params.refresh.unwrap_or(false);

    let result = if forced && state.config.allow_forced_refresh {
        tracing::info!("Forced refresh of {} requested", key);
        state.cache.refresh(key).await
    } else {
        if forced {
            tracing::debug!("Ignoring refresh request for {}: forced refresh is disabled", key);
        }
        state.cache.get(key).await
    };

    result.map_err(error_response)
}

fn error_response(err: FetchError) -> ApiError {
    match &err {
        FetchError::NoDataAvailable { .. } => {
            tracing::error!("Request failed: {}", err);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ErrorResponse::new(&err.to_string(), "NO_DATA_AVAILABLE")),
            )
        }
        FetchError::UnknownResource(_) => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse::new(&err.to_string(), "UNKNOWN_RESOURCE")),
        ),
    }
}

// Create the router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/air-quality", get(get_air_quality))
        .route("/api/weather", get(get_weather))
        .route("/api/time", get(get_time))
        .route("/api/cache", get(get_cache_status))
        .with_state(state)
}
