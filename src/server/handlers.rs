use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;

use crate::location::{Position, ProviderMode, ProviderSource, ProviderStatus, GPS_PROVIDER, NETWORK_PROVIDER};
use crate::plugin::{GeolocationPlugin, PluginConfig, PluginResult, PositionPayload, StaticPermissions};

use super::state::AppState;

// ─── Error response ──────────────────────────────────────────────

#[derive(Serialize)]
struct ApiErrorBody {
    error: String,
    code: u16,
}

#[derive(Debug)]
pub struct ApiError(StatusCode, String);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ApiErrorBody {
            error: self.1,
            code: self.0.as_u16(),
        };
        (self.0, Json(body)).into_response()
    }
}

fn api_error(status: StatusCode, msg: impl Into<String>) -> ApiError {
    ApiError(status, msg.into())
}

fn known_provider(id: &str) -> Result<&str, ApiError> {
    match id {
        GPS_PROVIDER | NETWORK_PROVIDER => Ok(id),
        other => Err(api_error(
            StatusCode::NOT_FOUND,
            format!("Unknown provider '{}'. Use 'gps' or 'network'.", other),
        )),
    }
}

// ─── GET /api/position ───────────────────────────────────────────

#[derive(Deserialize, Default)]
pub struct PositionQuery {
    pub mode: Option<String>,
    pub timeout_ms: Option<u64>,
}

pub async fn position(
    State(state): State<Arc<AppState>>,
    Query(params): Query<PositionQuery>,
) -> Result<Json<PositionPayload>, ApiError> {
    let start = Instant::now();

    let mode = match params.mode.as_deref() {
        Some(m) => m
            .parse::<ProviderMode>()
            .map_err(|e| api_error(StatusCode::BAD_REQUEST, e))?,
        None => state.config.mode,
    };
    let timeout = params
        .timeout_ms
        .map(Duration::from_millis)
        .unwrap_or(state.default_timeout);

    let config = PluginConfig { mode, ..state.config };
    let mut plugin = GeolocationPlugin::with_config(state.feed.clone(), StaticPermissions::all(), config);
    let (reply_tx, mut reply_rx) = tokio::sync::mpsc::unbounded_channel::<PluginResult>();
    plugin.execute("getCurrentPosition2", reply_tx);

    let settled = tokio::time::timeout(timeout, plugin.settle()).await;
    plugin.destroy();

    let outcome = match (settled, reply_rx.try_recv()) {
        (_, Ok(PluginResult::Position(payload))) => Ok(payload),
        (_, Ok(PluginResult::Error(msg))) => Err(api_error(StatusCode::SERVICE_UNAVAILABLE, msg)),
        (Err(_), _) => Err(api_error(
            StatusCode::GATEWAY_TIMEOUT,
            format!("No fix within {} ms", timeout.as_millis()),
        )),
        (Ok(()), other) => Err(api_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Unexpected plugin reply: {:?}", other),
        )),
    };

    info!(
        mode = %mode,
        ok = outcome.is_ok(),
        elapsed_ms = start.elapsed().as_secs_f64() * 1000.0,
        "GET /api/position"
    );
    outcome.map(Json)
}

// ─── POST /api/providers/{id}/fix ────────────────────────────────

#[derive(Deserialize)]
pub struct FixBody {
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy: f64,
    pub altitude: Option<f64>,
    pub speed: Option<f64>,
    pub bearing: Option<f64>,
    /// Epoch milliseconds; stamped on arrival when absent.
    pub timestamp: Option<i64>,
}

#[derive(Serialize, Debug)]
pub struct FixAccepted {
    pub provider: String,
    pub timestamp: i64,
    pub delivered: usize,
}

pub async fn publish_fix(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<FixBody>,
) -> Result<Json<FixAccepted>, ApiError> {
    let provider = known_provider(&id)?;
    if !(-90.0..=90.0).contains(&body.latitude) || !(-180.0..=180.0).contains(&body.longitude) {
        return Err(api_error(StatusCode::BAD_REQUEST,
            "Invalid coordinates. Lat: -90..90, Lon: -180..180"));
    }
    if !(body.accuracy.is_finite() && body.accuracy >= 0.0) {
        return Err(api_error(StatusCode::BAD_REQUEST, "Accuracy must be a non-negative number of meters"));
    }
    if !state.feed.is_provider_enabled(provider) {
        return Err(api_error(StatusCode::CONFLICT, format!("Provider '{}' is disabled", provider)));
    }

    let timestamp = body.timestamp.unwrap_or_else(|| Utc::now().timestamp_millis());
    let mut fix = Position::new(provider, body.latitude, body.longitude, body.accuracy, timestamp);
    if let Some(alt) = body.altitude {
        fix = fix.with_altitude(alt);
    }
    if let Some(speed) = body.speed {
        fix = fix.with_speed(speed);
    }
    if let Some(bearing) = body.bearing {
        fix = fix.with_bearing(bearing);
    }

    let delivered = state.feed.publish(fix);
    info!(provider, timestamp, delivered, "POST fix");
    Ok(Json(FixAccepted { provider: provider.to_string(), timestamp, delivered }))
}

// ─── POST /api/providers/{id}/enabled ────────────────────────────

#[derive(Deserialize, Serialize, Debug)]
pub struct EnabledBody {
    pub enabled: bool,
}

pub async fn set_enabled(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<EnabledBody>,
) -> Result<Json<EnabledBody>, ApiError> {
    let provider = known_provider(&id)?;
    state.feed.set_enabled(provider, body.enabled);
    info!(provider, enabled = body.enabled, "POST enabled");
    Ok(Json(body))
}

// ─── POST /api/providers/{id}/status ─────────────────────────────

#[derive(Deserialize, Serialize, Debug)]
pub struct StatusBody {
    pub status: ProviderStatus,
}

pub async fn set_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<StatusBody>,
) -> Result<Json<StatusBody>, ApiError> {
    let provider = known_provider(&id)?;
    state.feed.set_status(provider, body.status);
    info!(provider, status = %body.status, "POST status");
    Ok(Json(body))
}
