//! Device sync route.
//!
//! ## Routes
//!
//! - `POST /api/device/sync` - Merge a telemetry report, return the
//!   device's operating instruction

use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use saltern_core::{CommandEcho, DeviceId, Location, ReconciliationEngine, SyncReport};

use crate::error::ApiError;
use crate::server::AppState;

/// A telemetry report as device firmware sends it on the wire.
#[derive(Debug, Deserialize, ToSchema)]
pub struct SyncRequest {
    /// Hardware address of the reporting device.
    pub mac: String,
    /// Current sensor measurement. Stored as-is, no range validation.
    pub salinity: f64,
    /// The device's own idea of its valve state.
    pub valve: bool,
    /// Latitude in degrees.
    pub lat: f64,
    /// Longitude in degrees.
    pub lng: f64,
    /// Human-readable location string resolved by the device.
    pub address: String,
}

/// The operating instruction echoed back to the device.
#[derive(Debug, Serialize, ToSchema)]
#[cfg_attr(test, derive(Deserialize))]
pub struct SyncResponse {
    /// Whether the operator currently dictates valve state.
    pub manual_mode: bool,
    /// Desired salinity the device should drive toward.
    pub target_salinity: f64,
    /// Valve state the device should hold.
    pub valve: bool,
}

impl From<CommandEcho> for SyncResponse {
    fn from(echo: CommandEcho) -> Self {
        Self {
            manual_mode: echo.manual_mode,
            target_salinity: echo.target_salinity,
            valve: echo.valve,
        }
    }
}

/// Creates sync routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/api/device/sync", post(sync_device))
}

/// Merge a device telemetry report.
///
/// POST /api/device/sync
#[utoipa::path(
    post,
    path = "/api/device/sync",
    tag = "devices",
    request_body = SyncRequest,
    responses(
        (status = 200, description = "Report merged; operating instruction returned", body = SyncResponse),
        (status = 400, description = "Missing or empty device identifier"),
        (status = 500, description = "Store failure (plain-text message); device retries on its own schedule"),
    )
)]
pub(crate) async fn sync_device(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SyncRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let id = DeviceId::new(&req.mac).map_err(ApiError::from)?;

    tracing::debug!(
        device = %id,
        salinity = req.salinity,
        valve = req.valve,
        "Device sync"
    );

    let engine = ReconciliationEngine::new(state.store());
    let echo = engine
        .sync(SyncReport {
            id,
            salinity: req.salinity,
            valve: req.valve,
            location: Location::new(req.lat, req.lng),
            address: req.address,
        })
        .await
        .map_err(ApiError::from)?;

    Ok(Json(SyncResponse::from(echo)))
}
