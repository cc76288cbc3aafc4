//! Fleet view and operator edit routes.
//!
//! ## Routes
//!
//! - `GET /api/devices` - Fleet snapshot keyed by device identifier
//! - `PUT /api/device/:mac` - Apply a partial operator edit

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, put};
use axum::{Json, Router};
use serde::Serialize;
use utoipa::ToSchema;

use saltern_core::{CommandApplier, DeviceEdit, DeviceId, EditOutcome, FleetViewProjector};

use crate::error::ApiError;
use crate::server::AppState;

/// Response for an applied operator edit.
#[derive(Debug, Serialize, ToSchema)]
#[cfg_attr(test, derive(serde::Deserialize))]
pub struct EditResponse {
    /// Always true when the edit was written.
    pub success: bool,
}

/// Creates fleet view and edit routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/devices", get(list_devices))
        .route("/api/device/:mac", put(edit_device))
}

/// List the whole fleet.
///
/// GET /api/devices
#[utoipa::path(
    get,
    path = "/api/devices",
    tag = "devices",
    responses(
        (status = 200, description = "Mapping from device identifier to its view; boolean columns coerced to real booleans"),
        (status = 500, description = "Store failure (plain-text message)"),
    )
)]
pub(crate) async fn list_devices(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let projector = FleetViewProjector::new(state.store());
    let fleet = projector.list_all().await.map_err(ApiError::from)?;

    tracing::debug!(devices = fleet.len(), "Fleet view served");
    Ok(Json(fleet))
}

/// Apply a partial operator edit to one device.
///
/// PUT /api/device/:mac
///
/// The body may contain any subset of `valve`, `manualMode`,
/// `targetSalinity`, `isFinal`, `name`; anything else is silently
/// ignored. When no allow-listed field is present the response is the
/// distinct plain-text `No changes` rather than `{"success": true}`.
#[utoipa::path(
    put,
    path = "/api/device/{mac}",
    tag = "devices",
    params(
        ("mac" = String, Path, description = "Device hardware address")
    ),
    responses(
        (status = 200, description = "Edit applied (`{\"success\": true}`) or, distinctly, `No changes`", body = EditResponse),
        (status = 500, description = "Store failure (plain-text message)"),
    )
)]
pub(crate) async fn edit_device(
    State(state): State<Arc<AppState>>,
    Path(mac): Path<String>,
    Json(edit): Json<DeviceEdit>,
) -> Result<Response, ApiError> {
    let id = DeviceId::new(&mac).map_err(ApiError::from)?;

    tracing::info!(device = %id, "Operator edit");

    let applier = CommandApplier::new(state.store());
    let outcome = applier.apply_edit(&id, edit).await.map_err(ApiError::from)?;

    Ok(match outcome {
        EditOutcome::Applied => Json(EditResponse { success: true }).into_response(),
        EditOutcome::NoChanges => "No changes".into_response(),
    })
}
