//! HTTP route handlers.

pub mod devices;
pub mod sync;

use std::sync::Arc;

use axum::Router;

use crate::server::AppState;

/// `/api/*` routes used by device firmware and the operator app.
pub fn api_routes() -> Router<Arc<AppState>> {
    Router::new().merge(sync::routes()).merge(devices::routes())
}
