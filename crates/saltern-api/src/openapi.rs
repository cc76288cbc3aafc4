//! `OpenAPI` (3.1) specification generation for `saltern-api`.
//!
//! The checked-in spec is used to generate firmware stubs and dashboard
//! clients, and to detect breaking API changes in CI.

use utoipa::OpenApi;

/// `OpenAPI` documentation for the saltern REST API.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Saltern API",
        description = "Salinity-control fleet reconciliation REST API"
    ),
    paths(
        crate::routes::sync::sync_device,
        crate::routes::devices::list_devices,
        crate::routes::devices::edit_device,
    ),
    components(
        schemas(
            crate::routes::sync::SyncRequest,
            crate::routes::sync::SyncResponse,
            crate::routes::devices::EditResponse,
        )
    ),
    tags(
        (name = "devices", description = "Device sync and fleet operations"),
    ),
)]
pub struct ApiDoc;

/// Returns the generated `OpenAPI` spec.
#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    ApiDoc::openapi()
}

/// Returns the generated `OpenAPI` spec serialized as pretty JSON.
///
/// # Errors
///
/// Returns an error if JSON serialization fails (should not happen).
pub fn openapi_json() -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(&openapi())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spec_includes_all_routes() {
        let spec = openapi();
        let paths = &spec.paths.paths;
        assert!(paths.contains_key("/api/device/sync"));
        assert!(paths.contains_key("/api/devices"));
        assert!(paths.contains_key("/api/device/{mac}"));
    }

    #[test]
    fn spec_serializes_to_json() {
        let json = openapi_json().unwrap();
        assert!(json.contains("Saltern API"));
    }
}
