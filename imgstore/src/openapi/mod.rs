//! OpenAPI document for the service's own endpoints.
//!
//! Served at `/api-docs/openapi.json`. Delegated routes are not described here.

use utoipa::OpenApi;

use crate::api::models::uploads::UploadResponse;
use crate::errors::ErrorResponse;

#[derive(OpenApi)]
#[openapi(
    info(title = "imgstore", description = "Single-file image upload service"),
    paths(crate::api::handlers::uploads::upload_image),
    components(schemas(UploadResponse, ErrorResponse)),
    tags((name = "uploads", description = "File upload"))
)]
pub struct ApiDoc;
