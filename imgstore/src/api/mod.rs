//! API layer for HTTP request handling and data models.
//!
//! - **[`handlers`]**: Axum route handlers
//! - **[`models`]**: Request/response data structures
//!
//! # API Structure
//!
//! - `POST /upload`: single-file multipart upload, see [`handlers::uploads`]
//! - `GET <public_prefix>/{name}`: stored files, when `storage.serve_files` is enabled
//! - `GET /healthz`: liveness
//! - `GET /api-docs/openapi.json`: OpenAPI document for the endpoints above
//!
//! Every other path belongs to the delegated router passed to [`crate::build_router`].

pub mod handlers;
pub mod models;
