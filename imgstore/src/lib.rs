//! # imgstore: single-file upload service
//!
//! `imgstore` accepts `multipart/form-data` uploads on `POST /upload`, writes the file under a
//! random, collision-resistant name into a flat directory, and answers with the name and the
//! path the file is reachable under:
//!
//! ```json
//! { "message": "File uploaded successfully",
//!   "filename": "3f9a0c61d2e84b7a95c0e1f2.jpeg",
//!   "filePath": "/images/3f9a0c61d2e84b7a95c0e1f2.jpeg" }
//! ```
//!
//! ## Architecture
//!
//! The HTTP layer is [Axum](https://github.com/tokio-rs/axum). A request travels through:
//!
//! 1. the CORS and tracing layers built in [`build_router`]
//! 2. [`api::handlers::uploads::upload_image`], which decodes the multipart stream and picks out
//!    the file part
//! 3. [`storage::naming`], which derives the storage name from OS randomness and the original
//!    extension
//! 4. a [`storage::BlobStore`] (in production [`storage::LocalBlobStore`]) that receives the
//!    bytes chunk by chunk
//!
//! Anything the upload router does not match is handed to a delegated [`Router`] supplied by the
//! caller, so the service can sit in front of an existing set of routes.
//!
//! ## Quick Start
//!
//! ```no_run
//! use clap::Parser;
//! use imgstore::{Application, Config};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> anyhow::Result<()> {
//!     let args = imgstore::config::Args::parse();
//!     let config = Config::load(&args)?;
//!
//!     imgstore::telemetry::init_telemetry(config.enable_otel_export)?;
//!
//!     let app = Application::new(config).await?;
//!     app.serve(async {
//!         tokio::signal::ctrl_c().await.expect("Failed to listen for Ctrl+C");
//!     })
//!     .await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration
//!
//! See the [`config`] module for configuration options.

pub mod api;
pub mod config;
pub mod errors;
mod openapi;
pub mod storage;
pub mod telemetry;

#[cfg(test)]
pub mod test_utils;

use crate::config::CorsOrigin;
use crate::openapi::ApiDoc;
use crate::storage::{BlobStore, LocalBlobStore};
use anyhow::Context;
use axum::extract::DefaultBodyLimit;
use axum::http::{HeaderName, HeaderValue, Method};
use axum::{
    Json, Router,
    routing::{get, post},
};
use axum_prometheus::PrometheusMetricLayer;
use bon::Builder;
pub use config::Config;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    services::ServeDir,
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::{Level, debug, info, instrument, warn};
use utoipa::OpenApi;

/// Room left in the request body limit for multipart boundaries and part headers.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Application state shared across all request handlers.
///
/// ```ignore
/// let state = AppState::builder()
///     .config(config)
///     .blob_store(Arc::new(LocalBlobStore::new("./public/images")))
///     .build();
/// ```
#[derive(Clone, Builder)]
pub struct AppState {
    pub config: Config,
    pub blob_store: Arc<dyn BlobStore>,
}

/// Create CORS layer from configuration
fn create_cors_layer(config: &Config) -> anyhow::Result<CorsLayer> {
    let cors_config = &config.cors;

    let allow_origin = if cors_config.allowed_origins.iter().any(|o| matches!(o, CorsOrigin::Wildcard)) {
        AllowOrigin::any()
    } else {
        let mut origins = Vec::new();
        for origin in &cors_config.allowed_origins {
            origins.push(origin.header_value().parse::<HeaderValue>()?);
        }
        AllowOrigin::list(origins)
    };

    let methods = cors_config
        .allowed_methods
        .iter()
        .map(|m| Method::from_bytes(m.as_bytes()))
        .collect::<Result<Vec<_>, _>>()?;

    let headers = cors_config
        .allowed_headers
        .iter()
        .map(|h| HeaderName::from_bytes(h.as_bytes()))
        .collect::<Result<Vec<_>, _>>()?;

    let mut cors = CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(methods)
        .allow_headers(headers)
        .allow_credentials(cors_config.allow_credentials);

    if let Some(max_age) = cors_config.max_age {
        cors = cors.max_age(std::time::Duration::from_secs(max_age));
    }

    Ok(cors)
}

/// Build the main application router.
///
/// Mounts:
/// - `POST /upload` with a body limit derived from `uploads.max_file_size`
/// - `GET /healthz`
/// - `GET /api-docs/openapi.json`
/// - stored files under `storage.public_prefix` (if `storage.serve_files`)
/// - `GET /internal/metrics` (if `enable_metrics`)
///
/// Every other request falls through to `delegated`. CORS and tracing apply to all of it.
///
/// # Errors
///
/// Returns an error if the configuration fails [`Config::validate`] or the CORS settings cannot
/// be turned into header values.
#[instrument(skip_all)]
pub fn build_router(state: &AppState, delegated: Router) -> anyhow::Result<Router> {
    let config = &state.config;
    config.validate()?;
    let body_limit = usize::try_from(config.uploads.max_file_size)?.saturating_add(MULTIPART_OVERHEAD);

    let mut router = Router::new()
        .route(
            "/upload",
            post(api::handlers::uploads::upload_image).layer(DefaultBodyLimit::max(body_limit)),
        )
        .route("/healthz", get(|| async { "OK" }))
        .route("/api-docs/openapi.json", get(|| async { Json(ApiDoc::openapi()) }))
        .with_state(state.clone());

    if config.storage.serve_files {
        router = router.nest_service(&config.storage.public_prefix, ServeDir::new(&config.storage.root));
    }

    let router = router.fallback_service(delegated);

    let cors_layer = create_cors_layer(config)?;
    let mut router = router.layer(cors_layer);

    if config.enable_metrics {
        let (prometheus_layer, metric_handle) = PrometheusMetricLayer::pair();
        router = router
            .route("/internal/metrics", get(|| async move { metric_handle.render() }))
            .layer(prometheus_layer);
    }

    let router = router.layer(
        TraceLayer::new_for_http()
            .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
            .on_request(DefaultOnRequest::new().level(Level::INFO))
            .on_response(DefaultOnResponse::new().level(Level::INFO)),
    );

    Ok(router)
}

/// The upload service, ready to serve.
///
/// 1. **Create**: [`Application::new`] (or [`Application::with_routes`]) prepares the storage
///    root and builds the router
/// 2. **Serve**: [`Application::serve`] binds to the configured address and handles requests
///    until the shutdown future resolves
pub struct Application {
    router: Router,
    config: Config,
}

impl Application {
    /// Create an application with no delegated routes
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        Self::with_routes(config, Router::new()).await
    }

    /// Create an application that forwards unmatched requests to `delegated`
    pub async fn with_routes(config: Config, delegated: Router) -> anyhow::Result<Self> {
        debug!("Starting imgstore with configuration: {:#?}", config);

        let blob_store = LocalBlobStore::new(&config.storage.root);
        if config.storage.create_root {
            blob_store
                .ensure_root()
                .await
                .with_context(|| format!("Failed to create storage root {}", config.storage.root.display()))?;
        } else if !blob_store.root().is_dir() {
            warn!(root = %blob_store.root().display(), "Storage root does not exist; uploads will fail until it is created");
        }

        let state = AppState::builder().config(config.clone()).blob_store(Arc::new(blob_store)).build();
        let router = build_router(&state, delegated)?;

        Ok(Self { router, config })
    }

    /// Convert application into a test server (for tests)
    #[cfg(test)]
    pub fn into_test_server(self) -> axum_test::TestServer {
        axum_test::TestServer::new(self.router).expect("Failed to create test server")
    }

    /// Start serving the application
    pub async fn serve<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let bind_addr = self.config.bind_address();
        let listener = TcpListener::bind(&bind_addr).await?;
        info!(
            "imgstore listening on http://{}, storing uploads in {}",
            bind_addr,
            self.config.storage.root.display()
        );

        axum::serve(listener, self.router.into_make_service())
            .with_graceful_shutdown(shutdown)
            .await?;

        info!("Shutting down telemetry...");
        telemetry::shutdown_telemetry();

        Ok(())
    }
}
