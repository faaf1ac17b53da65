//! Upload ingestion.
//!
//! `POST /upload` takes a `multipart/form-data` body and stores the first part that is a file
//! under the configured field name (`image` by default). The part is streamed chunk by chunk
//! into the blob store under a freshly generated name; the rest of the body is not read.
//!
//! Outcomes:
//!
//! - no matching file part (or a body that is not multipart at all): 400 `No file uploaded`
//! - multipart framing that breaks after a part has started: 400
//! - file stored: 200 with the storage name and its public path
//! - file larger than `uploads.max_file_size`: 413
//! - entropy or storage failure: 500, and no name is handed out
//!
//! A failed write leaves whatever bytes reached the disk in place.

use crate::AppState;
use crate::api::models::uploads::UploadResponse;
use crate::errors::{Error, ErrorResponse, Result};
use crate::storage::{BlobSink, StorageError, StoredFile, naming};
use axum::{
    Json,
    extract::{
        Multipart, State,
        multipart::{Field, MultipartError, MultipartRejection},
    },
    http::StatusCode,
};
use tracing::{debug, info, instrument, warn};

/// How many storage names to try before giving up on collisions with existing blobs.
const MAX_NAME_ATTEMPTS: usize = 3;

#[utoipa::path(
    post,
    path = "/upload",
    tag = "uploads",
    summary = "Upload file",
    description = "Upload a single file in the `image` multipart field. The file is stored under a random name that keeps the original extension.",
    request_body(
        content_type = "multipart/form-data",
        description = "Multipart form with one file part named `image`; other fields are ignored"
    ),
    responses(
        (status = 200, description = "File uploaded successfully", body = UploadResponse),
        (status = 400, description = "No file uploaded, or malformed multipart body", body = ErrorResponse),
        (status = 413, description = "Payload too large", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
pub async fn upload_image(
    State(state): State<AppState>,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> Result<Json<UploadResponse>> {
    let result = receive_upload(&state, multipart).await;

    let outcome = match &result {
        Ok(_) => "success",
        Err(Error::NoFileUploaded) => "no_file",
        Err(e) if e.status_code().is_client_error() => "rejected",
        Err(_) => "failed",
    };
    metrics::counter!("imgstore_uploads_total", "outcome" => outcome).increment(1);

    let stored = result?;
    metrics::counter!("imgstore_upload_bytes_total").increment(stored.size_bytes);

    let file_path = state.config.public_path(&stored.storage_name);
    info!(
        storage_name = %stored.storage_name,
        size_bytes = stored.size_bytes,
        file_path = %file_path,
        "File uploaded successfully"
    );

    Ok(Json(UploadResponse::new(&stored, file_path)))
}

#[instrument(skip_all)]
async fn receive_upload(state: &AppState, multipart: std::result::Result<Multipart, MultipartRejection>) -> Result<StoredFile> {
    let mut multipart = match multipart {
        Ok(multipart) => multipart,
        Err(rejection) => {
            // Same as a multipart body without the file: nothing to store
            debug!(%rejection, "Request body is not multipart");
            return Err(Error::NoFileUploaded);
        }
    };

    let field_name = state.config.uploads.field_name.as_str();

    let mut seen_field = false;
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            // An empty or truncated body that never reached a part header carries no file
            Err(e) if !seen_field && e.status() != StatusCode::PAYLOAD_TOO_LARGE => {
                debug!(error = %e.body_text(), "Multipart body ended before the first part");
                return Err(Error::NoFileUploaded);
            }
            Err(e) => return Err(multipart_error(e)),
        };
        seen_field = true;

        if field.name() != Some(field_name) {
            debug!(name = ?field.name(), "Skipping multipart field");
            continue;
        }

        // A part without a filename (or with `filename=""`, an empty file input) is not a file
        let Some(original_name) = field.file_name().filter(|name| !name.is_empty()).map(str::to_string) else {
            debug!(name = field_name, "Skipping non-file part with upload field name");
            continue;
        };

        return store_field(state, &original_name, field).await;
    }

    Err(Error::NoFileUploaded)
}

/// Stream one file part into a new blob.
async fn store_field(state: &AppState, original_name: &str, mut field: Field<'_>) -> Result<StoredFile> {
    let (storage_name, mut sink) = create_blob(state, original_name).await?;
    let max_file_size = state.config.uploads.max_file_size;

    debug!(
        storage_name = %storage_name,
        original_name = %original_name,
        "Starting file upload stream"
    );

    let mut total_size = 0u64;
    while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
        total_size += chunk.len() as u64;

        // Check size limit incrementally to fail fast
        if total_size > max_file_size {
            warn!(
                storage_name = %storage_name,
                total_size,
                max_file_size,
                "File size limit exceeded, aborting upload"
            );
            return Err(too_large(max_file_size));
        }

        sink.write(&chunk).await?;
    }

    let size_bytes = sink.finish().await?;

    Ok(StoredFile {
        extension: naming::extension_of(original_name).to_string(),
        storage_name,
        size_bytes,
    })
}

/// Open a blob under a fresh random name, re-rolling if the name is somehow already taken.
async fn create_blob(state: &AppState, original_name: &str) -> Result<(String, Box<dyn BlobSink>)> {
    for attempt in 1..=MAX_NAME_ATTEMPTS {
        let storage_name = naming::generate_storage_name(original_name).await?;

        match state.blob_store.create(&storage_name).await {
            Ok(sink) => return Ok((storage_name, sink)),
            Err(StorageError::AlreadyExists { .. }) => {
                warn!(storage_name = %storage_name, attempt, "Storage name already taken, generating another");
            }
            Err(e) => return Err(e.into()),
        }
    }

    Err(Error::Internal {
        operation: format!("allocate an unused storage name in {MAX_NAME_ATTEMPTS} attempts"),
    })
}

fn too_large(max_file_size: u64) -> Error {
    Error::PayloadTooLarge {
        message: format!(
            "File size exceeds maximum allowed size of {} bytes ({} MB)",
            max_file_size,
            max_file_size / (1024 * 1024)
        ),
    }
}

fn multipart_error(e: MultipartError) -> Error {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        return Error::PayloadTooLarge { message: e.body_text() };
    }
    Error::BadRequest {
        message: format!("Failed to parse multipart data: {}", e.body_text()),
    }
}
