use crate::storage::{StorageError, naming::EntropyError};
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use thiserror::Error as ThisError;
use utoipa::ToSchema;

#[derive(ThisError, Debug)]
pub enum Error {
    /// The request carried no file under the upload field
    #[error("No file uploaded")]
    NoFileUploaded,

    /// Invalid request data, e.g. broken multipart framing
    #[error("{message}")]
    BadRequest { message: String },

    /// Upload exceeded the configured size limit
    #[error("{message}")]
    PayloadTooLarge { message: String },

    /// Random name generation failed
    #[error(transparent)]
    Entropy(#[from] EntropyError),

    /// Writing the blob failed
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Generic internal service error
    #[error("Failed to {operation}")]
    Internal { operation: String },
}

/// JSON body of every error response.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub message: String,
}

impl Error {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::NoFileUploaded | Error::BadRequest { .. } => StatusCode::BAD_REQUEST,
            Error::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Error::Entropy(_) | Error::Storage(_) | Error::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns a user-safe error message, without leaking internal implementation details
    pub fn user_message(&self) -> String {
        match self {
            Error::NoFileUploaded => "No file uploaded".to_string(),
            Error::BadRequest { message } | Error::PayloadTooLarge { message } => message.clone(),
            Error::Entropy(_) | Error::Storage(_) | Error::Internal { .. } => "Internal server error".to_string(),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        // Log full error details for debugging - different log levels based on severity
        match &self {
            Error::Entropy(_) | Error::Storage(_) | Error::Internal { .. } => {
                tracing::error!("Internal service error: {:#}", self);
            }
            Error::PayloadTooLarge { .. } => {
                tracing::warn!("Upload rejected: {}", self);
            }
            Error::NoFileUploaded | Error::BadRequest { .. } => {
                tracing::debug!("Client error: {}", self);
            }
        }

        let status = self.status_code();
        let body = ErrorResponse {
            message: self.user_message(),
        };
        (status, Json(body)).into_response()
    }
}

/// Type alias for service operation results
pub type Result<T> = std::result::Result<T, Error>;
